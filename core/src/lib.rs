//! Deterministic token deployment.
//!
//! Tokens are created at CREATE2 addresses derived from the factory address,
//! `keccak256` of the ABI-encoded token name, and the token's init code, so
//! anyone can compute where a token will land before it exists. Each
//! deployment also registers a trading pair against a reference asset with an
//! external pair registry, atomically.

pub mod encoding;
pub mod errors;
pub mod events;
pub mod factory;
pub mod ledger;
pub mod oracle;
pub mod registry;
pub mod settings;
pub mod telemetry;
pub mod token;
pub mod verify;

#[cfg(test)]
mod fuzz_test;

pub use encoding::{EncodingError, EncodingLimits, InitCode, TokenArgs};
pub use errors::FactoryError;
pub use events::{PairCreated, Receipt, TokenCreated};
pub use factory::{
    DeploymentFactory, DeploymentOutcome, DeploymentRecord, DeploymentStage, FactoryConfig,
};
pub use ledger::{Ledger, LedgerError, Transaction, WorldState};
pub use oracle::{AddressOracle, StateReader};
pub use registry::{CanonicalPairRegistry, PairRecord, PairRegistry, RegistryError};
pub use settings::{load_settings, FactorySettings};
pub use token::{TokenState, TokenTemplate};
pub use verify::{DeploymentExpectation, VerificationReport, Verifier};

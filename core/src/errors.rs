use alloy_primitives::Address;
use thiserror::Error;

use crate::encoding::EncodingError;
use crate::ledger::LedgerError;
use crate::registry::RegistryError;

/// Failures of a `deploy_new_token` call. Every variant means the whole
/// transaction was rolled back; none of them is worth retrying unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FactoryError {
    #[error("Address {address} is already occupied (name {name:?})")]
    AddressOccupied { address: Address, name: String },

    #[error("Invalid input: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Pair registration failed for token {token}, deployment rolled back: {source}")]
    RegistryFailure {
        token: Address,
        #[source]
        source: RegistryError,
    },

    #[error("Token landed at {actual} but {predicted} was predicted")]
    PredictionMismatch { predicted: Address, actual: Address },

    #[error("No code at {0} after deployment")]
    MissingCode(Address),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl FactoryError {
    /// Stable machine-readable identifier.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AddressOccupied { .. } => "ADDRESS_OCCUPIED",
            Self::Encoding(_) => "ENCODING_ERROR",
            Self::RegistryFailure { .. } => "REGISTRY_FAILURE",
            Self::PredictionMismatch { .. } => "PREDICTION_MISMATCH",
            Self::MissingCode(_) => "MISSING_CODE",
            Self::Ledger(_) => "LEDGER_ERROR",
        }
    }

    /// Whether the caller can fix this by changing its input.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::AddressOccupied { .. } | Self::Encoding(_))
    }
}

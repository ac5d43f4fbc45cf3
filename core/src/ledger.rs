//! In-memory host ledger.
//!
//! Every state change happens inside [`Ledger::transact`], which runs against a
//! snapshot of the world state and commits it (together with the emitted logs)
//! only when the closure returns `Ok`. Exclusive `&mut` access serializes
//! transactions; callers that share a ledger across threads wrap it in a mutex.

use alloy_primitives::{Address, Bytes, Log, B256, U256};
use alloy_sol_types::SolEvent;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::encoding::{EncodingError, InitCode};
use crate::events::Receipt;
use crate::factory::DeploymentBook;
use crate::oracle::{AddressOracle, StateReader};
use crate::registry::{PairBook, PairRecord};
use crate::token::{TokenError, TokenState};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Address {0} already holds code")]
    Collision(Address),

    #[error("Init code does not start with the template's creation code")]
    TemplateMismatch,

    #[error("No contract at {0}")]
    UnknownAccount(Address),

    #[error("Contract {address} does not hold {expected} storage")]
    UnexpectedStorage {
        address: Address,
        expected: &'static str,
    },

    #[error("Constructor failed: {0}")]
    Constructor(#[from] EncodingError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Nonce overflow for {0}")]
    NonceOverflow(Address),
}

// ── Accounts ──────────────────────────────────────────────────────────────────

/// Typed contract storage, one variant per contract kind the ledger hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Storage {
    #[default]
    Empty,
    Token(TokenState),
    Factory(DeploymentBook),
    PairRegistry(PairBook),
    Pair(PairRecord),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub nonce: u64,
    pub balance: U256,
    pub code: Bytes,
    pub storage: Storage,
}

/// Result of running a template's constructor.
#[derive(Debug, Clone)]
pub struct Constructed {
    pub runtime_code: Bytes,
    pub storage: Storage,
}

/// A deployable contract: fixed creation code plus the constructor that turns
/// the encoded arguments appended to it into runtime code and storage.
pub trait ContractTemplate {
    fn creation_code(&self) -> &[u8];

    fn construct(&self, constructor_args: &[u8]) -> Result<Constructed, LedgerError>;
}

#[derive(Debug, Clone, Default)]
pub struct WorldState {
    accounts: BTreeMap<Address, Account>,
}

impl WorldState {
    pub fn account(&self, address: Address) -> Option<&Account> {
        self.accounts.get(&address)
    }

    pub fn storage(&self, address: Address) -> Result<&Storage, LedgerError> {
        self.accounts
            .get(&address)
            .filter(|account| !account.code.is_empty())
            .map(|account| &account.storage)
            .ok_or(LedgerError::UnknownAccount(address))
    }

    pub fn token(&self, address: Address) -> Result<&TokenState, LedgerError> {
        match self.storage(address)? {
            Storage::Token(token) => Ok(token),
            _ => Err(LedgerError::UnexpectedStorage {
                address,
                expected: "token",
            }),
        }
    }

    fn storage_mut(&mut self, address: Address) -> Result<&mut Storage, LedgerError> {
        self.accounts
            .get_mut(&address)
            .filter(|account| !account.code.is_empty())
            .map(|account| &mut account.storage)
            .ok_or(LedgerError::UnknownAccount(address))
    }
}

impl StateReader for WorldState {
    fn has_code(&self, address: Address) -> bool {
        self.accounts
            .get(&address)
            .is_some_and(|account| !account.code.is_empty())
    }

    fn get_balance(&self, address: Address) -> U256 {
        self.accounts
            .get(&address)
            .map(|account| account.balance)
            .unwrap_or_default()
    }
}

// ── Transactions ──────────────────────────────────────────────────────────────

/// An in-flight transaction. Changes are made to a private copy of the world
/// state and only become visible when the owning [`Ledger::transact`] commits.
pub struct Transaction<'a> {
    origin: Address,
    state: &'a mut WorldState,
    logs: Vec<Log>,
}

impl Transaction<'_> {
    /// Externally owned account that signed the transaction.
    pub fn origin(&self) -> Address {
        self.origin
    }

    pub fn state(&self) -> &WorldState {
        self.state
    }

    pub fn storage_mut(&mut self, address: Address) -> Result<&mut Storage, LedgerError> {
        self.state.storage_mut(address)
    }

    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    /// Legacy CREATE: the address is derived from `deployer` and its nonce.
    pub fn create(
        &mut self,
        deployer: Address,
        runtime_code: Bytes,
        storage: Storage,
    ) -> Result<Address, LedgerError> {
        let nonce = self.bump_nonce(deployer)?;
        let address = AddressOracle::predict_create(deployer, nonce);
        self.place(address, runtime_code, storage)?;
        tracing::debug!(deployer = %deployer, nonce, address = %address, "CREATE");
        Ok(address)
    }

    /// CREATE2: runs `template`'s constructor over the arguments that follow
    /// its creation code inside `init_code`, at the address derived from
    /// `(deployer, salt, init_code)`.
    pub fn create2(
        &mut self,
        deployer: Address,
        salt: B256,
        init_code: &InitCode,
        template: &dyn ContractTemplate,
    ) -> Result<Address, LedgerError> {
        let constructor_args = init_code
            .as_bytes()
            .strip_prefix(template.creation_code())
            .ok_or(LedgerError::TemplateMismatch)?;

        let address = AddressOracle::predict(deployer, salt, init_code);
        if self.state.has_code(address) {
            return Err(LedgerError::Collision(address));
        }

        let constructed = template.construct(constructor_args)?;
        self.bump_nonce(deployer)?;
        self.place(address, constructed.runtime_code, constructed.storage)?;
        tracing::debug!(deployer = %deployer, salt = %salt, address = %address, "CREATE2");
        Ok(address)
    }

    /// Place code at a caller-computed address.
    pub fn install(
        &mut self,
        address: Address,
        code: Bytes,
        storage: Storage,
    ) -> Result<(), LedgerError> {
        self.place(address, code, storage)
    }

    pub fn emit<E: SolEvent>(&mut self, emitter: Address, event: &E) {
        self.logs.push(Log {
            address: emitter,
            data: event.encode_log_data(),
        });
    }

    fn place(
        &mut self,
        address: Address,
        code: Bytes,
        storage: Storage,
    ) -> Result<(), LedgerError> {
        if self.state.has_code(address) {
            return Err(LedgerError::Collision(address));
        }
        // A pre-funded address keeps its balance.
        let account = self.state.accounts.entry(address).or_default();
        account.code = code;
        account.storage = storage;
        Ok(())
    }

    fn bump_nonce(&mut self, address: Address) -> Result<u64, LedgerError> {
        let account = self.state.accounts.entry(address).or_default();
        let nonce = account.nonce;
        account.nonce = nonce
            .checked_add(1)
            .ok_or(LedgerError::NonceOverflow(address))?;
        Ok(nonce)
    }
}

impl StateReader for Transaction<'_> {
    fn has_code(&self, address: Address) -> bool {
        self.state.has_code(address)
    }

    fn get_balance(&self, address: Address) -> U256 {
        self.state.get_balance(address)
    }
}

// ── Ledger ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Ledger {
    state: WorldState,
    receipts: Vec<Receipt>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    /// Receipts of committed transactions, oldest first.
    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    pub fn set_balance(&mut self, address: Address, balance: U256) {
        self.state.accounts.entry(address).or_default().balance = balance;
    }

    /// Run `f` as one atomic transaction signed by `origin`.
    ///
    /// On `Err` nothing `f` did is kept: no state, no logs, no receipt.
    pub fn transact<T, E, F>(&mut self, origin: Address, f: F) -> Result<(T, Receipt), E>
    where
        E: std::fmt::Display,
        F: FnOnce(&mut Transaction<'_>) -> Result<T, E>,
    {
        let mut working = self.state.clone();
        let mut tx = Transaction {
            origin,
            state: &mut working,
            logs: Vec::new(),
        };

        let value = match f(&mut tx) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(origin = %origin, error = %e, "Transaction reverted");
                return Err(e);
            }
        };

        let Transaction { logs, .. } = tx;
        self.state = working;
        let receipt = Receipt { origin, logs };
        self.receipts.push(receipt.clone());
        tracing::debug!(origin = %origin, logs = receipt.logs.len(), "Transaction committed");
        Ok((value, receipt))
    }
}

impl StateReader for Ledger {
    fn has_code(&self, address: Address) -> bool {
        self.state.has_code(address)
    }

    fn get_balance(&self, address: Address) -> U256 {
        self.state.get_balance(address)
    }
}

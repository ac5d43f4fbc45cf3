use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::encoding::{EncodingLimits, InitCode, TokenArgs};
use crate::errors::FactoryError;
use crate::events::{Receipt, TokenCreated};
use crate::ledger::{Ledger, LedgerError, Storage, Transaction, WorldState};
use crate::oracle::AddressOracle;
use crate::registry::{PairRecord, PairRegistry};
use crate::token::TokenTemplate;

const FACTORY_RUNTIME_CODE: &[u8] = &[
    0x60, 0x80, 0x60, 0x40, 0x52, 0x34, 0x80, 0x15, 0x61, 0x00, 0x10, 0x57, 0x60, 0x00, 0x80, 0xfd,
    0x5b, 0x50, 0xf5,
];

// ── Records ───────────────────────────────────────────────────────────────────

/// Written once per successful deployment and never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub token_address: Address,
    pub salt: B256,
    pub name: String,
    pub symbol: String,
    pub total_supply: U256,
    pub creator: Address,
}

/// Factory storage: salt -> record, plus creation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentBook {
    owner: Address,
    records: BTreeMap<B256, DeploymentRecord>,
    order: Vec<B256>,
}

impl DeploymentBook {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            records: BTreeMap::new(),
            order: Vec::new(),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn get(&self, salt: &B256) -> Option<&DeploymentRecord> {
        self.records.get(salt)
    }

    /// Records in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &DeploymentRecord> + '_ {
        self.order.iter().filter_map(|salt| self.records.get(salt))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Append `record`; returns `false` and leaves the book untouched when
    /// its salt is already taken.
    fn append(&mut self, record: DeploymentRecord) -> bool {
        if self.records.contains_key(&record.salt) {
            return false;
        }
        self.order.push(record.salt);
        self.records.insert(record.salt, record);
        true
    }
}

// ── Stages ────────────────────────────────────────────────────────────────────

/// Progress of one `deploy_new_token` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStage {
    Requested,
    Deploying,
    Deployed,
    PairPending,
    PairCreated,
    Failed,
}

impl fmt::Display for DeploymentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Requested => "requested",
            Self::Deploying => "deploying",
            Self::Deployed => "deployed",
            Self::PairPending => "pair_pending",
            Self::PairCreated => "pair_created",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

struct StageTracker<'a> {
    name: &'a str,
    stages: Vec<DeploymentStage>,
}

impl<'a> StageTracker<'a> {
    fn new(name: &'a str) -> Self {
        tracing::debug!(name, stage = %DeploymentStage::Requested, "Deployment stage");
        Self {
            name,
            stages: vec![DeploymentStage::Requested],
        }
    }

    fn advance(&mut self, stage: DeploymentStage) {
        tracing::debug!(name = self.name, stage = %stage, "Deployment stage");
        self.stages.push(stage);
    }

    fn current(&self) -> DeploymentStage {
        self.stages
            .last()
            .copied()
            .unwrap_or(DeploymentStage::Requested)
    }

    fn fail(&self, error: &FactoryError) {
        tracing::warn!(
            name = self.name,
            stage = %DeploymentStage::Failed,
            reached = %self.current(),
            code = error.code(),
            error = %error,
            "Deployment failed"
        );
    }
}

// ── Factory ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryConfig {
    /// Asset every new token is paired against.
    pub reference_asset: Address,
    pub template: TokenTemplate,
    pub limits: EncodingLimits,
}

impl FactoryConfig {
    pub fn new(reference_asset: Address) -> Self {
        Self {
            reference_asset,
            template: TokenTemplate::standard(),
            limits: EncodingLimits::default(),
        }
    }
}

/// Successful `deploy_new_token` result.
#[derive(Debug, Clone)]
pub struct DeploymentOutcome {
    pub token_address: Address,
    pub salt: B256,
    pub pair: PairRecord,
    pub receipt: Receipt,
    pub stages: Vec<DeploymentStage>,
}

/// Deploys tokens at CREATE2 addresses derived from their names and registers
/// a pair for each one with the injected [`PairRegistry`].
#[derive(Debug, Clone)]
pub struct DeploymentFactory<R> {
    address: Address,
    owner: Address,
    config: FactoryConfig,
    registry: R,
}

impl<R: PairRegistry> DeploymentFactory<R> {
    /// Create the factory from `owner` with a plain CREATE.
    pub fn deploy(
        ledger: &mut Ledger,
        owner: Address,
        registry: R,
        config: FactoryConfig,
    ) -> Result<Self, FactoryError> {
        let (address, _) = ledger.transact(owner, |tx| {
            tx.create(
                owner,
                Bytes::from_static(FACTORY_RUNTIME_CODE),
                Storage::Factory(DeploymentBook::new(owner)),
            )
        })?;
        tracing::info!(
            factory = %address,
            owner = %owner,
            registry = %registry.address(),
            reference_asset = %config.reference_asset,
            "Deployment factory created"
        );
        Ok(Self {
            address,
            owner,
            config,
            registry,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Init code the factory would deploy for these arguments.
    pub fn init_code(&self, args: &TokenArgs) -> Result<InitCode, FactoryError> {
        args.validate(&self.config.limits)?;
        Ok(self.config.template.init_code(args)?)
    }

    /// Address a `deploy_new_token` call with these inputs would produce.
    /// Reads no state.
    pub fn compute_token_address(
        &self,
        name: &str,
        symbol: &str,
        total_supply: U256,
        originator: Address,
    ) -> Result<Address, FactoryError> {
        let args = TokenArgs::new(name, symbol, total_supply, originator);
        let init_code = self.init_code(&args)?;
        Ok(AddressOracle::predict(
            self.address,
            AddressOracle::derive_salt(name)?,
            &init_code,
        ))
    }

    /// Deploy a token and register its pair in one atomic transaction.
    ///
    /// The whole supply is minted to `originator`, who signs the transaction.
    /// A name can be used once per factory; reusing it fails with
    /// [`FactoryError::AddressOccupied`].
    pub fn deploy_new_token(
        &self,
        ledger: &mut Ledger,
        originator: Address,
        name: &str,
        symbol: &str,
        total_supply: U256,
    ) -> Result<DeploymentOutcome, FactoryError> {
        let args = TokenArgs::new(name, symbol, total_supply, originator);
        let mut tracker = StageTracker::new(name);

        match ledger.transact(originator, |tx| self.execute(tx, &mut tracker, &args)) {
            Ok(((token_address, salt, pair), receipt)) => {
                tracing::info!(
                    name,
                    symbol,
                    token = %token_address,
                    salt = %salt,
                    pair = %pair.pair,
                    "Token deployed"
                );
                Ok(DeploymentOutcome {
                    token_address,
                    salt,
                    pair,
                    receipt,
                    stages: tracker.stages,
                })
            }
            Err(e) => {
                tracker.fail(&e);
                Err(e)
            }
        }
    }

    fn execute(
        &self,
        tx: &mut Transaction<'_>,
        tracker: &mut StageTracker<'_>,
        args: &TokenArgs,
    ) -> Result<(Address, B256, PairRecord), FactoryError> {
        let init_code = self.init_code(args)?;
        let salt = AddressOracle::derive_salt(&args.name)?;

        if let Some(existing) = read_book(tx.state(), self.address)?.get(&salt) {
            return Err(FactoryError::AddressOccupied {
                address: existing.token_address,
                name: args.name.clone(),
            });
        }

        let predicted = AddressOracle::predict(self.address, salt, &init_code);
        if AddressOracle::is_occupied(predicted, &*tx) {
            return Err(FactoryError::AddressOccupied {
                address: predicted,
                name: args.name.clone(),
            });
        }

        tracker.advance(DeploymentStage::Deploying);
        let actual = tx
            .create2(self.address, salt, &init_code, &self.config.template)
            .map_err(|e| match e {
                LedgerError::Collision(address) => FactoryError::AddressOccupied {
                    address,
                    name: args.name.clone(),
                },
                other => other.into(),
            })?;
        if actual != predicted {
            return Err(FactoryError::PredictionMismatch { predicted, actual });
        }
        if !AddressOracle::is_occupied(predicted, &*tx) {
            return Err(FactoryError::MissingCode(predicted));
        }
        tracker.advance(DeploymentStage::Deployed);

        let record = DeploymentRecord {
            token_address: predicted,
            salt,
            name: args.name.clone(),
            symbol: args.symbol.clone(),
            total_supply: args.total_supply,
            creator: tx.origin(),
        };
        if !book_mut(tx, self.address)?.append(record) {
            return Err(FactoryError::AddressOccupied {
                address: predicted,
                name: args.name.clone(),
            });
        }
        tx.emit(
            self.address,
            &TokenCreated {
                tokenAddress: predicted,
            },
        );

        tracker.advance(DeploymentStage::PairPending);
        let pair = self
            .registry
            .create_pair(tx, self.config.reference_asset, predicted)
            .map_err(|source| FactoryError::RegistryFailure {
                token: predicted,
                source,
            })?;
        tracker.advance(DeploymentStage::PairCreated);

        Ok((predicted, salt, pair))
    }

    pub fn deployment(
        &self,
        state: &WorldState,
        salt: B256,
    ) -> Result<Option<DeploymentRecord>, FactoryError> {
        Ok(read_book(state, self.address)?.get(&salt).cloned())
    }

    pub fn deployment_by_name(
        &self,
        state: &WorldState,
        name: &str,
    ) -> Result<Option<DeploymentRecord>, FactoryError> {
        self.deployment(state, AddressOracle::derive_salt(name)?)
    }

    /// All deployments, oldest first.
    pub fn deployments(&self, state: &WorldState) -> Result<Vec<DeploymentRecord>, FactoryError> {
        Ok(read_book(state, self.address)?.iter().cloned().collect())
    }
}

fn read_book(state: &WorldState, address: Address) -> Result<&DeploymentBook, LedgerError> {
    match state.storage(address)? {
        Storage::Factory(book) => Ok(book),
        _ => Err(LedgerError::UnexpectedStorage {
            address,
            expected: "factory",
        }),
    }
}

fn book_mut<'a>(
    tx: &'a mut Transaction<'_>,
    address: Address,
) -> Result<&'a mut DeploymentBook, LedgerError> {
    match tx.storage_mut(address)? {
        Storage::Factory(book) => Ok(book),
        _ => Err(LedgerError::UnexpectedStorage {
            address,
            expected: "factory",
        }),
    }
}

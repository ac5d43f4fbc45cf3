use alloy_primitives::{b256, keccak256, Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::events::PairCreated;
use crate::ledger::{Ledger, LedgerError, Storage, Transaction, WorldState};
use crate::oracle::AddressOracle;

/// `keccak256` of the Uniswap V2 pair creation code.
pub const UNISWAP_V2_PAIR_INIT_CODE_HASH: B256 =
    b256!("96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f");

const REGISTRY_RUNTIME_CODE: &[u8] = &[0x60, 0x80, 0x60, 0x40, 0x52, 0x5b, 0x00];
const PAIR_RUNTIME_CODE: &[u8] = &[0x60, 0x80, 0x60, 0x40, 0x52, 0x5b, 0x01];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Pair tokens must differ, got {0} twice")]
    IdenticalAddresses(Address),

    #[error("Pair token must not be the zero address")]
    ZeroAddress,

    #[error("Pair already exists for {token0} / {token1}")]
    PairExists { token0: Address, token1: Address },

    #[error("Registry ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Registry reverted: {0}")]
    Reverted(String),
}

/// A created pair. `token0 < token1` under big-endian address ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairRecord {
    pub token0: Address,
    pub token1: Address,
    pub pair: Address,
    /// Position in the registry's `all_pairs` list.
    pub index: u64,
}

impl PairRecord {
    pub fn contains(&self, token: Address) -> bool {
        self.token0 == token || self.token1 == token
    }
}

/// Registry storage: sorted token pair -> pair address, plus creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairBook {
    pairs: BTreeMap<(Address, Address), Address>,
    all_pairs: Vec<Address>,
}

/// Order two tokens so that A-B and B-A map to the same pair.
pub fn sort_tokens(token_a: Address, token_b: Address) -> (Address, Address) {
    if token_a < token_b {
        (token_a, token_b)
    } else {
        (token_b, token_a)
    }
}

/// External pair-creation capability the factory calls after a deployment.
///
/// `create_pair` runs inside the caller's transaction; an `Err` rolls the
/// whole transaction back.
pub trait PairRegistry {
    fn address(&self) -> Address;

    fn create_pair(
        &self,
        tx: &mut Transaction<'_>,
        token_a: Address,
        token_b: Address,
    ) -> Result<PairRecord, RegistryError>;
}

// ── Canonical registry ────────────────────────────────────────────────────────

/// Uniswap V2 shaped registry whose state lives in the ledger.
///
/// Pair addresses are CREATE2-derived from the registry address, the salt
/// `keccak256(token0 ‖ token1)` and a fixed pair init-code hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalPairRegistry {
    address: Address,
    pair_init_code_hash: B256,
}

impl CanonicalPairRegistry {
    /// Handle to a registry already present at `address`.
    pub fn at(address: Address, pair_init_code_hash: B256) -> Self {
        Self {
            address,
            pair_init_code_hash,
        }
    }

    /// Place an empty registry at a fixed address, the way a forked chain
    /// already has one.
    pub fn install(
        ledger: &mut Ledger,
        address: Address,
        pair_init_code_hash: B256,
    ) -> Result<Self, LedgerError> {
        ledger.transact(Address::ZERO, |tx| {
            tx.install(
                address,
                Bytes::from_static(REGISTRY_RUNTIME_CODE),
                Storage::PairRegistry(PairBook::default()),
            )
        })?;
        tracing::info!(registry = %address, "Pair registry installed");
        Ok(Self::at(address, pair_init_code_hash))
    }

    pub fn pair_address(&self, token_a: Address, token_b: Address) -> Address {
        let (token0, token1) = sort_tokens(token_a, token_b);
        let mut packed = [0u8; 40];
        packed[..20].copy_from_slice(token0.as_slice());
        packed[20..].copy_from_slice(token1.as_slice());
        AddressOracle::predict_from_hash(self.address, keccak256(packed), self.pair_init_code_hash)
    }

    pub fn get_pair(
        &self,
        state: &WorldState,
        token_a: Address,
        token_b: Address,
    ) -> Result<Option<Address>, LedgerError> {
        let book = read_book(state, self.address)?;
        Ok(book.pairs.get(&sort_tokens(token_a, token_b)).copied())
    }

    pub fn pair(&self, state: &WorldState, pair: Address) -> Result<PairRecord, LedgerError> {
        match state.storage(pair)? {
            Storage::Pair(record) => Ok(*record),
            _ => Err(LedgerError::UnexpectedStorage {
                address: pair,
                expected: "pair",
            }),
        }
    }

    pub fn all_pairs(&self, state: &WorldState) -> Result<Vec<Address>, LedgerError> {
        Ok(read_book(state, self.address)?.all_pairs.clone())
    }

    pub fn all_pairs_length(&self, state: &WorldState) -> Result<usize, LedgerError> {
        Ok(read_book(state, self.address)?.all_pairs.len())
    }
}

impl PairRegistry for CanonicalPairRegistry {
    fn address(&self) -> Address {
        self.address
    }

    fn create_pair(
        &self,
        tx: &mut Transaction<'_>,
        token_a: Address,
        token_b: Address,
    ) -> Result<PairRecord, RegistryError> {
        if token_a == token_b {
            return Err(RegistryError::IdenticalAddresses(token_a));
        }
        let (token0, token1) = sort_tokens(token_a, token_b);
        if token0 == Address::ZERO {
            return Err(RegistryError::ZeroAddress);
        }

        let (exists, index) = {
            let book = read_book(tx.state(), self.address)?;
            (
                book.pairs.contains_key(&(token0, token1)),
                book.all_pairs.len(),
            )
        };
        if exists {
            return Err(RegistryError::PairExists { token0, token1 });
        }

        let record = PairRecord {
            token0,
            token1,
            pair: self.pair_address(token0, token1),
            index: index as u64,
        };
        tx.install(
            record.pair,
            Bytes::from_static(PAIR_RUNTIME_CODE),
            Storage::Pair(record),
        )?;

        let book = book_mut(tx, self.address)?;
        book.pairs.insert((token0, token1), record.pair);
        book.all_pairs.push(record.pair);
        let all_pairs_length = U256::from(book.all_pairs.len());

        tx.emit(
            self.address,
            &PairCreated {
                token0,
                token1,
                pair: record.pair,
                allPairsLength: all_pairs_length,
            },
        );
        tracing::info!(
            registry = %self.address,
            token0 = %token0,
            token1 = %token1,
            pair = %record.pair,
            "Pair created"
        );
        Ok(record)
    }
}

fn read_book(state: &WorldState, address: Address) -> Result<&PairBook, LedgerError> {
    match state.storage(address)? {
        Storage::PairRegistry(book) => Ok(book),
        _ => Err(LedgerError::UnexpectedStorage {
            address,
            expected: "pair registry",
        }),
    }
}

fn book_mut<'a>(
    tx: &'a mut Transaction<'_>,
    address: Address,
) -> Result<&'a mut PairBook, LedgerError> {
    match tx.storage_mut(address)? {
        Storage::PairRegistry(book) => Ok(book),
        _ => Err(LedgerError::UnexpectedStorage {
            address,
            expected: "pair registry",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Receipt;
    use crate::oracle::StateReader;
    use alloy_primitives::address;

    const UNISWAP_V2_FACTORY: Address = address!("5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f");
    const WETH: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
    const GNO: Address = address!("6810e776880C02933D47DB1b9fc05908e5386b96");

    fn setup() -> (Ledger, CanonicalPairRegistry) {
        let mut ledger = Ledger::new();
        let registry = CanonicalPairRegistry::install(
            &mut ledger,
            UNISWAP_V2_FACTORY,
            UNISWAP_V2_PAIR_INIT_CODE_HASH,
        )
        .unwrap();
        (ledger, registry)
    }

    fn create(
        ledger: &mut Ledger,
        registry: &CanonicalPairRegistry,
        a: Address,
        b: Address,
    ) -> Result<(PairRecord, Receipt), RegistryError> {
        ledger.transact(Address::repeat_byte(0x01), |tx| registry.create_pair(tx, a, b))
    }

    #[test]
    fn test_sort_tokens() {
        assert_eq!(sort_tokens(WETH, GNO), (GNO, WETH));
        assert_eq!(sort_tokens(GNO, WETH), (GNO, WETH));
    }

    #[test]
    fn test_pair_address_matches_mainnet() {
        let (_, registry) = setup();
        let expected = address!("3e8468f66d30fc99f745481d4b383f89861702c6");
        assert_eq!(registry.pair_address(GNO, WETH), expected);
        assert_eq!(registry.pair_address(WETH, GNO), expected);
    }

    #[test]
    fn test_create_pair_orders_tokens_and_emits() {
        let (mut ledger, registry) = setup();
        let (record, receipt) = create(&mut ledger, &registry, WETH, GNO).unwrap();

        assert_eq!((record.token0, record.token1), (GNO, WETH));
        assert_eq!(record.index, 0);
        assert!(ledger.has_code(record.pair));

        let event = receipt.event::<PairCreated>(registry.address()).unwrap();
        assert_eq!(event.token0, GNO);
        assert_eq!(event.token1, WETH);
        assert_eq!(event.pair, record.pair);
        assert_eq!(event.allPairsLength, U256::from(1));
    }

    #[test]
    fn test_get_pair_either_order() {
        let (mut ledger, registry) = setup();
        let (record, _) = create(&mut ledger, &registry, GNO, WETH).unwrap();
        assert_eq!(registry.get_pair(ledger.state(), WETH, GNO).unwrap(), Some(record.pair));
        assert_eq!(registry.get_pair(ledger.state(), GNO, WETH).unwrap(), Some(record.pair));
        assert_eq!(registry.pair(ledger.state(), record.pair).unwrap(), record);
        assert_eq!(registry.all_pairs(ledger.state()).unwrap(), vec![record.pair]);
    }

    #[test]
    fn test_duplicate_pair_rejected_in_both_orders() {
        let (mut ledger, registry) = setup();
        create(&mut ledger, &registry, GNO, WETH).unwrap();

        for (a, b) in [(GNO, WETH), (WETH, GNO)] {
            assert_eq!(
                create(&mut ledger, &registry, a, b).unwrap_err(),
                RegistryError::PairExists {
                    token0: GNO,
                    token1: WETH
                }
            );
        }
        assert_eq!(registry.all_pairs_length(ledger.state()).unwrap(), 1);
    }

    #[test]
    fn test_identical_and_zero_tokens_rejected() {
        let (mut ledger, registry) = setup();
        assert_eq!(
            create(&mut ledger, &registry, WETH, WETH).unwrap_err(),
            RegistryError::IdenticalAddresses(WETH)
        );
        assert_eq!(
            create(&mut ledger, &registry, Address::ZERO, WETH).unwrap_err(),
            RegistryError::ZeroAddress
        );
        assert!(ledger.receipts().len() == 1, "only the install transaction committed");
    }

    #[test]
    fn test_second_pair_gets_next_index() {
        let (mut ledger, registry) = setup();
        create(&mut ledger, &registry, GNO, WETH).unwrap();
        let (record, receipt) =
            create(&mut ledger, &registry, WETH, Address::repeat_byte(0xff)).unwrap();
        assert_eq!(record.index, 1);
        assert_eq!(
            receipt.event::<PairCreated>(registry.address()).unwrap().allPairsLength,
            U256::from(2)
        );
    }

    #[test]
    fn test_missing_registry_is_a_ledger_error() {
        let mut ledger = Ledger::new();
        let registry =
            CanonicalPairRegistry::at(UNISWAP_V2_FACTORY, UNISWAP_V2_PAIR_INIT_CODE_HASH);
        assert_eq!(
            create(&mut ledger, &registry, GNO, WETH).unwrap_err(),
            RegistryError::Ledger(LedgerError::UnknownAccount(UNISWAP_V2_FACTORY))
        );
    }
}

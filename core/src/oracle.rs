use alloy_primitives::{keccak256, Address, B256, U256};

use crate::encoding::{encode_string, EncodingError, InitCode};

/// Marker byte that separates CREATE2 preimages from legacy CREATE (RLP) ones.
pub const CREATE2_PREFIX: u8 = 0xff;

const ADDRESS_LEN: usize = 20;
const SALT_LEN: usize = 32;
const PREIMAGE_LEN: usize = 1 + ADDRESS_LEN + SALT_LEN + 32;

/// Read-only view of ledger state, supplied by the host.
pub trait StateReader {
    /// Whether executable code currently exists at `address`.
    fn has_code(&self, address: Address) -> bool;

    /// Native balance held by `address`.
    fn get_balance(&self, address: Address) -> U256;
}

/// Pure deterministic-address derivation.
///
/// Nothing here touches shared state, so every function may be called from any
/// number of threads without synchronisation.
pub struct AddressOracle;

impl AddressOracle {
    /// `keccak256(0xff ‖ deployer ‖ salt ‖ keccak256(init_code))[12..]`
    pub fn predict(deployer: Address, salt: B256, init_code: &InitCode) -> Address {
        Self::predict_from_hash(deployer, salt, init_code.hash())
    }

    /// Same derivation when only the hash of the init code is known.
    pub fn predict_from_hash(deployer: Address, salt: B256, init_code_hash: B256) -> Address {
        let mut preimage = [0u8; PREIMAGE_LEN];
        preimage[0] = CREATE2_PREFIX;
        preimage[1..21].copy_from_slice(deployer.as_slice());
        preimage[21..53].copy_from_slice(salt.as_slice());
        preimage[53..85].copy_from_slice(init_code_hash.as_slice());
        Address::from_slice(&keccak256(preimage)[12..])
    }

    /// Untyped entry point. Lengths are checked exactly; nothing is padded or
    /// truncated on the caller's behalf.
    pub fn predict_raw(
        deployer: &[u8],
        salt: &[u8],
        init_code: &[u8],
    ) -> Result<Address, EncodingError> {
        if deployer.len() != ADDRESS_LEN {
            return Err(EncodingError::InvalidLength {
                field: "deployer",
                expected: ADDRESS_LEN,
                found: deployer.len(),
            });
        }
        if salt.len() != SALT_LEN {
            return Err(EncodingError::InvalidLength {
                field: "salt",
                expected: SALT_LEN,
                found: salt.len(),
            });
        }
        let init_code = InitCode::from_bytes(init_code.to_vec())?;
        Ok(Self::predict(
            Address::from_slice(deployer),
            B256::from_slice(salt),
            &init_code,
        ))
    }

    /// Salt for a token name: `keccak256(abi.encode(name))`.
    pub fn derive_salt(name: &str) -> Result<B256, EncodingError> {
        Ok(keccak256(encode_string(name)?))
    }

    pub fn is_occupied<S: StateReader + ?Sized>(address: Address, reader: &S) -> bool {
        reader.has_code(address)
    }

    /// Legacy sequential-nonce derivation: `keccak256(rlp([deployer, nonce]))[12..]`.
    pub fn predict_create(deployer: Address, nonce: u64) -> Address {
        deployer.create(nonce)
    }
}

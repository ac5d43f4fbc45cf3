use alloy_primitives::{Address, Bytes, U256};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::encoding::{EncodingError, InitCode, TokenArgs};
use crate::ledger::{Constructed, ContractTemplate, LedgerError, Storage};

/// Creation bytecode of the standard fixed-supply token.
const STANDARD_CREATION_CODE: &[u8] = &[
    0x60, 0x80, 0x60, 0x40, 0x52, 0x34, 0x80, 0x15, 0x61, 0x00, 0x10, 0x57, 0x60, 0x00, 0x80,
    0xfd, 0x5b, 0x50, 0x60, 0x40, 0x51, 0x61, 0x0a, 0x38, 0x38, 0x03, 0x80, 0x61, 0x0a, 0x38,
    0x83, 0x39, 0x81, 0x01, 0x60, 0x40, 0x81, 0x90, 0x52, 0x61, 0x00, 0x30, 0x91, 0x61, 0x01,
    0xe5, 0x56, 0x5b,
];

/// Runtime bytecode left behind once the constructor has run.
const STANDARD_RUNTIME_CODE: &[u8] = &[
    0x60, 0x80, 0x60, 0x40, 0x52, 0x34, 0x80, 0x15, 0x60, 0x0f, 0x57, 0x60, 0x00, 0x80, 0xfd,
    0x5b, 0x50, 0x60, 0x04, 0x36, 0x10, 0x60, 0x32, 0x57, 0x60, 0x00, 0x35, 0x60, 0xe0, 0x1c,
    0x80, 0x63, 0x18, 0x16, 0x0d, 0xdd, 0x14, 0x60, 0x37, 0x57, 0x80, 0x63, 0x70, 0xa0, 0x82,
    0x31, 0x14, 0x60, 0x4d, 0x57, 0x5b, 0x60, 0x00, 0x80, 0xfd, 0x5b,
];

/// Decimals reported by every token built from the template.
pub const TOKEN_DECIMALS: u8 = 18;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Insufficient balance for {holder}: has {balance}, needs {amount}")]
    InsufficientBalance {
        holder: Address,
        balance: U256,
        amount: U256,
    },

    #[error("Balance overflow for {0}")]
    Overflow(Address),
}

// ── Template ──────────────────────────────────────────────────────────────────

/// Parameterized token contract: immutable creation code whose constructor
/// takes `(name, symbol, totalSupply, initialHolder)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTemplate {
    creation_code: Bytes,
    runtime_code: Bytes,
}

impl TokenTemplate {
    pub fn standard() -> Self {
        Self {
            creation_code: Bytes::from_static(STANDARD_CREATION_CODE),
            runtime_code: Bytes::from_static(STANDARD_RUNTIME_CODE),
        }
    }

    /// Build a template from hex bytecode (with or without `0x`).
    pub fn from_hex(creation_code: &str, runtime_code: &str) -> Result<Self, EncodingError> {
        let decode = |field: &'static str, value: &str| {
            hex::decode(value.trim_start_matches("0x"))
                .map_err(|e| EncodingError::Decode(format!("{field}: {e}")))
        };
        let creation_code = decode("creation code", creation_code)?;
        if creation_code.is_empty() {
            return Err(EncodingError::EmptyInitCode);
        }
        let runtime_code = decode("runtime code", runtime_code)?;
        if runtime_code.is_empty() {
            return Err(EncodingError::EmptyRuntimeCode);
        }
        Ok(Self {
            creation_code: creation_code.into(),
            runtime_code: runtime_code.into(),
        })
    }

    /// Template whose constructor leaves no code behind.
    #[cfg(test)]
    pub(crate) fn without_runtime(creation_code: &'static [u8]) -> Self {
        Self {
            creation_code: Bytes::from_static(creation_code),
            runtime_code: Bytes::new(),
        }
    }

    pub fn runtime_code(&self) -> &Bytes {
        &self.runtime_code
    }

    /// Creation code followed by the encoded constructor arguments.
    pub fn init_code(&self, args: &TokenArgs) -> Result<InitCode, EncodingError> {
        InitCode::new(&self.creation_code, &args.abi_encode())
    }
}

impl Default for TokenTemplate {
    fn default() -> Self {
        Self::standard()
    }
}

impl ContractTemplate for TokenTemplate {
    fn creation_code(&self) -> &[u8] {
        &self.creation_code
    }

    fn construct(&self, constructor_args: &[u8]) -> Result<Constructed, LedgerError> {
        let args = TokenArgs::abi_decode(constructor_args)?;
        Ok(Constructed {
            runtime_code: self.runtime_code.clone(),
            storage: Storage::Token(TokenState::new(args)),
        })
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Storage of a deployed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenState {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
    balances: BTreeMap<Address, U256>,
}

impl TokenState {
    /// The whole supply goes to `initial_holder`; nobody else starts with a balance.
    pub fn new(args: TokenArgs) -> Self {
        let mut balances = BTreeMap::new();
        if !args.total_supply.is_zero() {
            balances.insert(args.initial_holder, args.total_supply);
        }
        Self {
            name: args.name,
            symbol: args.symbol,
            decimals: TOKEN_DECIMALS,
            total_supply: args.total_supply,
            balances,
        }
    }

    pub fn balance_of(&self, holder: Address) -> U256 {
        self.balances.get(&holder).copied().unwrap_or_default()
    }

    /// Holders with a non-zero balance, in address order.
    pub fn holders(&self) -> impl Iterator<Item = (Address, U256)> + '_ {
        self.balances
            .iter()
            .filter(|(_, balance)| !balance.is_zero())
            .map(|(holder, balance)| (*holder, *balance))
    }

    pub fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<(), TokenError> {
        self.spend_balance(from, amount)?;
        self.receive_balance(to, amount)
    }

    fn receive_balance(&mut self, holder: Address, amount: U256) -> Result<(), TokenError> {
        let balance = self.balance_of(holder);
        let updated = balance
            .checked_add(amount)
            .ok_or(TokenError::Overflow(holder))?;
        self.balances.insert(holder, updated);
        Ok(())
    }

    fn spend_balance(&mut self, holder: Address, amount: U256) -> Result<(), TokenError> {
        let balance = self.balance_of(holder);
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                holder,
                balance,
                amount,
            });
        }
        self.balances.insert(holder, balance - amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holder() -> Address {
        Address::repeat_byte(0x0a)
    }

    fn pop_args() -> TokenArgs {
        TokenArgs::new("PopCoin", "POP", U256::from(1000), holder())
    }

    #[test]
    fn test_new_token_allocates_supply_to_holder() {
        let token = TokenState::new(pop_args());
        assert_eq!(token.total_supply, U256::from(1000));
        assert_eq!(token.balance_of(holder()), U256::from(1000));
        assert_eq!(token.holders().collect::<Vec<_>>(), vec![(holder(), U256::from(1000))]);
        assert_eq!(token.decimals, 18);
    }

    #[test]
    fn test_zero_supply_has_no_holders() {
        let token = TokenState::new(TokenArgs::new("Empty", "EMP", U256::ZERO, holder()));
        assert_eq!(token.holders().count(), 0);
        assert_eq!(token.balance_of(holder()), U256::ZERO);
    }

    #[test]
    fn test_transfer_moves_balance() {
        let mut token = TokenState::new(pop_args());
        let other = Address::repeat_byte(0x0b);
        token.transfer(holder(), other, U256::from(200)).unwrap();
        assert_eq!(token.balance_of(holder()), U256::from(800));
        assert_eq!(token.balance_of(other), U256::from(200));
    }

    #[test]
    fn test_transfer_rejects_overspend() {
        let mut token = TokenState::new(pop_args());
        let err = token
            .transfer(holder(), Address::repeat_byte(0x0b), U256::from(1001))
            .unwrap_err();
        assert_eq!(
            err,
            TokenError::InsufficientBalance {
                holder: holder(),
                balance: U256::from(1000),
                amount: U256::from(1001),
            }
        );
        assert_eq!(token.balance_of(holder()), U256::from(1000));
    }

    #[test]
    fn test_construct_decodes_constructor_args() {
        let template = TokenTemplate::standard();
        let constructed = template.construct(&pop_args().abi_encode()).unwrap();
        assert_eq!(&constructed.runtime_code, template.runtime_code());
        match constructed.storage {
            Storage::Token(state) => {
                assert_eq!(state.name, "PopCoin");
                assert_eq!(state.symbol, "POP");
                assert_eq!(state.balance_of(holder()), U256::from(1000));
            }
            other => panic!("Expected token storage, got {other:?}"),
        }
    }

    #[test]
    fn test_construct_rejects_bad_args() {
        let err = TokenTemplate::standard().construct(&[0x01]).unwrap_err();
        assert!(matches!(err, LedgerError::Constructor(EncodingError::Decode(_))));
    }

    #[test]
    fn test_init_code_prefixes_creation_code() {
        let template = TokenTemplate::standard();
        let init_code = template.init_code(&pop_args()).unwrap();
        assert!(init_code.as_bytes().starts_with(template.creation_code()));
        assert_eq!(
            &init_code.as_bytes()[template.creation_code().len()..],
            pop_args().abi_encode().as_slice()
        );
    }

    #[test]
    fn test_from_hex_accepts_prefix() {
        let template = TokenTemplate::from_hex("0x6080", "6001").unwrap();
        assert_eq!(template.creation_code(), &[0x60, 0x80]);
        assert_eq!(template.runtime_code().to_vec(), vec![0x60, 0x01]);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(matches!(
            TokenTemplate::from_hex("0xzz", "00"),
            Err(EncodingError::Decode(_))
        ));
        assert_eq!(
            TokenTemplate::from_hex("0x", "00"),
            Err(EncodingError::EmptyInitCode)
        );
    }

    #[test]
    fn test_from_hex_rejects_empty_runtime() {
        assert_eq!(
            TokenTemplate::from_hex("0x6080", ""),
            Err(EncodingError::EmptyRuntimeCode)
        );
        assert_eq!(
            TokenTemplate::from_hex("0x6080", "0x"),
            Err(EncodingError::EmptyRuntimeCode)
        );
    }
}

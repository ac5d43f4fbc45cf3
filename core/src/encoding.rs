use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// ABI word size in bytes.
pub const WORD: usize = 32;

/// Errors raised while validating or encoding deployment inputs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} contains non-printable character {found:?} at byte {index}")]
    NonPrintable {
        field: &'static str,
        found: char,
        index: usize,
    },

    #[error("{field} is {len} bytes, limit is {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Invalid {field} length: expected {expected} bytes, found {found}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Init code must not be empty")]
    EmptyInitCode,

    #[error("Runtime code must not be empty")]
    EmptyRuntimeCode,

    #[error("Constructor arguments could not be decoded: {0}")]
    Decode(String),
}

// ── Limits ────────────────────────────────────────────────────────────────────

/// Upper bounds on user supplied strings, checked before anything is hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingLimits {
    pub max_name_bytes: usize,
    pub max_symbol_bytes: usize,
}

impl Default for EncodingLimits {
    fn default() -> Self {
        Self {
            max_name_bytes: 64,
            max_symbol_bytes: 32,
        }
    }
}

/// Unicode format characters (category Cf): invisible, and able to reorder
/// or hide the surrounding text.
fn is_format(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{0600}'..='\u{0605}'
            | '\u{061C}'
            | '\u{06DD}'
            | '\u{070F}'
            | '\u{0890}'..='\u{0891}'
            | '\u{08E2}'
            | '\u{180E}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{206F}'
            | '\u{FEFF}'
            | '\u{FFF9}'..='\u{FFFB}'
            | '\u{110BD}'
            | '\u{110CD}'
            | '\u{13430}'..='\u{1343F}'
            | '\u{1BCA0}'..='\u{1BCA3}'
            | '\u{1D173}'..='\u{1D17A}'
            | '\u{E0001}'
            | '\u{E0020}'..='\u{E007F}'
    )
}

/// Reject empty, blank, non-printable or oversized text.
pub fn validate_text(field: &'static str, value: &str, max: usize) -> Result<(), EncodingError> {
    if value.trim().is_empty() {
        return Err(EncodingError::Empty { field });
    }
    if let Some((index, found)) = value
        .char_indices()
        .find(|(_, c)| c.is_control() || is_format(*c))
    {
        return Err(EncodingError::NonPrintable {
            field,
            found,
            index,
        });
    }
    if value.len() > max {
        return Err(EncodingError::TooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

/// Length of `len` bytes once right-padded to a whole number of words.
pub fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

/// Canonical ABI encoding of a single `string` parameter:
/// offset word, length word, then the UTF-8 bytes zero-padded to a word boundary.
/// The total length is checked against that layout.
pub fn encode_string(value: &str) -> Result<Vec<u8>, EncodingError> {
    let encoded = (value.to_owned(),).abi_encode_params();
    let expected = 2 * WORD + padded_len(value.len());
    if encoded.len() != expected {
        return Err(EncodingError::InvalidLength {
            field: "encoded string",
            expected,
            found: encoded.len(),
        });
    }
    Ok(encoded)
}

// ── Constructor arguments ─────────────────────────────────────────────────────

/// Constructor arguments of the token template, in declaration order:
/// `(string name, string symbol, uint256 totalSupply, address initialHolder)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenArgs {
    pub name: String,
    pub symbol: String,
    pub total_supply: U256,
    pub initial_holder: Address,
}

impl TokenArgs {
    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        total_supply: U256,
        initial_holder: Address,
    ) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            total_supply,
            initial_holder,
        }
    }

    pub fn validate(&self, limits: &EncodingLimits) -> Result<(), EncodingError> {
        validate_text("name", &self.name, limits.max_name_bytes)?;
        validate_text("symbol", &self.symbol, limits.max_symbol_bytes)
    }

    pub fn abi_encode(&self) -> Vec<u8> {
        (
            self.name.clone(),
            self.symbol.clone(),
            self.total_supply,
            self.initial_holder,
        )
            .abi_encode_params()
    }

    pub fn abi_decode(data: &[u8]) -> Result<Self, EncodingError> {
        let (name, symbol, total_supply, initial_holder) =
            <(String, String, U256, Address)>::abi_decode_params(data, true)
                .map_err(|e| EncodingError::Decode(e.to_string()))?;
        Ok(Self {
            name,
            symbol,
            total_supply,
            initial_holder,
        })
    }
}

// ── Init code ─────────────────────────────────────────────────────────────────

/// Creation bytecode followed by its ABI-encoded constructor arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitCode(Bytes);

impl InitCode {
    pub fn new(creation_code: &[u8], constructor_args: &[u8]) -> Result<Self, EncodingError> {
        if creation_code.is_empty() {
            return Err(EncodingError::EmptyInitCode);
        }
        let mut code = Vec::with_capacity(creation_code.len() + constructor_args.len());
        code.extend_from_slice(creation_code);
        code.extend_from_slice(constructor_args);
        Ok(Self(code.into()))
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self, EncodingError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(EncodingError::EmptyInitCode);
        }
        Ok(Self(bytes))
    }

    pub fn hash(&self) -> B256 {
        keccak256(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

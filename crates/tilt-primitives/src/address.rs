//! 160-bit account address type

use crate::U256;
use std::fmt;
use thiserror::Error;

/// Address parsing error
#[derive(Debug, Error)]
pub enum AddressError {
    /// Invalid hex string
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    /// Invalid length
    #[error("invalid address length: expected 20 bytes, got {0}")]
    InvalidLength(usize),
}

/// 160-bit account address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// Size of address in bytes
    pub const LEN: usize = 20;

    /// Zero address (0x0000...0000)
    pub const ZERO: Address = Address([0u8; 20]);

    /// Create address from bytes
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    /// Create address from slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, AddressError> {
        if slice.len() != 20 {
            return Err(AddressError::InvalidLength(slice.len()));
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(slice);
        Ok(Address(bytes))
    }

    /// Parse address from hex string (with or without 0x prefix)
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Build an address from the low 160 bits of a word
    pub fn from_word(word: U256) -> Self {
        let mut buf = [0u8; 32];
        word.to_big_endian(&mut buf);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&buf[12..32]);
        Address(bytes)
    }

    /// Widen the address into a word (big-endian, zero-extended)
    pub fn to_word(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// Get as byte slice
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Check if this is the zero address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Convert to hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl rlp::Encodable for Address {
    fn rlp_append(&self, s: &mut rlp::RlpStream) {
        s.encoder().encode_value(&self.0);
    }
}

impl rlp::Decodable for Address {
    fn decode(rlp: &rlp::Rlp) -> Result<Self, rlp::DecoderError> {
        let bytes: Vec<u8> = rlp.as_val()?;
        if bytes.len() != 20 {
            return Err(rlp::DecoderError::RlpInvalidLength);
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(Address(arr))
    }
}

//! 256-bit hash type

use crate::U256;
use std::fmt;
use thiserror::Error;

/// Hash parsing error
#[derive(Debug, Error)]
pub enum HashError {
    /// Invalid hex string
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    /// Invalid length
    #[error("invalid hash length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Expected byte count
        expected: usize,
        /// Actual byte count
        got: usize,
    },
}

/// 256-bit hash (32 bytes)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct H256([u8; 32]);

/// Alias for H256
pub type Hash = H256;

impl H256 {
    /// Size in bytes
    pub const LEN: usize = 32;

    /// Zero hash
    pub const ZERO: H256 = H256([0u8; 32]);

    /// Create from bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }

    /// Create from slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, HashError> {
        if slice.len() != 32 {
            return Err(HashError::InvalidLength {
                expected: 32,
                got: slice.len(),
            });
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(H256(bytes))
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| HashError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Build a hash from a word's big-endian byte representation
    pub fn from_word(word: U256) -> Self {
        let mut bytes = [0u8; 32];
        word.to_big_endian(&mut bytes);
        H256(bytes)
    }

    /// Interpret the hash bytes as a big-endian word
    pub fn to_word(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H256({})", self.to_hex())
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for H256 {
    fn from(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }
}

impl AsRef<[u8]> for H256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl rlp::Encodable for H256 {
    fn rlp_append(&self, s: &mut rlp::RlpStream) {
        s.encoder().encode_value(&self.0);
    }
}

impl rlp::Decodable for H256 {
    fn decode(rlp: &rlp::Rlp) -> Result<Self, rlp::DecoderError> {
        let bytes: Vec<u8> = rlp.as_val()?;
        if bytes.len() != 32 {
            return Err(rlp::DecoderError::RlpInvalidLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(H256(arr))
    }
}

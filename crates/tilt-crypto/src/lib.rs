//! # tilt-crypto
//!
//! Hash functions and public-key recovery for the Tilt blockchain core.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod hash;
mod recover;

pub use hash::{keccak256, keccak512, ripemd160, sha256};
pub use recover::{ecrecover, CryptoError};

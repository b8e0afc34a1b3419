//! # tilt-primitives
//!
//! Primitive types for the Tilt blockchain core.
//!
//! This crate provides the fundamental data types used throughout the
//! system: 160-bit addresses, 256-bit hashes, and the 256-bit word
//! arithmetic the virtual machine executes on.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod hash;
pub mod uint;

pub use address::{Address, AddressError};
pub use hash::{Hash, HashError, H256};

// Re-export primitive-types for U256/U512
pub use primitive_types::{U256, U512};

/// Block height type
pub type BlockHeight = u64;

/// Transaction nonce type
pub type Nonce = u64;

/// Gas type
pub type Gas = u64;

//! # tilt-state
//!
//! The state capability the virtual machine executes against, plus a
//! journaled in-memory implementation. The VM never holds state of its
//! own: every mutation flows through the [`StateDb`] trait, and a
//! snapshot/revert pair restores exactly the changes made in between.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod memory;

pub use memory::MemoryState;

use tilt_primitives::{Address, H256, U256};

/// A log record emitted by contract execution
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Log {
    /// Emitting contract address
    pub address: Address,
    /// Up to four topic hashes
    pub topics: Vec<H256>,
    /// Opaque payload bytes
    pub data: Vec<u8>,
    /// Block the log was emitted in
    pub block_number: u64,
}

/// Capability set the VM consumes from the surrounding state system.
///
/// Snapshots are opaque integers; `revert_to_snapshot(s)` restores every
/// observable change (balances, nonces, code, storage, logs, preimages,
/// suicide marks) made since `s` was taken.
pub trait StateDb {
    /// Create a fresh account (resets an existing one's storage view)
    fn create_account(&mut self, address: Address);
    /// Whether an account exists at all
    fn exist(&self, address: &Address) -> bool;
    /// Whether an account is empty (no nonce, balance or code)
    fn empty(&self, address: &Address) -> bool;

    /// Take a revertible checkpoint
    fn snapshot(&mut self) -> usize;
    /// Undo all changes made since the given checkpoint
    fn revert_to_snapshot(&mut self, id: usize);

    /// Account balance (zero for missing accounts)
    fn get_balance(&self, address: &Address) -> U256;
    /// Credit an account, creating it if missing
    fn add_balance(&mut self, address: Address, amount: U256);
    /// Debit an account
    fn sub_balance(&mut self, address: Address, amount: U256);

    /// Account nonce (zero for missing accounts)
    fn get_nonce(&self, address: &Address) -> u64;
    /// Overwrite the account nonce
    fn set_nonce(&mut self, address: Address, nonce: u64);

    /// Contract code (empty for missing accounts)
    fn get_code(&self, address: &Address) -> Vec<u8>;
    /// Hash of the contract code (zero hash for missing accounts)
    fn get_code_hash(&self, address: &Address) -> H256;
    /// Length of the contract code
    fn get_code_size(&self, address: &Address) -> usize;
    /// Install contract code
    fn set_code(&mut self, address: Address, code: Vec<u8>);

    /// Read a storage slot (zero for unset slots)
    fn get_state(&self, address: &Address, key: &H256) -> H256;
    /// Write a storage slot
    fn set_state(&mut self, address: Address, key: H256, value: H256);

    /// Append a log record
    fn add_log(&mut self, log: Log);
    /// Record a hash preimage
    fn add_preimage(&mut self, hash: H256, preimage: Vec<u8>);

    /// Mark the account for deletion at the end of the transaction and
    /// zero its balance; returns whether the account existed
    fn suicide(&mut self, address: &Address) -> bool;
    /// Whether the account is marked for deletion
    fn has_suicided(&self, address: &Address) -> bool;
}

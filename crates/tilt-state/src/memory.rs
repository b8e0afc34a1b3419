//! Journaled in-memory state

use crate::{Log, StateDb};
use std::collections::{HashMap, HashSet};
use tilt_crypto::keccak256;
use tilt_primitives::{Address, H256, U256};

/// Hash of empty contract code
fn empty_code_hash() -> H256 {
    keccak256(&[])
}

#[derive(Clone, Debug)]
struct Account {
    balance: U256,
    nonce: u64,
    code: Vec<u8>,
    code_hash: H256,
}

impl Account {
    fn new() -> Self {
        Self {
            balance: U256::zero(),
            nonce: 0,
            code: Vec::new(),
            code_hash: empty_code_hash(),
        }
    }

    fn is_empty(&self) -> bool {
        self.balance.is_zero() && self.nonce == 0 && self.code.is_empty()
    }
}

/// Reverse operations recorded for every mutation, undone on revert
#[derive(Clone, Debug)]
enum JournalEntry {
    AccountCreated {
        address: Address,
        previous: Option<Box<Account>>,
    },
    BalanceChanged {
        address: Address,
        previous: U256,
    },
    NonceChanged {
        address: Address,
        previous: u64,
    },
    CodeChanged {
        address: Address,
        previous_code: Vec<u8>,
        previous_hash: H256,
    },
    StorageChanged {
        address: Address,
        key: H256,
        previous: H256,
    },
    SuicideMarked {
        address: Address,
        previous_balance: U256,
    },
    LogAdded,
    PreimageAdded {
        hash: H256,
    },
}

/// In-memory [`StateDb`] with full snapshot/revert support.
///
/// Every mutation appends a reverse operation to a journal; a snapshot is
/// simply the journal length at the time it was taken.
#[derive(Default)]
pub struct MemoryState {
    accounts: HashMap<Address, Account>,
    storage: HashMap<(Address, H256), H256>,
    suicided: HashSet<Address>,
    logs: Vec<Log>,
    preimages: HashMap<H256, Vec<u8>>,

    journal: Vec<JournalEntry>,
    snapshots: Vec<(usize, usize)>,
    next_snapshot: usize,
}

impl MemoryState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs accumulated so far
    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    /// Recorded hash preimages
    pub fn preimages(&self) -> &HashMap<H256, Vec<u8>> {
        &self.preimages
    }

    /// Delete accounts marked suicided and reset the journal. Called once
    /// the enclosing transaction is final; reverting past this point is no
    /// longer possible.
    pub fn finalise(&mut self) {
        for address in self.suicided.drain() {
            self.accounts.remove(&address);
            self.storage.retain(|(a, _), _| *a != address);
        }
        self.journal.clear();
        self.snapshots.clear();
    }

    fn account_mut(&mut self, address: Address) -> &mut Account {
        match self.accounts.entry(address) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                self.journal.push(JournalEntry::AccountCreated {
                    address,
                    previous: None,
                });
                entry.insert(Account::new())
            }
        }
    }

    fn undo(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::AccountCreated { address, previous } => match previous {
                Some(account) => {
                    self.accounts.insert(address, *account);
                }
                None => {
                    self.accounts.remove(&address);
                    self.storage.retain(|(a, _), _| *a != address);
                }
            },
            JournalEntry::BalanceChanged { address, previous } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.balance = previous;
                }
            }
            JournalEntry::NonceChanged { address, previous } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.nonce = previous;
                }
            }
            JournalEntry::CodeChanged {
                address,
                previous_code,
                previous_hash,
            } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.code = previous_code;
                    account.code_hash = previous_hash;
                }
            }
            JournalEntry::StorageChanged {
                address,
                key,
                previous,
            } => {
                if previous.is_zero() {
                    self.storage.remove(&(address, key));
                } else {
                    self.storage.insert((address, key), previous);
                }
            }
            JournalEntry::SuicideMarked {
                address,
                previous_balance,
            } => {
                self.suicided.remove(&address);
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.balance = previous_balance;
                }
            }
            JournalEntry::LogAdded => {
                self.logs.pop();
            }
            JournalEntry::PreimageAdded { hash } => {
                self.preimages.remove(&hash);
            }
        }
    }
}

impl StateDb for MemoryState {
    fn create_account(&mut self, address: Address) {
        let previous = self.accounts.get(&address).cloned().map(Box::new);
        self.journal
            .push(JournalEntry::AccountCreated { address, previous });

        // A fresh account starts with clean storage; journal every wiped
        // slot so a revert puts it back
        let wiped: Vec<(H256, H256)> = self
            .storage
            .iter()
            .filter(|((a, _), _)| *a == address)
            .map(|((_, k), v)| (*k, *v))
            .collect();
        for (key, previous) in wiped {
            self.journal.push(JournalEntry::StorageChanged {
                address,
                key,
                previous,
            });
            self.storage.remove(&(address, key));
        }

        // A recreated account keeps its balance, as the surrounding chain
        // state would carry it over
        let balance = self
            .accounts
            .get(&address)
            .map(|a| a.balance)
            .unwrap_or_default();
        let mut account = Account::new();
        account.balance = balance;
        self.accounts.insert(address, account);
    }

    fn exist(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    fn empty(&self, address: &Address) -> bool {
        self.accounts
            .get(address)
            .map(Account::is_empty)
            .unwrap_or(true)
    }

    fn snapshot(&mut self) -> usize {
        let id = self.next_snapshot;
        self.next_snapshot += 1;
        self.snapshots.push((id, self.journal.len()));
        id
    }

    fn revert_to_snapshot(&mut self, id: usize) {
        let Some(pos) = self.snapshots.iter().position(|(sid, _)| *sid == id) else {
            return;
        };
        let (_, journal_len) = self.snapshots[pos];
        while self.journal.len() > journal_len {
            if let Some(entry) = self.journal.pop() {
                self.undo(entry);
            }
        }
        self.snapshots.truncate(pos);
    }

    fn get_balance(&self, address: &Address) -> U256 {
        self.accounts
            .get(address)
            .map(|a| a.balance)
            .unwrap_or_default()
    }

    fn add_balance(&mut self, address: Address, amount: U256) {
        let account = self.account_mut(address);
        let previous = account.balance;
        account.balance = previous.overflowing_add(amount).0;
        self.journal
            .push(JournalEntry::BalanceChanged { address, previous });
    }

    fn sub_balance(&mut self, address: Address, amount: U256) {
        let account = self.account_mut(address);
        let previous = account.balance;
        account.balance = previous.overflowing_sub(amount).0;
        self.journal
            .push(JournalEntry::BalanceChanged { address, previous });
    }

    fn get_nonce(&self, address: &Address) -> u64 {
        self.accounts
            .get(address)
            .map(|a| a.nonce)
            .unwrap_or_default()
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) {
        let account = self.account_mut(address);
        let previous = account.nonce;
        account.nonce = nonce;
        self.journal
            .push(JournalEntry::NonceChanged { address, previous });
    }

    fn get_code(&self, address: &Address) -> Vec<u8> {
        self.accounts
            .get(address)
            .map(|a| a.code.clone())
            .unwrap_or_default()
    }

    fn get_code_hash(&self, address: &Address) -> H256 {
        self.accounts
            .get(address)
            .map(|a| a.code_hash)
            .unwrap_or(H256::ZERO)
    }

    fn get_code_size(&self, address: &Address) -> usize {
        self.accounts
            .get(address)
            .map(|a| a.code.len())
            .unwrap_or(0)
    }

    fn set_code(&mut self, address: Address, code: Vec<u8>) {
        let hash = keccak256(&code);
        let account = self.account_mut(address);
        let previous_code = std::mem::take(&mut account.code);
        let previous_hash = account.code_hash;
        account.code = code;
        account.code_hash = hash;
        self.journal.push(JournalEntry::CodeChanged {
            address,
            previous_code,
            previous_hash,
        });
    }

    fn get_state(&self, address: &Address, key: &H256) -> H256 {
        self.storage
            .get(&(*address, *key))
            .copied()
            .unwrap_or(H256::ZERO)
    }

    fn set_state(&mut self, address: Address, key: H256, value: H256) {
        let previous = self
            .storage
            .get(&(address, key))
            .copied()
            .unwrap_or(H256::ZERO);
        self.journal.push(JournalEntry::StorageChanged {
            address,
            key,
            previous,
        });
        if value.is_zero() {
            self.storage.remove(&(address, key));
        } else {
            self.storage.insert((address, key), value);
        }
    }

    fn add_log(&mut self, log: Log) {
        self.journal.push(JournalEntry::LogAdded);
        self.logs.push(log);
    }

    fn add_preimage(&mut self, hash: H256, preimage: Vec<u8>) {
        if !self.preimages.contains_key(&hash) {
            self.journal.push(JournalEntry::PreimageAdded { hash });
            self.preimages.insert(hash, preimage);
        }
    }

    fn suicide(&mut self, address: &Address) -> bool {
        let Some(account) = self.accounts.get_mut(address) else {
            return false;
        };
        let previous_balance = account.balance;
        account.balance = U256::zero();
        self.suicided.insert(*address);
        self.journal.push(JournalEntry::SuicideMarked {
            address: *address,
            previous_balance,
        });
        true
    }

    fn has_suicided(&self, address: &Address) -> bool {
        self.suicided.contains(address)
    }
}

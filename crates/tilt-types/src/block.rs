//! Block types

use bytes::Bytes;
use rlp::RlpStream;
use tilt_crypto::keccak256;
use tilt_primitives::{Address, H256, U256};

/// Logs bloom filter (2048 bits = 256 bytes)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bloom(pub [u8; 256]);

impl Default for Bloom {
    fn default() -> Self {
        Self([0u8; 256])
    }
}

impl Bloom {
    /// Empty bloom filter
    pub const ZERO: Bloom = Bloom([0u8; 256]);

    /// Create bloom from bytes
    pub fn from_bytes(bytes: [u8; 256]) -> Self {
        Self(bytes)
    }

    /// Check if bloom filter is empty
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

/// Block header
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    /// Parent block hash
    pub parent_hash: H256,
    /// Ommers/uncles hash
    pub ommers_hash: H256,
    /// Block producer/miner address
    pub beneficiary: Address,
    /// State root after executing the block
    pub state_root: H256,
    /// Transactions trie root
    pub transactions_root: H256,
    /// Receipts trie root
    pub receipts_root: H256,
    /// Logs bloom filter
    pub logs_bloom: Bloom,
    /// Proof-of-work difficulty
    pub difficulty: U256,
    /// Block number (height)
    pub number: u64,
    /// Gas limit for the block
    pub gas_limit: u64,
    /// Gas used by all transactions
    pub gas_used: u64,
    /// Block timestamp (Unix seconds)
    pub timestamp: u64,
    /// Extra data (consensus-specific)
    pub extra_data: Bytes,
    /// Proof-of-work mix digest
    pub mix_digest: H256,
    /// Proof-of-work nonce
    pub nonce: u64,
}

impl Default for BlockHeader {
    fn default() -> Self {
        Self {
            parent_hash: H256::ZERO,
            ommers_hash: H256::ZERO,
            beneficiary: Address::ZERO,
            state_root: H256::ZERO,
            transactions_root: H256::ZERO,
            receipts_root: H256::ZERO,
            logs_bloom: Bloom::ZERO,
            difficulty: U256::one(),
            number: 0,
            gas_limit: 0,
            gas_used: 0,
            timestamp: 0,
            extra_data: Bytes::new(),
            mix_digest: H256::ZERO,
            nonce: 0,
        }
    }
}

impl BlockHeader {
    fn rlp_body(&self, s: &mut RlpStream, with_seal: bool) {
        s.begin_list(if with_seal { 15 } else { 13 });
        s.append(&self.parent_hash);
        s.append(&self.ommers_hash);
        s.append(&self.beneficiary);
        s.append(&self.state_root);
        s.append(&self.transactions_root);
        s.append(&self.receipts_root);
        s.append(&self.logs_bloom.0.to_vec());
        s.append(&self.difficulty);
        s.append(&self.number);
        s.append(&self.gas_limit);
        s.append(&self.gas_used);
        s.append(&self.timestamp);
        s.append(&self.extra_data.to_vec());
        if with_seal {
            s.append(&self.mix_digest);
            s.append(&self.nonce);
        }
    }

    /// Keccak hash of the fully sealed header
    pub fn hash(&self) -> H256 {
        let mut s = RlpStream::new();
        self.rlp_body(&mut s, true);
        keccak256(&s.out())
    }

    /// Keccak hash of the header without its seal fields; this is the
    /// message the proof-of-work search commits to
    pub fn hash_no_nonce(&self) -> H256 {
        let mut s = RlpStream::new();
        self.rlp_body(&mut s, false);
        keccak256(&s.out())
    }
}

/// Complete block
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Block {
    /// Block header
    pub header: BlockHeader,
}

impl Block {
    /// Create a block around a header
    pub fn new(header: BlockHeader) -> Self {
        Self { header }
    }

    /// Copy of the header
    pub fn header(&self) -> BlockHeader {
        self.header.clone()
    }

    /// Replace the seal fields, producing the sealed block
    pub fn with_seal(&self, header: BlockHeader) -> Block {
        Block { header }
    }
}

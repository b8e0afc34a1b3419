//! Jump destination analysis

use crate::opcode::Opcode;
use std::collections::HashMap;
use tilt_primitives::{H256, U256};

/// One bit per code byte, set where the byte is a valid JUMPDEST
#[derive(Clone, Debug)]
pub struct Bitvec(Vec<u8>);

impl Bitvec {
    fn new(len: usize) -> Self {
        Bitvec(vec![0; len / 8 + 1])
    }

    fn set(&mut self, pos: usize) {
        self.0[pos / 8] |= 1 << (pos % 8);
    }

    fn is_set(&self, pos: usize) -> bool {
        self.0[pos / 8] & (1 << (pos % 8)) != 0
    }
}

/// Analyse code for valid jump destinations, skipping the immediates of
/// PUSH1..PUSH32
pub fn analyse(code: &[u8]) -> Bitvec {
    let mut dests = Bitvec::new(code.len());
    let mut pc = 0usize;
    while pc < code.len() {
        let byte = code[pc];
        if byte == Opcode::JUMPDEST as u8 {
            dests.set(pc);
            pc += 1;
        } else if (0x60..=0x7F).contains(&byte) {
            pc += (byte - 0x5F) as usize + 1;
        } else {
            pc += 1;
        }
    }
    dests
}

/// Per-code-hash cache of jumpdest analyses; frames that execute the same
/// code share one analysis
#[derive(Default)]
pub struct Destinations {
    cache: HashMap<H256, Bitvec>,
}

impl Destinations {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `dest` is a valid jump target in `code`, analysing and
    /// memoizing under `code_hash` on first use
    pub fn has(&mut self, code_hash: H256, code: &[u8], dest: U256) -> bool {
        // PC cannot go beyond len(code), and certainly not above 2^63
        if dest >= U256::from(code.len() as u64) {
            return false;
        }
        let pos = dest.low_u64() as usize;
        self.cache
            .entry(code_hash)
            .or_insert_with(|| analyse(code))
            .is_set(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyse_marks_jumpdest() {
        // JUMPDEST, STOP, JUMPDEST
        let code = [0x5B, 0x00, 0x5B];
        let dests = analyse(&code);
        assert!(dests.is_set(0));
        assert!(!dests.is_set(1));
        assert!(dests.is_set(2));
    }

    #[test]
    fn test_analyse_skips_push_immediates() {
        // PUSH2 0x5B 0x5B, JUMPDEST
        let code = [0x61, 0x5B, 0x5B, 0x5B];
        let dests = analyse(&code);
        assert!(!dests.is_set(1));
        assert!(!dests.is_set(2));
        assert!(dests.is_set(3));
    }

    #[test]
    fn test_analyse_push32_immediate() {
        let mut code = vec![0x7F]; // PUSH32
        code.extend([0x5B; 32]);
        code.push(0x5B); // real JUMPDEST after the immediate
        let dests = analyse(&code);
        for pos in 1..=32 {
            assert!(!dests.is_set(pos), "byte {} is an immediate", pos);
        }
        assert!(dests.is_set(33));
    }

    #[test]
    fn test_analyse_truncated_push() {
        // PUSH3 with only two immediate bytes present
        let code = [0x62, 0x5B, 0x5B];
        let dests = analyse(&code);
        assert!(!dests.is_set(1));
        assert!(!dests.is_set(2));
    }

    #[test]
    fn test_destinations_memoizes() {
        let code = [0x5B, 0x00];
        let hash = tilt_crypto::keccak256(&code);
        let mut dests = Destinations::new();
        assert!(dests.has(hash, &code, U256::zero()));
        // Second query hits the cache; same answer
        assert!(dests.has(hash, &code, U256::zero()));
        assert!(!dests.has(hash, &code, U256::one()));
    }

    #[test]
    fn test_destinations_out_of_range() {
        let code = [0x5B];
        let hash = tilt_crypto::keccak256(&code);
        let mut dests = Destinations::new();
        assert!(!dests.has(hash, &code, U256::from(1u64)));
        assert!(!dests.has(hash, &code, U256::MAX));
    }
}

//! Precompiled contracts: fixed, natively-implemented contracts living at
//! reserved low addresses.

use crate::contract::Contract;
use crate::error::{VmError, VmResult};
use crate::gas;
use tilt_crypto::{ecrecover, ripemd160, sha256};
use tilt_primitives::{Address, H256};

/// A precompiled contract: a pure function of its input plus a gas
/// formula over the input size
pub trait PrecompiledContract: Sync {
    /// Gas the contract charges for `input`
    fn required_gas(&self, input: &[u8]) -> u64;
    /// Execute against `input`
    fn run(&self, input: &[u8]) -> VmResult<Vec<u8>>;
}

/// Charge the precompile's gas against the frame and run it
pub(crate) fn run_precompiled(
    p: &dyn PrecompiledContract,
    input: &[u8],
    contract: &mut Contract,
) -> VmResult<Vec<u8>> {
    if contract.use_gas(p.required_gas(input)) {
        p.run(input)
    } else {
        Err(VmError::OutOfGas)
    }
}

/// Look up the precompiled contract at `addr`, if any
pub fn precompiled(addr: &Address) -> Option<&'static dyn PrecompiledContract> {
    let bytes = addr.as_bytes();
    if bytes[..19].iter().any(|&b| b != 0) {
        return None;
    }
    match bytes[19] {
        1 => Some(&Ecrecover),
        2 => Some(&Sha256Hash),
        3 => Some(&Ripemd160Hash),
        4 => Some(&DataCopy),
        _ => None,
    }
}

fn right_pad(input: &[u8], len: usize) -> Vec<u8> {
    let mut out = input.to_vec();
    if out.len() < len {
        out.resize(len, 0);
    }
    out
}

struct Ecrecover;

impl PrecompiledContract for Ecrecover {
    fn required_gas(&self, _input: &[u8]) -> u64 {
        gas::ECRECOVER_GAS
    }

    fn run(&self, input: &[u8]) -> VmResult<Vec<u8>> {
        let input = right_pad(input, 128);

        // The recovery id is a 32-byte big-endian 27 or 28; anything else
        // yields an empty result rather than an error
        if input[32..63].iter().any(|&b| b != 0) {
            return Ok(Vec::new());
        }
        let v = input[63];
        if v != 27 && v != 28 {
            return Ok(Vec::new());
        }

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&input[..32]);
        let mut r = [0u8; 32];
        r.copy_from_slice(&input[64..96]);
        let mut s = [0u8; 32];
        s.copy_from_slice(&input[96..128]);

        match ecrecover(&H256::from_bytes(hash), v - 27, &r, &s) {
            Ok(address) => {
                let mut out = vec![0u8; 32];
                out[12..].copy_from_slice(address.as_bytes());
                Ok(out)
            }
            Err(_) => Ok(Vec::new()),
        }
    }
}

struct Sha256Hash;

impl PrecompiledContract for Sha256Hash {
    fn required_gas(&self, input: &[u8]) -> u64 {
        gas::to_word_size(input.len() as u64) * gas::SHA256_WORD_GAS + gas::SHA256_BASE_GAS
    }

    fn run(&self, input: &[u8]) -> VmResult<Vec<u8>> {
        Ok(sha256(input).as_bytes().to_vec())
    }
}

struct Ripemd160Hash;

impl PrecompiledContract for Ripemd160Hash {
    fn required_gas(&self, input: &[u8]) -> u64 {
        gas::to_word_size(input.len() as u64) * gas::RIPEMD160_WORD_GAS
            + gas::RIPEMD160_BASE_GAS
    }

    fn run(&self, input: &[u8]) -> VmResult<Vec<u8>> {
        let digest = ripemd160(input);
        let mut out = vec![0u8; 32];
        out[12..].copy_from_slice(&digest);
        Ok(out)
    }
}

struct DataCopy;

impl PrecompiledContract for DataCopy {
    fn required_gas(&self, input: &[u8]) -> u64 {
        gas::to_word_size(input.len() as u64) * gas::IDENTITY_WORD_GAS + gas::IDENTITY_BASE_GAS
    }

    fn run(&self, input: &[u8]) -> VmResult<Vec<u8>> {
        Ok(input.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilt_primitives::U256;

    fn precompile_addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address::from_bytes(bytes)
    }

    #[test]
    fn test_lookup() {
        assert!(precompiled(&precompile_addr(1)).is_some());
        assert!(precompiled(&precompile_addr(4)).is_some());
        assert!(precompiled(&precompile_addr(5)).is_none());
        assert!(precompiled(&precompile_addr(0)).is_none());
        assert!(precompiled(&Address::from_bytes([1u8; 20])).is_none());
    }

    #[test]
    fn test_identity() {
        let out = DataCopy.run(&[1, 2, 3]).unwrap();
        assert_eq!(out, vec![1, 2, 3]);
        assert_eq!(DataCopy.required_gas(&[0u8; 32]), 15 + 3);
        assert_eq!(DataCopy.required_gas(&[0u8; 33]), 15 + 6);
    }

    #[test]
    fn test_sha256_output() {
        let out = Sha256Hash.run(b"abc").unwrap();
        assert_eq!(
            hex::encode(&out),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(Sha256Hash.required_gas(b"abc"), 60 + 12);
    }

    #[test]
    fn test_ripemd160_left_padded() {
        let out = Ripemd160Hash.run(b"abc").unwrap();
        assert_eq!(out.len(), 32);
        assert!(out[..12].iter().all(|&b| b == 0));
        assert_eq!(
            hex::encode(&out[12..]),
            "8eb208f7e05d987a9b044a8e98c6b087f15a0bfc"
        );
    }

    #[test]
    fn test_ecrecover_rejects_bad_v() {
        // v = 29 yields an empty result, not an error
        let mut input = vec![0u8; 128];
        input[63] = 29;
        assert!(Ecrecover.run(&input).unwrap().is_empty());
        // Garbage in the v padding is also rejected
        let mut input = vec![0u8; 128];
        input[40] = 1;
        input[63] = 27;
        assert!(Ecrecover.run(&input).unwrap().is_empty());
    }

    #[test]
    fn test_run_precompiled_charges_gas() {
        let mut contract = Contract::new(
            Address::ZERO,
            Address::ZERO,
            U256::zero(),
            100,
        );
        let out = run_precompiled(&DataCopy, &[1, 2], &mut contract).unwrap();
        assert_eq!(out, vec![1, 2]);
        assert_eq!(contract.gas, 100 - 18);

        let mut poor = Contract::new(Address::ZERO, Address::ZERO, U256::zero(), 5);
        assert_eq!(
            run_precompiled(&DataCopy, &[1, 2], &mut poor),
            Err(VmError::OutOfGas)
        );
    }
}

//! Keccak and precompile digests

use sha2::Sha256;
use sha3::{Digest, Keccak256, Keccak512};
use tilt_primitives::H256;

/// Compute Keccak-256 hash of the input data
pub fn keccak256(data: &[u8]) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    H256::from_bytes(hasher.finalize().into())
}

/// Compute Keccak-512 hash of the input data (64-byte digest)
pub fn keccak512(data: &[u8]) -> [u8; 64] {
    let mut hasher = Keccak512::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    H256::from_bytes(hasher.finalize().into())
}

/// Compute RIPEMD-160 hash of the input data (20-byte digest)
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    use ripemd::Ripemd160;
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_empty() {
        // keccak256("") = 0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470
        let hash = keccak256(&[]);
        assert_eq!(
            hash.to_hex(),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_keccak256_hello() {
        // keccak256("hello") = 0x1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8
        let hash = keccak256(b"hello");
        assert_eq!(
            hash.to_hex(),
            "0x1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
        );
    }

    #[test]
    fn test_keccak512_empty() {
        // First 8 bytes of keccak512("")
        let hash = keccak512(&[]);
        assert_eq!(
            &hash[..8],
            &hex::decode("0eab42de4c3ceb92").unwrap()[..]
        );
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_keccak512_deterministic() {
        assert_eq!(keccak512(b"tilt"), keccak512(b"tilt"));
        assert_ne!(keccak512(b"tilt")[..], keccak512(b"tilt2")[..]);
    }

    #[test]
    fn test_sha256_abc() {
        // FIPS 180-2 test vector
        let hash = sha256(b"abc");
        assert_eq!(
            hash.to_hex(),
            "0xba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_ripemd160_abc() {
        // RIPEMD-160 reference vector
        let hash = ripemd160(b"abc");
        assert_eq!(
            hex::encode(hash),
            "8eb208f7e05d987a9b044a8e98c6b087f15a0bfc"
        );
    }

    #[test]
    fn test_keccak256_erc20_transfer_selector() {
        // keccak256("transfer(address,uint256)") starts with 0xa9059cbb
        let hash = keccak256(b"transfer(address,uint256)");
        assert_eq!(&hash.as_bytes()[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
    }
}

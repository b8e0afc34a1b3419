//! Public-key recovery for the ecrecover precompile

use crate::keccak256;
use k256::ecdsa::{RecoveryId, Signature as K256Signature, VerifyingKey};
use thiserror::Error;
use tilt_primitives::{Address, H256};

/// Signature recovery errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// r/s scalars were rejected by the curve implementation
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    /// Recovery id outside 0..=1
    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),
    /// No public key could be recovered
    #[error("recovery failed: {0}")]
    RecoveryFailed(String),
}

/// Recover the signing address from a 32-byte message hash and an
/// `(r, s, recovery_id)` signature.
///
/// The recovery id is the raw 0/1 value, not the 27/28 wire form.
pub fn ecrecover(
    hash: &H256,
    recovery_id: u8,
    r: &[u8; 32],
    s: &[u8; 32],
) -> Result<Address, CryptoError> {
    let r: k256::FieldBytes = (*r).into();
    let s: k256::FieldBytes = (*s).into();
    let signature = K256Signature::from_scalars(r, s)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let recovery_id = RecoveryId::try_from(recovery_id)
        .map_err(|_| CryptoError::InvalidRecoveryId(recovery_id))?;

    let key = VerifyingKey::recover_from_prehash(hash.as_bytes(), &signature, recovery_id)
        .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))?;
    Ok(public_key_to_address(&key))
}

/// Derive the account address from an uncompressed public key: the low 20
/// bytes of `keccak256(x || y)`.
fn public_key_to_address(public_key: &VerifyingKey) -> Address {
    let encoded = public_key.to_encoded_point(false);
    let bytes = encoded.as_bytes();

    // Skip the 0x04 prefix, hash the remaining 64 bytes
    let hash = keccak256(&bytes[1..]);

    let mut addr_bytes = [0u8; 20];
    addr_bytes.copy_from_slice(&hash.as_bytes()[12..]);
    Address::from_bytes(addr_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;

    #[test]
    fn test_recover_roundtrip() {
        let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
        let expected = public_key_to_address(key.verifying_key());

        let hash = keccak256(b"tilt message");
        let (signature, recovery_id) = key.sign_prehash_recoverable(hash.as_bytes()).unwrap();

        let r: [u8; 32] = signature.r().to_bytes().into();
        let s: [u8; 32] = signature.s().to_bytes().into();
        let recovered = ecrecover(&hash, recovery_id.to_byte(), &r, &s).unwrap();
        assert_eq!(recovered, expected);
    }

    #[test]
    fn test_recover_wrong_id_gives_other_address() {
        let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
        let expected = public_key_to_address(key.verifying_key());

        let hash = keccak256(b"tilt message");
        let (signature, recovery_id) = key.sign_prehash_recoverable(hash.as_bytes()).unwrap();

        let r: [u8; 32] = signature.r().to_bytes().into();
        let s: [u8; 32] = signature.s().to_bytes().into();
        let flipped = recovery_id.to_byte() ^ 1;
        match ecrecover(&hash, flipped, &r, &s) {
            Ok(other) => assert_ne!(other, expected),
            Err(_) => {} // point may simply not exist for the flipped id
        }
    }

    #[test]
    fn test_recover_rejects_zero_scalars() {
        let hash = keccak256(b"tilt");
        assert!(ecrecover(&hash, 0, &[0u8; 32], &[0u8; 32]).is_err());
    }

    #[test]
    fn test_recover_rejects_bad_id() {
        let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
        let hash = keccak256(b"tilt message");
        let (signature, _) = key.sign_prehash_recoverable(hash.as_bytes()).unwrap();
        let r: [u8; 32] = signature.r().to_bytes().into();
        let s: [u8; 32] = signature.s().to_bytes().into();
        assert!(matches!(
            ecrecover(&hash, 4, &r, &s),
            Err(CryptoError::InvalidRecoveryId(4))
        ));
    }
}

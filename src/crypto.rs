//! `personal_sign` signature recovery
use alloy::primitives::{eip191_hash_message, Address, Signature, U256};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("signature must be 65 bytes long, got {0}")]
    InvalidLength(usize),

    #[error("invalid Ethereum signature (V is not 27 or 28)")]
    InvalidV,

    #[error("signature recovery failed: {0}")]
    Recovery(String),
}

/// Decode `0x`-prefixed (or bare) hex
pub fn decode_hex(input: &str) -> Result<Vec<u8>, CryptoError> {
    let digits = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    hex::decode(digits).map_err(|e| CryptoError::InvalidHex(format!("{}: {}", input, e)))
}

/// Recover the address that produced `signature` over `data` with
/// `personal_sign` / `eth_sign`.
///
/// The signature is `r || s || v` with `v` in {27, 28}; the message is
/// hashed with the EIP-191 `"\x19Ethereum Signed Message:\n" + len` prefix.
pub fn ec_recover(data: &[u8], signature: &[u8]) -> Result<Address, CryptoError> {
    if signature.len() != 65 {
        return Err(CryptoError::InvalidLength(signature.len()));
    }

    let y_parity = match signature[64] {
        27 => false,
        28 => true,
        _ => return Err(CryptoError::InvalidV),
    };

    let r = U256::from_be_slice(&signature[..32]);
    let s = U256::from_be_slice(&signature[32..64]);
    let signature = Signature::new(r, s, y_parity);

    signature
        .recover_address_from_prehash(&eip191_hash_message(data))
        .map_err(|e| CryptoError::Recovery(e.to_string()))
}

/// [`ec_recover`] over hex-encoded inputs
pub fn ec_recover_hex(data: &str, signature: &str) -> Result<Address, CryptoError> {
    ec_recover(&decode_hex(data)?, &decode_hex(signature)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nonce_manager::dummy_signer;
    use alloy::signers::SignerSync;

    fn personal_sign(message: &[u8]) -> Vec<u8> {
        let signer = dummy_signer().unwrap();
        let signature = signer.sign_message_sync(message).unwrap();
        let mut bytes = Vec::with_capacity(65);
        bytes.extend_from_slice(&signature.r().to_be_bytes::<32>());
        bytes.extend_from_slice(&signature.s().to_be_bytes::<32>());
        bytes.push(27 + signature.v() as u8);
        bytes
    }

    #[test]
    fn test_recovers_signer() {
        let signer = dummy_signer().unwrap();
        let message = b"gateway login 42";
        let signature = personal_sign(message);

        assert_eq!(ec_recover(message, &signature).unwrap(), signer.address());

        let hex_sig = format!("0x{}", hex::encode(&signature));
        let hex_data = format!("0x{}", hex::encode(message));
        assert_eq!(ec_recover_hex(&hex_data, &hex_sig).unwrap(), signer.address());
    }

    #[test]
    fn test_different_message_recovers_other_address() {
        let signer = dummy_signer().unwrap();
        let signature = personal_sign(b"original");
        let recovered = ec_recover(b"tampered", &signature).unwrap_or(Address::ZERO);
        assert_ne!(recovered, signer.address());
    }

    #[test]
    fn test_rejects_bad_length() {
        assert_eq!(ec_recover(b"x", &[0u8; 64]), Err(CryptoError::InvalidLength(64)));
    }

    #[test]
    fn test_rejects_raw_parity_v() {
        let mut signature = personal_sign(b"hello");
        signature[64] -= 27;
        assert_eq!(ec_recover(b"hello", &signature), Err(CryptoError::InvalidV));
    }

    #[test]
    fn test_invalid_hex() {
        assert!(matches!(
            ec_recover_hex("0xzz", "0x00"),
            Err(CryptoError::InvalidHex(_))
        ));
    }
}

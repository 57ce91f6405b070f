//! Key material and transaction signing
//!
//! - Keystore credentials with a zeroized passphrase
//! - Web3 Secret Storage decryption on a blocking thread
//! - Legacy EIP-155 signing and RLP wire encoding
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes, Signature, B256};
use alloy::signers::local::PrivateKeySigner;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::nonce_errors::{SigningError, SigningResult};

/// Fixed, publicly known key used by the dummy coordinator
pub const DUMMY_PRIVATE_KEY: &str =
    "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

/// Keystore path and passphrase handed to the coordinator at startup
pub struct KeyCredentials {
    path: PathBuf,
    passphrase: Zeroizing<String>,
}

impl KeyCredentials {
    pub fn new(path: impl Into<PathBuf>, passphrase: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            passphrase: Zeroizing::new(passphrase.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for KeyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCredentials")
            .field("path", &self.path)
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

/// Decrypt a Web3 Secret Storage keystore
pub async fn load_keystore(credentials: KeyCredentials) -> SigningResult<PrivateKeySigner> {
    warn_on_loose_permissions(&credentials.path);

    tokio::task::spawn_blocking(move || {
        PrivateKeySigner::decrypt_keystore(&credentials.path, credentials.passphrase.as_bytes())
            .map_err(|e| {
                SigningError::Keystore(format!("{}: {}", credentials.path.display(), e))
            })
    })
    .await
    .map_err(|e| SigningError::Aborted(e.to_string()))?
}

/// Signer for the fixed dummy key
pub fn dummy_signer() -> SigningResult<PrivateKeySigner> {
    PrivateKeySigner::from_str(DUMMY_PRIVATE_KEY).map_err(|e| SigningError::Keystore(e.to_string()))
}

#[cfg(unix)]
fn warn_on_loose_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(metadata) = std::fs::metadata(path) {
        let mode = metadata.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            warn!(
                path = %path.display(),
                mode = format!("{:o}", mode),
                "Keystore file is readable by group or others, expected 0600 or 0400"
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_on_loose_permissions(_path: &Path) {}

/// A signed transaction ready for `eth_sendRawTransaction`
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub hash: B256,
    pub raw: Bytes,
    pub nonce: u64,
    pub signature: Signature,
    /// EIP-155 hash the signature was produced over
    pub signature_hash: B256,
}

impl SignedTransaction {
    /// Recover the signing address from the signature
    pub fn recover_signer(&self) -> SigningResult<Address> {
        self.signature
            .recover_address_from_prehash(&self.signature_hash)
            .map_err(|e| SigningError::Signature(e.to_string()))
    }

    /// Hex wire encoding with `0x` prefix
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }
}

/// Sign a legacy transaction and encode it for the wire
pub fn sign_legacy(signer: &PrivateKeySigner, mut tx: TxLegacy) -> SigningResult<SignedTransaction> {
    let signature = signer
        .sign_transaction_sync(&mut tx)
        .map_err(|e| SigningError::Signature(e.to_string()))?;

    let nonce = tx.nonce;
    let signature_hash = tx.signature_hash();
    let signed = tx.into_signed(signature);
    let hash = *signed.hash();
    let raw = TxEnvelope::from(signed).encoded_2718();

    debug!(nonce, hash = %hash, "Transaction signed");

    Ok(SignedTransaction {
        hash,
        raw: Bytes::from(raw),
        nonce,
        signature,
        signature_hash,
    })
}

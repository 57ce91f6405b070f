use thiserror::Error;

use crate::rpc_manager::RpcError;

/// Signing coordinator errors
///
/// None of these are retried automatically: a retry with a stale nonce or
/// a bad key is unsafe, so they always reach the caller.
#[derive(Debug, Clone, Error)]
pub enum SigningError {
    /// The key failed to load; the coordinator will never become ready
    #[error("signing key unavailable: {0}")]
    KeyUnavailable(String),

    /// Keystore file could not be read or decrypted
    #[error("keystore error: {0}")]
    Keystore(String),

    /// Builder produced or received unusable transaction inputs
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// ECDSA signing failed
    #[error("signing failed: {0}")]
    Signature(String),

    /// The node answered the submission with an error
    #[error("transaction rejected by node: {message} (code: {code})")]
    Rejected { code: i64, message: String },

    /// Transport or pool failure while talking to the node
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// Transaction count from the chain could not be parsed
    #[error("invalid transaction count from chain: {0}")]
    InvalidNonce(String),

    /// The detached signing task panicked or was cancelled
    #[error("signing task aborted: {0}")]
    Aborted(String),
}

impl SigningError {
    /// The node reports the nonce as already used: local counter is behind
    pub fn is_nonce_drift(&self) -> bool {
        match self {
            SigningError::Rejected { message, .. } => {
                let msg = message.to_lowercase();
                msg.contains("nonce too low")
                    || msg.contains("nonce is too low")
                    || msg.contains("already known")
            }
            _ => false,
        }
    }
}

/// Result type for signing operations
pub type SigningResult<T> = Result<T, SigningError>;

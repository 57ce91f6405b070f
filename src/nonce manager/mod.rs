//! Nonce Manager Module
//!
//! Single-key signing coordinator with serialized nonce assignment and
//! chain resynchronization

// Submodules
pub mod nonce_coordinator;
pub mod nonce_errors;
pub mod nonce_refresh;
pub mod nonce_signer;

// Re-exports for convenience
pub use nonce_coordinator::{KeyState, SigningCoordinator};
pub use nonce_errors::{SigningError, SigningResult};
pub use nonce_refresh::{parse_quantity, NonceSource};
pub use nonce_signer::{dummy_signer, load_keystore, sign_legacy, KeyCredentials, SignedTransaction};

#[cfg(any(test, feature = "test_utils"))]
pub use nonce_refresh::MockNonceSource;

//! Keystore handoff: the coordinator exists before its key does
use alloy::primitives::address;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::nonce_manager::{KeyCredentials, MockNonceSource, NonceSource, SigningCoordinator, SigningError};

const CHAIN_ID: u64 = 11155111;

fn fixture_path() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/keystore-pbkdf2.json"))
}

#[tokio::test]
async fn test_signing_waits_for_credentials() {
    let (tx, rx) = oneshot::channel();
    let source = Arc::new(MockNonceSource::new(3));
    let coordinator = SigningCoordinator::new(rx, CHAIN_ID, Some(source.clone() as Arc<dyn NonceSource>));
    assert!(!coordinator.is_ready());

    let waiting = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.address().await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiting.is_finished());

    tx.send(KeyCredentials::new(fixture_path(), "testpassword")).unwrap();

    let address = tokio::time::timeout(Duration::from_secs(30), waiting)
        .await
        .expect("key never loaded")
        .unwrap()
        .unwrap();
    assert_eq!(address, address!("008aeeda4d805471df9b2a5b0f38a0c3bcba786b"));
    assert!(coordinator.is_ready());

    // First cycle adopts the chain count
    assert_eq!(coordinator.resync().await.unwrap(), 3);
    assert!(source.calls() >= 1);
}

#[tokio::test]
async fn test_wrong_passphrase_fails_every_call() {
    let (tx, rx) = oneshot::channel();
    let coordinator = SigningCoordinator::new(rx, CHAIN_ID, None);
    tx.send(KeyCredentials::new(fixture_path(), "not-the-passphrase")).unwrap();

    let err = coordinator.address().await.unwrap_err();
    assert!(matches!(err, SigningError::KeyUnavailable(_)));
    assert!(!coordinator.is_ready());

    let err = coordinator
        .sign_with_nonce(
            |_| async move { Err(SigningError::InvalidTransaction("unreachable".to_string())) },
            |signed| async move { Ok(signed.nonce) },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SigningError::KeyUnavailable(_)));
}

#[tokio::test]
async fn test_from_credentials_returns_ready_coordinator() {
    let coordinator = SigningCoordinator::from_credentials(
        KeyCredentials::new(fixture_path(), "testpassword"),
        CHAIN_ID,
        None,
    )
    .await
    .unwrap();
    assert!(coordinator.is_ready());
    assert_eq!(coordinator.next_nonce().await, 0);
}

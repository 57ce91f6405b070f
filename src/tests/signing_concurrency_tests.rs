//! Concurrent signing cycles against one coordinator
use alloy::consensus::TxLegacy;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::nonce_manager::{MockNonceSource, NonceSource, SigningCoordinator, SigningError};

const CHAIN_ID: u64 = 11155111;

fn transfer(nonce: u64) -> TxLegacy {
    TxLegacy {
        chain_id: None,
        nonce,
        gas_price: 1_000_000_000,
        gas_limit: 21_000,
        to: TxKind::Call(Address::repeat_byte(0x42)),
        value: U256::from(1u64),
        input: Bytes::new(),
    }
}

/// 20 parallel cycles get 20 distinct, contiguous nonces
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_cycles_assign_contiguous_nonces() {
    const TASKS: u64 = 20;
    let coordinator = SigningCoordinator::dummy(CHAIN_ID).unwrap();

    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .sign_with_nonce(
                        |n| async move {
                            // Yield inside the critical section
                            tokio::time::sleep(Duration::from_millis(1)).await;
                            Ok(transfer(n))
                        },
                        |signed| async move { Ok(signed.nonce) },
                    )
                    .await
            })
        })
        .collect();

    let mut nonces = BTreeSet::new();
    for result in join_all(handles).await {
        let nonce = result.unwrap().unwrap();
        assert!(nonces.insert(nonce), "nonce {} assigned twice", nonce);
    }

    assert_eq!(nonces, (0..TASKS).collect::<BTreeSet<_>>());
    assert_eq!(coordinator.next_nonce().await, TASKS);
}

/// Failed submissions leave no gaps for the successful ones
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_failures_leave_no_gaps() {
    let coordinator = SigningCoordinator::dummy(CHAIN_ID).unwrap();
    let attempt = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            let attempt = Arc::clone(&attempt);
            tokio::spawn(async move {
                coordinator
                    .sign_with_nonce(
                        |n| async move { Ok(transfer(n)) },
                        move |signed| async move {
                            // Every third submission is rejected
                            if attempt.fetch_add(1, Ordering::SeqCst) % 3 == 2 {
                                Err(SigningError::Rejected {
                                    code: -32000,
                                    message: "insufficient funds".to_string(),
                                })
                            } else {
                                Ok(signed.nonce)
                            }
                        },
                    )
                    .await
            })
        })
        .collect();

    let mut nonces = Vec::new();
    for handle in handles {
        if let Ok(nonce) = handle.await.unwrap() {
            nonces.push(nonce);
        }
    }
    nonces.sort_unstable();

    let expected: Vec<u64> = (0..nonces.len() as u64).collect();
    assert_eq!(nonces, expected);
    assert_eq!(coordinator.next_nonce().await, nonces.len() as u64);
}

/// External transactions from the same key are picked up after a drift
/// rejection, and the counter never rewinds
#[tokio::test]
async fn test_drift_recovery_through_chain_source() {
    let source = Arc::new(MockNonceSource::new(0));
    let coordinator = SigningCoordinator::with_signer(
        crate::nonce_manager::dummy_signer().unwrap(),
        CHAIN_ID,
        Some(source.clone() as Arc<dyn NonceSource>),
    );

    // Two local sends
    for _ in 0..2 {
        coordinator
            .sign_with_nonce(|n| async move { Ok(transfer(n)) }, |s| async move { Ok(s.nonce) })
            .await
            .unwrap();
    }
    assert_eq!(coordinator.next_nonce().await, 2);

    // Someone else used nonces 2..5 with the same key
    source.set(5);
    let err = coordinator
        .sign_with_nonce(
            |n| async move { Ok(transfer(n)) },
            |_s| async move {
                Err::<u64, _>(SigningError::Rejected {
                    code: -32000,
                    message: "nonce too low".to_string(),
                })
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_nonce_drift());

    let nonce = coordinator
        .sign_with_nonce(|n| async move { Ok(transfer(n)) }, |s| async move { Ok(s.nonce) })
        .await
        .unwrap();
    assert_eq!(nonce, 5);

    // A lagging node does not pull the counter back
    source.set(1);
    coordinator.resync().await.unwrap();
    assert_eq!(coordinator.next_nonce().await, 6);
}

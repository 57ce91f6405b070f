//! Benchmarks for endpoint pool selection and signing cycles
//!
//! - Round-robin selection over healthy and partially demoted pools
//! - Failure/success reporting under the pool lock
//! - One full build-sign-submit cycle on the dummy coordinator

use alloy::consensus::TxLegacy;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use eth_gateway::nonce_manager::SigningCoordinator;
use eth_gateway::rpc_manager::{EndpointPool, RestorePolicy};
use eth_gateway::types::Network;

fn pool_with(size: usize) -> (EndpointPool, Vec<String>) {
    let urls: Vec<String> = (0..size).map(|i| format!("http://node-{}.invalid", i)).collect();
    let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    let pool = EndpointPool::with_endpoints(Network::Mainnet, &refs, 3)
        .with_restore_policy(RestorePolicy::Interval);
    (pool, urls)
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_select");
    for size in [1usize, 4, 16] {
        let (pool, _) = pool_with(size);
        group.bench_with_input(BenchmarkId::new("healthy", size), &size, |b, _| {
            b.iter(|| black_box(pool.select(Network::Mainnet).ok()))
        });

        // Half the pool demoted
        let (pool, urls) = pool_with(size);
        for url in urls.iter().step_by(2) {
            for _ in 0..3 {
                pool.report_failure(Network::Mainnet, url);
            }
        }
        group.bench_with_input(BenchmarkId::new("half_demoted", size), &size, |b, _| {
            b.iter(|| black_box(pool.select(Network::Mainnet).ok()))
        });
    }
    group.finish();
}

fn bench_report(c: &mut Criterion) {
    let (pool, urls) = pool_with(8);
    c.bench_function("pool_report_failure_then_success", |b| {
        b.iter(|| {
            pool.report_failure(Network::Mainnet, &urls[3]);
            pool.report_success(Network::Mainnet, black_box(&urls[3]));
        })
    });
}

fn bench_signing_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let coordinator: Arc<SigningCoordinator> = SigningCoordinator::dummy(1).unwrap();

    c.bench_function("signing_cycle", |b| {
        b.iter(|| {
            rt.block_on(coordinator.sign_with_nonce(
                |nonce| async move {
                    Ok(TxLegacy {
                        chain_id: None,
                        nonce,
                        gas_price: 1_000_000_000,
                        gas_limit: 21_000,
                        to: TxKind::Call(Address::repeat_byte(0x11)),
                        value: U256::from(1u64),
                        input: Bytes::new(),
                    })
                },
                |signed| async move { Ok(signed.raw.len()) },
            ))
            .unwrap()
        })
    });
}

criterion_group!(benches, bench_select, bench_report, bench_signing_cycle);
criterion_main!(benches);

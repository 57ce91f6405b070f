//! Per-network endpoint pool with failure tracking and restore cycles
//!
//! - Round-robin selection over the available subset of each network's list
//! - Consecutive transport failures demote an endpoint once the threshold is hit
//! - Demotion is idempotent; `available_count` drops by exactly one per endpoint
//! - Demoted endpoints come back through `restore_all`, either on exhaustion
//!   or from a periodic background task
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::rpc_config::{RestorePolicy, RpcConfig};
use super::rpc_errors::PoolError;
use crate::metrics::metrics;
use crate::types::Network;

/// Failure bookkeeping for one upstream URL
#[derive(Debug, Clone)]
struct TrackedEndpoint {
    url: String,
    consecutive_failures: u32,
    total_failures: u64,
    demotions: u64,
    available: bool,
}

impl TrackedEndpoint {
    fn new(url: String) -> Self {
        Self {
            url,
            consecutive_failures: 0,
            total_failures: 0,
            demotions: 0,
            available: true,
        }
    }
}

#[derive(Debug)]
struct NetworkPool {
    endpoints: Vec<TrackedEndpoint>,
    available_count: usize,
    cursor: usize,
}

impl NetworkPool {
    fn new(urls: &[String]) -> Self {
        let endpoints: Vec<TrackedEndpoint> =
            urls.iter().cloned().map(TrackedEndpoint::new).collect();
        let available_count = endpoints.len();
        Self {
            endpoints,
            available_count,
            cursor: 0,
        }
    }

    fn position(&self, url: &str) -> Option<usize> {
        self.endpoints.iter().position(|e| e.url == url)
    }

    fn restore(&mut self) -> usize {
        let mut restored = 0;
        for endpoint in self.endpoints.iter_mut() {
            if !endpoint.available {
                endpoint.available = true;
                restored += 1;
            }
            endpoint.consecutive_failures = 0;
        }
        self.available_count = self.endpoints.len();
        restored
    }
}

/// Endpoint pool shared by every request handler
#[derive(Debug)]
pub struct EndpointPool {
    networks: HashMap<Network, Mutex<NetworkPool>>,
    failure_threshold: u32,
    restore_policy: RestorePolicy,
}

impl EndpointPool {
    /// Build a pool for every network that has a non-empty endpoint list
    pub fn new(config: &RpcConfig) -> Self {
        let networks = Network::ALL
            .iter()
            .filter(|n| !config.endpoints_for(**n).is_empty())
            .map(|n| (*n, Mutex::new(NetworkPool::new(config.endpoints_for(*n)))))
            .collect::<HashMap<_, _>>();

        for (network, pool) in &networks {
            metrics()
                .available_endpoints
                .with_label_values(&[network.as_str()])
                .set(pool.lock().available_count as i64);
        }

        Self {
            networks,
            failure_threshold: config.failure_threshold.max(1),
            restore_policy: config.restore_policy,
        }
    }

    /// Single-network pool
    pub fn with_endpoints(network: Network, urls: &[&str], failure_threshold: u32) -> Self {
        let mut config = RpcConfig::from_urls(network, urls);
        config.failure_threshold = failure_threshold;
        Self::new(&config)
    }

    pub fn with_restore_policy(mut self, policy: RestorePolicy) -> Self {
        self.restore_policy = policy;
        self
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn restore_policy(&self) -> RestorePolicy {
        self.restore_policy
    }

    fn network(&self, network: Network) -> Result<&Mutex<NetworkPool>, PoolError> {
        self.networks
            .get(&network)
            .ok_or(PoolError::UnknownNetwork(network))
    }

    /// Return the URL of the next available endpoint, round-robin.
    ///
    /// An empty available set yields `PoolError::Empty`. Under the
    /// on-exhaustion restore policy that same call restores the pool so the
    /// next request can succeed.
    pub fn select(&self, network: Network) -> Result<String, PoolError> {
        let mut pool = self.network(network)?.lock();
        let len = pool.endpoints.len();

        if pool.available_count == 0 {
            metrics()
                .pool_exhausted
                .with_label_values(&[network.as_str()])
                .inc();
            warn!(network = %network, total = len, "Endpoint pool exhausted");

            if self.restore_policy == RestorePolicy::OnExhaustion {
                let restored = pool.restore();
                self.record_restore(network, restored, pool.available_count);
            }
            return Err(PoolError::Empty {
                network,
                total: len,
            });
        }

        for offset in 0..len {
            let idx = (pool.cursor + offset) % len;
            if pool.endpoints[idx].available {
                pool.cursor = (idx + 1) % len;
                return Ok(pool.endpoints[idx].url.clone());
            }
        }

        // available_count > 0 guarantees a hit above
        Err(PoolError::Empty {
            network,
            total: len,
        })
    }

    /// Count a transport failure against `url`. Returns true when this call
    /// demoted the endpoint. Failures against a demoted endpoint are ignored.
    pub fn report_failure(&self, network: Network, url: &str) -> bool {
        let Ok(pool) = self.network(network) else {
            return false;
        };
        let mut pool = pool.lock();
        let Some(idx) = pool.position(url) else {
            debug!(network = %network, url = %url, "Failure reported for unknown endpoint");
            return false;
        };

        if !pool.endpoints[idx].available {
            return false;
        }

        let threshold = self.failure_threshold;
        let endpoint = &mut pool.endpoints[idx];
        endpoint.consecutive_failures += 1;
        endpoint.total_failures += 1;

        if endpoint.consecutive_failures < threshold {
            debug!(
                network = %network,
                url = %url,
                failures = endpoint.consecutive_failures,
                threshold,
                "Endpoint failure recorded"
            );
            return false;
        }

        endpoint.available = false;
        endpoint.demotions += 1;
        pool.available_count -= 1;

        let m = metrics();
        m.endpoint_demotions.with_label_values(&[network.as_str()]).inc();
        m.available_endpoints
            .with_label_values(&[network.as_str()])
            .set(pool.available_count as i64);

        warn!(
            network = %network,
            url = %url,
            available = pool.available_count,
            total = pool.endpoints.len(),
            "Endpoint demoted after consecutive failures"
        );
        true
    }

    /// Reset the consecutive failure counter of `url`
    pub fn report_success(&self, network: Network, url: &str) {
        if let Ok(pool) = self.network(network) {
            let mut pool = pool.lock();
            if let Some(idx) = pool.position(url) {
                pool.endpoints[idx].consecutive_failures = 0;
            }
        }
    }

    /// Mark every endpoint of the network available again. Returns how many
    /// were restored.
    pub fn restore_all(&self, network: Network) -> usize {
        let Ok(pool) = self.network(network) else {
            return 0;
        };
        let mut pool = pool.lock();
        let restored = pool.restore();
        self.record_restore(network, restored, pool.available_count);
        restored
    }

    fn record_restore(&self, network: Network, restored: usize, available: usize) {
        let m = metrics();
        m.available_endpoints
            .with_label_values(&[network.as_str()])
            .set(available as i64);
        if restored > 0 {
            m.endpoint_restorations
                .with_label_values(&[network.as_str()])
                .inc_by(restored as u64);
            info!(network = %network, restored, "Restored demoted endpoints");
        }
    }

    pub fn available_count(&self, network: Network) -> usize {
        self.network(network)
            .map(|p| p.lock().available_count)
            .unwrap_or(0)
    }

    pub fn total_count(&self, network: Network) -> usize {
        self.network(network)
            .map(|p| p.lock().endpoints.len())
            .unwrap_or(0)
    }

    pub fn is_available(&self, network: Network, url: &str) -> bool {
        self.network(network)
            .ok()
            .and_then(|p| {
                let pool = p.lock();
                pool.position(url).map(|idx| pool.endpoints[idx].available)
            })
            .unwrap_or(false)
    }

    /// Start the periodic restore task for `RestorePolicy::Interval`
    pub fn start_restore_task(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Starting endpoint restore task");
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                for network in Network::ALL {
                    if self.networks.contains_key(&network) {
                        self.restore_all(network);
                    }
                }
            }
        })
    }

    /// Start periodic pool statistics logging
    pub fn start_stats_logger(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                for stats in self.stats() {
                    info!(
                        network = %stats.network,
                        total = stats.total_endpoints,
                        available = stats.available_endpoints,
                        "Endpoint pool statistics"
                    );
                    for ep in &stats.endpoints {
                        debug!(
                            url = %ep.url,
                            available = ep.available,
                            consecutive_failures = ep.consecutive_failures,
                            total_failures = ep.total_failures,
                            demotions = ep.demotions,
                            "Endpoint stats"
                        );
                    }
                }
            }
        })
    }

    /// Snapshot of every configured network
    pub fn stats(&self) -> Vec<PoolStats> {
        let mut networks: Vec<Network> = self.networks.keys().copied().collect();
        networks.sort();
        networks
            .into_iter()
            .filter_map(|n| self.network_stats(n))
            .collect()
    }

    pub fn network_stats(&self, network: Network) -> Option<PoolStats> {
        let pool = self.networks.get(&network)?.lock();
        Some(PoolStats {
            network,
            total_endpoints: pool.endpoints.len(),
            available_endpoints: pool.available_count,
            endpoints: pool
                .endpoints
                .iter()
                .map(|e| EndpointStats {
                    url: e.url.clone(),
                    available: e.available,
                    consecutive_failures: e.consecutive_failures,
                    total_failures: e.total_failures,
                    demotions: e.demotions,
                })
                .collect(),
        })
    }
}

/// Pool statistics
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub network: Network,
    pub total_endpoints: usize,
    pub available_endpoints: usize,
    pub endpoints: Vec<EndpointStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointStats {
    pub url: String,
    pub available: bool,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub demotions: u64,
}

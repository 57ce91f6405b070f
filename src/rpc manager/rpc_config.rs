use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use super::rpc_errors::RetryPolicy;
use crate::config::ConfigError;
use crate::types::Network;

/// When demoted endpoints are put back into rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePolicy {
    /// A selection that finds the pool empty restores every endpoint
    OnExhaustion,
    /// A background task restores every endpoint on a fixed interval
    Interval,
}

impl Default for RestorePolicy {
    fn default() -> Self {
        RestorePolicy::OnExhaustion
    }
}

/// Endpoint pool and RPC client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Mainnet endpoint URLs, in preference order
    #[serde(default)]
    pub mainnet: Vec<String>,

    /// Testnet endpoint URLs, in preference order
    #[serde(default)]
    pub testnet: Vec<String>,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Upper bound on endpoints tried per call (further bounded by the available count)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Consecutive transport failures before an endpoint is demoted
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default)]
    pub restore_policy: RestorePolicy,

    /// Restore period for `RestorePolicy::Interval`
    #[serde(default = "default_restore_interval")]
    pub restore_interval_secs: u64,

    /// Pool stats log period, 0 disables
    #[serde(default = "default_stats_interval")]
    pub stats_log_interval_secs: u64,

    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_restore_interval() -> u64 {
    60
}

fn default_stats_interval() -> u64 {
    300
}

fn default_retry_base_delay() -> u64 {
    50
}

fn default_retry_max_delay() -> u64 {
    1000
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            mainnet: Vec::new(),
            testnet: Vec::new(),
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            failure_threshold: default_failure_threshold(),
            restore_policy: RestorePolicy::default(),
            restore_interval_secs: default_restore_interval(),
            stats_log_interval_secs: default_stats_interval(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
        }
    }
}

impl RpcConfig {
    /// Create a configuration with a single network's endpoint list
    pub fn from_urls(network: Network, urls: &[&str]) -> Self {
        let mut config = Self::default();
        let urls: Vec<String> = urls.iter().map(|u| u.to_string()).collect();
        match network {
            Network::Mainnet => config.mainnet = urls,
            Network::Testnet => config.testnet = urls,
        }
        config
    }

    pub fn endpoints_for(&self, network: Network) -> &[String] {
        match network {
            Network::Mainnet => &self.mainnet,
            Network::Testnet => &self.testnet,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay_ms: self.retry_base_delay_ms,
            max_delay_ms: self.retry_max_delay_ms,
            ..RetryPolicy::default()
        }
    }

    /// Validate the endpoint list of the selected network and the tunables
    pub fn validate(&self, network: Network) -> Result<(), ConfigError> {
        let endpoints = self.endpoints_for(network);
        if endpoints.is_empty() {
            return Err(ConfigError::Validation(format!(
                "at least one {} endpoint must be configured",
                network
            )));
        }

        let mut seen = HashSet::new();
        for url in endpoints {
            if !seen.insert(url) {
                return Err(ConfigError::Validation(format!("duplicate RPC URL: {}", url)));
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Validation(format!("invalid URL format: {}", url)));
            }
        }

        if self.timeout_ms == 0 {
            return Err(ConfigError::Validation("rpc.timeout_ms must be > 0".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Validation("rpc.max_attempts must be > 0".to_string()));
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::Validation(
                "rpc.failure_threshold must be > 0".to_string(),
            ));
        }
        if self.restore_policy == RestorePolicy::Interval && self.restore_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "rpc.restore_interval_secs must be > 0 with the interval restore policy"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

use std::time::Duration;
use thiserror::Error;

use crate::types::Network;

/// Endpoint pool errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Every endpoint of the network is currently demoted
    #[error("endpoint pool exhausted for {network}: 0 of {total} endpoints available")]
    Empty { network: Network, total: usize },

    /// No endpoint list was configured for the network
    #[error("no endpoints configured for {0}")]
    UnknownNetwork(Network),
}

/// RPC client errors
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// Endpoint unreachable or connection reset
    #[error("transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// No response within the per-call timeout
    #[error("timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// Body that is not a JSON-RPC response
    #[error("malformed response from {endpoint}: {message}")]
    MalformedResponse { endpoint: String, message: String },

    /// No endpoint left to try
    #[error("endpoint pool exhausted for {network} after {attempts} attempt(s){}", last_error_suffix(.last_error))]
    PoolExhausted {
        network: Network,
        attempts: u32,
        last_error: Option<String>,
    },

    /// Every attempt failed on transport while endpoints remain available
    #[error("all {attempts} attempt(s) failed for {network}{}", last_error_suffix(.last_error))]
    RetriesExhausted {
        network: Network,
        attempts: u32,
        last_error: Option<String>,
    },

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),
}

fn last_error_suffix(last: &Option<String>) -> String {
    match last {
        Some(e) => format!(" (last error: {})", e),
        None => String::new(),
    }
}

impl RpcError {
    /// Transport-level failures count toward endpoint demotion
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RpcError::Transport { .. } | RpcError::Timeout { .. } | RpcError::MalformedResponse { .. }
        )
    }

    /// True when the caller may wait for a restore cycle and try again
    pub fn is_pool_exhausted(&self) -> bool {
        matches!(
            self,
            RpcError::PoolExhausted { .. } | RpcError::Pool(PoolError::Empty { .. })
        )
    }

    /// Classify a reqwest failure against the endpoint that produced it
    pub fn from_reqwest(err: reqwest::Error, endpoint: &str, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            RpcError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms,
            }
        } else if err.is_decode() || err.is_body() {
            RpcError::MalformedResponse {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        } else {
            RpcError::Transport {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Backoff between failover attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Base delay in milliseconds
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,

    /// Jitter factor (0.0 - 1.0)
    pub jitter_factor: f64,

    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 50,
            max_delay_ms: 1000,
            jitter_factor: 0.1,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// No delay between attempts
    pub fn immediate() -> Self {
        Self {
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_factor: 0.0,
            multiplier: 1.0,
        }
    }

    /// Delay before the retry following `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay_ms = self.base_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        let delay_ms = delay_ms.min(self.max_delay_ms as f64);

        let jitter = (rand::random::<f64>() - 0.5) * 2.0 * self.jitter_factor;
        let jittered = (delay_ms * (1.0 + jitter)).clamp(0.0, self.max_delay_ms as f64) as u64;

        Duration::from_millis(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(RpcError::Transport {
            endpoint: "http://a".to_string(),
            message: "connection refused".to_string(),
        }
        .is_transport());

        assert!(RpcError::Timeout {
            endpoint: "http://a".to_string(),
            timeout_ms: 5000,
        }
        .is_transport());

        assert!(RpcError::MalformedResponse {
            endpoint: "http://a".to_string(),
            message: "eof".to_string(),
        }
        .is_transport());

        let exhausted = RpcError::PoolExhausted {
            network: Network::Testnet,
            attempts: 2,
            last_error: None,
        };
        assert!(!exhausted.is_transport());
        assert!(exhausted.is_pool_exhausted());

        let retries = RpcError::RetriesExhausted {
            network: Network::Testnet,
            attempts: 2,
            last_error: None,
        };
        assert!(!retries.is_transport());
        assert!(!retries.is_pool_exhausted());
        assert!(!RpcError::ClientSetup("tls".to_string()).is_transport());
    }

    #[test]
    fn test_pool_exhausted_message() {
        let err = RpcError::PoolExhausted {
            network: Network::Mainnet,
            attempts: 3,
            last_error: Some("timeout after 10ms (endpoint: http://a)".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("pool exhausted"));
        assert!(msg.contains("mainnet"));
        assert!(msg.contains("last error"));

        let empty: RpcError = PoolError::Empty {
            network: Network::Testnet,
            total: 2,
        }
        .into();
        assert!(empty.to_string().contains("pool exhausted"));
        assert!(empty.is_pool_exhausted());
    }

    #[test]
    fn test_retries_exhausted_message() {
        let err = RpcError::RetriesExhausted {
            network: Network::Mainnet,
            attempts: 3,
            last_error: Some("connection refused".to_string()),
        };
        let msg = err.to_string();
        assert!(!msg.contains("pool exhausted"));
        assert_eq!(msg, "all 3 attempt(s) failed for mainnet (last error: connection refused)");
    }

    #[test]
    fn test_retry_policy_delay() {
        let policy = RetryPolicy {
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(50));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        // Capped
        assert_eq!(policy.delay_for(10), Duration::from_millis(1000));

        assert_eq!(RetryPolicy::immediate().delay_for(3), Duration::ZERO);
    }
}

//! Configuration module for the gateway
//!
//! Configuration is loaded from a TOML file (every field has a default),
//! after `.env` has been applied to the process environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::rpc_manager::RpcConfig;
use crate::types::Network;

/// Configuration-related errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("validation error: {0}")]
    Validation(String),

    /// Neither environment nor arguments carried key material
    #[error("missing key material: {0}")]
    MissingCredentials(String),
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Endpoint lists and failover tunables
    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub signer: SignerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// HTTP listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Serve Lambda runtime invocations instead of HTTP
    #[serde(default)]
    pub serverless: bool,

    /// Target network
    #[serde(default = "default_network")]
    pub network: Network,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    #[serde(default = "default_mainnet_chain_id")]
    pub mainnet_chain_id: u64,

    #[serde(default = "default_testnet_chain_id")]
    pub testnet_chain_id: u64,

    /// Gas limit for locally signed transactions that carry none
    #[serde(default = "default_gas_limit")]
    pub default_gas_limit: u64,
}

// Default value functions
fn default_listen() -> String { "0.0.0.0:8545".to_string() }
fn default_network() -> Network { Network::Testnet }
fn default_mainnet_chain_id() -> u64 { 1 }
fn default_testnet_chain_id() -> u64 { 11155111 }
fn default_gas_limit() -> u64 { 3_000_000 }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            serverless: false,
            network: default_network(),
        }
    }
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            mainnet_chain_id: default_mainnet_chain_id(),
            testnet_chain_id: default_testnet_chain_id(),
            default_gas_limit: default_gas_limit(),
        }
    }
}

impl SignerConfig {
    pub fn chain_id(&self, network: Network) -> u64 {
        match network {
            Network::Mainnet => self.mainnet_chain_id,
            Network::Testnet => self.testnet_chain_id,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load `.env`, then the TOML file if one was given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Validate the configuration for the selected network
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rpc.validate(self.gateway.network)?;

        if !self.gateway.serverless && self.gateway.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "invalid listen address: {}",
                self.gateway.listen
            )));
        }
        if self.signer.chain_id(self.gateway.network) == 0 {
            return Err(ConfigError::Validation("chain id must be > 0".to_string()));
        }
        if self.signer.default_gas_limit == 0 {
            return Err(ConfigError::Validation(
                "signer.default_gas_limit must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn chain_id(&self) -> u64 {
        self.signer.chain_id(self.gateway.network)
    }
}

pub const KEY_PATH_ENV: &str = "KEY_PATH";
pub const KEY_PASSPHRASE_ENV: &str = "KEY_PASSPHRASE";
pub const IS_AWS_LAMBDA_ENV: &str = "IS_AWS_LAMBDA";
pub const LAMBDA_RUNTIME_API_ENV: &str = "AWS_LAMBDA_RUNTIME_API";

/// Keystore location and passphrase as supplied at startup.
/// A `None` passphrase has to be prompted for.
pub struct CredentialSource {
    pub path: PathBuf,
    pub passphrase: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSource")
            .field("path", &self.path)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl CredentialSource {
    /// Environment variables win over positional arguments. A path taken
    /// from the environment never prompts; an empty passphrase is used as is.
    pub fn resolve(
        env_path: Option<String>,
        env_passphrase: Option<String>,
        arg_path: Option<PathBuf>,
        arg_passphrase: Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(path) = env_path.filter(|p| !p.is_empty()) {
            return Ok(Self {
                path: PathBuf::from(path),
                passphrase: Some(Zeroizing::new(env_passphrase.unwrap_or_default())),
            });
        }

        match arg_path {
            Some(path) => Ok(Self {
                path,
                passphrase: arg_passphrase.map(Zeroizing::new),
            }),
            None => Err(ConfigError::MissingCredentials(format!(
                "set {} and {} or pass [KEY_PATH] [PASSPHRASE]",
                KEY_PATH_ENV, KEY_PASSPHRASE_ENV
            ))),
        }
    }

    /// Resolve from the process environment, clearing the key variables
    /// once read
    pub fn from_env_or_args(
        arg_path: Option<PathBuf>,
        arg_passphrase: Option<String>,
    ) -> Result<Self, ConfigError> {
        let env_path = std::env::var(KEY_PATH_ENV).ok();
        let env_passphrase = std::env::var(KEY_PASSPHRASE_ENV).ok();
        std::env::remove_var(KEY_PATH_ENV);
        std::env::remove_var(KEY_PASSPHRASE_ENV);
        Self::resolve(env_path, env_passphrase, arg_path, arg_passphrase)
    }
}

/// Serverless transport requested by flag or by the Lambda environment
pub fn serverless_requested(flag: bool) -> bool {
    flag || std::env::var_os(LAMBDA_RUNTIME_API_ENV).is_some()
        || std::env::var(IS_AWS_LAMBDA_ENV)
            .map(|v| !v.is_empty())
            .unwrap_or(false)
}

//! eth-gateway - JSON-RPC gateway
//!
//! Entry point: resolves key material, builds the endpoint pool, RPC client
//! and signing coordinator, then serves either HTTP or Lambda invocations.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::oneshot;
use tracing::{info, warn};
use zeroize::Zeroizing;

use eth_gateway::config::{serverless_requested, Config, CredentialSource};
use eth_gateway::gateway::{http, lambda::LambdaRuntime, Gateway};
use eth_gateway::nonce_manager::{KeyCredentials, NonceSource, SigningCoordinator};
use eth_gateway::observability::init_logging;
use eth_gateway::rpc_manager::{EndpointPool, RestorePolicy, RpcClient};
use eth_gateway::types::Network;

const KEY_HELP: &str = "\
Key material (one of):
  1. KEY_PATH and KEY_PASSPHRASE environment variables (cleared after reading)
  2. eth-gateway [OPTIONS] <KEY_PATH> <PASSPHRASE>
  3. eth-gateway [OPTIONS] <KEY_PATH>   (passphrase is read from stdin)";

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, after_help = KEY_HELP)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target network, overrides the configuration
    #[arg(short, long, value_enum)]
    network: Option<Network>,

    /// Serve Lambda runtime invocations instead of HTTP
    #[arg(long)]
    serverless: bool,

    /// HTTP listen address, overrides the configuration
    #[arg(short, long)]
    listen: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Encrypted keystore file
    key_path: Option<PathBuf>,

    /// Keystore passphrase
    passphrase: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = Args::parse();

    // Read and clear key variables before anything else runs
    let credentials = match CredentialSource::from_env_or_args(args.key_path.take(), args.passphrase.take()) {
        Ok(credentials) => credentials,
        Err(e) => {
            eprintln!("error: {}\n", e);
            Args::command().print_help()?;
            std::process::exit(2);
        }
    };

    init_logging(args.verbose, args.json_logs)?;

    info!("🚀 Starting eth-gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    run(config, credentials).await
}

fn load_config(args: &Args) -> Result<Config> {
    if let Some(path) = &args.config {
        info!("📋 Loading configuration from: {}", path.display());
    }
    let mut config = Config::load(args.config.as_deref()).context("failed to load configuration")?;

    if let Some(network) = args.network {
        config.gateway.network = network;
    }
    if let Some(listen) = &args.listen {
        config.gateway.listen = listen.clone();
    }
    config.gateway.serverless = serverless_requested(args.serverless || config.gateway.serverless);

    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn run(config: Config, credentials: CredentialSource) -> Result<()> {
    let network = config.gateway.network;
    info!("🌐 Network: {} (chain id {})", network, config.chain_id());

    let pool = Arc::new(EndpointPool::new(&config.rpc));
    info!(
        "🔗 Endpoint pool: {} endpoint(s), failure threshold {}",
        pool.total_count(network),
        pool.failure_threshold()
    );

    if config.rpc.restore_policy == RestorePolicy::Interval {
        Arc::clone(&pool).start_restore_task(Duration::from_secs(config.rpc.restore_interval_secs));
    }
    if config.rpc.stats_log_interval_secs > 0 {
        Arc::clone(&pool).start_stats_logger(Duration::from_secs(config.rpc.stats_log_interval_secs));
    }

    let client = Arc::new(RpcClient::new(Arc::clone(&pool), network, &config.rpc)?);

    // Coordinator exists before the key is decrypted
    let (key_tx, key_rx) = oneshot::channel();
    let coordinator = SigningCoordinator::new(
        key_rx,
        config.chain_id(),
        Some(Arc::clone(&client) as Arc<dyn NonceSource>),
    );

    let passphrase = match credentials.passphrase {
        Some(passphrase) => passphrase,
        None => prompt_passphrase().await?,
    };
    key_tx
        .send(KeyCredentials::new(credentials.path, passphrase.as_str()))
        .map_err(|_| anyhow::anyhow!("signing coordinator stopped before receiving credentials"))?;

    let address = coordinator.address().await.context("failed to load signing key")?;
    info!("🔑 Signer address: {}", address);

    let gateway = Arc::new(Gateway::new(client, coordinator, config.signer.default_gas_limit));

    if config.gateway.serverless {
        info!("☁️ Serverless mode");
        LambdaRuntime::from_env()?.run(gateway, shutdown_signal()).await?;
    } else {
        let addr: SocketAddr = config
            .gateway
            .listen
            .parse()
            .with_context(|| format!("invalid listen address {}", config.gateway.listen))?;
        http::serve(gateway, addr, shutdown_signal()).await?;
    }

    info!("👋 Shutting down gracefully...");
    Ok(())
}

async fn prompt_passphrase() -> Result<Zeroizing<String>> {
    eprint!("Keystore passphrase: ");
    let mut line = Zeroizing::new(String::new());
    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
    stdin
        .read_line(&mut line)
        .await
        .context("failed to read passphrase from stdin")?;

    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        warn!("Empty keystore passphrase");
    }
    Ok(Zeroizing::new(trimmed.to_string()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("🛑 Received shutdown signal");
}

//! wsrelay - WebSocket to TCP tunnel gateway

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsrelay::{config::ConfigManager, GatewayServer, ShutdownCoordinator};

/// CLI arguments for wsrelay
#[derive(Parser, Debug)]
#[command(name = "wsrelay")]
#[command(about = "WebSocket to TCP tunnel gateway")]
#[command(version)]
#[command(long_about = "
WebSocket to TCP tunnel gateway.

Clients connect to ws://<addr>/ws?host=<backend host>&port=<backend port>.
Every WebSocket message is written to the backend as raw bytes; every
backend read is returned as one WebSocket message.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  WSRELAY_LISTEN_ADDR      - Listen address (e.g., 0.0.0.0:8080)
  WSRELAY_MODULE_ID        - Module id of this instance
  WSRELAY_MAX_SESSIONS     - Maximum concurrent sessions
  WSRELAY_CONNECT_TIMEOUT  - Backend connect timeout (e.g., 10s)
  WSRELAY_QUEUE_CAPACITY   - Per-direction relay queue capacity
  WSRELAY_LOG_LEVEL        - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", help = "Path to configuration file")]
    pub config: PathBuf,

    /// Listen address (overrides config file)
    #[arg(short, long, help = "Listen address (e.g., 0.0.0.0:8080)")]
    pub addr: Option<String>,

    /// Module id (overrides config file)
    #[arg(short, long, help = "Module id of this gateway instance")]
    pub module_id: Option<i64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level (defaults to the configured level)")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Load configuration with priority: CLI args > config file > environment > defaults
    let mut config = ConfigManager::load(&args.config)?;

    init_tracing(&args, &config.monitoring.log_level)?;

    config.merge_with_cli_args(args.addr.as_deref(), args.module_id)?;
    config
        .validate()
        .context("Final configuration validation failed")?;

    if args.validate_config {
        info!("Configuration is valid");
        info!("  Listen address: {}", config.server.listen_addr);
        info!("  Module id: {}", config.server.module_id);
        info!("  Tunnel path: {}", config.gateway.path);
        info!("  Max sessions: {}", config.gateway.max_sessions);
        info!("  Connect timeout: {:?}", config.gateway.connect_timeout);
        info!("  Queue capacity: {}", config.relay.queue_capacity);
        info!("  Read buffer size: {} bytes", config.relay.read_buffer_size);
        return Ok(());
    }

    info!(
        "start with addr: {} module_id: {}",
        config.server.listen_addr, config.server.module_id
    );

    let shutdown = Arc::new(ShutdownCoordinator::new(config.server.shutdown_timeout));
    let server = GatewayServer::new(config, Arc::clone(&shutdown))?;
    let listener = server.bind().await?;

    let signals = {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if let Err(e) = shutdown.listen_for_signals().await {
                error!("Error setting up signal handlers: {}", e);
                shutdown.trigger();
            }
        })
    };

    let result = tokio::spawn(server.serve(listener)).await;
    signals.abort();

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Gateway error: {:#}", e),
        Err(e) => error!("Gateway task failed: {}", e),
    }

    info!("Gateway shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs, configured_level: &str) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        args.log_level.as_deref().unwrap_or(configured_level)
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}

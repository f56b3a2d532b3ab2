//! resource-guard gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ upstream registry ──▶ guarded client ──▶ Upstream
//!                        │                                   breaker
//!                        │                                   deadline
//!                        │                                   retry
//!                        ▼
//!                  /health, /health/{name}
//!
//!     Cross-cutting: config (+ watcher, SIGHUP), observability, lifecycle, admin
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use resource_guard::config::{load_config, ConfigWatcher, GuardConfig};
use resource_guard::lifecycle::signals::{handle_signals, ReloadTarget};
use resource_guard::lifecycle::Shutdown;
use resource_guard::observability::{logging, metrics};
use resource_guard::HttpServer;

#[derive(Parser)]
#[command(name = "resource-guard", version)]
#[command(about = "Circuit-breaker gateway for external dependencies", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long, env = "GUARD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "resource-guard starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstreams = config.upstreams.len(),
        retries = config.retries.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher must stay alive for as long as the server runs.
    let (config_updates, _watcher, reload) = match &args.config {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            let reload = ReloadTarget {
                path: path.clone(),
                updates: watcher.sender(),
            };
            let handle = match watcher.run() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, reload with SIGHUP");
                    None
                }
            };
            (rx, handle, Some(reload))
        }
        None => {
            let (_, rx) = mpsc::unbounded_channel();
            (rx, None, None)
        }
    };

    let shutdown = Shutdown::new();
    let signals = tokio::spawn(handle_signals(shutdown.clone(), reload));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config);
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    signals.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}

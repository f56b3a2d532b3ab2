//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//! - Trigger appropriate actions (shutdown, reload)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers config reload, not shutdown
//! - A reload that fails to load or validate keeps the running config

use std::io;
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::config::{load_config, GuardConfig};
use crate::lifecycle::Shutdown;

/// Config file re-read on SIGHUP and the channel the result is sent on.
#[derive(Debug, Clone)]
pub struct ReloadTarget {
    pub path: PathBuf,
    pub updates: mpsc::UnboundedSender<GuardConfig>,
}

impl ReloadTarget {
    /// Load the file and hand it to the server. Returns whether it was sent.
    pub fn reload(&self) -> bool {
        match load_config(&self.path) {
            Ok(config) => {
                if self.updates.send(config).is_err() {
                    tracing::warn!("Server no longer accepts config updates");
                    return false;
                }
                tracing::info!(path = ?self.path, "Configuration reloaded");
                true
            }
            Err(e) => {
                tracing::error!(path = ?self.path, error = %e, "Config reload rejected, keeping current configuration");
                false
            }
        }
    }
}

/// Wait for a terminating signal, then trigger `shutdown`.
///
/// SIGHUP reloads `reload` (when given) without stopping.
#[cfg(unix)]
pub async fn handle_signals(shutdown: Shutdown, reload: Option<ReloadTarget>) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                tracing::info!("Received SIGINT");
                break;
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM");
                break;
            }
            _ = hangup.recv() => {
                match &reload {
                    Some(target) => {
                        target.reload();
                    }
                    None => tracing::info!("Received SIGHUP without a config file, ignoring"),
                }
            }
        }
    }

    shutdown.trigger();
    Ok(())
}

#[cfg(not(unix))]
pub async fn handle_signals(shutdown: Shutdown, _reload: Option<ReloadTarget>) -> io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl+C");
    shutdown.trigger();
    Ok(())
}

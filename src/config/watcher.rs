//! Configuration file watcher for hot reload.
//!
//! The parent directory is watched rather than the file itself, so editors
//! that save by writing a new file and renaming it over the old one are still
//! seen. Events for sibling files are ignored, and a save that leaves the
//! file's bytes unchanged does not produce an update.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::parse_config;
use crate::config::schema::GuardConfig;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<GuardConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GuardConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Another handle for pushing configs to the same receiver.
    pub fn sender(&self) -> mpsc::UnboundedSender<GuardConfig> {
        self.update_tx.clone()
    }

    /// Start watching the file. Keep the returned watcher alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = watch_dir(&self.path);
        let mut reloader = Reloader::new(self.path.clone(), self.update_tx);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => reloader.on_event(&event),
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, dir = ?dir, "Config watcher started");
        Ok(watcher)
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Whether `event` touches the watched file and may have changed its contents.
fn is_relevant(event: &Event, path: &Path) -> bool {
    if !(event.kind.is_modify() || event.kind.is_create()) {
        return false;
    }
    let name = path.file_name();
    event.paths.iter().any(|p| p.file_name() == name)
}

/// Turns file events into config updates.
struct Reloader {
    path: PathBuf,
    tx: mpsc::UnboundedSender<GuardConfig>,
    // Contents as of the last read, so saves without edits are dropped.
    last_seen: Option<String>,
}

impl Reloader {
    fn new(path: PathBuf, tx: mpsc::UnboundedSender<GuardConfig>) -> Self {
        let last_seen = std::fs::read_to_string(&path).ok();
        Self { path, tx, last_seen }
    }

    fn on_event(&mut self, event: &Event) {
        if !is_relevant(event, &self.path) {
            return;
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                // Mid-rename the file can be briefly missing; the next event retries.
                tracing::debug!(path = ?self.path, error = %e, "Config file not readable yet");
                return;
            }
        };
        if self.last_seen.as_deref() == Some(content.as_str()) {
            tracing::debug!(path = ?self.path, "Config file unchanged, skipping reload");
            return;
        }

        tracing::info!(path = ?self.path, "Config file change detected, reloading");
        let parsed = parse_config(&content);
        self.last_seen = Some(content);
        match parsed {
            Ok(config) => {
                let _ = self.tx.send(config);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
            }
        }
    }
}

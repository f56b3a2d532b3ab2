//! Upstream registry.
//!
//! # Responsibilities
//! - Build one guarded client per configured upstream
//! - Look upstreams up by name for forwarding and health reporting
//! - Reconcile against a reloaded configuration

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

use crate::config::{BreakerDefaults, GuardConfig, UpstreamConfig};
use crate::health::HealthReport;
use crate::resilience::{Clock, ResourceClient, SystemClock};
use crate::upstream::target::{GuardedUpstream, UpstreamTarget};

/// What a reconcile pass changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

/// All guarded upstreams, keyed by name.
#[derive(Debug)]
pub struct UpstreamRegistry {
    upstreams: DashMap<String, Arc<GuardedUpstream>>,
    clock: Arc<dyn Clock>,
}

impl UpstreamRegistry {
    /// Create a registry from configuration.
    pub fn new(config: &GuardConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a registry whose breakers use `clock`.
    pub fn with_clock(config: &GuardConfig, clock: Arc<dyn Clock>) -> Self {
        let registry = Self {
            upstreams: DashMap::new(),
            clock,
        };
        for upstream in &config.upstreams {
            if let Some(guarded) = registry.build(upstream, &config.defaults) {
                registry.upstreams.insert(upstream.name.clone(), guarded);
            }
        }
        registry
    }

    fn build(&self, config: &UpstreamConfig, defaults: &BreakerDefaults) -> Option<Arc<GuardedUpstream>> {
        let target = Self::target_for(config, defaults)?;
        let client = ResourceClient::with_clock(
            config.name.clone(),
            config.breaker_settings(defaults),
            target.timeout,
            self.clock.clone(),
        );
        tracing::debug!(upstream = %config.name, url = %target.base_url, "Registered upstream");
        Some(Arc::new(GuardedUpstream::new(client, target)))
    }

    fn target_for(config: &UpstreamConfig, defaults: &BreakerDefaults) -> Option<UpstreamTarget> {
        match Url::parse(&config.url) {
            Ok(url) => Some(UpstreamTarget::new(url, config.timeout(defaults))),
            Err(e) => {
                tracing::warn!(upstream = %config.name, url = %config.url, error = %e, "Invalid upstream url");
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<GuardedUpstream>> {
        self.upstreams.get(name).map(|entry| entry.value().clone())
    }

    /// All upstreams, sorted by name.
    pub fn all(&self) -> Vec<Arc<GuardedUpstream>> {
        let mut all: Vec<_> = self.upstreams.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Health report for every upstream, sorted by name.
    pub fn reports(&self) -> Vec<HealthReport> {
        self.all().iter().map(|u| u.report()).collect()
    }

    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }

    /// Apply a reloaded configuration.
    ///
    /// Upstreams that keep their name keep their breaker and its state; only
    /// their target is swapped. New names get a fresh breaker, missing names are
    /// dropped.
    pub fn reconcile(&self, config: &GuardConfig) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        let wanted: HashSet<&str> = config.upstreams.iter().map(|u| u.name.as_str()).collect();

        for upstream in &config.upstreams {
            if let Some(existing) = self.get(&upstream.name) {
                let Some(target) = Self::target_for(upstream, &config.defaults) else {
                    continue;
                };
                if existing.client().breaker().settings() != &upstream.breaker_settings(&config.defaults) {
                    tracing::warn!(
                        upstream = %upstream.name,
                        "Breaker thresholds changed; existing breaker keeps its original settings until restart"
                    );
                }
                if *existing.target() != target {
                    existing.set_target(target);
                    summary.updated.push(upstream.name.clone());
                }
            } else if let Some(guarded) = self.build(upstream, &config.defaults) {
                self.upstreams.insert(upstream.name.clone(), guarded);
                summary.added.push(upstream.name.clone());
            }
        }

        self.upstreams.retain(|name, _| {
            let keep = wanted.contains(name.as_str());
            if !keep {
                summary.removed.push(name.clone());
            }
            keep
        });

        summary.added.sort();
        summary.updated.sort();
        summary.removed.sort();
        tracing::info!(
            added = ?summary.added,
            updated = ?summary.updated,
            removed = ?summary.removed,
            "Upstream registry reconciled"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{CircuitState, ManualClock};
    use std::time::Duration;

    fn config(upstreams: Vec<UpstreamConfig>) -> GuardConfig {
        GuardConfig {
            upstreams,
            ..GuardConfig::default()
        }
    }

    #[test]
    fn test_builds_from_config() {
        let registry = UpstreamRegistry::new(&config(vec![
            UpstreamConfig::new("quotes", "http://127.0.0.1:9000"),
            UpstreamConfig::new("portfolio-api", "http://127.0.0.1:9001"),
            UpstreamConfig::new("broken", "not a url"),
        ]));
        assert_eq!(registry.len(), 2);
        let names: Vec<_> = registry.reports().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["portfolio-api", "quotes"]);
        assert!(registry.get("broken").is_none());
    }

    #[test]
    fn test_breakers_are_independent() {
        let mut quotes = UpstreamConfig::new("quotes", "http://127.0.0.1:9000");
        quotes.failure_threshold = Some(1);
        let registry = UpstreamRegistry::new(&config(vec![
            quotes,
            UpstreamConfig::new("portfolio-api", "http://127.0.0.1:9001"),
        ]));

        registry.get("quotes").unwrap().client().breaker().record_failure();
        assert_eq!(registry.get("quotes").unwrap().client().state(), CircuitState::Open);
        assert_eq!(
            registry.get("portfolio-api").unwrap().client().state(),
            CircuitState::Closed
        );
    }

    #[test]
    fn test_reconcile_preserves_breaker_state() {
        let clock = Arc::new(ManualClock::new());
        let mut quotes = UpstreamConfig::new("quotes", "http://127.0.0.1:9000");
        quotes.failure_threshold = Some(1);
        let registry = UpstreamRegistry::with_clock(
            &config(vec![
                quotes.clone(),
                UpstreamConfig::new("legacy", "http://127.0.0.1:9100"),
            ]),
            clock,
        );
        let before = registry.get("quotes").unwrap();
        before.client().breaker().record_failure();

        let mut moved = quotes;
        moved.url = "http://127.0.0.1:9500".into();
        moved.timeout_ms = Some(750);
        let summary = registry.reconcile(&config(vec![
            moved,
            UpstreamConfig::new("news", "http://127.0.0.1:9200"),
        ]));

        assert_eq!(summary.added, vec!["news"]);
        assert_eq!(summary.updated, vec!["quotes"]);
        assert_eq!(summary.removed, vec!["legacy"]);

        let after = registry.get("quotes").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.client().state(), CircuitState::Open);
        assert_eq!(after.target().base_url.port(), Some(9500));
        assert_eq!(after.target().timeout, Duration::from_millis(750));
        assert!(registry.get("legacy").is_none());
    }

    #[test]
    fn test_reconcile_unchanged_is_noop() {
        let cfg = config(vec![UpstreamConfig::new("quotes", "http://127.0.0.1:9000")]);
        let registry = UpstreamRegistry::new(&cfg);
        assert_eq!(registry.reconcile(&cfg), ReconcileSummary::default());
    }
}

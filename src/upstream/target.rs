//! Upstream abstraction.
//!
//! # Responsibilities
//! - Represent a single protected upstream and its breaker
//! - Track active requests
//! - Hold the swappable forwarding target (URL + deadline)

use arc_swap::ArcSwap;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::health::HealthReport;
use crate::resilience::ResourceClient;

/// Where and how long to forward. Replaced wholesale on reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    pub base_url: Url,
    pub timeout: Duration,
}

impl UpstreamTarget {
    pub fn new(base_url: Url, timeout: Duration) -> Self {
        Self { base_url, timeout }
    }

    /// Full URL for `path` (relative to the base URL's path) and optional query.
    pub fn forward_url(&self, path: &str, query: Option<&str>) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let mut url = format!("{}/{}", base, path);
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(q);
        }
        url
    }
}

/// A single protected upstream.
#[derive(Debug)]
pub struct GuardedUpstream {
    client: ResourceClient,
    target: ArcSwap<UpstreamTarget>,
    active_requests: AtomicUsize,
}

impl GuardedUpstream {
    pub fn new(client: ResourceClient, target: UpstreamTarget) -> Self {
        Self {
            client,
            target: ArcSwap::from_pointee(target),
            active_requests: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        self.client.name()
    }

    pub fn client(&self) -> &ResourceClient {
        &self.client
    }

    /// Current forwarding target.
    pub fn target(&self) -> Arc<UpstreamTarget> {
        self.target.load_full()
    }

    /// Swap in a new target. In-flight requests keep the one they loaded.
    pub fn set_target(&self, target: UpstreamTarget) {
        self.target.store(Arc::new(target));
    }

    /// Number of requests currently being forwarded.
    pub fn active_requests(&self) -> usize {
        self.active_requests.load(Ordering::Relaxed)
    }

    /// Count a request for as long as the guard lives.
    pub fn track(self: &Arc<Self>) -> RequestGuard {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
        RequestGuard {
            upstream: self.clone(),
        }
    }

    pub fn report(&self) -> HealthReport {
        self.client.report()
    }
}

/// A RAII guard that manages the active request count.
#[derive(Debug)]
pub struct RequestGuard {
    upstream: Arc<GuardedUpstream>,
}

impl Deref for RequestGuard {
    type Target = GuardedUpstream;
    fn deref(&self) -> &Self::Target {
        &self.upstream
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.upstream.active_requests.fetch_sub(1, Ordering::Relaxed);
    }
}

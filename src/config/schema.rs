//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::resilience::{BreakerSettings, RetryPolicy};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Listener configuration (bind address, outer request timeout).
    pub listener: ListenerConfig,

    /// Breaker and timeout settings applied to every upstream unless overridden.
    pub defaults: BreakerDefaults,

    /// Retry configuration for idempotent requests.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin endpoint settings.
    pub admin: AdminConfig,

    /// Protected upstream definitions. Each gets its own breaker.
    pub upstreams: Vec<UpstreamConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Upper bound on a whole inbound request, retries included, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// Default breaker settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerDefaults {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,

    /// Cooldown before a probe is admitted, in milliseconds.
    pub recovery_timeout_ms: u64,

    /// Concurrent probes allowed while half-open.
    pub half_open_max_calls: u32,

    /// Probe successes needed to close again.
    pub success_threshold: u32,

    /// Per-attempt deadline in milliseconds (0 disables it).
    pub timeout_ms: u64,
}

impl Default for BreakerDefaults {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            half_open_max_calls: 3,
            success_threshold: 1,
            timeout_ms: 10_000,
        }
    }
}

impl BreakerDefaults {
    pub fn breaker_settings(&self) -> BreakerSettings {
        BreakerSettings {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_millis(self.recovery_timeout_ms),
            half_open_max_calls: self.half_open_max_calls,
            success_threshold: self.success_threshold,
        }
    }
}

/// One protected upstream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Unique name, used in routes, logs and metrics.
    pub name: String,

    /// Base URL requests are forwarded to (e.g., "http://127.0.0.1:3000").
    pub url: String,

    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default)]
    pub failure_threshold: Option<u32>,

    #[serde(default)]
    pub recovery_timeout_ms: Option<u64>,

    #[serde(default)]
    pub half_open_max_calls: Option<u32>,

    #[serde(default)]
    pub success_threshold: Option<u32>,
}

impl UpstreamConfig {
    /// An upstream that inherits every default.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            timeout_ms: None,
            failure_threshold: None,
            recovery_timeout_ms: None,
            half_open_max_calls: None,
            success_threshold: None,
        }
    }

    /// Effective breaker settings after applying overrides.
    pub fn breaker_settings(&self, defaults: &BreakerDefaults) -> BreakerSettings {
        BreakerSettings {
            failure_threshold: self.failure_threshold.unwrap_or(defaults.failure_threshold),
            recovery_timeout: Duration::from_millis(
                self.recovery_timeout_ms.unwrap_or(defaults.recovery_timeout_ms),
            ),
            half_open_max_calls: self.half_open_max_calls.unwrap_or(defaults.half_open_max_calls),
            success_threshold: self.success_threshold.unwrap_or(defaults.success_threshold),
        }
    }

    /// Effective per-attempt deadline.
    pub fn timeout(&self, defaults: &BreakerDefaults) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(defaults.timeout_ms))
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Total attempts including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        if !self.enabled {
            return RetryPolicy::disabled();
        }
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin endpoint configuration.
/// Default admin key. Validation refuses it once the admin listener is enabled.
pub const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin listener.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_API_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

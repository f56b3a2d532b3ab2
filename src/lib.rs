//! Circuit-breaker-guarded access to external resources.
//!
//! The library half wraps any fallible async operation in a per-resource
//! breaker, deadline and optional retry policy ([`resilience`]) and reports
//! each resource's health ([`health`]). The gateway half fronts configured
//! HTTP upstreams with one guarded client each.

pub mod admin;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod upstream;

pub use config::schema::GuardConfig;
pub use health::{HealthReport, OverallStatus, ServiceHealth};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resilience::{
    BreakerSettings, CircuitState, GuardError, Operation, ResourceClient, RetryPolicy,
};

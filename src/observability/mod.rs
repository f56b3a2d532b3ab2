//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Breakers, clients and the HTTP layer produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout log aggregation
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Every breaker transition is both logged and counted
//! - Request ID flows through the HTTP layer
//! - Metrics are cheap (atomic increments behind the facade)

pub mod logging;
pub mod metrics;

//! Health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! Guarded call completes:
//!     → latency.rs (append duration to the recent window)
//!
//! Health request:
//!     → ResourceClient::report() (breaker snapshot + latency summary)
//!     → report.rs (per-resource report, aggregate status)
//! ```
//!
//! # Design Decisions
//! - Reports are snapshots; reading never moves the breaker
//! - Locks are held only long enough to copy counters
//! - Mapping status to HTTP codes belongs to the HTTP layer

pub mod latency;
pub mod report;

pub use latency::{LatencySummary, LatencyWindow};
pub use report::{HealthReport, OverallStatus, ServiceHealth};

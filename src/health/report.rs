//! Health report types.
//!
//! # Report Fields
//! ```text
//! state              closed | open | half_open
//! failure_count      consecutive failures seen while Closed
//! ms_until_retry     remaining cooldown while Open, else 0
//! ```
//!
//! # Aggregate Status
//! ```text
//! healthy:     every breaker Closed
//! degraded:    some breaker Half-Open, none Open
//! unavailable: at least one breaker Open
//! ```

use serde::Serialize;

use crate::health::latency::LatencySummary;
use crate::resilience::CircuitState;

/// Read-only view of one guarded resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    /// Milliseconds since the most recent recorded failure.
    pub last_failure_age_ms: Option<u64>,
    pub ms_until_retry: u64,
    pub half_open_in_flight: u32,
    pub trips: u64,
    pub latency: LatencySummary,
}

/// Roll-up across all guarded resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unavailable,
}

impl OverallStatus {
    pub fn from_reports(reports: &[HealthReport]) -> Self {
        if reports.iter().any(|r| r.state == CircuitState::Open) {
            OverallStatus::Unavailable
        } else if reports.iter().any(|r| r.state == CircuitState::HalfOpen) {
            OverallStatus::Degraded
        } else {
            OverallStatus::Healthy
        }
    }
}

/// Body served by the aggregate health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub status: OverallStatus,
    pub resources: Vec<HealthReport>,
}

impl ServiceHealth {
    pub fn new(mut resources: Vec<HealthReport>) -> Self {
        resources.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            status: OverallStatus::from_reports(&resources),
            resources,
        }
    }
}

use axum::{extract::State, Json};
use serde::Serialize;

use crate::health::{HealthReport, OverallStatus};
use crate::http::server::AppState;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: OverallStatus,
    pub upstreams: usize,
    pub active_requests: usize,
}

/// A breaker's report together with the settings it runs under.
#[derive(Serialize)]
pub struct BreakerStatus {
    #[serde(flatten)]
    pub report: HealthReport,
    pub url: String,
    pub timeout_ms: u64,
    pub active_requests: usize,
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub half_open_max_calls: u32,
    pub success_threshold: u32,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let upstreams = state.registry.all();
    let reports: Vec<HealthReport> = upstreams.iter().map(|u| u.report()).collect();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: OverallStatus::from_reports(&reports),
        upstreams: upstreams.len(),
        active_requests: upstreams.iter().map(|u| u.active_requests()).sum(),
    })
}

pub async fn get_breakers(State(state): State<AppState>) -> Json<Vec<BreakerStatus>> {
    let statuses = state
        .registry
        .all()
        .into_iter()
        .map(|upstream| {
            let target = upstream.target();
            let settings = upstream.client().breaker().settings().clone();
            BreakerStatus {
                report: upstream.report(),
                url: target.base_url.to_string(),
                timeout_ms: target.timeout.as_millis() as u64,
                active_requests: upstream.active_requests(),
                failure_threshold: settings.failure_threshold,
                recovery_timeout_ms: settings.recovery_timeout.as_millis() as u64,
                half_open_max_calls: settings.half_open_max_calls,
                success_threshold: settings.success_threshold,
            }
        })
        .collect();

    Json(statuses)
}

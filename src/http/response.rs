//! Response handling and error mapping.
//!
//! # Responsibilities
//! - Decide which upstream responses count as breaker failures
//! - Map guarded-call errors to HTTP status codes
//!
//! # Design Decisions
//! - Open breaker results in 503 with Retry-After (whole seconds, rounded up)
//! - Deadline expiry results in 504 Gateway Timeout
//! - Transport failures and upstream 502/503/504 result in 502 Bad Gateway

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::resilience::GuardError;

/// Why forwarding to an upstream failed.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid upstream uri `{uri}`: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("failed to build upstream request: {0}")]
    Build(#[from] axum::http::Error),

    #[error("upstream request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("upstream returned {0}")]
    Status(StatusCode),
}

/// Upstream statuses that mean the dependency itself is unhealthy.
pub fn is_failure_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

/// `Retry-After` seconds for a cooldown, never below one.
pub fn retry_after_secs(ms_until_retry: u64) -> u64 {
    ms_until_retry.div_ceil(1000).max(1)
}

impl IntoResponse for GuardError<ForwardError> {
    fn into_response(self) -> Response {
        match self {
            GuardError::CircuitOpen {
                resource,
                ms_until_retry,
            } => {
                let secs = retry_after_secs(ms_until_retry);
                let mut response = (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({
                        "error": "circuit_open",
                        "resource": resource,
                        "ms_until_retry": ms_until_retry,
                    })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                response
            }
            GuardError::Timeout {
                resource,
                elapsed_ms,
            } => (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({
                    "error": "timeout",
                    "resource": resource,
                    "elapsed_ms": elapsed_ms,
                })),
            )
                .into_response(),
            GuardError::Operation(e) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "upstream_error",
                    "message": e.to_string(),
                })),
            )
                .into_response(),
        }
    }
}

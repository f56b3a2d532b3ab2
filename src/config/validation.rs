//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds >= 1, delays ordered)
//! - Check upstream names are unique and URLs usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::{GuardConfig, PLACEHOLDER_API_KEY};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{scope}: {field} must be at least 1")]
    BelowMinimum { scope: String, field: &'static str },

    #[error("{field} `{value}` is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("upstream #{index} has an empty name")]
    EmptyUpstreamName { index: usize },

    #[error("upstream `{name}` is defined more than once")]
    DuplicateUpstream { name: String },

    #[error("upstream `{name}` has an invalid url: {reason}")]
    InvalidUpstreamUrl { name: String, reason: String },

    #[error("retries: max_delay_ms ({max}) is below base_delay_ms ({base})")]
    RetryDelayRange { base: u64, max: u64 },

    #[error("observability: unknown log level `{level}`")]
    UnknownLogLevel { level: String },

    #[error("admin: api_key must be set when the admin listener is enabled")]
    MissingAdminKey,

    #[error("admin: api_key is still the shipped placeholder")]
    PlaceholderAdminKey,
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a parsed configuration, collecting every problem.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_min(
        &mut errors,
        "listener",
        "request_timeout_secs",
        Some(config.listener.request_timeout_secs),
    );

    let d = &config.defaults;
    check_min(&mut errors, "defaults", "failure_threshold", Some(d.failure_threshold));
    check_min(&mut errors, "defaults", "half_open_max_calls", Some(d.half_open_max_calls));
    check_min(&mut errors, "defaults", "success_threshold", Some(d.success_threshold));

    let mut seen = HashSet::new();
    for (index, upstream) in config.upstreams.iter().enumerate() {
        if upstream.name.trim().is_empty() {
            errors.push(ValidationError::EmptyUpstreamName { index });
            continue;
        }
        if !seen.insert(upstream.name.as_str()) {
            errors.push(ValidationError::DuplicateUpstream {
                name: upstream.name.clone(),
            });
        }

        let scope = format!("upstream `{}`", upstream.name);
        check_min(&mut errors, &scope, "failure_threshold", upstream.failure_threshold);
        check_min(&mut errors, &scope, "half_open_max_calls", upstream.half_open_max_calls);
        check_min(&mut errors, &scope, "success_threshold", upstream.success_threshold);

        match Url::parse(&upstream.url) {
            Ok(url) if url.scheme() != "http" => {
                errors.push(ValidationError::InvalidUpstreamUrl {
                    name: upstream.name.clone(),
                    reason: format!("unsupported scheme `{}`", url.scheme()),
                });
            }
            Ok(url) if url.host_str().is_none() => {
                errors.push(ValidationError::InvalidUpstreamUrl {
                    name: upstream.name.clone(),
                    reason: "missing host".to_string(),
                });
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidUpstreamUrl {
                name: upstream.name.clone(),
                reason: e.to_string(),
            }),
        }
    }

    let r = &config.retries;
    if r.enabled {
        check_min(&mut errors, "retries", "max_attempts", Some(r.max_attempts));
        if r.max_delay_ms < r.base_delay_ms {
            errors.push(ValidationError::RetryDelayRange {
                base: r.base_delay_ms,
                max: r.max_delay_ms,
            });
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::UnknownLogLevel {
            level: config.observability.log_level.clone(),
        });
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.admin.enabled {
        let key = config.admin.api_key.trim();
        if key.is_empty() {
            errors.push(ValidationError::MissingAdminKey);
        } else if key == PLACEHOLDER_API_KEY {
            errors.push(ValidationError::PlaceholderAdminKey);
        }
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_min<T: Into<u64>>(
    errors: &mut Vec<ValidationError>,
    scope: &str,
    field: &'static str,
    value: Option<T>,
) {
    if value.map(Into::into) == Some(0) {
        errors.push(ValidationError::BelowMinimum {
            scope: scope.to_string(),
            field,
        });
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

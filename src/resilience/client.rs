//! Breaker-protected execution of caller-supplied operations.
//!
//! # Responsibilities
//! - Ask the breaker for admission before every attempt
//! - Race the operation against its deadline
//! - Feed the outcome back into the breaker and the latency window
//!
//! # Design Decisions
//! - A rejected call never polls the operation
//! - A dropped (cancelled) call records neither success nor failure
//! - Outcomes are recorded against the state the call was admitted under
//! - The wrapped resource is never acquired or released here

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::health::latency::LatencyWindow;
use crate::health::HealthReport;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{Admission, BreakerSettings, CircuitBreaker, CircuitState};
use crate::resilience::clock::Clock;
use crate::resilience::error::{ceil_millis, GuardError};
use crate::resilience::operation::Operation;
use crate::resilience::timeouts::with_deadline;

/// A circuit breaker plus the bookkeeping for one protected resource.
#[derive(Debug)]
pub struct ResourceClient {
    breaker: CircuitBreaker,
    latency: LatencyWindow,
    default_timeout: Duration,
}

impl ResourceClient {
    pub fn new(name: impl Into<String>, settings: BreakerSettings, default_timeout: Duration) -> Self {
        Self::from_breaker(CircuitBreaker::new(name, settings), default_timeout)
    }

    pub fn with_clock(
        name: impl Into<String>,
        settings: BreakerSettings,
        default_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::from_breaker(CircuitBreaker::with_clock(name, settings, clock), default_timeout)
    }

    fn from_breaker(breaker: CircuitBreaker, default_timeout: Duration) -> Self {
        Self {
            breaker,
            latency: LatencyWindow::default(),
            default_timeout,
        }
    }

    pub fn name(&self) -> &str {
        self.breaker.name()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run `op` under breaker protection with the given deadline.
    ///
    /// A zero `timeout` runs without a deadline.
    pub async fn execute<T, E, F>(&self, op: F, timeout: Duration) -> Result<T, GuardError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        let (ticket, permit) = match self.breaker.allow() {
            Admission::Reject(reason) => {
                let ms_until_retry = ceil_millis(reason.retry_after());
                tracing::debug!(resource = %self.name(), ms_until_retry, "Call rejected by circuit breaker");
                metrics::record_call(self.name(), "rejected", None);
                return Err(GuardError::CircuitOpen {
                    resource: self.name().to_string(),
                    ms_until_retry,
                });
            }
            Admission::Proceed(ticket) => (ticket, None),
            Admission::Probe(permit) => {
                tracing::debug!(resource = %self.name(), "Running half-open probe");
                (permit.ticket(), Some(permit))
            }
        };

        let (result, took) = with_deadline(timeout, op).await;
        self.latency.record(took);

        let outcome = match result {
            Ok(Ok(value)) => {
                self.breaker.record_success_for(ticket);
                metrics::record_call(self.name(), "success", Some(took));
                Ok(value)
            }
            Ok(Err(e)) => {
                self.breaker.record_failure_for(ticket);
                metrics::record_call(self.name(), "failure", Some(took));
                Err(GuardError::Operation(e))
            }
            Err(exceeded) => {
                self.breaker.record_failure_for(ticket);
                metrics::record_call(self.name(), "timeout", Some(took));
                let elapsed_ms = exceeded.elapsed.as_millis() as u64;
                tracing::warn!(resource = %self.name(), elapsed_ms, "Guarded call timed out");
                Err(GuardError::Timeout {
                    resource: self.name().to_string(),
                    elapsed_ms,
                })
            }
        };

        // Released only after the outcome is recorded.
        drop(permit);
        outcome
    }

    /// Run `fut` as `operation`, using the operation's deadline.
    pub async fn call<T, E, F>(&self, operation: &Operation, fut: F) -> Result<T, GuardError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        let result = self.execute(fut, operation.timeout()).await;
        if let Err(GuardError::Timeout { elapsed_ms, .. }) = &result {
            tracing::debug!(resource = %self.name(), operation = %operation.name(), elapsed_ms, "Operation deadline exceeded");
        }
        result
    }

    /// Current breaker state and recent latency. Never mutates the breaker.
    pub fn report(&self) -> HealthReport {
        let stats = self.breaker.stats();
        let now = self.breaker.clock().now();
        let age = stats.last_failure.map(|at| now.saturating_duration_since(at));

        let ms_until_retry = match (stats.state, age) {
            (CircuitState::Open, Some(age)) => {
                ceil_millis(self.breaker.settings().recovery_timeout.saturating_sub(age))
            }
            _ => 0,
        };

        HealthReport {
            name: self.name().to_string(),
            state: stats.state,
            failure_count: stats.failure_count,
            last_failure_age_ms: age.map(|d| d.as_millis() as u64),
            ms_until_retry,
            half_open_in_flight: stats.half_open_in_flight,
            trips: stats.trips,
            latency: self.latency.summary(),
        }
    }
}

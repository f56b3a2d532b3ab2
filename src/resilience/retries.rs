//! Retry logic.
//!
//! # Responsibilities
//! - Repeat failed idempotent operations with exponential backoff + jitter
//! - Stop as soon as the breaker leaves Closed
//!
//! # Design Decisions
//! - Layered over [`ResourceClient`]; the client records every attempt
//! - Never retry non-idempotent operations
//! - Never retry a call the breaker rejected

use std::future::Future;
use std::time::Duration;

use crate::observability::metrics;
use crate::resilience::backoff::{calculate_backoff, calculate_backoff_with_jitter};
use crate::resilience::circuit_breaker::CircuitState;
use crate::resilience::client::ResourceClient;
use crate::resilience::error::GuardError;
use crate::resilience::operation::Operation;

/// How many times, and how patiently, to retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(2000),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        if self.jitter {
            calculate_backoff_with_jitter(retry, base, max)
        } else {
            calculate_backoff(retry, base, max)
        }
    }

    /// Run `operation`, retrying any timeout or operation error.
    ///
    /// `make` builds a fresh future for each attempt and receives the 0-based
    /// attempt number.
    pub async fn run<T, E, F, Fut>(
        &self,
        client: &ResourceClient,
        operation: &Operation,
        make: F,
    ) -> Result<T, GuardError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_if(client, operation, make, |_| true).await
    }

    /// Like [`run`](Self::run), but only retries errors accepted by `should_retry`.
    pub async fn run_if<T, E, F, Fut, P>(
        &self,
        client: &ResourceClient,
        operation: &Operation,
        mut make: F,
        should_retry: P,
    ) -> Result<T, GuardError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&GuardError<E>) -> bool,
    {
        let max_attempts = if operation.is_idempotent() {
            self.max_attempts.max(1)
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            let err = match client.call(operation, make(attempt)).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            attempt += 1;

            if err.is_circuit_open()
                || attempt >= max_attempts
                || client.state() != CircuitState::Closed
                || !should_retry(&err)
            {
                return Err(err);
            }

            let delay = self.delay_for(attempt - 1);
            tracing::info!(
                resource = %client.name(),
                operation = %operation.name(),
                attempt,
                delay = ?delay,
                timeout = err.is_timeout(),
                "Retrying guarded call"
            );
            metrics::record_retry(client.name());
            tokio::time::sleep(delay).await;
        }
    }
}

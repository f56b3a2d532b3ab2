//! Errors surfaced by guarded calls.

use std::time::Duration;
use thiserror::Error;

/// Failure of a call made through a [`ResourceClient`](crate::resilience::ResourceClient).
///
/// `CircuitOpen` means the operation was never attempted. The other two
/// variants were counted as breaker failures before being returned.
#[derive(Debug, Error)]
pub enum GuardError<E> {
    #[error("{resource} is temporarily unavailable, retry in {ms_until_retry}ms")]
    CircuitOpen { resource: String, ms_until_retry: u64 },

    #[error("{resource} timed out after {elapsed_ms}ms")]
    Timeout { resource: String, elapsed_ms: u64 },

    #[error("{0}")]
    Operation(E),
}

impl<E> GuardError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, GuardError::CircuitOpen { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, GuardError::Timeout { .. })
    }

    /// Milliseconds until the breaker admits a probe, if it rejected the call.
    pub fn ms_until_retry(&self) -> Option<u64> {
        match self {
            GuardError::CircuitOpen { ms_until_retry, .. } => Some(*ms_until_retry),
            _ => None,
        }
    }

    /// How long to wait before retrying, if the breaker rejected the call.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GuardError::CircuitOpen { ms_until_retry, .. } => {
                Some(Duration::from_millis(*ms_until_retry))
            }
            _ => None,
        }
    }

    /// The wrapped operation's own error, if that is what failed.
    pub fn into_operation(self) -> Option<E> {
        match self {
            GuardError::Operation(e) => Some(e),
            _ => None,
        }
    }

    pub fn map_operation<F, E2>(self, f: F) -> GuardError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            GuardError::CircuitOpen {
                resource,
                ms_until_retry,
            } => GuardError::CircuitOpen {
                resource,
                ms_until_retry,
            },
            GuardError::Timeout {
                resource,
                elapsed_ms,
            } => GuardError::Timeout {
                resource,
                elapsed_ms,
            },
            GuardError::Operation(e) => GuardError::Operation(f(e)),
        }
    }
}

/// Milliseconds rounded up so a sub-millisecond cooldown is never reported as zero.
pub(crate) fn ceil_millis(d: Duration) -> u64 {
    let ms = d.as_millis() as u64;
    if d > Duration::from_millis(ms) {
        ms + 1
    } else {
        ms
    }
}

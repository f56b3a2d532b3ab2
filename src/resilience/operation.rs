//! Description of a guarded unit of work.

use std::borrow::Cow;
use std::time::Duration;

/// A named unit of work with its own deadline.
///
/// The operation's future is supplied separately at call time and stays owned
/// by the caller; this only carries the metadata the guard needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    name: Cow<'static, str>,
    timeout: Duration,
    idempotent: bool,
}

impl Operation {
    /// A non-idempotent operation with the given deadline.
    pub fn new(name: impl Into<Cow<'static, str>>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            timeout,
            idempotent: false,
        }
    }

    /// Mark the operation safe to repeat.
    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }
}

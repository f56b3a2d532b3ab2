//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Guarded call:
//!     → retries.rs (optional; idempotent operations only)
//!     → client.rs (ask circuit_breaker.rs for admission)
//!     → timeouts.rs (race the operation against its deadline)
//!     → circuit_breaker.rs (record success / failure)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retry and breaker are separate layers so each can be tested alone
//! - Breaker time comes from an injected clock
//! - One breaker per resource, living for the process lifetime

pub mod backoff;
pub mod circuit_breaker;
pub mod client;
pub mod clock;
pub mod error;
pub mod operation;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{
    Admission, BreakerSettings, BreakerStats, CircuitBreaker, CircuitState, ProbePermit,
    RejectReason, Ticket,
};
pub use client::ResourceClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::GuardError;
pub use operation::Operation;
pub use retries::RetryPolicy;

//! Upstream management subsystem.
//!
//! # Data Flow
//! ```text
//! Request for /upstream/{name}/...
//!     → registry.rs (look up guarded upstream by name)
//!     → target.rs (load current target, count the request)
//!     → resilience (breaker + timeout + retry around the forward)
//! ```
//!
//! # Design Decisions
//! - One breaker per upstream, never shared
//! - Targets are swapped atomically on reload; breakers are not
//! - Registry is shared via Arc and safe for concurrent lookups

pub mod registry;
pub mod target;

pub use registry::{ReconcileSummary, UpstreamRegistry};
pub use target::{GuardedUpstream, RequestGuard, UpstreamTarget};

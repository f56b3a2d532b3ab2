//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → upstream registry reconciles (breakers of surviving upstreams keep their state)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Breaker thresholds of an existing upstream are fixed for its lifetime

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, BreakerDefaults, GuardConfig, ListenerConfig, ObservabilityConfig, RetryConfig,
    UpstreamConfig,
};
pub use validation::ValidationError;
pub use watcher::ConfigWatcher;

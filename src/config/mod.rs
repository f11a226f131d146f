//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!
//! On file change (--watch):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps in the new rewrite rules
//! ```
//!
//! All fields have defaults, so an empty file is a valid configuration.
//! Listener and limiter settings are fixed at startup; only the rewrite
//! rules follow a reload.

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    LimitsConfig, ListenerConfig, LogFormat, ObservabilityConfig, RequestLogConfig, RuleConfig,
    ServerConfig, StaticFilesConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;

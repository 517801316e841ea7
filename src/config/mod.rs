//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → ServerConfig::resolve (environment-derived defaults via ConfigSource)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Environment lookups happen once, here, never in the server core

pub mod loader;
pub mod schema;
pub mod source;
pub mod validation;

pub use loader::{load_config, parse_config, read_config, ConfigError};
pub use schema::{AppConfig, LogFormat, ObservabilityConfig, SecretStoreConfig, ServerConfig};
pub use source::{ConfigSource, EnvSource};
pub use validation::{validate_config, ValidationError};

//! # pubsub-bridge config
//!
//! TOML configuration for the bridge: schema with defaults, `${VAR}`
//! expansion, command-line overrides and validation.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};

//! Configuration errors. Any of these stops the bridge at startup.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// The file could not be preprocessed before TOML parsing.
    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    /// One of `redis.url`, `redis.channel` or `server.bind` is unset,
    /// both in the file and on the command line.
    #[error("Missing required setting {0} (set it in the config file or on the command line)")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    /// A `${VAR}` reference in the file names an unset variable.
    #[error("Environment variable {0} referenced by the config file is not set")]
    EnvVarNotSet(String),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

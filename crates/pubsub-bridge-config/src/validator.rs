//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

const BUS_SCHEMES: [&str; 3] = ["redis", "rediss", "memory"];
const OVERFLOW_POLICIES: [&str; 2] = ["block", "reject"];

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// The first error as a [`ConfigError`], if any.
    pub fn into_error(self) -> Option<ConfigError> {
        self.errors.into_iter().next().map(|e| ConfigError::InvalidValue {
            field: e.path,
            message: e.message,
        })
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    ///
    /// A missing required field fails immediately with
    /// [`ConfigError::MissingField`]; everything else is collected into the
    /// returned [`ValidationResult`].
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        Self::require(config.redis.url.as_deref(), "redis.url")?;
        Self::require(config.redis.channel.as_deref(), "redis.channel")?;
        Self::require(config.server.bind.as_deref(), "server.bind")?;

        let mut result = ValidationResult::default();
        Self::validate_server(config, &mut result);
        Self::validate_redis(config, &mut result);
        Self::validate_publish(config, &mut result);
        Self::validate_reconnect(config, &mut result);
        Ok(result)
    }

    fn require(value: Option<&str>, path: &str) -> Result<(), ConfigError> {
        match value {
            Some(v) if !v.trim().is_empty() => Ok(()),
            _ => Err(ConfigError::MissingField(path.to_string())),
        }
    }

    fn validate_server(config: &Config, result: &mut ValidationResult) {
        let server = &config.server;

        if let Some(addr) = server.listen_addr() {
            let port = addr.rsplit_once(':').map(|(_, port)| port.parse::<u16>());
            if !matches!(port, Some(Ok(_))) {
                result.add_error(ValidationError::new(
                    "server.bind",
                    format!("'{addr}' is not a host:port address"),
                ));
            }
        }

        if server.allowed_origins.is_empty() {
            result.add_warning(ValidationWarning::new(
                "server.allowed_origins",
                "No origins allowed, every WebSocket upgrade will be rejected",
            ));
        } else if server.allowed_origins.iter().any(|o| o == "*") {
            result.add_warning(ValidationWarning::new(
                "server.allowed_origins",
                "Wildcard origin allows WebSocket connections from any site",
            ));
        }

        for (path, value) in [
            ("server.read_timeout_secs", server.read_timeout_secs),
            ("server.write_timeout_secs", server.write_timeout_secs),
            ("server.ping_interval_secs", server.ping_interval_secs),
        ] {
            if value == 0 {
                result.add_error(ValidationError::new(path, "must be greater than 0"));
            }
        }

        if server.ping_interval_secs >= server.read_timeout_secs {
            result.add_warning(ValidationWarning::new(
                "server.ping_interval_secs",
                "Ping interval is not shorter than the read timeout, idle clients will be evicted",
            ));
        }

        if server.outbound_buffer == 0 {
            result.add_error(ValidationError::new(
                "server.outbound_buffer",
                "outbound_buffer must be greater than 0",
            ));
        }
    }

    fn validate_redis(config: &Config, result: &mut ValidationResult) {
        if let Some(raw) = config.redis.url.as_deref() {
            match url::Url::parse(raw) {
                Ok(parsed) if BUS_SCHEMES.contains(&parsed.scheme()) => {}
                Ok(parsed) => result.add_error(ValidationError::new(
                    "redis.url",
                    format!(
                        "Unsupported scheme '{}', valid values: {:?}",
                        parsed.scheme(),
                        BUS_SCHEMES
                    ),
                )),
                Err(e) => result.add_error(ValidationError::new(
                    "redis.url",
                    format!("Not a valid URL: {e}"),
                )),
            }
        }

        if config.redis.max_idle == 0 {
            result.add_warning(ValidationWarning::new(
                "redis.max_idle",
                "max_idle is 0, every publish will open a new connection",
            ));
        }
    }

    fn validate_publish(config: &Config, result: &mut ValidationResult) {
        let publish = &config.publish;

        if publish.queue_capacity == 0 {
            result.add_error(ValidationError::new(
                "publish.queue_capacity",
                "queue_capacity must be greater than 0",
            ));
        }

        if !OVERFLOW_POLICIES.contains(&publish.overflow.as_str()) {
            result.add_error(ValidationError::new(
                "publish.overflow",
                format!(
                    "Unknown overflow policy '{}', valid values: {:?}",
                    publish.overflow, OVERFLOW_POLICIES
                ),
            ));
        }

        if publish.retry_delay_ms > publish.retry_max_delay_ms {
            result.add_warning(ValidationWarning::new(
                "publish.retry_delay_ms",
                "retry_delay_ms is above retry_max_delay_ms and will be capped",
            ));
        }
    }

    fn validate_reconnect(config: &Config, result: &mut ValidationResult) {
        let reconnect = &config.reconnect;

        if reconnect.multiplier < 1.0 {
            result.add_error(ValidationError::new(
                "reconnect.multiplier",
                "multiplier must be at least 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&reconnect.jitter) {
            result.add_error(ValidationError::new(
                "reconnect.jitter",
                "jitter must be between 0.0 and 1.0",
            ));
        }

        if reconnect.initial_delay_ms > reconnect.max_delay_ms {
            result.add_warning(ValidationWarning::new(
                "reconnect.initial_delay_ms",
                "initial_delay_ms is above max_delay_ms and will be capped",
            ));
        }

        if reconnect.max_attempts > 0 {
            result.add_warning(ValidationWarning::new(
                "reconnect.max_attempts",
                "Fan-out stops for good once max_attempts resubscribes have failed",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;

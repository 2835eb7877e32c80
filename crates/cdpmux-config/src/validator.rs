//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result: hard errors plus advisory warnings.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub warnings: Vec<ValidationWarning>,
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
    /// Validate the configuration. Hard errors fail the load; everything
    /// else is returned as warnings for the caller to log.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        if config.server.host.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "server.host".to_string(),
                message: "host cannot be empty".to_string(),
            });
        }

        if config.relay.write_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "relay.write_queue_capacity".to_string(),
                message: "capacity must be at least 1".to_string(),
            });
        }

        if config.relay.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "relay.request_timeout_ms".to_string(),
                message: "timeout must be at least 1ms".to_string(),
            });
        }

        if config.relay.extension_allowed_origins.is_empty() {
            result.warnings.push(ValidationWarning::new(
                "relay.extension_allowed_origins",
                "no extension origins configured; all extension connections will be rejected",
            ));
        }

        for origin in &config.relay.extension_allowed_origins {
            if !origin.starts_with("chrome-extension://") {
                result.warnings.push(ValidationWarning::new(
                    "relay.extension_allowed_origins",
                    format!("origin {origin:?} is not a chrome-extension:// origin"),
                ));
            }
        }

        if let Some(token) = &config.relay.bearer_token {
            if token.len() < 16 {
                result.warnings.push(ValidationWarning::new(
                    "relay.bearer_token",
                    "bearer token is shorter than 16 characters",
                ));
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;

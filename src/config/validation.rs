//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities > 0, backoff bounds ordered)
//! - Validate addresses parse before anything binds
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PumpConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::PumpConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["pretty", "json"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// Human readable description.
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a parsed configuration.
pub fn validate_config(config: &PumpConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.listener.handoff_capacity == Some(0) {
        errors.push(ValidationError::new(
            "listener.handoff_capacity",
            "must be at least 1",
        ));
    }

    if config.accept.backoff_base_ms == 0 {
        errors.push(ValidationError::new(
            "accept.backoff_base_ms",
            "must be greater than 0",
        ));
    }

    if config.accept.backoff_max_ms < config.accept.backoff_base_ms {
        errors.push(ValidationError::new(
            "accept.backoff_max_ms",
            format!(
                "{} is below backoff_base_ms ({})",
                config.accept.backoff_max_ms, config.accept.backoff_base_ms
            ),
        ));
    }

    if config.buffer_pool.buffer_capacity == 0 {
        errors.push(ValidationError::new(
            "buffer_pool.buffer_capacity",
            "must be greater than 0",
        ));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }

    if !LOG_FORMATS.contains(&config.observability.log_format.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!(
                "expected one of {:?}, got '{}'",
                LOG_FORMATS, config.observability.log_format
            ),
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&PumpConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = PumpConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.listener.handoff_capacity = Some(0);
        config.accept.backoff_base_ms = 0;
        config.observability.log_format = "xml".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "listener.handoff_capacity",
                "accept.backoff_base_ms",
                "observability.log_format",
            ]
        );
    }

    #[test]
    fn backoff_bounds_must_be_ordered() {
        let mut config = PumpConfig::default();
        config.accept.backoff_base_ms = 500;
        config.accept.backoff_max_ms = 100;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "accept.backoff_max_ms");
    }

    #[test]
    fn metrics_address_only_checked_when_enabled() {
        let mut config = PumpConfig::default();
        config.observability.metrics_address = "nope".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}

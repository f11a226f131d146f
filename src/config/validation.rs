//! Configuration validation.
//!
//! Semantic checks that serde cannot express: address syntax, value ranges
//! and rule compilation. Every problem is reported, not just the first.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::rewrite::RuleSet;
use crate::security::limits::RequestLimitPolicy;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
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

/// Check a deserialized configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = config.listener.bind_address.parse::<SocketAddr>() {
        errors.push(ValidationError::new("listener.bind_address", e.to_string()));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new(
            "listener.max_connections",
            "must be greater than zero",
        ));
    }
    if let Some(max) = config.limits.max_requests_per_connection {
        if let Err(e) = RequestLimitPolicy::new(max) {
            errors.push(ValidationError::new(
                "limits.max_requests_per_connection",
                e.to_string(),
            ));
        }
    }
    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new(
            "limits.max_body_bytes",
            "must be greater than zero",
        ));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new(
            "timeouts.request_secs",
            "must be greater than zero",
        ));
    }
    if let Err(e) = RuleSet::from_config(&config.rewrite.rules, config.listener.secure_port) {
        errors.push(ValidationError::new("rewrite.rules", e.to_string()));
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
            "not a socket address",
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
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn zero_max_requests_rejected() {
        let mut config = ServerConfig::default();
        config.limits.max_requests_per_connection = Some(0);
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "limits.max_requests_per_connection");
    }

    #[test]
    fn disabled_limiter_is_valid() {
        let mut config = ServerConfig::default();
        config.limits.max_requests_per_connection = None;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn bad_rule_reported() {
        let config: ServerConfig = toml::from_str(
            r#"
            [[rewrite.rules]]
            kind = "rewrite_path"
            regex = "["
            replacement = "/"
            "#,
        )
        .unwrap();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "rewrite.rules");
    }
}

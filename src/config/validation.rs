//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, pool sizes > 0)
//! - Check addresses parse before anything binds
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AjpConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::AjpConfig;
use crate::protocol::MAX_BODY_CHUNK_SIZE;

/// One semantic problem, keyed by its dotted config path.
#[derive(Debug, Clone, PartialEq, Eq)]
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

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &AjpConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.acceptors == 0 {
        errors.push(ValidationError::new("listener.acceptors", "must be at least 1"));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be at least 1"));
    }

    if config.timeouts.read_secs == 0 {
        errors.push(ValidationError::new("timeouts.read_secs", "must be greater than 0"));
    }
    if config.timeouts.keep_alive_secs == 0 {
        errors.push(ValidationError::new("timeouts.keep_alive_secs", "must be greater than 0"));
    }

    if config.request.max_parameters == 0 {
        errors.push(ValidationError::new("request.max_parameters", "must be at least 1"));
    }
    if config.request.max_form_size < MAX_BODY_CHUNK_SIZE {
        errors.push(ValidationError::new(
            "request.max_form_size",
            format!("must hold at least one body chunk ({} bytes)", MAX_BODY_CHUNK_SIZE),
        ));
    }
    if config
        .request
        .echo_header
        .as_deref()
        .is_some_and(|h| h.trim().is_empty())
    {
        errors.push(ValidationError::new("request.echo_header", "must not be blank"));
    }

    if config.session.cookie_name.is_empty()
        || config
            .session
            .cookie_name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ';' | ',' | '='))
    {
        errors.push(ValidationError::new(
            "session.cookie_name",
            format!("{:?} is not a valid cookie name", config.session.cookie_name),
        ));
    }
    if let Some(route) = &config.session.jvm_route {
        if route.contains('.') || route.contains(';') {
            errors.push(ValidationError::new(
                "session.jvm_route",
                "must not contain '.' or ';'",
            ));
        }
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("expected one of {}", LOG_LEVELS.join(", ")),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", config.observability.metrics_address),
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
        assert!(validate_config(&AjpConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = AjpConfig::default();
        config.listener.bind_address = "localhost".into();
        config.listener.acceptors = 0;
        config.timeouts.read_secs = 0;
        config.session.jvm_route = Some("node.1".into());
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            [
                "listener.bind_address",
                "listener.acceptors",
                "timeouts.read_secs",
                "session.jvm_route",
                "observability.log_level",
            ]
        );
    }

    #[test]
    fn metrics_address_only_checked_when_enabled() {
        let mut config = AjpConfig::default();
        config.observability.metrics_address = "nowhere".into();
        assert!(validate_config(&config).is_ok());
        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}

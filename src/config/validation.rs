#![allow(clippy::collapsible_if)]

use std::net::IpAddr;

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::{
    config::models::{BackendConfig, HealthCheckConfig, ProbeConfig, ResolverConfig},
    core::address::{BackendAddress, origin_host},
};

static HOSTNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?)*$")
        .expect("invalid hostname regex")
});

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid address '{address}' in '{field}': {reason}")]
    InvalidAddress {
        field: String,
        address: String,
        reason: String,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Resolver configuration validator
pub struct ResolverConfigValidator;

impl ResolverConfigValidator {
    /// Validate the entire resolver configuration
    pub fn validate(config: &ResolverConfig) -> ValidationResult<()> {
        let errors = Self::collect_errors(config);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Collect every validation problem without stopping at the first one
    pub fn collect_errors(config: &ResolverConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_protocol(&config.default_protocol, "default_protocol") {
            errors.push(e);
        }

        if config.default_port == 0 {
            errors.push(ValidationError::InvalidField {
                field: "default_port".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if let Err(e) = Self::validate_address(&config.fallback_address, "fallback_address") {
            errors.push(e);
        }

        if let Some(origin) = &config.origin {
            if origin_host(origin).is_none() {
                errors.push(ValidationError::InvalidField {
                    field: "origin".to_string(),
                    message: "Origin cannot be empty".to_string(),
                });
            }
        }

        errors.extend(Self::validate_backend_config(&config.backend));
        errors.extend(Self::validate_health_check_config(&config.health_check));
        errors.extend(Self::validate_probe_config(&config.probe));

        errors
    }

    fn validate_backend_config(config: &BackendConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(url) = &config.url {
            if let Err(e) = Self::validate_address(url, "backend.url") {
                errors.push(e);
            }
        }

        if let Some(host) = &config.host {
            if let Err(e) = Self::validate_host(host, "backend.host") {
                errors.push(e);
            }
        }

        if let Some(port) = config.port {
            if port == 0 {
                errors.push(ValidationError::InvalidField {
                    field: "backend.port".to_string(),
                    message: "Must be greater than 0".to_string(),
                });
            }
        }

        if let Some(protocol) = &config.protocol {
            if let Err(e) = Self::validate_protocol(protocol, "backend.protocol") {
                errors.push(e);
            }
        }

        if config.host.is_none() && (config.port.is_some() || config.protocol.is_some()) {
            errors.push(ValidationError::InvalidField {
                field: "backend.host".to_string(),
                message: "backend.port / backend.protocol have no effect without backend.host"
                    .to_string(),
            });
        }

        errors
    }

    fn validate_health_check_config(config: &HealthCheckConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !config.path.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: "health_check.path".to_string(),
                message: "Health check path must start with '/'".to_string(),
            });
        }

        if config.timeout_ms == 0 {
            errors.push(ValidationError::InvalidField {
                field: "health_check.timeout_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        errors
    }

    fn validate_probe_config(config: &ProbeConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if config.local_probe_timeout_ms == 0 {
            errors.push(ValidationError::InvalidField {
                field: "probe.local_probe_timeout_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if config.external_lookup_timeout_ms == 0 {
            errors.push(ValidationError::InvalidField {
                field: "probe.external_lookup_timeout_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if let Some(url) = &config.external_lookup_url {
            if let Err(e) = Self::validate_lookup_url(url, "probe.external_lookup_url") {
                errors.push(e);
            }
        }

        for (i, server) in config.stun_servers.iter().enumerate() {
            let field = format!("probe.stun_servers[{i}]");
            match server.rsplit_once(':') {
                Some((host, port)) if port.parse::<u16>().map(|p| p > 0).unwrap_or(false) => {
                    let host = host.trim_start_matches('[').trim_end_matches(']');
                    if let Err(e) = Self::validate_host(host, &field) {
                        errors.push(e);
                    }
                }
                _ => errors.push(ValidationError::InvalidField {
                    field,
                    message: format!("STUN server must be 'host:port', got '{server}'"),
                }),
            }
        }

        for (i, host) in config.common_candidates.iter().enumerate() {
            if let Err(e) = Self::validate_host(host, &format!("probe.common_candidates[{i}]")) {
                errors.push(e);
            }
        }

        errors
    }

    /// Validate a full backend address
    fn validate_address(address: &str, field: &str) -> ValidationResult<()> {
        BackendAddress::new(address)
            .map(|_| ())
            .map_err(|e| ValidationError::InvalidAddress {
                field: field.to_string(),
                address: address.to_string(),
                reason: e.to_string(),
            })
    }

    /// Validate a request URL; unlike a backend address it may carry a query
    fn validate_lookup_url(url: &str, field: &str) -> ValidationResult<()> {
        let invalid = |reason: String| ValidationError::InvalidAddress {
            field: field.to_string(),
            address: url.to_string(),
            reason,
        };
        let parsed = Url::parse(url.trim()).map_err(|e| invalid(e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" if parsed.host_str().is_some_and(|h| !h.is_empty()) => Ok(()),
            "http" | "https" => Err(invalid("missing host".to_string())),
            other => Err(invalid(format!("scheme must be http or https, got '{other}'"))),
        }
    }

    fn validate_protocol(protocol: &str, field: &str) -> ValidationResult<()> {
        match protocol.trim().to_ascii_lowercase().as_str() {
            "http" | "https" => Ok(()),
            other => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("Protocol must be 'http' or 'https', got '{other}'"),
            }),
        }
    }

    fn validate_host(host: &str, field: &str) -> ValidationResult<()> {
        if host.is_empty() {
            return Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: "Host cannot be empty".to_string(),
            });
        }

        if host.contains("://") {
            return Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: "Host should not contain protocol (e.g., use '10.0.0.5' not 'http://10.0.0.5')".to_string(),
            });
        }

        if host.parse::<IpAddr>().is_ok() || HOSTNAME_REGEX.is_match(host) {
            return Ok(());
        }

        Err(ValidationError::InvalidField {
            field: field.to_string(),
            message: format!("Invalid hostname format: '{host}'"),
        })
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

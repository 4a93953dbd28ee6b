//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Bind IP must be present and parse as an address or host name
//! - TLS certificate and key paths must be set when TLS is enabled
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: StaticConfig → Result<(), Vec<ValidationError>>
//! - File existence is checked when TLS material is loaded, not here

use std::net::IpAddr;

use thiserror::Error;

use crate::config::schema::StaticConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("bind ip must not be empty")]
    EmptyBindIp,

    #[error("bind ip {0:?} is not an IP address or host name")]
    InvalidBindIp(String),

    #[error("host must not be empty")]
    EmptyHost,

    #[error("tls is enabled but {0} path is empty")]
    MissingTlsPath(&'static str),
}

/// Check a resolved configuration, collecting every problem found.
pub fn validate_config(config: &StaticConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let ip = config.ip.trim_start_matches('[').trim_end_matches(']');
    if ip.is_empty() {
        errors.push(ValidationError::EmptyBindIp);
    } else if ip.parse::<IpAddr>().is_err() && !is_host_name(ip) {
        errors.push(ValidationError::InvalidBindIp(config.ip.clone()));
    }

    if config.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }

    if config.tls_enabled {
        if config.tls_cert.as_os_str().is_empty() {
            errors.push(ValidationError::MissingTlsPath("certificate"));
        }
        if config.tls_key.as_os_str().is_empty() {
            errors.push(ValidationError::MissingTlsPath("key"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_host_name(value: &str) -> bool {
    value
        .split('.')
        .all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

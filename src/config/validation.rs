//! Configuration validation.
//!
//! Semantic validation on top of serde's syntactic checks. Runs as a pure
//! function over the final configuration (after environment overrides) and
//! returns all errors, not just the first.

use std::fmt;
use std::net::SocketAddr;

use axum::http::HeaderValue;

use crate::config::schema::ServiceConfig;

/// A single semantic configuration problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    InvalidBindAddress(String),
    ZeroMaxFileSize,
    NoAllowedContentTypes,
    ZeroRequestLimit,
    ZeroTimeWindow,
    ZeroRequestTimeout,
    InvalidCorsOrigin(String),
    InvalidMetricsAddress(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBindAddress(addr) => write!(f, "invalid bind address {addr:?}"),
            Self::ZeroMaxFileSize => write!(f, "upload.max_file_size must be greater than zero"),
            Self::NoAllowedContentTypes => {
                write!(f, "upload.allowed_content_types must not be empty")
            }
            Self::ZeroRequestLimit => write!(f, "rate_limit.max_requests must be greater than zero"),
            Self::ZeroTimeWindow => write!(f, "rate_limit.window_secs must be greater than zero"),
            Self::ZeroRequestTimeout => {
                write!(f, "timeouts.request_secs must be greater than zero")
            }
            Self::InvalidCorsOrigin(origin) => write!(f, "invalid CORS origin {origin:?}"),
            Self::InvalidMetricsAddress(addr) => write!(f, "invalid metrics address {addr:?}"),
        }
    }
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.upload.max_file_size == 0 {
        errors.push(ValidationError::ZeroMaxFileSize);
    }
    if config.upload.allowed_content_types.is_empty() {
        errors.push(ValidationError::NoAllowedContentTypes);
    }
    if config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::ZeroRequestLimit);
    }
    if config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::ZeroTimeWindow);
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }
    for origin in &config.cors.allowed_origins {
        if origin.parse::<HeaderValue>().is_err() {
            errors.push(ValidationError::InvalidCorsOrigin(origin.clone()));
        }
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

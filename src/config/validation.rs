//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check catalog key segments are usable in key paths
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use thiserror::Error;

use crate::catalog::paths::validate_segment;
use crate::config::schema::RouterConfig;

/// A single semantic configuration problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("engine.close_timeout_secs must be greater than 0")]
    ZeroCloseTimeout,

    #[error("catalog.path must not be empty")]
    EmptyCatalogPath,

    #[error("catalog.{field} is not a valid key segment: {value:?}")]
    InvalidSegment { field: &'static str, value: String },

    #[error("observability.log_level {0:?} is not one of trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),
}

pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.engine.close_timeout_secs == 0 {
        errors.push(ValidationError::ZeroCloseTimeout);
    }

    if config.catalog.path.trim().is_empty() {
        errors.push(ValidationError::EmptyCatalogPath);
    }
    for (field, value) in [
        ("app_id", &config.catalog.app_id),
        ("cluster_id", &config.catalog.cluster_id),
    ] {
        if validate_segment(value).is_err() {
            errors.push(ValidationError::InvalidSegment {
                field,
                value: value.clone(),
            });
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
        errors.push(ValidationError::InvalidLogLevel(config.observability.log_level.clone()));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
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

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges
//! - Check that an enabled rollout has somewhere to go
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::uri::Authority;
use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    InvalidBindAddress(String),

    #[error("{field} '{value}' is not a valid host:port")]
    InvalidTargetAddress { field: &'static str, value: String },

    #[error("rollout.percentage {0} must be between 0 and 100")]
    PercentageOutOfRange(u8),

    #[error("rollout is enabled but rollout.target is missing")]
    MissingRolloutTarget,

    #[error("{memory_field} ({memory}) exceeds {total_field} ({total})")]
    MemoryAboveCeiling {
        memory_field: &'static str,
        memory: u64,
        total_field: &'static str,
        total: u64,
    },

    #[error("timeouts.request_secs must be greater than 0")]
    ZeroRequestTimeout,
}

/// Check `config` for semantic errors, collecting every one found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    check_authority("target.address", &config.target.address, &mut errors);

    let rollout = &config.rollout;
    if rollout.percentage > 100 {
        errors.push(ValidationError::PercentageOutOfRange(rollout.percentage));
    }
    match (&rollout.target, rollout.enabled) {
        (Some(target), _) => check_authority("rollout.target", target, &mut errors),
        (None, true) => errors.push(ValidationError::MissingRolloutTarget),
        (None, false) => {}
    }

    let buffering = &config.buffering;
    check_memory_ceiling(
        ("buffering.max_request_memory_bytes", buffering.max_request_memory_bytes),
        ("buffering.max_request_body_bytes", buffering.max_request_body_bytes),
        &mut errors,
    );
    check_memory_ceiling(
        ("buffering.max_response_memory_bytes", buffering.max_response_memory_bytes),
        ("buffering.max_response_body_bytes", buffering.max_response_body_bytes),
        &mut errors,
    );

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_authority(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    let valid = value
        .parse::<Authority>()
        .map(|a| a.port_u16().is_some())
        .unwrap_or(false);
    if !valid {
        errors.push(ValidationError::InvalidTargetAddress {
            field,
            value: value.to_string(),
        });
    }
}

// A memory threshold above a nonzero ceiling can never be reached.
fn check_memory_ceiling(
    (memory_field, memory): (&'static str, u64),
    (total_field, total): (&'static str, u64),
    errors: &mut Vec<ValidationError>,
) {
    if total > 0 && memory > total {
        errors.push(ValidationError::MemoryAboveCeiling {
            memory_field,
            memory,
            total_field,
            total,
        });
    }
}

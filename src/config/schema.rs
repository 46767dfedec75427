//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::buffer::BufferLimits;

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Active backend receiving all non-canary traffic.
    pub target: TargetConfig,

    /// Staged rollout to a canary backend.
    pub rollout: RolloutConfig,

    /// Request/response body buffering limits.
    pub buffering: BufferingConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Backend the proxy forwards to.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Backend authority (e.g., "127.0.0.1:3000").
    pub address: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Canary rollout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RolloutConfig {
    /// Route part of the traffic to `target`.
    pub enabled: bool,

    /// Canary backend authority.
    pub target: Option<String>,

    /// Share of identifiers sent to canary, 0–100.
    pub percentage: u8,

    /// Identifiers always sent to canary.
    pub allowlist: Vec<String>,
}

/// Body buffering configuration.
///
/// A ceiling of `0` means unlimited.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferingConfig {
    /// Buffer request bodies before forwarding.
    pub buffer_requests: bool,

    /// Maximum request body size in bytes.
    pub max_request_body_bytes: u64,

    /// Request bytes held in memory before spilling to disk.
    pub max_request_memory_bytes: u64,

    /// Buffer upstream response bodies before replying.
    pub buffer_responses: bool,

    /// Maximum response body size in bytes.
    pub max_response_body_bytes: u64,

    /// Response bytes held in memory before spilling to disk.
    pub max_response_memory_bytes: u64,

    /// Directory for spill files (default: OS temp dir).
    pub spill_dir: Option<PathBuf>,
}

impl Default for BufferingConfig {
    fn default() -> Self {
        Self {
            buffer_requests: true,
            max_request_body_bytes: 0,
            max_request_memory_bytes: 1024 * 1024, // 1MB
            buffer_responses: false,
            max_response_body_bytes: 0,
            max_response_memory_bytes: 1024 * 1024,
            spill_dir: None,
        }
    }
}

impl BufferingConfig {
    pub fn request_limits(&self) -> BufferLimits {
        self.limits(self.max_request_body_bytes, self.max_request_memory_bytes)
    }

    pub fn response_limits(&self) -> BufferLimits {
        self.limits(self.max_response_body_bytes, self.max_response_memory_bytes)
    }

    fn limits(&self, max_total_bytes: u64, max_memory_bytes: u64) -> BufferLimits {
        BufferLimits {
            max_total_bytes,
            max_memory_bytes,
            spill_dir: self.spill_dir.clone(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

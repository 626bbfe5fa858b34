//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the pump.
//! All types derive Serde traits for deserialization from config files.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Root configuration for the connection pump.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PumpConfig {
    /// Listener configuration (bind address, hand-off queue, keepalive).
    pub listener: ListenerConfig,

    /// Accept loop error handling.
    pub accept: AcceptConfig,

    /// Per-connection buffer pool sizing.
    pub buffer_pool: BufferPoolConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8443").
    pub bind_address: String,

    /// Capacity of the hand-off queue feeding `PumpListener::accept`.
    /// Defaults to the host's available parallelism.
    pub handoff_capacity: Option<usize>,

    /// Apply the fixed TCP keepalive policy to accepted connections.
    pub keepalive: bool,
}

impl ListenerConfig {
    /// Hand-off capacity after applying the parallelism default.
    pub fn effective_handoff_capacity(&self) -> usize {
        self.handoff_capacity.unwrap_or_else(default_parallelism)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8443".to_string(),
            handoff_capacity: None,
            keepalive: true,
        }
    }
}

/// Host parallelism, falling back to 1 when it cannot be determined.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Accept loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AcceptConfig {
    /// Base delay for backoff after a transient accept error, in milliseconds.
    pub backoff_base_ms: u64,

    /// Upper bound for the backoff delay, in milliseconds.
    pub backoff_max_ms: u64,

    /// Consecutive transient errors tolerated before the accept loop gives up.
    /// 0 disables the limit.
    pub max_consecutive_errors: u32,
}

impl Default for AcceptConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: 5,
            backoff_max_ms: 1000,
            max_consecutive_errors: 0,
        }
    }
}

/// Buffer pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    /// Initial capacity of each buffer in bytes.
    pub buffer_capacity: usize,

    /// Maximum number of idle buffers kept for reuse.
    pub max_idle: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 4096,
            max_idle: 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

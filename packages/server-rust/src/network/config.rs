//! Network configuration types for the relay host.

use std::time::Duration;

/// Default cap on request body size (10 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Top-level network configuration for the server.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Largest accepted request body in bytes.
    pub max_body_bytes: usize,
    /// Events processed concurrently before new ones are shed.
    pub max_concurrent_events: u32,
    /// How long shutdown waits for in-flight events.
    pub drain_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_concurrent_events: 1000,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

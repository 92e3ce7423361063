//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! forwarder. All types derive Serde traits for deserialization from
//! config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::forward::{RewritePolicy, StreamingConfig, TransportConfig};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Forwarding header policy.
    pub forward: ForwardConfig,

    /// Backend timeouts.
    pub timeouts: TimeoutConfig,

    /// Response framing and connection reuse.
    pub streaming: StreamingSection,

    /// Route definitions mapping requests to backends.
    pub routes: Vec<RouteConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// How X-Forwarded-* and Host are produced.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ForwardConfig {
    /// Keep forwarding headers supplied by the client.
    pub trust_forward_header: bool,

    /// Name reported in `X-Forwarded-Server`. Falls back to `$HOSTNAME`.
    pub hostname: Option<String>,

    /// Forward the client's Host instead of the target authority.
    pub pass_host_header: bool,
}

impl ForwardConfig {
    pub fn rewrite_policy(&self) -> RewritePolicy {
        let hostname = self
            .hostname
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_default();
        RewritePolicy::new(self.trust_forward_header, hostname)
    }
}

/// Timeout configuration for backend exchanges.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connect timeout in milliseconds.
    pub dial_ms: u64,

    /// Wait for the backend status line in milliseconds.
    pub response_header_ms: u64,

    /// Idle pooled connection lifetime in seconds.
    pub idle_pool_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            dial_ms: 5000,
            response_header_ms: 30_000,
            idle_pool_secs: 90,
        }
    }
}

/// Response framing settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamingSection {
    /// How long a body of unknown length may be buffered.
    pub collapse_window_ms: u64,

    /// Buffering cap before switching to live streaming.
    pub max_collapse_bytes: usize,

    /// Idle keep-alive backend connections per host (0 disables reuse).
    pub max_idle_per_host: usize,
}

impl Default for StreamingSection {
    fn default() -> Self {
        Self {
            collapse_window_ms: 50,
            max_collapse_bytes: 64 * 1024,
            max_idle_per_host: 0,
        }
    }
}

/// Route configuration mapping requests to a backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging.
    pub name: String,

    /// Host header to match (exact, case-insensitive).
    pub host: Option<String>,

    /// Path prefix to match.
    pub path_prefix: Option<String>,

    /// Backend URL, e.g. "http://127.0.0.1:3000" or "ws://chat:9000".
    pub target: String,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl ProxyConfig {
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            dial_timeout: Duration::from_millis(self.timeouts.dial_ms),
            response_header_timeout: Some(Duration::from_millis(self.timeouts.response_header_ms)),
            max_idle_per_host: self.streaming.max_idle_per_host,
            pool_idle_timeout: Duration::from_secs(self.timeouts.idle_pool_secs),
        }
    }

    pub fn streaming_config(&self) -> StreamingConfig {
        StreamingConfig {
            collapse_window: Duration::from_millis(self.streaming.collapse_window_ms),
            max_collapse_bytes: self.streaming.max_collapse_bytes,
        }
    }
}

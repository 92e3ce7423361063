//! Logging seam for the forwarding core.
//!
//! The core reports what it does through `ForwardLogger` and never reads
//! anything back. `TracingLogger` is the default sink.

use std::fmt;
use std::time::Duration;

use axum::http::{Method, StatusCode, Uri};

use crate::forward::error::ForwardError;
use crate::forward::target::ForwardTarget;

/// Something the forwarder did or ran into.
#[derive(Debug)]
pub enum ForwardEvent<'a> {
    /// A request is about to be sent to `target`.
    TargetSelected {
        method: &'a Method,
        uri: &'a Uri,
        target: &'a ForwardTarget,
    },
    /// The request arrived over TLS.
    TlsDetected { remote_addr: &'a str },
    /// The request was classified as a WebSocket upgrade.
    UpgradeRequested { target: &'a ForwardTarget },
    /// Backend accepted the upgrade; raw relaying starts.
    TunnelOpened { target: &'a ForwardTarget },
    /// Raw relaying ended.
    TunnelClosed {
        target: &'a ForwardTarget,
        client_to_backend: u64,
        backend_to_client: u64,
    },
    /// Forwarding failed.
    Failure {
        target: Option<&'a ForwardTarget>,
        error: &'a ForwardError,
    },
    /// A response head was handed back to the client.
    Completed {
        target: &'a ForwardTarget,
        status: StatusCode,
        elapsed: Duration,
    },
}

impl fmt::Display for ForwardEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetSelected { method, uri, target } => {
                write!(f, "forwarding {method} {uri} to {target}")
            }
            Self::TlsDetected { remote_addr } => write!(f, "request from {remote_addr} over tls"),
            Self::UpgradeRequested { target } => write!(f, "websocket upgrade requested for {target}"),
            Self::TunnelOpened { target } => write!(f, "tunnel to {target} opened"),
            Self::TunnelClosed {
                target,
                client_to_backend,
                backend_to_client,
            } => write!(
                f,
                "tunnel to {target} closed ({client_to_backend} bytes up, {backend_to_client} bytes down)"
            ),
            Self::Failure {
                target: Some(target),
                error,
            } => write!(f, "forwarding to {target} failed: {error}"),
            Self::Failure { target: None, error } => write!(f, "forwarding failed: {error}"),
            Self::Completed {
                target,
                status,
                elapsed,
            } => write!(f, "{target} answered {status} in {elapsed:?}"),
        }
    }
}

/// Write-only sink for forwarding events.
pub trait ForwardLogger: Send + Sync + 'static {
    fn log(&self, event: &ForwardEvent<'_>);
}

/// Emits events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl ForwardLogger for TracingLogger {
    fn log(&self, event: &ForwardEvent<'_>) {
        match event {
            ForwardEvent::TargetSelected { method, uri, target } => {
                tracing::debug!(method = %method, uri = %uri, backend = %target, "Forwarding request");
            }
            ForwardEvent::TlsDetected { remote_addr } => {
                tracing::debug!(remote_addr = %remote_addr, "Request received over tls");
            }
            ForwardEvent::UpgradeRequested { target } => {
                tracing::debug!(backend = %target, "WebSocket upgrade requested");
            }
            ForwardEvent::TunnelOpened { target } => {
                tracing::info!(backend = %target, "Tunnel opened");
            }
            ForwardEvent::TunnelClosed {
                target,
                client_to_backend,
                backend_to_client,
            } => {
                tracing::info!(
                    backend = %target,
                    client_to_backend,
                    backend_to_client,
                    "Tunnel closed"
                );
            }
            ForwardEvent::Failure { target, error } => match error {
                ForwardError::UpgradeRejected(_) | ForwardError::Relay(_) => {
                    tracing::warn!(backend = ?target.map(ToString::to_string), error = %error, "Forwarding failed");
                }
                _ => {
                    tracing::error!(backend = ?target.map(ToString::to_string), error = %error, "Forwarding failed");
                }
            },
            ForwardEvent::Completed {
                target,
                status,
                elapsed,
            } => {
                tracing::debug!(backend = %target, status = %status, elapsed = ?elapsed, "Response received");
            }
        }
    }
}

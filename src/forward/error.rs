//! Forwarding failures and how they become client responses.
//!
//! # Design Decisions
//! - One taxonomy for both the HTTP and the tunnel path
//! - The default mapping lives on the error (`status_code`), the handler
//!   only decides whether to use it
//! - Upgrade rejection never reaches a handler; it is a fixed 500

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a request could not be forwarded.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// No `ForwardTarget` was attached to the request.
    #[error("no forward target attached to request")]
    NoTarget,

    /// The backend connection could not be established.
    #[error("dial {target} failed: {source}")]
    Dial {
        target: String,
        #[source]
        source: BoxError,
    },

    /// The backend did not produce a status line in time.
    #[error("backend response headers not received within {0:?}")]
    Timeout(Duration),

    /// The backend answered a WebSocket handshake with something other than 101.
    #[error("websocket upgrade rejected by backend with status {0}")]
    UpgradeRejected(StatusCode),

    /// I/O failure while relaying body bytes or tunnel traffic.
    #[error("relay failed: {0}")]
    Relay(#[source] BoxError),

    /// Any other round-trip failure.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
}

impl ForwardError {
    pub fn dial(target: impl ToString, source: impl Into<BoxError>) -> Self {
        Self::Dial {
            target: target.to_string(),
            source: source.into(),
        }
    }

    pub fn transport(source: impl Into<BoxError>) -> Self {
        Self::Transport(source.into())
    }

    /// Default client-visible status for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::UpgradeRejected(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoTarget | Self::Dial { .. } | Self::Relay(_) | Self::Transport(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

/// Produces the client response for a failed forward.
///
/// `request` is the inbound request head as received, before rewriting.
pub trait ErrorHandler: Send + Sync + 'static {
    fn handle(&self, request: &Request<()>, error: &ForwardError) -> Response<Body>;
}

impl<F> ErrorHandler for F
where
    F: Fn(&Request<()>, &ForwardError) -> Response<Body> + Send + Sync + 'static,
{
    fn handle(&self, request: &Request<()>, error: &ForwardError) -> Response<Body> {
        self(request, error)
    }
}

/// Maps errors to a bare status: 504 on timeout, 502 otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusErrorHandler;

impl ErrorHandler for StatusErrorHandler {
    fn handle(&self, _request: &Request<()>, error: &ForwardError) -> Response<Body> {
        status_response(error.status_code())
    }
}

pub(crate) fn status_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

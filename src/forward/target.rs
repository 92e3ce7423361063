//! Per-request forwarding inputs carried as request extensions.
//!
//! The router that picks a backend attaches a `ForwardTarget`; the listener
//! attaches a `ClientInfo`. The forwarder only reads them.

use std::fmt;
use std::str::FromStr;

use axum::http::uri::{Authority, PathAndQuery, Scheme, Uri};
use axum::http::Request;
use thiserror::Error;

/// Errors building a `ForwardTarget`.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("invalid target URL '{0}': {1}")]
    InvalidUri(String, #[source] axum::http::uri::InvalidUri),

    #[error("target URL '{0}' must be absolute (scheme and host)")]
    NotAbsolute(String),

    #[error("unsupported target scheme '{0}'")]
    UnsupportedScheme(String),
}

/// The backend a request is forwarded to: scheme and authority only.
///
/// The inbound path and query are never taken from here, so they reach the
/// backend exactly as the client sent them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTarget {
    scheme: Scheme,
    authority: Authority,
}

impl ForwardTarget {
    pub fn new(scheme: Scheme, authority: Authority) -> Result<Self, TargetError> {
        match scheme.as_str() {
            "http" | "https" | "ws" | "wss" => Ok(Self { scheme, authority }),
            other => Err(TargetError::UnsupportedScheme(other.to_string())),
        }
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// True for `https` and `wss` targets.
    pub fn is_secure(&self) -> bool {
        matches!(self.scheme.as_str(), "https" | "wss")
    }

    /// Host and port to dial; the port defaults by scheme.
    pub fn host_port(&self) -> (&str, u16) {
        let host = self.authority.host();
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port = self
            .authority
            .port_u16()
            .unwrap_or(if self.is_secure() { 443 } else { 80 });
        (host, port)
    }

    /// Absolute backend URI for an HTTP round trip, keeping `path_and_query`
    /// byte for byte. WebSocket schemes map onto their HTTP counterparts.
    pub fn uri_for(&self, path_and_query: Option<&PathAndQuery>) -> Result<Uri, axum::http::Error> {
        let scheme = if self.is_secure() {
            Scheme::HTTPS
        } else {
            Scheme::HTTP
        };
        let path_and_query = path_and_query
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        Uri::builder()
            .scheme(scheme)
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
    }
}

impl FromStr for ForwardTarget {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uri: Uri = s
            .parse()
            .map_err(|e| TargetError::InvalidUri(s.to_string(), e))?;
        let parts = uri.into_parts();
        match (parts.scheme, parts.authority) {
            (Some(scheme), Some(authority)) => Self::new(scheme, authority),
            _ => Err(TargetError::NotAbsolute(s.to_string())),
        }
    }
}

impl fmt::Display for ForwardTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}

/// Facts about the client connection a request arrived on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    /// Remote socket address as `host:port`. Kept as a string so addresses
    /// from non-socket transports still pass through.
    pub remote_addr: String,
    /// Whether the connection is TLS-terminated by this proxy.
    pub tls: bool,
}

impl ClientInfo {
    pub fn new(remote_addr: impl Into<String>, tls: bool) -> Self {
        Self {
            remote_addr: remote_addr.into(),
            tls,
        }
    }
}

/// Host the client addressed: the `Host` header, else the URI authority.
pub fn declared_host<B>(req: &Request<B>) -> Option<String> {
    req.headers()
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
}

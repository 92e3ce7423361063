//! Forwarding header rewrite and hop-by-hop stripping.
//!
//! # Responsibilities
//! - Compute `X-Forwarded-*` and `X-Real-Ip` for the outbound request
//! - Honour or discard inbound forwarding headers per `RewritePolicy`
//! - Strip hop-by-hop headers (both directions)
//!
//! # Design Decisions
//! - Trust is resolved per header, never all-or-nothing
//! - Stripping is unconditional and independent of the trust policy
//! - Only headers are touched; the body is never inspected

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PORT: HeaderName = HeaderName::from_static("x-forwarded-port");
pub const X_FORWARDED_SERVER: HeaderName = HeaderName::from_static("x-forwarded-server");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

pub const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");
/// Not the standard `Trailer` response header; listed for compatibility
/// with proxies that emit the plural form.
pub const TRAILERS: HeaderName = HeaderName::from_static("trailers");

/// Headers recording the original client context.
pub const FORWARD_HEADERS: [HeaderName; 6] = [
    X_FORWARDED_PROTO,
    X_FORWARDED_FOR,
    X_FORWARDED_HOST,
    X_FORWARDED_PORT,
    X_FORWARDED_SERVER,
    X_REAL_IP,
];

/// Headers meaningful only for a single transport connection.
pub const HOP_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    KEEP_ALIVE,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    TRAILERS,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// How inbound forwarding headers are treated.
///
/// Built once at startup and shared read-only by every in-flight request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewritePolicy {
    /// Keep forwarding headers supplied by the client (or a proxy in front).
    pub trust_forward_header: bool,
    /// Identifies this proxy instance in `X-Forwarded-Server`. A trusted
    /// inbound `X-Forwarded-Server` is kept and wins over this value.
    pub hostname: String,
}

impl RewritePolicy {
    pub fn new(trust_forward_header: bool, hostname: impl Into<String>) -> Self {
        Self {
            trust_forward_header,
            hostname: hostname.into(),
        }
    }
}

/// Per-request facts the rewriter needs besides the headers themselves.
#[derive(Debug, Clone, Copy)]
pub struct RewriteContext<'a> {
    /// Remote socket address as reported by the listener (`host:port`).
    pub remote_addr: &'a str,
    /// Whether the request arrived over TLS.
    pub tls: bool,
    /// Host the client addressed (authority), if known.
    pub declared_host: Option<&'a str>,
}

/// Applies a `RewritePolicy` to outbound request headers.
#[derive(Debug, Clone, Default)]
pub struct HeaderRewriter {
    policy: RewritePolicy,
}

impl HeaderRewriter {
    pub fn new(policy: RewritePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RewritePolicy {
        &self.policy
    }

    /// Upsert the forwarding headers, then strip hop-by-hop headers.
    pub fn rewrite(&self, headers: &mut HeaderMap, ctx: &RewriteContext<'_>) {
        let client_ip = client_ip(ctx.remote_addr);

        let proto = if ctx.tls { "https" } else { "http" };
        self.resolve(headers, X_FORWARDED_PROTO, || Some(proto.to_string()));

        self.resolve(headers, X_FORWARDED_HOST, || {
            ctx.declared_host.map(str::to_string)
        });

        // Default port follows the resolved proto, which may be trusted input.
        let resolved_proto = headers
            .get(&X_FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(proto)
            .to_ascii_lowercase();
        self.resolve(headers, X_FORWARDED_PORT, || {
            let port = ctx
                .declared_host
                .and_then(split_host_port)
                .map(|(_, port)| port.to_string());
            Some(port.unwrap_or_else(|| default_port(&resolved_proto).to_string()))
        });

        self.resolve(headers, X_FORWARDED_SERVER, || {
            (!self.policy.hostname.is_empty()).then(|| self.policy.hostname.clone())
        });

        self.resolve(headers, X_REAL_IP, || {
            (!client_ip.is_empty()).then(|| client_ip.to_string())
        });

        self.resolve_forwarded_for(headers, &client_ip);

        strip_hop_headers(headers);
    }

    fn resolve<F>(&self, headers: &mut HeaderMap, name: HeaderName, fresh: F)
    where
        F: FnOnce() -> Option<String>,
    {
        if self.policy.trust_forward_header && has_value(headers, &name) {
            return;
        }
        headers.remove(&name);
        if let Some(value) = fresh().and_then(|v| HeaderValue::from_str(&v).ok()) {
            headers.insert(name, value);
        }
    }

    fn resolve_forwarded_for(&self, headers: &mut HeaderMap, client_ip: &str) {
        let prior: Vec<String> = if self.policy.trust_forward_header {
            headers
                .get_all(&X_FORWARDED_FOR)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .filter(|v| !v.trim().is_empty())
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        };
        headers.remove(&X_FORWARDED_FOR);

        let value = match (prior.is_empty(), client_ip.is_empty()) {
            (true, true) => return,
            (true, false) => client_ip.to_string(),
            (false, true) => prior.join(", "),
            (false, false) => format!("{}, {}", prior.join(", "), client_ip),
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }
}

/// Remove every hop-by-hop header, including those named by `Connection`.
pub fn strip_hop_headers(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in HOP_HEADERS.iter().chain(listed.iter()) {
        headers.remove(name);
    }
}

/// True if any `name` header carries `token` in its comma-separated list.
pub fn has_token(headers: &HeaderMap, name: &HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

fn has_value(headers: &HeaderMap, name: &HeaderName) -> bool {
    headers.get_all(name).iter().any(|v| !v.is_empty())
}

/// Client IP from a remote address. Falls back to the raw string when no
/// port is present.
pub fn client_ip(remote_addr: &str) -> String {
    let host = split_host_port(remote_addr)
        .map(|(host, _)| host)
        .unwrap_or(remote_addr);
    let host = host.trim_start_matches('[').trim_end_matches(']');
    // IPv6 zone identifiers never make sense to a backend.
    match host.split_once('%') {
        Some((ip, _zone)) => ip.to_string(),
        None => host.to_string(),
    }
}

/// Split `host:port`, `[v6]:port`. Bare hosts and bare IPv6 yield `None`.
pub fn split_host_port(authority: &str) -> Option<(&str, &str)> {
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        let port = after.strip_prefix(':')?;
        return (!port.is_empty()).then_some((host, port));
    }
    let (host, port) = authority.rsplit_once(':')?;
    if host.contains(':') || port.is_empty() {
        return None;
    }
    Some((host, port))
}

fn default_port(proto: &str) -> u16 {
    match proto {
        "https" | "wss" => 443,
        _ => 80,
    }
}

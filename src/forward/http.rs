//! Plain HTTP forwarding.
//!
//! # Data Flow
//! ```text
//! inbound request
//!   → header rewrite (X-Forwarded-*, hop strip)
//!   → Host / URI / version
//!   → RoundTripper
//!   → hop strip on response
//!   → framing decision (pass through | collapse | stream)
//! ```
//!
//! # Design Decisions
//! - A response that already has a length, or that cannot have a body, is
//!   passed through untouched
//! - Otherwise the body is read for a short window: if it ends in time it
//!   goes out with `Content-Length`, else it streams and every backend
//!   frame is flushed as it arrives
//! - Trailers on a collapsed body keep the response chunked and are
//!   announced in `Trailer`

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{
    header, HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Version,
};
use bytes::BytesMut;
use futures_util::{stream, StreamExt, TryStreamExt};
use hyper::body::Frame;
use http_body_util::{BodyExt, BodyStream, StreamBody};
use tokio::time::Instant;

use crate::forward::error::ForwardError;
use crate::forward::headers::{strip_hop_headers, RewriteContext};
use crate::forward::logger::{ForwardEvent, ForwardLogger};
use crate::forward::target::{declared_host, ClientInfo, ForwardTarget};
use crate::forward::Shared;

/// How long a response of unknown length may be buffered before it is
/// streamed instead.
#[derive(Debug, Clone, Copy)]
pub struct StreamingConfig {
    /// Wait at most this long for the body to finish.
    pub collapse_window: Duration,
    /// Give up collapsing once this many bytes are buffered.
    pub max_collapse_bytes: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            collapse_window: Duration::from_millis(50),
            max_collapse_bytes: 64 * 1024,
        }
    }
}

pub(crate) async fn forward(
    shared: &Arc<Shared>,
    req: Request<Body>,
    target: &ForwardTarget,
    client: &ClientInfo,
) -> Result<Response<Body>, ForwardError> {
    let host = declared_host(&req);
    let (mut parts, body) = req.into_parts();

    shared.rewriter.rewrite(
        &mut parts.headers,
        &RewriteContext {
            remote_addr: &client.remote_addr,
            tls: client.tls,
            declared_host: host.as_deref(),
        },
    );

    let outbound_host = match host.as_deref() {
        Some(host) if shared.pass_host_header => HeaderValue::from_str(host),
        _ => HeaderValue::from_str(target.authority().as_str()),
    }
    .map_err(ForwardError::transport)?;
    parts.headers.insert(header::HOST, outbound_host);

    parts.uri = target
        .uri_for(parts.uri.path_and_query())
        .map_err(ForwardError::transport)?;
    parts.version = Version::HTTP_11;
    let method = parts.method.clone();

    let response = shared
        .transport
        .round_trip(Request::from_parts(parts, body))
        .await?;

    relay_response(
        response,
        &method,
        &shared.streaming,
        Arc::clone(&shared.logger),
        target,
    )
    .await
}

/// Turn a backend response into the client response.
pub(crate) async fn relay_response(
    response: Response<Body>,
    method: &Method,
    streaming: &StreamingConfig,
    logger: Arc<dyn ForwardLogger>,
    target: &ForwardTarget,
) -> Result<Response<Body>, ForwardError> {
    let (mut parts, body) = response.into_parts();
    strip_hop_headers(&mut parts.headers);

    if !needs_framing(method, parts.status, &parts.headers) {
        return Ok(Response::from_parts(parts, body));
    }

    let body = match prefetch(body, streaming).await? {
        Prefetched::Complete {
            data,
            trailers: None,
        } => {
            parts
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(data.len()));
            Body::from(data)
        }
        Prefetched::Complete {
            data,
            trailers: Some(trailers),
        } => {
            announce_trailers(&mut parts.headers, &trailers);
            replay(vec![Frame::data(data), Frame::trailers(trailers)])
        }
        Prefetched::Streaming { frames, rest } => {
            let target = target.clone();
            let rest = TryStreamExt::inspect_err(BodyStream::new(rest), move |e| {
                let error = ForwardError::Relay(e.to_string().into());
                logger.log(&ForwardEvent::Failure {
                    target: Some(&target),
                    error: &error,
                });
            });
            Body::new(StreamBody::new(
                stream::iter(frames.into_iter().map(Ok)).chain(rest),
            ))
        }
    };

    Ok(Response::from_parts(parts, body))
}

/// Whether the proxy has to decide the response framing itself.
fn needs_framing(method: &Method, status: StatusCode, headers: &HeaderMap) -> bool {
    let bodiless = *method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED;
    !bodiless && !headers.contains_key(header::CONTENT_LENGTH)
}

enum Prefetched {
    Complete {
        data: Bytes,
        trailers: Option<HeaderMap>,
    },
    Streaming {
        frames: Vec<Frame<Bytes>>,
        rest: Body,
    },
}

async fn prefetch(mut body: Body, streaming: &StreamingConfig) -> Result<Prefetched, ForwardError> {
    let deadline = Instant::now() + streaming.collapse_window;
    let mut frames = Vec::new();
    let mut buffered = 0usize;

    loop {
        let next = match tokio::time::timeout_at(deadline, body.frame()).await {
            Ok(next) => next,
            Err(_) => return Ok(Prefetched::Streaming { frames, rest: body }),
        };
        match next {
            None => return Ok(collapse(frames)),
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    buffered += data.len();
                }
                frames.push(frame);
                if buffered > streaming.max_collapse_bytes {
                    return Ok(Prefetched::Streaming { frames, rest: body });
                }
            }
            Some(Err(e)) => return Err(ForwardError::Relay(Box::new(e))),
        }
    }
}

fn collapse(frames: Vec<Frame<Bytes>>) -> Prefetched {
    let mut data = BytesMut::new();
    let mut trailers: Option<HeaderMap> = None;
    for frame in frames {
        match frame.into_data() {
            Ok(chunk) => data.extend_from_slice(&chunk),
            Err(frame) => {
                if let Ok(map) = frame.into_trailers() {
                    trailers.get_or_insert_with(HeaderMap::new).extend(map);
                }
            }
        }
    }
    Prefetched::Complete {
        data: data.freeze(),
        trailers,
    }
}

/// List every trailer name in `Trailer`, announced or not, once each.
fn announce_trailers(headers: &mut HeaderMap, trailers: &HeaderMap) {
    let mut names: Vec<HeaderName> = headers
        .get_all(header::TRAILER)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in trailers.keys() {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }

    headers.remove(header::TRAILER);
    for name in names {
        headers.append(header::TRAILER, HeaderValue::from(name));
    }
}

fn replay(frames: Vec<Frame<Bytes>>) -> Body {
    Body::new(StreamBody::new(stream::iter(
        frames.into_iter().map(Ok::<_, axum::Error>),
    )))
}

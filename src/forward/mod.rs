//! Forwarding core.
//!
//! # Data Flow
//! ```text
//! Request (+ ForwardTarget, ClientInfo extensions)
//!     → Forwarder::forward
//!         ├─ WebSocket upgrade? → websocket::open_tunnel → 101 + background relay
//!         └─ otherwise          → http::forward → RoundTripper → client response
//!     failures → ErrorHandler (tunnel rejection → fixed 500)
//! ```
//!
//! # Responsibilities
//! - Read the target chosen upstream; never route
//! - Rewrite X-Forwarded-* and strip hop-by-hop headers
//! - Stream bodies and tunnel upgraded connections
//! - Report everything through `ForwardLogger`
//!
//! # Design Decisions
//! - Immutable after `build()`: one `Forwarder` is shared by every
//!   connection task through an `Arc`
//! - Transport, error handler and logger are trait objects so callers
//!   can swap them without touching the core

pub mod error;
pub mod headers;
pub mod http;
pub mod logger;
pub mod target;
pub mod transport;
pub mod websocket;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};

pub use error::{BoxError, ErrorHandler, ForwardError, StatusErrorHandler};
pub use headers::{HeaderRewriter, RewritePolicy};
pub use self::http::StreamingConfig;
pub use logger::{ForwardEvent, ForwardLogger, TracingLogger};
pub use target::{ClientInfo, ForwardTarget, TargetError};
pub use transport::{HttpTransport, RoundTripper, TransportConfig};
pub use websocket::is_websocket_upgrade;

/// State shared by every forward performed through one `Forwarder`.
pub(crate) struct Shared {
    pub(crate) rewriter: HeaderRewriter,
    pub(crate) transport: Arc<dyn RoundTripper>,
    pub(crate) error_handler: Arc<dyn ErrorHandler>,
    pub(crate) logger: Arc<dyn ForwardLogger>,
    pub(crate) pass_host_header: bool,
    pub(crate) dial_timeout: Duration,
    pub(crate) handshake_timeout: Option<Duration>,
    pub(crate) streaming: StreamingConfig,
}

/// Forwards one request to the backend named by its `ForwardTarget`
/// extension. Cheap to clone.
#[derive(Clone)]
pub struct Forwarder {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("policy", self.shared.rewriter.policy())
            .field("pass_host_header", &self.shared.pass_host_header)
            .field("streaming", &self.shared.streaming)
            .finish_non_exhaustive()
    }
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Forwarder {
    pub fn builder() -> ForwarderBuilder {
        ForwarderBuilder::default()
    }

    /// Forward `req` and produce the client response.
    ///
    /// Never fails: forwarding errors go through the configured
    /// `ErrorHandler`, a rejected WebSocket upgrade becomes a bare 500.
    pub async fn forward(&self, req: Request<Body>) -> Response<Body> {
        let started = Instant::now();
        let head = request_head(&req);

        let Some(target) = req.extensions().get::<ForwardTarget>().cloned() else {
            return self.fail(&head, None, ForwardError::NoTarget);
        };
        let client = req
            .extensions()
            .get::<ClientInfo>()
            .cloned()
            .unwrap_or_default();

        let logger = &self.shared.logger;
        if client.tls {
            logger.log(&ForwardEvent::TlsDetected {
                remote_addr: &client.remote_addr,
            });
        }
        logger.log(&ForwardEvent::TargetSelected {
            method: head.method(),
            uri: head.uri(),
            target: &target,
        });

        if is_websocket_upgrade(&req) {
            logger.log(&ForwardEvent::UpgradeRequested { target: &target });
            return match websocket::open_tunnel(&self.shared, req, &target).await {
                Ok(response) => response,
                // A refused dial or handshake never reaches the error handler.
                Err(error @ (ForwardError::Dial { .. } | ForwardError::UpgradeRejected(_))) => {
                    logger.log(&ForwardEvent::Failure {
                        target: Some(&target),
                        error: &error,
                    });
                    error::status_response(StatusCode::INTERNAL_SERVER_ERROR)
                }
                Err(error) => self.fail(&head, Some(&target), error),
            };
        }

        match self::http::forward(&self.shared, req, &target, &client).await {
            Ok(response) => {
                logger.log(&ForwardEvent::Completed {
                    target: &target,
                    status: response.status(),
                    elapsed: started.elapsed(),
                });
                response
            }
            Err(error) => self.fail(&head, Some(&target), error),
        }
    }

    fn fail(
        &self,
        head: &Request<()>,
        target: Option<&ForwardTarget>,
        error: ForwardError,
    ) -> Response<Body> {
        self.shared.logger.log(&ForwardEvent::Failure {
            target,
            error: &error,
        });
        self.shared.error_handler.handle(head, &error)
    }
}

/// Copy of the inbound head handed to the error handler.
fn request_head(req: &Request<Body>) -> Request<()> {
    let mut head = Request::new(());
    *head.method_mut() = req.method().clone();
    *head.uri_mut() = req.uri().clone();
    *head.version_mut() = req.version();
    *head.headers_mut() = req.headers().clone();
    head
}

/// Builder for `Forwarder`. Unset parts get the defaults: untrusted
/// forwarding headers, `HttpTransport`, `StatusErrorHandler`, `TracingLogger`.
pub struct ForwarderBuilder {
    policy: RewritePolicy,
    transport: Option<Arc<dyn RoundTripper>>,
    transport_config: TransportConfig,
    error_handler: Arc<dyn ErrorHandler>,
    logger: Arc<dyn ForwardLogger>,
    pass_host_header: bool,
    streaming: StreamingConfig,
}

impl Default for ForwarderBuilder {
    fn default() -> Self {
        Self {
            policy: RewritePolicy::default(),
            transport: None,
            transport_config: TransportConfig::default(),
            error_handler: Arc::new(StatusErrorHandler),
            logger: Arc::new(TracingLogger),
            pass_host_header: false,
            streaming: StreamingConfig::default(),
        }
    }
}

impl ForwarderBuilder {
    pub fn rewrite_policy(mut self, policy: RewritePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn trust_forward_header(mut self, trust: bool) -> Self {
        self.policy.trust_forward_header = trust;
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.policy.hostname = hostname.into();
        self
    }

    /// Replace the backend transport. Dial and handshake timeouts from
    /// `transport_config` still apply to WebSocket tunnels.
    pub fn transport(mut self, transport: impl RoundTripper) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    pub fn error_handler(mut self, handler: impl ErrorHandler) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }

    pub fn logger(mut self, logger: impl ForwardLogger) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    /// Send the client's `Host` instead of the target authority.
    pub fn pass_host_header(mut self, pass: bool) -> Self {
        self.pass_host_header = pass;
        self
    }

    pub fn streaming(mut self, streaming: StreamingConfig) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn build(self) -> Forwarder {
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpTransport::new(&self.transport_config)));
        Forwarder {
            shared: Arc::new(Shared {
                rewriter: HeaderRewriter::new(self.policy),
                transport,
                error_handler: self.error_handler,
                logger: self.logger,
                pass_host_header: self.pass_host_header,
                dial_timeout: self.transport_config.dial_timeout,
                handshake_timeout: self.transport_config.response_header_timeout,
                streaming: self.streaming,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use axum::http::HeaderValue;
    use http_body_util::BodyExt;

    /// Records the outbound request and answers 200.
    #[derive(Default)]
    struct Recording {
        seen: Mutex<Option<Request<()>>>,
    }

    impl RoundTripper for Recording {
        fn round_trip(&self, request: Request<Body>) -> transport::RoundTripFuture {
            let (parts, _) = request.into_parts();
            *self.seen.lock().unwrap() = Some(Request::from_parts(parts, ()));
            Box::pin(async { Ok(Response::new(Body::from("ok"))) })
        }
    }

    fn with_target(uri: &str, target: &str) -> Request<Body> {
        let mut req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(target.parse::<ForwardTarget>().unwrap());
        req.extensions_mut()
            .insert(ClientInfo::new("10.0.0.7:40000", false));
        req
    }

    #[tokio::test]
    async fn missing_target_goes_to_error_handler() {
        let forwarder = Forwarder::default();
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = forwarder.forward(req).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn outbound_request_is_rewritten() {
        let recording = Arc::new(Recording::default());
        let forwarder = Forwarder::builder()
            .transport(Arc::clone(&recording))
            .hostname("proxy-1")
            .build();

        let mut req = with_target("http://front.example/a//b?x=%3A", "http://127.0.0.1:7000");
        req.headers_mut()
            .insert("host", HeaderValue::from_static("front.example"));
        req.headers_mut()
            .insert("connection", HeaderValue::from_static("keep-alive"));

        let response = forwarder.forward(req).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");

        let seen = recording.seen.lock().unwrap().take().unwrap();
        assert_eq!(seen.uri().to_string(), "http://127.0.0.1:7000/a//b?x=%3A");
        assert_eq!(seen.headers()["host"], "127.0.0.1:7000");
        assert_eq!(seen.headers()["x-forwarded-for"], "10.0.0.7");
        assert_eq!(seen.headers()["x-forwarded-host"], "front.example");
        assert_eq!(seen.headers()["x-forwarded-server"], "proxy-1");
        assert!(seen.headers().get("connection").is_none());
    }

    #[tokio::test]
    async fn pass_host_header_keeps_client_host() {
        let recording = Arc::new(Recording::default());
        let forwarder = Forwarder::builder()
            .transport(Arc::clone(&recording))
            .pass_host_header(true)
            .build();

        let mut req = with_target("/", "http://127.0.0.1:7000");
        req.headers_mut()
            .insert("host", HeaderValue::from_static("front.example"));
        forwarder.forward(req).await;

        let seen = recording.seen.lock().unwrap().take().unwrap();
        assert_eq!(seen.headers()["host"], "front.example");
    }
}

//! Backend round trips.
//!
//! # Responsibilities
//! - Perform exactly one HTTP exchange with the backend
//! - Bound connect time and the wait for the response head; the header
//!   clock starts once the request body has been fully written
//! - Classify failures (dial / timeout / other)
//!
//! # Design Decisions
//! - The forwarder treats `RoundTripper` as a black box
//! - Pooling is opt-in (`max_idle_per_host`); by default every forward
//!   uses its own connection, released when the exchange ends

use std::error::Error as _;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use tokio::sync::oneshot;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::forward::error::ForwardError;

pub type RoundTripFuture = BoxFuture<'static, Result<Response<Body>, ForwardError>>;

/// Performs one HTTP round trip. The future resolves once the response
/// head is available; the body streams afterwards.
pub trait RoundTripper: Send + Sync + 'static {
    fn round_trip(&self, request: Request<Body>) -> RoundTripFuture;
}

impl<T: RoundTripper + ?Sized> RoundTripper for Arc<T> {
    fn round_trip(&self, request: Request<Body>) -> RoundTripFuture {
        (**self).round_trip(request)
    }
}

/// Settings for `HttpTransport`.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// TCP connect bound.
    pub dial_timeout: Duration,
    /// Bound on waiting for the backend status line. `None` waits forever.
    pub response_header_timeout: Option<Duration>,
    /// Idle keep-alive connections kept per backend host.
    pub max_idle_per_host: usize,
    /// How long an idle pooled connection survives.
    pub pool_idle_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(5),
            response_header_timeout: Some(Duration::from_secs(30)),
            max_idle_per_host: 0,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

/// HTTP/1.1 transport on top of the hyper-util client.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpConnector, Body>,
    response_header_timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.dial_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .build(connector);

        Self {
            client,
            response_header_timeout: config.response_header_timeout,
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(&TransportConfig::default())
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("response_header_timeout", &self.response_header_timeout)
            .finish_non_exhaustive()
    }
}

impl RoundTripper for HttpTransport {
    fn round_trip(&self, request: Request<Body>) -> RoundTripFuture {
        let client = self.client.clone();
        let limit = self.response_header_timeout;
        let authority = request
            .uri()
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_default();

        Box::pin(async move {
            let Some(limit) = limit else {
                return classify(client.request(request).await, authority);
            };

            let (request, written) = UploadBody::wrap(request);
            let pending = client.request(request);
            tokio::pin!(pending);

            // A backend may answer before the upload ends.
            let result = tokio::select! {
                result = &mut pending => result,
                _ = written => tokio::time::timeout(limit, &mut pending)
                    .await
                    .map_err(|_| ForwardError::Timeout(limit))?,
            };
            classify(result, authority)
        })
    }
}

fn classify(
    result: Result<Response<hyper::body::Incoming>, hyper_util::client::legacy::Error>,
    authority: String,
) -> Result<Response<Body>, ForwardError> {
    match result {
        Ok(response) => Ok(response.map(Body::new)),
        Err(e) if e.is_connect() => {
            let source = e.source().map(|s| s.to_string()).unwrap_or_else(|| e.to_string());
            Err(ForwardError::dial(authority, source))
        }
        Err(e) => Err(ForwardError::transport(e)),
    }
}

/// Request body that reports when its last frame has been handed to hyper.
/// Dropping it early (a failed or aborted upload) also fires the signal.
struct UploadBody {
    inner: Body,
    written: Option<oneshot::Sender<()>>,
}

impl UploadBody {
    fn wrap(request: Request<Body>) -> (Request<Body>, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let request = request.map(|inner| {
            let mut body = UploadBody {
                inner,
                written: Some(tx),
            };
            // hyper never polls a body that is already finished.
            if body.inner.is_end_stream() {
                body.finish();
            }
            Body::new(body)
        });
        (request, rx)
    }

    fn finish(&mut self) {
        if let Some(tx) = self.written.take() {
            let _ = tx.send(());
        }
    }
}

impl HttpBody for UploadBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, axum::Error>>> {
        let this = self.get_mut();
        let frame = ready!(Pin::new(&mut this.inner).poll_frame(cx));
        if frame.is_none() || this.inner.is_end_stream() {
            this.finish();
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

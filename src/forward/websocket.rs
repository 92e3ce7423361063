//! WebSocket detection and raw tunnelling.
//!
//! # Tunnel states
//! ```text
//! DETECTED → DIAL → HANDSHAKE_SENT ─┬─ 101 ──→ UPGRADED → RELAYING → CLOSED
//!                                   └─ other → REJECTED → fixed 500
//! ```
//!
//! # Design Decisions
//! - The handshake is replayed with the inbound headers untouched; only
//!   `Host` is pointed at the backend
//! - Path and query are sent exactly as received
//! - After 101 both connections belong to the relay alone; whichever
//!   direction ends first tears down both

use std::io;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, StatusCode, Uri, Version};
use bytes::Bytes;
use http_body_util::Empty;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::forward::error::ForwardError;
use crate::forward::headers::has_token;
use crate::forward::logger::ForwardEvent;
use crate::forward::target::ForwardTarget;
use crate::forward::Shared;

const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// True iff `Connection` carries the `upgrade` token and `Upgrade` is
/// `websocket` (both case-insensitive).
pub fn is_websocket_upgrade<B>(req: &Request<B>) -> bool {
    let headers = req.headers();
    has_token(headers, &header::CONNECTION, "upgrade")
        && headers
            .get_all(header::UPGRADE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.trim().eq_ignore_ascii_case("websocket"))
}

/// Open a tunnel for an upgrade request. On success the returned 101
/// response is handed to the client and relaying runs in the background.
pub(crate) async fn open_tunnel(
    shared: &Arc<Shared>,
    mut req: Request<Body>,
    target: &ForwardTarget,
) -> Result<Response<Body>, ForwardError> {
    let stream = dial(shared, target).await?;

    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(ForwardError::transport)?;
    // Owns the backend connection until upgrade or rejection.
    let driver = tokio::spawn(conn.with_upgrades());

    let handshake = handshake_request(shared, &req, target)?;
    let pending = sender.send_request(handshake);
    let result = match shared.handshake_timeout {
        Some(limit) => match tokio::time::timeout(limit, pending).await {
            Ok(result) => result,
            Err(_) => {
                driver.abort();
                return Err(ForwardError::Timeout(limit));
            }
        },
        None => pending.await,
    };
    let mut backend_response = match result {
        Ok(response) => response,
        Err(e) => {
            driver.abort();
            return Err(ForwardError::transport(e));
        }
    };

    let status = backend_response.status();
    if status != StatusCode::SWITCHING_PROTOCOLS {
        driver.abort();
        return Err(ForwardError::UpgradeRejected(status));
    }

    let backend_upgrade = hyper::upgrade::on(&mut backend_response);
    let client_upgrade = hyper::upgrade::on(&mut req);

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    *response.headers_mut() = backend_response.headers().clone();

    let shared = Arc::clone(shared);
    let target = target.clone();
    tokio::spawn(async move {
        let (backend, client) = match tokio::try_join!(backend_upgrade, client_upgrade) {
            Ok(pair) => pair,
            Err(e) => {
                let error = ForwardError::Relay(Box::new(e));
                shared.logger.log(&ForwardEvent::Failure {
                    target: Some(&target),
                    error: &error,
                });
                return;
            }
        };
        drop(sender);

        shared.logger.log(&ForwardEvent::TunnelOpened { target: &target });
        let outcome = relay(TokioIo::new(client), TokioIo::new(backend)).await;
        if let Some(e) = outcome.error {
            let error = ForwardError::Relay(Box::new(e));
            shared.logger.log(&ForwardEvent::Failure {
                target: Some(&target),
                error: &error,
            });
        }
        shared.logger.log(&ForwardEvent::TunnelClosed {
            target: &target,
            client_to_backend: outcome.client_to_backend,
            backend_to_client: outcome.backend_to_client,
        });
    });

    Ok(response)
}

async fn dial(shared: &Shared, target: &ForwardTarget) -> Result<TcpStream, ForwardError> {
    if target.is_secure() {
        return Err(ForwardError::dial(
            target,
            io::Error::new(io::ErrorKind::Unsupported, "tls backends are not supported"),
        ));
    }
    let (host, port) = target.host_port();
    let stream = tokio::time::timeout(shared.dial_timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| ForwardError::dial(target, io::Error::from(io::ErrorKind::TimedOut)))?
        .map_err(|e| ForwardError::dial(target, e))?;
    stream.set_nodelay(true).map_err(|e| ForwardError::dial(target, e))?;
    Ok(stream)
}

fn handshake_request(
    shared: &Shared,
    req: &Request<Body>,
    target: &ForwardTarget,
) -> Result<Request<Empty<Bytes>>, ForwardError> {
    let uri = req
        .uri()
        .path_and_query()
        .cloned()
        .map(Uri::from)
        .unwrap_or_else(|| Uri::from_static("/"));

    let mut handshake = Request::new(Empty::new());
    *handshake.method_mut() = req.method().clone();
    *handshake.uri_mut() = uri;
    *handshake.version_mut() = Version::HTTP_11;
    *handshake.headers_mut() = req.headers().clone();

    if !shared.pass_host_header || !handshake.headers().contains_key(header::HOST) {
        let host = HeaderValue::from_str(target.authority().as_str())
            .map_err(ForwardError::transport)?;
        handshake.headers_mut().insert(header::HOST, host);
    }
    Ok(handshake)
}

/// Result of a finished relay.
#[derive(Debug, Default)]
pub(crate) struct RelayOutcome {
    pub client_to_backend: u64,
    pub backend_to_client: u64,
    /// First I/O error seen, if the relay did not end on a clean EOF.
    pub error: Option<io::Error>,
}

/// Copy raw bytes both ways until either direction ends, then close both.
pub(crate) async fn relay<C, B>(client: C, backend: B) -> RelayOutcome
where
    C: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut backend_read, mut backend_write) = tokio::io::split(backend);
    let mut outcome = RelayOutcome::default();

    let result = {
        let upstream = pipe(&mut client_read, &mut backend_write, &mut outcome.client_to_backend);
        let downstream = pipe(&mut backend_read, &mut client_write, &mut outcome.backend_to_client);
        tokio::select! {
            r = upstream => r,
            r = downstream => r,
        }
    };
    outcome.error = result.err();

    // Shutdown is idempotent; the halves drop right after.
    let _ = backend_write.shutdown().await;
    let _ = client_write.shutdown().await;
    outcome
}

async fn pipe<R, W>(reader: &mut R, writer: &mut W, copied: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        *copied += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::duplex;

    fn request(connection: &str, upgrade: &str) -> Request<()> {
        Request::builder()
            .uri("/ws")
            .header(header::CONNECTION, connection)
            .header(header::UPGRADE, upgrade)
            .body(())
            .unwrap()
    }

    #[test]
    fn detects_upgrade_requests() {
        assert!(is_websocket_upgrade(&request("Upgrade", "websocket")));
        assert!(is_websocket_upgrade(&request("keep-alive, upgrade", "WebSocket")));
        assert!(is_websocket_upgrade(&request("UPGRADE", "WEBSOCKET")));
    }

    #[test]
    fn ignores_non_upgrade_requests() {
        assert!(!is_websocket_upgrade(&request("keep-alive", "websocket")));
        assert!(!is_websocket_upgrade(&request("upgrade", "h2c")));
        let plain = Request::builder().uri("/ws").body(()).unwrap();
        assert!(!is_websocket_upgrade(&plain));
    }

    #[tokio::test]
    async fn relay_copies_both_ways_and_ends_when_one_side_closes() {
        let (client, mut client_peer) = duplex(1024);
        let (backend, mut backend_peer) = duplex(1024);
        let relay = tokio::spawn(relay(client, backend));

        client_peer.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        backend_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        backend_peer.write_all(b"pong!").await.unwrap();
        let mut buf = [0u8; 5];
        client_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong!");

        drop(backend_peer);
        let outcome = tokio::time::timeout(Duration::from_secs(2), relay)
            .await
            .expect("relay did not terminate")
            .unwrap();
        assert_eq!(outcome.client_to_backend, 4);
        assert_eq!(outcome.backend_to_client, 5);

        // The client side was closed too.
        let mut rest = Vec::new();
        client_peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}

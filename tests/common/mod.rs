//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::Router;
use forwarder::config::ProxyConfig;
use forwarder::forward::{ClientInfo, ForwardEvent, ForwardLogger, ForwardTarget, Forwarder};
use forwarder::{HttpServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Serve an axum app on an ephemeral port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

/// Put `forwarder` in front of `target`: every request goes there.
pub async fn start_forwarder(forwarder: Forwarder, target: &str) -> SocketAddr {
    let target: ForwardTarget = target.parse().unwrap();
    let app = Router::new().fallback(
        move |ConnectInfo(peer): ConnectInfo<SocketAddr>, mut req: Request<Body>| {
            let forwarder = forwarder.clone();
            let target = target.clone();
            async move {
                req.extensions_mut().insert(target);
                req.extensions_mut()
                    .insert(ClientInfo::new(peer.to_string(), false));
                forwarder.forward(req).await
            }
        },
    );
    serve(app).await
}

/// Run a full `HttpServer` from configuration.
pub async fn start_proxy(config: ProxyConfig) -> (SocketAddr, Shutdown) {
    let server = HttpServer::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, receiver).await;
    });
    (addr, shutdown)
}

/// Start a backend that hands every accepted socket to `handler`.
pub async fn start_raw_backend<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(handler(socket));
        }
    });
    addr
}

/// Start a backend that reads a request head and writes `response` verbatim.
pub async fn start_fixed_backend(response: &'static str) -> SocketAddr {
    start_raw_backend(move |mut socket| async move {
        read_head(&mut socket).await;
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    })
    .await
}

/// Read up to and including the blank line ending an HTTP head.
pub async fn read_head(socket: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match socket.read(&mut byte).await {
            Ok(0) | Err(_) => break,
            Ok(_) => head.push(byte[0]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Send a raw request and read the whole response (the request should
/// carry `Connection: close`).
pub async fn raw_exchange(addr: SocketAddr, request: &str) -> String {
    let mut socket = TcpStream::connect(addr).await.unwrap();
    socket.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), socket.read_to_end(&mut response))
        .await
        .expect("response not finished in time")
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

/// HTTP client that never pools or uses system proxies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Logger that keeps the rendered events.
#[derive(Clone, Default)]
pub struct RecordingLogger {
    pub lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingLogger {
    pub fn contains(&self, needle: &str) -> bool {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .any(|line| line.contains(needle))
    }
}

impl ForwardLogger for RecordingLogger {
    fn log(&self, event: &ForwardEvent<'_>) {
        self.lines.lock().unwrap().push(event.to_string());
    }
}

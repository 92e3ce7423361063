//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum application around the forwarder
//! - Wire up middleware (tracing, request ID)
//! - Resolve the route and attach `ForwardTarget` / `ClientInfo`
//! - Serve over plain TCP or TLS with graceful shutdown

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::forward::{ClientInfo, Forwarder, TargetError};
use crate::lifecycle::ShutdownSignal;
use crate::net::tls::load_tls_config;
use crate::routing::Router as ProxyRouter;

/// In-flight requests get this long to finish once shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ProxyRouter>,
    pub forwarder: Forwarder,
    /// Whether connections reaching this app are TLS-terminated here.
    pub tls: bool,
}

/// HTTP server for the forwarder.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a server whose forwarder is built from `config`.
    pub fn new(config: ProxyConfig) -> Result<Self, TargetError> {
        let forwarder = forwarder_from_config(&config);
        Self::with_forwarder(config, forwarder)
    }

    /// Create a server around an already built forwarder.
    pub fn with_forwarder(config: ProxyConfig, forwarder: Forwarder) -> Result<Self, TargetError> {
        let state = AppState {
            router: Arc::new(ProxyRouter::new(&config.routes)?),
            forwarder,
            tls: config.listener.tls.is_some(),
        };
        let router = Self::build_router(state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The application without a listener, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        match &self.config.listener.tls {
            None => {
                tracing::info!(address = %addr, "HTTP server starting");
                axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown.wait())
                    .await?;
            }
            Some(tls) => {
                let rustls =
                    load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
                tracing::info!(address = %addr, "HTTPS server starting");

                let handle = axum_server::Handle::new();
                let drain = handle.clone();
                tokio::spawn(async move {
                    shutdown.wait().await;
                    drain.graceful_shutdown(Some(DRAIN_TIMEOUT));
                });

                axum_server::from_tcp_rustls(listener.into_std()?, rustls)
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the forwarder described by the `[forward]`, `[timeouts]` and
/// `[streaming]` sections.
pub fn forwarder_from_config(config: &ProxyConfig) -> Forwarder {
    Forwarder::builder()
        .rewrite_policy(config.forward.rewrite_policy())
        .pass_host_header(config.forward.pass_host_header)
        .transport_config(config.transport_config())
        .streaming(config.streaming_config())
        .build()
}

/// Main proxy handler.
/// Looks up the route, attaches the target and client facts, forwards.
async fn proxy_handler(State(state): State<AppState>, mut request: Request<Body>) -> Response {
    let Some(route) = state.router.route(&request) else {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "No route matched"
        );
        return (StatusCode::NOT_FOUND, "No matching route found").into_response();
    };

    let target = route.target.clone();
    tracing::trace!(route = %route.name, backend = %target, "Route matched");

    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();
    request.extensions_mut().insert(target);
    request
        .extensions_mut()
        .insert(ClientInfo::new(remote_addr, state.tls));

    state.forwarder.forward(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use tower::ServiceExt;

    #[tokio::test]
    async fn unmatched_request_is_404() {
        let mut config = ProxyConfig::default();
        config.routes = vec![RouteConfig {
            name: "api".into(),
            host: Some("api.example.com".into()),
            path_prefix: None,
            target: "http://127.0.0.1:9".into(),
            priority: 0,
        }];
        let server = HttpServer::new(config).unwrap();

        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("host", "other.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn unreachable_backend_is_502() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut config = ProxyConfig::default();
        config.routes = vec![RouteConfig {
            name: "down".into(),
            host: None,
            path_prefix: None,
            target: format!("http://{addr}"),
            priority: 0,
        }];
        let server = HttpServer::new(config).unwrap();

        let response = server
            .router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn invalid_route_target_is_rejected() {
        let mut config = ProxyConfig::default();
        config.routes = vec![RouteConfig {
            name: "bad".into(),
            host: None,
            path_prefix: None,
            target: "not a url".into(),
            priority: 0,
        }];
        assert!(HttpServer::new(config).is_err());
    }
}

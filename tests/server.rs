//! End-to-end: configuration → HttpServer → routing → forwarder.

use axum::extract::ws::WebSocketUpgrade;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::Router;
use forwarder::config::{ProxyConfig, RouteConfig};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

mod common;

fn route(name: &str, host: Option<&str>, prefix: Option<&str>, target: String, priority: u32) -> RouteConfig {
    RouteConfig {
        name: name.into(),
        host: host.map(Into::into),
        path_prefix: prefix.map(Into::into),
        target,
        priority,
    }
}

#[tokio::test]
async fn routes_pick_the_backend() {
    let api = common::serve(Router::new().fallback(|| async { "api" })).await;
    let web = common::serve(Router::new().fallback(|| async { "web" })).await;

    let mut config = ProxyConfig::default();
    config.routes = vec![
        route("web", None, None, format!("http://{web}"), 0),
        route("api", None, Some("/api"), format!("http://{api}"), 10),
        route("admin", Some("admin.internal"), None, format!("http://{api}"), 20),
    ];
    let (proxy, shutdown) = common::start_proxy(config).await;
    let client = common::client();

    let body = client
        .get(format!("http://{proxy}/api/users"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "api");

    let body = client
        .get(format!("http://{proxy}/index.html"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "web");

    let body = client
        .get(format!("http://{proxy}/"))
        .header("Host", "admin.internal")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "api");

    shutdown.trigger();
}

#[tokio::test]
async fn unmatched_request_is_404() {
    let mut config = ProxyConfig::default();
    config.routes = vec![route(
        "only",
        Some("only.example"),
        None,
        "http://127.0.0.1:9".into(),
        0,
    )];
    let (proxy, shutdown) = common::start_proxy(config).await;

    let res = common::client()
        .get(format!("http://{proxy}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    assert!(res.headers().contains_key("x-request-id"));

    shutdown.trigger();
}

#[tokio::test]
async fn configured_forward_policy_applies() {
    let backend = common::serve(Router::new().fallback(|headers: HeaderMap| async move {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
                .to_string()
        };
        format!("{}|{}|{}", get("host"), get("x-forwarded-for"), get("x-forwarded-server"))
    }))
    .await;

    let mut config = ProxyConfig::default();
    config.forward.trust_forward_header = true;
    config.forward.hostname = Some("edge-7".into());
    config.forward.pass_host_header = true;
    config.routes = vec![route("all", None, None, format!("http://{backend}"), 0)];
    let (proxy, shutdown) = common::start_proxy(config).await;

    let body = common::client()
        .get(format!("http://{proxy}/"))
        .header("Host", "public.example")
        .header("X-Forwarded-For", "203.0.113.9")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "public.example|203.0.113.9, 127.0.0.1|edge-7");

    shutdown.trigger();
}

#[tokio::test]
async fn websocket_through_server() {
    let backend = common::serve(Router::new().route(
        "/chat",
        get(|ws: WebSocketUpgrade| async move {
            ws.on_upgrade(|mut socket| async move {
                while let Some(Ok(msg)) = socket.recv().await {
                    if socket.send(msg).await.is_err() {
                        break;
                    }
                }
            })
        }),
    ))
    .await;

    let mut config = ProxyConfig::default();
    config.routes = vec![route("chat", None, Some("/chat"), format!("ws://{backend}"), 0)];
    let (proxy, shutdown) = common::start_proxy(config).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{proxy}/chat"))
        .await
        .unwrap();
    ws.send(Message::text("ping")).await.unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    assert_eq!(reply.to_text().unwrap(), "ping");

    shutdown.trigger();
}

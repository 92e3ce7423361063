//! Forwarding reverse proxy library.
//!
//! The `forward` module is the core: given a request that already carries
//! its backend (`ForwardTarget`) it rewrites forwarding headers, relays the
//! exchange and tunnels WebSocket upgrades. Everything else wires it into a
//! runnable server.

pub mod config;
pub mod forward;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use forward::{Forwarder, ForwarderBuilder};
pub use http::HttpServer;
pub use lifecycle::Shutdown;

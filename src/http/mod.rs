//! HTTP front end.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → routing (pick ForwardTarget)
//!     → forward::Forwarder (HTTP round trip or WebSocket tunnel)
//!     → Send to client
//! ```

pub mod server;

pub use server::{forwarder_from_config, AppState, HttpServer};

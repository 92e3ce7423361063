//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Forwarder ─ ForwardEvent ─→ TracingLogger ─┐
//! tower-http TraceLayer ─────────────────────┼─→ tracing subscriber (logging.rs)
//! server / lifecycle ────────────────────────┘
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event
//! - Request ID (`x-request-id`) is set at the edge and propagated

pub mod logging;

pub use logging::init_logging;

//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → tls.rs (optional TLS termination material)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - TLS is optional and handled transparently; the forwarder only sees a
//!   `tls` flag on `ClientInfo`
//! - Certificates are parsed up front so bad files fail at startup

pub mod tls;

//! Routing subsystem.
//!
//! Picks the backend for a request before the forwarder sees it. The
//! forwarder itself never routes; it only reads the `ForwardTarget` the
//! router attached.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched Route (with ForwardTarget) or None
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Parse targets
//!     → Sort by priority
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - First match wins (ordered by priority)

pub mod matcher;
pub mod router;

pub use router::{Route, Router};

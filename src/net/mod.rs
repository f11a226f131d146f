//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (connection id, request counter, lifecycle tracking)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Request counters belong to exactly one connection

pub mod connection;
pub mod listener;

pub use connection::{ConnectionId, ConnectionInfo, ConnectionMakeService, ConnectionTracker};
pub use listener::{BoundedListener, ListenerError};

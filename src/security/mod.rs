//! Connection-level protections.
//!
//! # Data Flow
//! ```text
//! request (with ConnectionInfo)
//!     → limits.rs (count reached? mark ForcedClose)
//!     → handler
//!     → limits.rs stamps Connection: close through headers.rs
//!     → headers.rs refuses any later attempt to keep the connection open
//! ```

pub mod headers;
pub mod limits;

pub use headers::{HeaderConflict, ResponseHeaders};
pub use limits::{
    ConnectionRequestLimiter, ConnectionRequestLimiterLayer, ForcedClose, LimitError,
    RequestLimitPolicy,
};

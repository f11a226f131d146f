//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! accepted connection (net)
//!     → server.rs (middleware stack, serve loop, reloads)
//!     → request.rs (request id, request span)
//!     → rewrite rules, then route selection
//!     → handlers.rs / forms.rs / websocket.rs / static files
//! ```

pub mod forms;
pub mod handlers;
pub mod request;
pub mod server;
pub mod websocket;

pub use request::{MakeRequestUuid, RequestIdExt, X_REQUEST_ID};
pub use server::{HttpServer, ServerError};

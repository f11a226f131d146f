//! HTTP server that caps the number of requests served on each persistent
//! connection, with an ordered rewrite rule engine in front of a set of demo
//! endpoints.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod rewrite;
pub mod security;

pub use config::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;

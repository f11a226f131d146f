//! Request identity.
//!
//! Every request gets an `x-request-id` (kept if the client sent one) that is
//! echoed on the response and recorded on the request span together with the
//! connection id and the request's position on its connection.

use axum::http::{HeaderName, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::Span;
use uuid::Uuid;

use crate::net::ConnectionInfo;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Generates UUID v4 request ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        id.parse().ok().map(RequestId::new)
    }
}

/// Read the request id assigned to a request.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&str>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&str> {
        self.extensions()
            .get::<RequestId>()
            .and_then(|id| id.header_value().to_str().ok())
            .or_else(|| {
                self.headers()
                    .get(&X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
            })
    }
}

/// Span for `TraceLayer`, carrying request and connection identity.
pub fn make_span<B>(request: &Request<B>) -> Span {
    let connection = request.extensions().get::<ConnectionInfo>();
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        version = ?request.version(),
        request_id = request.request_id().unwrap_or("-"),
        connection_id = %connection.map(|c| c.id().to_string()).unwrap_or_default(),
        requests = connection.map(|c| c.requests()).unwrap_or(0),
    )
}

//! Per-connection request limits.
//!
//! After a persistent connection has carried `max_requests` requests, every
//! further response on it is stamped with `Connection: close`, so hyper closes
//! the connection once that response has been flushed. Only HTTP/1.x is
//! affected: HTTP/2 and later multiplex streams over a connection whose
//! lifetime no single response header controls.
//!
//! The counter itself lives on [`ConnectionInfo`] and is advanced by the
//! transport layer; this module only reads it.
//!
//! A request that reaches the limit may not switch protocols: its upgrade
//! handle is withheld, so a WebSocket handshake on an exhausted connection is
//! refused instead of outliving the `Connection: close` response.

use std::future::Future;
use std::num::NonZeroU64;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, StatusCode, Version},
    response::{IntoResponse, Response},
};
use hyper::upgrade::OnUpgrade;
use thiserror::Error;
use tower::{Layer, Service};

use crate::net::{ConnectionId, ConnectionInfo};
use crate::observability::metrics;
use crate::security::headers::{HeaderConflict, ResponseHeaders};

/// Error constructing a [`RequestLimitPolicy`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LimitError {
    #[error("max_requests must be positive, got {0}")]
    NonPositiveMaxRequests(i64),
}

/// Maximum number of requests served on one HTTP/1.x connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimitPolicy {
    max_requests: NonZeroU64,
}

impl RequestLimitPolicy {
    pub fn new(max_requests: i64) -> Result<Self, LimitError> {
        u64::try_from(max_requests)
            .ok()
            .and_then(NonZeroU64::new)
            .map(|max_requests| Self { max_requests })
            .ok_or(LimitError::NonPositiveMaxRequests(max_requests))
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests.get()
    }

    /// Whether a request that is the `requests`-th on its connection must
    /// close the connection.
    pub fn should_force_close(&self, version: Version, requests: u64) -> bool {
        supports_connection_header(version) && requests >= self.max_requests.get()
    }
}

/// Versions that negotiate connection persistence per response.
fn supports_connection_header(version: Version) -> bool {
    matches!(
        version,
        Version::HTTP_09 | Version::HTTP_10 | Version::HTTP_11
    )
}

/// Marker inserted into the request extensions when the limiter has decided
/// to close the connection after this exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForcedClose {
    pub connection_id: ConnectionId,
    pub requests: u64,
}

impl ForcedClose {
    /// Stamp `Connection: close` on the response, or turn it into a 500 when a
    /// downstream writer already asked for the connection to stay open.
    pub fn apply(self, response: Response) -> Response {
        let (mut parts, body) = response.into_parts();
        let mut headers = ResponseHeaders::new(&mut parts.headers);

        match headers.force_close() {
            Ok(()) => {
                tracing::debug!(
                    connection_id = %self.connection_id,
                    requests = self.requests,
                    "Setting [Connection: close]"
                );
                metrics::record_forced_close();
                Response::from_parts(parts, body)
            }
            Err(conflict) => self.conflict_response(conflict),
        }
    }

    fn conflict_response(self, conflict: HeaderConflict) -> Response {
        tracing::error!(
            connection_id = %self.connection_id,
            requests = self.requests,
            attempted = %conflict.attempted,
            "Response handler tried to keep a limited connection open"
        );
        metrics::record_header_conflict();

        let mut response = (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Connection count exceeded, close is forced",
        )
            .into_response();
        response
            .headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
        response
    }
}

/// Layer installing [`ConnectionRequestLimiter`].
#[derive(Debug, Clone, Copy)]
pub struct ConnectionRequestLimiterLayer {
    policy: RequestLimitPolicy,
}

impl ConnectionRequestLimiterLayer {
    pub fn new(policy: RequestLimitPolicy) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for ConnectionRequestLimiterLayer {
    type Service = ConnectionRequestLimiter<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ConnectionRequestLimiter {
            inner,
            policy: self.policy,
        }
    }
}

/// Response-decorating middleware enforcing [`RequestLimitPolicy`].
#[derive(Debug, Clone)]
pub struct ConnectionRequestLimiter<S> {
    inner: S,
    policy: RequestLimitPolicy,
}

impl<S> ConnectionRequestLimiter<S> {
    fn decide(&self, request: &Request<Body>) -> Option<ForcedClose> {
        let info = request.extensions().get::<ConnectionInfo>()?;
        let requests = info.requests();
        self.policy
            .should_force_close(request.version(), requests)
            .then(|| ForcedClose {
                connection_id: info.id(),
                requests,
            })
    }
}

impl<S> Service<Request<Body>> for ConnectionRequestLimiter<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let forced = self.decide(&request);
        if let Some(forced) = forced {
            if request.extensions_mut().remove::<OnUpgrade>().is_some() {
                tracing::debug!(
                    connection_id = %forced.connection_id,
                    requests = forced.requests,
                    "Refusing protocol upgrade on a closing connection"
                );
            }
            request.extensions_mut().insert(forced);
        }

        let future = self.inner.call(request);
        Box::pin(async move {
            let response = future.await?;
            Ok(match forced {
                Some(forced) => forced.apply(response),
                None => response,
            })
        })
    }
}

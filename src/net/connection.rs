//! Connection identity, request counting and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count requests received on each persistent connection
//! - Track active connections for graceful shutdown and metrics
//! - Attach connection metadata to every request it carries

use std::convert::Infallible;
use std::future::{ready, Ready};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::serve::IncomingStream;
use tower::Service;

use crate::net::listener::BoundedListener;
use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Metadata for one accepted transport connection.
///
/// Cloned into the extensions of every request carried by the connection.
/// The request counter is shared by all clones and only ever increases; it is
/// bumped by [`ConnectionService`] when a request arrives and read by the
/// middleware stack.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    id: ConnectionId,
    peer_addr: SocketAddr,
    requests: Arc<AtomicU64>,
    _guard: Option<Arc<ConnectionGuard>>,
}

impl ConnectionInfo {
    /// Create metadata for a connection that is not registered with a tracker.
    pub fn new(peer_addr: SocketAddr) -> Self {
        Self {
            id: ConnectionId::new(),
            peer_addr,
            requests: Arc::new(AtomicU64::new(0)),
            _guard: None,
        }
    }

    fn tracked(peer_addr: SocketAddr, guard: ConnectionGuard) -> Self {
        Self {
            id: guard.id(),
            peer_addr,
            requests: Arc::new(AtomicU64::new(0)),
            _guard: Some(Arc::new(guard)),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Number of requests received on this connection so far, including the
    /// one currently being handled.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Acquire)
    }

    /// Record a newly received request and return the updated count.
    pub fn record_request(&self) -> u64 {
        self.requests.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Tracks active connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    /// Current count of active connections.
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        let active = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_active_connections(active);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all connections are closed.
    pub async fn wait_for_idle(&self) {
        while self.active_count.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let active = self.active_count.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::record_active_connections(active);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// Builds one [`ConnectionService`] per accepted connection.
///
/// Handed to `axum::serve` in place of `Router::into_make_service`.
#[derive(Clone)]
pub struct ConnectionMakeService<S> {
    inner: S,
    tracker: ConnectionTracker,
}

impl<S> ConnectionMakeService<S> {
    pub fn new(inner: S, tracker: ConnectionTracker) -> Self {
        Self { inner, tracker }
    }
}

impl<S> Service<IncomingStream<'_, BoundedListener>> for ConnectionMakeService<S>
where
    S: Clone,
{
    type Response = ConnectionService<S>;
    type Error = Infallible;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, stream: IncomingStream<'_, BoundedListener>) -> Self::Future {
        let info = ConnectionInfo::tracked(*stream.remote_addr(), self.tracker.track());
        tracing::debug!(
            connection_id = %info.id(),
            peer_addr = %info.peer_addr(),
            "Connection opened"
        );
        ready(Ok(ConnectionService::new(self.inner.clone(), info)))
    }
}

/// Per-connection service: counts each request and attaches [`ConnectionInfo`].
#[derive(Clone)]
pub struct ConnectionService<S> {
    inner: S,
    info: ConnectionInfo,
}

impl<S> ConnectionService<S> {
    pub fn new(inner: S, info: ConnectionInfo) -> Self {
        Self { inner, info }
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }
}

impl<S, B> Service<Request<B>> for ConnectionService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        let requests = self.info.record_request();
        tracing::trace!(connection_id = %self.info.id(), requests, "Request received");
        request.extensions_mut().insert(self.info.clone());
        self.inner.call(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use tower::ServiceExt;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn connection_tracker_counts() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track();
        assert_eq!(tracker.active_count(), 1);

        let guard2 = tracker.track();
        assert_eq!(tracker.active_count(), 2);

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn tracked_connection_released_with_last_clone() {
        let tracker = ConnectionTracker::new();
        let info = ConnectionInfo::tracked(peer(), tracker.track());
        let copy = info.clone();
        drop(info);
        assert_eq!(tracker.active_count(), 1);
        drop(copy);
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn fresh_connection_starts_at_zero() {
        let first = ConnectionInfo::new(peer());
        first.record_request();
        first.record_request();

        let second = ConnectionInfo::new(peer());
        assert_eq!(first.requests(), 2);
        assert_eq!(second.requests(), 0);
    }

    #[tokio::test]
    async fn service_counts_and_attaches_info() {
        let inner = tower::service_fn(|req: Request<Body>| async move {
            let info = req.extensions().get::<ConnectionInfo>().cloned();
            Ok::<_, Infallible>(info.map(|i| i.requests()))
        });
        let service = ConnectionService::new(inner, ConnectionInfo::new(peer()));

        for expected in 1..=3u64 {
            let seen = service
                .clone()
                .oneshot(Request::new(Body::empty()))
                .await
                .unwrap();
            assert_eq!(seen, Some(expected));
        }
        assert_eq!(service.info().requests(), 3);
    }
}

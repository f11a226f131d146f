//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the Axum router with the demo handlers
//! - Wire up middleware (request id, tracing, request log, limiter, timeout)
//! - Serve HTTP/1.1 and HTTP/2 over the bounded listener
//! - Swap in new rewrite rules when a reloaded config arrives

use std::io;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    middleware,
    routing::{any, get, post},
    Router,
};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tower::{Layer, ServiceBuilder};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::http::{forms, handlers, request, websocket};
use crate::net::{BoundedListener, ConnectionMakeService, ConnectionTracker};
use crate::observability::request_log::{request_log_middleware, RequestLog};
use crate::rewrite::{RewriteLayer, RuleError, RuleSet, RuleSetHandle};
use crate::security::limits::{ConnectionRequestLimiterLayer, LimitError, RequestLimitPolicy};

/// Error building an [`HttpServer`].
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid request limit: {0}")]
    Limit(#[from] LimitError),

    #[error("invalid rewrite rules: {0}")]
    Rules(#[from] RuleError),
}

/// The demo HTTP server.
pub struct HttpServer {
    config: ServerConfig,
    policy: Option<RequestLimitPolicy>,
    rules: RuleSetHandle,
    connections: ConnectionTracker,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let policy = config
            .limits
            .max_requests_per_connection
            .map(RequestLimitPolicy::new)
            .transpose()?;
        let rules = RuleSet::from_config(&config.rewrite.rules, config.listener.secure_port)?;

        match policy {
            Some(policy) => tracing::info!(
                max_requests = policy.max_requests(),
                "Connection request limit enabled"
            ),
            None => tracing::info!("Connection request limit disabled"),
        }

        Ok(Self {
            config,
            policy,
            rules: Arc::new(ArcSwap::from_pointee(rules)),
            connections: ConnectionTracker::new(),
        })
    }

    /// Handle to the active rule set.
    pub fn rules_handle(&self) -> RuleSetHandle {
        Arc::clone(&self.rules)
    }

    pub fn connections(&self) -> &ConnectionTracker {
        &self.connections
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Rewrite rules wrap the route table itself so rewritten URIs are
    /// routed; everything else wraps the result.
    #[allow(deprecated)]
    pub fn router(&self, request_log: Option<RequestLog>) -> Router {
        let mut routes = Router::new()
            .route("/", get(handlers::hello))
            .route("/dump", any(handlers::dump))
            .route("/dump/{*path}", any(handlers::dump))
            .route("/bogus", any(handlers::bogus))
            .route("/bogus/{*path}", any(handlers::bogus))
            .route("/form/query", get(forms::query))
            .route("/form/urlencoded", post(forms::urlencoded))
            .route("/form/multipart", post(forms::multipart))
            .route("/ws/echo", get(websocket::echo))
            .route("/ws/time", get(websocket::time));

        if let Some(root) = &self.config.static_files.root {
            tracing::info!(root = %root.display(), "Serving static files");
            routes = routes.fallback_service(ServeDir::new(root).append_index_html_on_directories(true));
        }

        let routes = routes.layer(RequestBodyLimitLayer::new(self.config.limits.max_body_bytes));
        let rewritten = RewriteLayer::new(self.rules_handle()).layer(routes);

        Router::new().fallback_service(rewritten).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    request::X_REQUEST_ID,
                    request::MakeRequestUuid,
                ))
                .layer(TraceLayer::new_for_http().make_span_with(request::make_span::<Body>))
                .layer(PropagateRequestIdLayer::new(request::X_REQUEST_ID))
                .layer(middleware::from_fn_with_state(
                    request_log,
                    request_log_middleware,
                ))
                .option_layer(self.policy.map(ConnectionRequestLimiterLayer::new))
                .layer(TimeoutLayer::new(Duration::from_secs(
                    self.config.timeouts.request_secs,
                ))),
        )
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configs received on `config_updates` replace the rewrite rules; an
    /// invalid rule set is logged and the current one kept.
    pub async fn run(
        self,
        listener: BoundedListener,
        config_updates: mpsc::UnboundedReceiver<ServerConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> io::Result<()> {
        let addr = axum::serve::Listener::local_addr(&listener)?;
        tracing::info!(
            address = %addr,
            max_connections = listener.max_connections(),
            "HTTP server starting"
        );

        let request_log = RequestLog::from_config(&self.config.request_log).await?;
        let app = ConnectionMakeService::new(self.router(request_log), self.connections.clone());

        let reload = tokio::spawn(apply_reloads(
            self.config.clone(),
            self.rules_handle(),
            config_updates,
        ));

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        reload.abort();
        tracing::info!(
            active_connections = self.connections.active_count(),
            "HTTP server stopped"
        );
        Ok(())
    }
}

async fn apply_reloads(
    current: ServerConfig,
    rules: RuleSetHandle,
    mut updates: mpsc::UnboundedReceiver<ServerConfig>,
) {
    while let Some(update) = updates.recv().await {
        reload(&current, &rules, &update);
    }
}

fn reload(current: &ServerConfig, rules: &RuleSetHandle, update: &ServerConfig) {
    match RuleSet::from_config(&update.rewrite.rules, update.listener.secure_port) {
        Ok(set) => {
            tracing::info!(rules = set.len(), "Rewrite rules reloaded");
            rules.store(Arc::new(set));
        }
        Err(e) => {
            tracing::error!(error = %e, "Rejected reloaded rewrite rules, keeping current set");
        }
    }

    if update.limits.max_requests_per_connection != current.limits.max_requests_per_connection {
        tracing::warn!(
            current = ?current.limits.max_requests_per_connection,
            requested = ?update.limits.max_requests_per_connection,
            "Request limit changes take effect after restart"
        );
    }
    if update.listener.bind_address != current.listener.bind_address {
        tracing::warn!("Listener changes take effect after restart");
    }
}

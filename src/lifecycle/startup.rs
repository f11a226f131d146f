//! Startup orchestration.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::{ConfigWatcher, ServerConfig};
use crate::http::{HttpServer, ServerError};
use crate::lifecycle::{signals, Shutdown};
use crate::net::{BoundedListener, ListenerError};
use crate::observability::{logging, metrics};

/// Fatal startup failure.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("metrics exporter: {0}")]
    Metrics(String),

    #[error("config watcher: {0}")]
    Watcher(#[from] notify::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Initialize every subsystem and serve until a shutdown signal.
///
/// `watch` names the config file to follow for rule reloads.
pub async fn start(config: ServerConfig, watch: Option<PathBuf>) -> Result<(), StartupError> {
    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "limited-server starting");

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|e: std::net::AddrParseError| StartupError::Metrics(e.to_string()))?;
        metrics::init_metrics(addr).map_err(|e| StartupError::Metrics(e.to_string()))?;
    }

    let listener_config = config.listener.clone();
    let server = HttpServer::new(config)?;
    let listener = BoundedListener::bind(&listener_config).await?;

    // The watcher must outlive the server; dropping it stops notifications.
    let (_watcher, updates) = match watch {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(&path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, updates, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

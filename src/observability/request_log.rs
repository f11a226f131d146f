//! Access logging in Extended NCSA format.
//!
//! Each completed exchange produces one line:
//! ```text
//! 127.0.0.1 - - [19/Oct/2026:10:00:00 +0000] "GET /index.html HTTP/1.1" 200 1043 "-" "curl/8.5.0"
//! ```
//! Lines go either to an append-only file (written by a single background
//! task) or to the `request_log` tracing target.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use axum::{
    body::HttpBody,
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri, Version},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;

use crate::config::schema::RequestLogConfig;
use crate::net::ConnectionInfo;
use crate::observability::metrics;

/// Everything needed to render one access log line.
#[derive(Debug, Clone)]
pub struct AccessRecord {
    pub client: Option<String>,
    pub time: DateTime<Utc>,
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub status: StatusCode,
    pub bytes: Option<u64>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
}

impl AccessRecord {
    /// Render as an Extended NCSA line (no trailing newline).
    pub fn to_extended_ncsa(&self) -> String {
        let target = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        format!(
            "{client} - - [{time}] \"{method} {target} {version:?}\" {status} {bytes} \"{referer}\" \"{agent}\"",
            client = self.client.as_deref().unwrap_or("-"),
            time = self.time.format("%d/%b/%Y:%H:%M:%S %z"),
            method = self.method,
            version = self.version,
            status = self.status.as_u16(),
            bytes = self
                .bytes
                .map(|b| b.to_string())
                .unwrap_or_else(|| "-".to_string()),
            referer = self.referer.as_deref().unwrap_or("-"),
            agent = self.user_agent.as_deref().unwrap_or("-"),
        )
    }
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[derive(Clone)]
enum Sink {
    File(mpsc::UnboundedSender<String>),
    Tracing,
}

/// Handle to the request log; cheap to clone.
#[derive(Clone)]
pub struct RequestLog {
    sink: Sink,
}

impl RequestLog {
    /// Log through the `request_log` tracing target.
    pub fn to_tracing() -> Self {
        Self {
            sink: Sink::Tracing,
        }
    }

    /// Open (or create) a log file and spawn the writer task.
    pub async fn to_file(path: &Path, append: bool) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let file = options.open(path).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_lines(BufWriter::new(file), rx, path.to_path_buf()));

        tracing::info!(path = %path.display(), append, "Request log opened");
        Ok(Self {
            sink: Sink::File(tx),
        })
    }

    /// Build the request log described by the configuration, if enabled.
    pub async fn from_config(config: &RequestLogConfig) -> io::Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        match &config.path {
            Some(path) => Self::to_file(path, config.append).await.map(Some),
            None => Ok(Some(Self::to_tracing())),
        }
    }

    pub fn log(&self, record: &AccessRecord) {
        let line = record.to_extended_ncsa();
        match &self.sink {
            Sink::File(tx) => {
                if tx.send(line).is_err() {
                    tracing::warn!("Request log writer has stopped");
                }
            }
            Sink::Tracing => tracing::info!(target: "request_log", "{}", line),
        }
    }
}

async fn write_lines(
    mut writer: BufWriter<tokio::fs::File>,
    mut rx: mpsc::UnboundedReceiver<String>,
    path: PathBuf,
) {
    while let Some(line) = rx.recv().await {
        let mut batch = vec![line];
        while let Ok(line) = rx.try_recv() {
            batch.push(line);
        }

        for line in batch {
            if let Err(e) = write_line(&mut writer, &line).await {
                tracing::error!(path = %path.display(), error = %e, "Failed to write request log");
            }
        }
        if let Err(e) = writer.flush().await {
            tracing::error!(path = %path.display(), error = %e, "Failed to flush request log");
        }
    }
}

async fn write_line(writer: &mut BufWriter<tokio::fs::File>, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}

/// Middleware recording request metrics for every exchange, and an access
/// log line when a request log is configured.
pub async fn request_log_middleware(
    State(log): State<Option<RequestLog>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let time = Utc::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();
    let client = request
        .extensions()
        .get::<ConnectionInfo>()
        .map(|info| info.peer_addr().ip().to_string());
    let referer = header_string(request.headers(), header::REFERER);
    let user_agent = header_string(request.headers(), header::USER_AGENT);

    let response = next.run(request).await;

    let bytes = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .or_else(|| response.body().size_hint().exact());

    metrics::record_request(method.as_str(), response.status().as_u16(), start);

    let Some(log) = log else {
        return response;
    };
    log.log(&AccessRecord {
        client,
        time,
        method,
        uri,
        version,
        status: response.status(),
        bytes,
        referer,
        user_agent,
    });

    response
}

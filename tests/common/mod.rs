//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, Request, StatusCode};
use http_body_util::{BodyExt, Empty};
use hyper::client::conn::http1::SendRequest;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use limited_server::config::ServerConfig;
use limited_server::http::HttpServer;
use limited_server::lifecycle::Shutdown;
use limited_server::net::{BoundedListener, ConnectionTracker};

/// A server running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub reload: mpsc::UnboundedSender<ServerConfig>,
    pub connections: ConnectionTracker,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the serve loop to return.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

pub fn config(toml_config: &str) -> ServerConfig {
    toml::from_str(toml_config).unwrap()
}

pub async fn spawn_server(config: ServerConfig) -> TestServer {
    let server = HttpServer::new(config).unwrap();
    let connections = server.connections().clone();

    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let listener = BoundedListener::from_tcp(tcp, 64);

    let shutdown = Shutdown::new();
    let (reload, updates) = mpsc::unbounded_channel();
    let handle = tokio::spawn(server.run(listener, updates, shutdown.subscribe()));

    TestServer {
        addr,
        shutdown,
        reload,
        connections,
        handle,
    }
}

/// One persistent HTTP/1.1 client connection.
pub struct Http1Connection {
    sender: SendRequest<Empty<Bytes>>,
    conn: JoinHandle<()>,
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl Reply {
    pub fn connection_header(&self) -> Option<&str> {
        self.headers
            .get(header::CONNECTION)
            .and_then(|v| v.to_str().ok())
    }
}

impl Http1Connection {
    pub async fn open(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        let conn = tokio::spawn(async move {
            let _ = conn.await;
        });
        Self { sender, conn }
    }

    pub async fn get(&mut self, path: &str) -> Reply {
        self.get_with(path, &[]).await
    }

    pub async fn get_with(&mut self, path: &str, headers: &[(&str, &str)]) -> Reply {
        let mut builder = Request::get(path);
        if !headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("host")) {
            builder = builder.header(header::HOST, "localhost");
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Empty::<Bytes>::new()).unwrap();

        self.sender.ready().await.unwrap();
        let response = self.sender.send_request(request).await.unwrap();
        let (parts, body) = response.into_parts();
        let body = body.collect().await.unwrap().to_bytes();

        Reply {
            status: parts.status,
            headers: parts.headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        }
    }

    /// Whether the server has closed the connection.
    pub async fn closed_by_server(self) -> bool {
        let Self { sender, conn } = self;
        // Holding the sender keeps the client side from closing first.
        let closed = tokio::time::timeout(Duration::from_secs(2), conn)
            .await
            .is_ok();
        drop(sender);
        closed
    }
}

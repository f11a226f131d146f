//! Plain HTTP demo endpoints.

use std::fmt::Write;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::IntoResponse,
};

use crate::http::request::RequestIdExt;
use crate::net::ConnectionInfo;
use crate::security::limits::ForcedClose;

pub async fn hello() -> &'static str {
    "Hello World\n"
}

/// Echo the request line, connection position and headers as plain text.
pub async fn dump(request: Request<Body>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Method: {}", request.method());
    let _ = writeln!(out, "URI: {}", request.uri());
    let _ = writeln!(out, "Version: {:?}", request.version());
    if let Some(id) = request.request_id() {
        let _ = writeln!(out, "Request-Id: {id}");
    }
    if let Some(info) = request.extensions().get::<ConnectionInfo>() {
        let _ = writeln!(out, "Connection: {}", info.id());
        let _ = writeln!(out, "Peer: {}", info.peer_addr());
        let _ = writeln!(out, "Request-Number: {}", info.requests());
    }
    if request.extensions().get::<ForcedClose>().is_some() {
        let _ = writeln!(out, "Closing: true");
    }

    let _ = writeln!(out, "Headers:");
    for (name, value) in request.headers() {
        let _ = writeln!(
            out,
            "  {}: {}",
            name,
            String::from_utf8_lossy(value.as_bytes())
        );
    }
    out
}

/// Always missing; gives the request log something to record.
pub async fn bogus() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dump_lists_request_and_connection() {
        let info = ConnectionInfo::new("10.0.0.1:5000".parse().unwrap());
        info.record_request();
        info.record_request();

        let mut request = Request::builder()
            .method("POST")
            .uri("/dump/info?x=1")
            .header("user-agent", "test-agent")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(info.clone());

        let text = dump(request).await;
        assert!(text.contains("Method: POST\n"));
        assert!(text.contains("URI: /dump/info?x=1\n"));
        assert!(text.contains(&format!("Connection: {}\n", info.id())));
        assert!(text.contains("Request-Number: 2\n"));
        assert!(text.contains("  user-agent: test-agent\n"));
        assert!(!text.contains("Closing"));
    }
}

//! WebSocket demo endpoints.

use std::time::Duration;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
};

pub const ECHO_GREETING: &str = "You are now connected to echo";

/// Greet, then echo every text frame back. Binary frames are ignored.
pub async fn echo(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(echo_session)
}

async fn echo_session(mut socket: WebSocket) {
    if socket.send(Message::Text(ECHO_GREETING.into())).await.is_err() {
        return;
    }

    while let Some(message) = socket.recv().await {
        match message {
            Ok(Message::Text(text)) => {
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Echo socket error");
                break;
            }
        }
    }
    tracing::debug!("Echo session closed");
}

/// Push the current UTC time once per second until the client goes away.
pub async fn time(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(time_session)
}

async fn time_session(mut socket: WebSocket) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = chrono::Utc::now().to_rfc3339();
                if socket.send(Message::Text(now.into())).await.is_err() {
                    break;
                }
            }
            message = socket.recv() => match message {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::debug!("Time session closed");
}

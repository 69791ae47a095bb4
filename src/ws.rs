use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use crate::handlers::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
    let mut events = BroadcastStream::new(state.events.subscribe());
    let (mut sender, mut receiver) = socket.split();

    info!("WebSocket subscriber connected");

    let hello = serde_json::json!({
        "event": "subscribed",
        "version": env!("CARGO_PKG_VERSION"),
    });
    if sender.send(Message::Text(hello.to_string())).await.is_err() {
        return;
    }

    let send_task = tokio::spawn(async move {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(j) => j,
                        Err(_) => continue,
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        return;
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    debug!("WebSocket lagged by {} events", n);
                }
            }
        }
        let close = serde_json::json!({ "event": "stream_closed" });
        let _ = sender.send(Message::Text(close.to_string())).await;
    });

    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("WebSocket subscriber disconnected");
}

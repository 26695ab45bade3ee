//! `GET /ws`: one WebSocket per browser tab.
//!
//! Each connection runs a reader loop and a writer task. The writer merges
//! hub broadcasts with replies addressed to this connection only.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use uuid::Uuid;

use crate::AppState;

use super::events::{ClientEvent, ServerEvent};

/// Largest accepted client frame. Inline images travel as base64.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

const DIRECT_QUEUE: usize = 32;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    // Leave headroom above our own limit so oversized frames get a reply
    // instead of a protocol error.
    ws.max_message_size(MAX_FRAME_BYTES * 2)
        .max_frame_size(MAX_FRAME_BYTES * 2)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::error!(event = event.name(), error = %e, "Failed to encode relay event");
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    let _guard = state.relay.connect();
    tracing::info!(
        name: "relay.connected",
        connection_id = %connection_id,
        connections = state.relay.connections(),
        "Client connected"
    );

    let (mut sink, mut stream) = socket.split();
    let (direct_tx, mut direct_rx) = mpsc::channel::<ServerEvent>(DIRECT_QUEUE);
    let mut broadcasts = BroadcastStream::new(state.relay.subscribe());

    let writer = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                Some(event) = direct_rx.recv() => event,
                item = broadcasts.next() => match item {
                    Some(Ok(event)) => event,
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        tracing::warn!(connection_id = %connection_id, skipped, "Relay subscriber lagged");
                        continue;
                    }
                    None => break,
                },
            };
            let Some(msg) = encode(&event) else { continue };
            if let Err(e) = sink.send(msg).await {
                tracing::debug!(connection_id = %connection_id, error = %e, "Relay send failed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if text.len() > MAX_FRAME_BYTES {
                    tracing::warn!(
                        connection_id = %connection_id,
                        size = text.len(),
                        max = MAX_FRAME_BYTES,
                        "Frame exceeds size limit"
                    );
                    let too_large = ServerEvent::error(format!(
                        "メッセージが大きすぎます ({} bytes, 上限 {MAX_FRAME_BYTES} bytes)",
                        text.len()
                    ));
                    if direct_tx.send(too_large).await.is_err() {
                        break;
                    }
                    continue;
                }
                match serde_json::from_str::<ClientEvent>(text.as_str()) {
                    Ok(ClientEvent::ChatRequest(req)) => {
                        state.chat.dispatch(req, Some(direct_tx.clone()));
                    }
                    Err(e) => {
                        tracing::warn!(connection_id = %connection_id, error = %e, "Ignoring invalid relay frame");
                    }
                }
            }
            Ok(Message::Binary(data)) => {
                tracing::debug!(connection_id = %connection_id, size = data.len(), "Ignoring binary frame");
            }
            // Pongs are answered by axum
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer.abort();
    tracing::info!(name: "relay.disconnected", connection_id = %connection_id, "Client disconnected");
}

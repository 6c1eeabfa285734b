//! Websocket endpoint: the transport side of the duplex queues.
//!
//! # Data Flow
//! ```text
//! peer -> inbound queue -> application poll/ack
//! application push -> outbound queue -> delivery loop -> writer task -> peer
//! ```
//!
//! # Design Decisions
//! - A dedicated writer task owns the sink; the delivery loop's channel
//!   send into it is the non-blocking transport write
//! - Empty frames are keepalives and never enqueued; a literal `exit`
//!   payload closes the connection
//! - Socket close (or read error) tears the connection down, discarding
//!   both queues

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::http::server::AppState;

pub(crate) async fn handle_socket(socket: WebSocket, state: AppState, addr: SocketAddr) {
    let (mut sink, mut stream) = socket.split();
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let conn = state.registry.open(state.interface.clone(), writer_tx);
    let id = conn.id();
    tracing::debug!(connection_id = %id, peer = %addr, "websocket open");

    let writer = tokio::spawn(async move {
        while let Some(payload) = writer_rx.recv().await {
            if sink.send(Message::Binary(payload.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Binary(bytes)) => {
                if bytes.is_empty() {
                    continue;
                }
                if bytes.as_ref() == b"exit" {
                    break;
                }
                conn.enqueue_inbound(bytes.to_vec());
            }
            Ok(Message::Text(text)) => {
                if text.is_empty() {
                    continue;
                }
                if text.as_str() == "exit" {
                    break;
                }
                conn.enqueue_inbound(text.as_bytes().to_vec());
            }
            // axum answers pings itself.
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "websocket read error");
                break;
            }
        }
    }

    state.registry.close(id);
    writer.abort();
    tracing::debug!(connection_id = %id, peer = %addr, "websocket closed");
}

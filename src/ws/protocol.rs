//! Inbound/outbound JSON message types and dispatch for the WebSocket
//! protocol. One JSON object per text frame.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;

use crate::state::AppState;
use crate::ws::dispatch::Event;

/// Messages a client may send. Unknown types fail deserialization and are
/// ignored by the caller — malformed input is not fatal to the connection.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness probe; replied with `pong`, no state change.
    Ping,
    /// Task status change; fanned out to all connected users.
    TaskStatus { task_id: String, status: String },
    /// Explicit presence refresh; bumps the sender's last-seen.
    Presence,
}

/// Server-originated replies that are not dispatcher events.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Pong,
}

/// Handle one inbound text frame from an active connection.
pub fn handle_text_message(
    text: &str,
    tx: &mpsc::UnboundedSender<Message>,
    state: &AppState,
    user_id: &str,
) {
    let parsed = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(
                user_id = %user_id,
                error = %e,
                "Ignoring malformed client message"
            );
            return;
        }
    };

    match parsed {
        ClientMessage::Ping => {
            send_message(tx, &ServerMessage::Pong);
        }
        ClientMessage::TaskStatus { task_id, status } => {
            let event = Event::task_update(task_id, "status_changed", json!({ "status": status }));
            let delivered = state.dispatcher.broadcast_all(&event);
            tracing::debug!(
                user_id = %user_id,
                delivered = delivered,
                "Task status broadcast"
            );
        }
        ClientMessage::Presence => {
            state.presence.touch(user_id);
        }
    }
}

/// Serialize and send a server message into a connection's channel.
fn send_message(tx: &mpsc::UnboundedSender<Message>, msg: &ServerMessage) {
    if let Ok(text) = serde_json::to_string(msg) {
        let _ = tx.send(Message::Text(text.into()));
    }
}

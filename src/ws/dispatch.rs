//! Broadcast dispatcher: resolves an event's recipient set from the
//! connection registry and delivers to each live connection independently.
//!
//! Delivery is fire-and-forget. A failed send (closed channel) is logged
//! and skipped; it never aborts delivery to the remaining recipients and
//! never deregisters the connection — the owning actor does that when its
//! own receive loop ends, so two components never race to mutate the
//! registry for the same connection.

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::ws::registry::ConnectionRegistry;
use crate::ws::ConnectionHandle;

/// Event payload delivered to clients. Closed set: task updates go to all
/// connected users, notifications to one user's connections only.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TaskUpdate {
        action: String,
        task_id: String,
        data: Value,
        timestamp: DateTime<Utc>,
    },
    Notification {
        data: Value,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn task_update(task_id: impl Into<String>, action: impl Into<String>, data: Value) -> Self {
        Self::TaskUpdate {
            action: action.into(),
            task_id: task_id.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn notification(data: Value) -> Self {
        Self::Notification {
            data,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct BroadcastDispatcher {
    registry: ConnectionRegistry,
}

impl BroadcastDispatcher {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// Deliver an event to every live connection across all users.
    /// Returns the number of successful deliveries.
    pub fn broadcast_all(&self, event: &Event) -> usize {
        self.deliver(self.registry.all_connections(), event)
    }

    /// Deliver a notification to one user's connections only. No-op (not an
    /// error) when the user has no live connections — notifications are not
    /// queued for later delivery.
    pub fn notify(&self, user_id: &str, data: Value) -> usize {
        let event = Event::notification(data);
        self.deliver(self.registry.connections_for(user_id), &event)
    }

    fn deliver(&self, recipients: Vec<ConnectionHandle>, event: &Event) -> usize {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize event");
                return 0;
            }
        };
        let msg = Message::Text(text.into());

        let mut delivered = 0;
        for conn in &recipients {
            // The channel send never blocks; the per-connection writer task
            // owns the actual socket write. Per-connection FIFO comes from
            // the channel; no ordering across recipients.
            match conn.sender.send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::debug!(
                        user_id = %conn.user_id,
                        connection_id = %conn.id,
                        "Dropping event for closed connection"
                    );
                }
            }
        }
        delivered
    }
}

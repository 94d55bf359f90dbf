pub mod actor;
pub mod dispatch;
pub mod handler;
pub mod protocol;
pub mod registry;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// One live transport session belonging to exactly one user.
/// Owned by the connection registry for its lifetime; the per-connection
/// actor holds a copy only while servicing the receive loop.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Unique per-session id; registry dedup key.
    pub id: Uuid,
    /// Owning user id.
    pub user_id: String,
    /// Outbound frame channel into this connection's writer task.
    pub sender: ConnectionSender,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    pub fn new(user_id: impl Into<String>, sender: ConnectionSender) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.into(),
            sender,
            connected_at: Utc::now(),
        }
    }
}

//! Connection registry: authoritative mapping from user id to that user's
//! live WebSocket connections. A user can have multiple concurrent
//! connections (multiple devices/tabs).
//!
//! Invariants:
//! - a user id has a map entry iff it has at least one live connection
//! - connection ids are unique within a user's set
//! - shard locks cover only the map/set edit, never a network send

use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::presence::PresenceTracker;
use crate::ws::ConnectionHandle;

#[derive(Clone)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<String, Vec<ConnectionHandle>>>,
    presence: PresenceTracker,
}

impl ConnectionRegistry {
    pub fn new(presence: PresenceTracker) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            presence,
        }
    }

    /// Add a connection to its user's set, creating the set if absent.
    /// Idempotent: registering an already-registered connection id is a no-op.
    /// The user's first live connection marks them online.
    pub fn register(&self, handle: ConnectionHandle) {
        let user_id = handle.user_id.clone();
        let first_connection = {
            let mut entry = self.connections.entry(user_id.clone()).or_default();
            if entry.iter().any(|c| c.id == handle.id) {
                return;
            }
            let was_empty = entry.is_empty();
            entry.push(handle);
            was_empty
        };

        // Presence flip happens outside the shard lock
        if first_connection {
            self.presence.mark_online(&user_id);
        }

        tracing::debug!(
            user_id = %user_id,
            connections = self.connection_count(&user_id),
            "Connection registered"
        );
    }

    /// Remove a connection from its user's set. Removes the map entry and
    /// marks the user offline when the set empties. Safe to call on an
    /// already-deregistered connection.
    pub fn deregister(&self, user_id: &str, connection_id: Uuid) {
        let now_empty = {
            let Some(mut entry) = self.connections.get_mut(user_id) else {
                return;
            };
            let before = entry.len();
            entry.retain(|c| c.id != connection_id);
            before != entry.len() && entry.is_empty()
        };

        if now_empty {
            // Re-check emptiness under the lock: a concurrent register may
            // have added a connection since the guard above was dropped.
            let removed = self
                .connections
                .remove_if(user_id, |_, conns| conns.is_empty())
                .is_some();
            if removed {
                self.presence.mark_offline(user_id);
            }
        }

        tracing::debug!(user_id = %user_id, "Connection deregistered");
    }

    /// Point-in-time snapshot of one user's live connections, or empty if
    /// none. Callers deliver against the copy so sends never iterate a set
    /// a concurrent register/deregister is mutating.
    pub fn connections_for(&self, user_id: &str) -> Vec<ConnectionHandle> {
        self.connections
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Point-in-time snapshot of every live connection across all users.
    pub fn all_connections(&self) -> Vec<ConnectionHandle> {
        self.connections
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of live connections for a user.
    pub fn connection_count(&self, user_id: &str) -> usize {
        self.connections
            .get(user_id)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    /// Whether any connection is live for the given user.
    pub fn is_connected(&self, user_id: &str) -> bool {
        self.connections.contains_key(user_id)
    }
}

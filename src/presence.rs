//! Server-side presence tracking.
//!
//! In-memory presence store (DashMap) keyed by user id. Records are created
//! on first connect and kept for the process lifetime — only the status
//! transitions, so "last seen" history survives disconnects.
//! REST endpoints expose the current snapshot.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

use crate::auth::middleware::Claims;
use crate::state::AppState;

/// Presence status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// Record tracked per user that has connected this process lifetime.
#[derive(Debug, Clone, Serialize)]
pub struct PresenceRecord {
    pub user_id: String,
    pub status: PresenceStatus,
    pub last_seen: DateTime<Utc>,
}

/// Last-known status per user. Pure state, no I/O; mutated by the
/// connection registry on first-connect/last-disconnect and by the
/// gateway on presence-refresh messages.
#[derive(Clone, Default)]
pub struct PresenceTracker {
    records: Arc<DashMap<String, PresenceRecord>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set status online, last_seen = now. Creates the record if absent.
    pub fn mark_online(&self, user_id: &str) {
        self.upsert(user_id, PresenceStatus::Online);
    }

    /// Set status offline, last_seen = now (time of last activity).
    pub fn mark_offline(&self, user_id: &str) {
        self.upsert(user_id, PresenceStatus::Offline);
    }

    /// Refresh last_seen without changing status. Used for explicit
    /// presence-refresh messages from an active connection.
    pub fn touch(&self, user_id: &str) {
        let now = Utc::now();
        self.records
            .entry(user_id.to_string())
            .and_modify(|rec| rec.last_seen = now)
            .or_insert_with(|| PresenceRecord {
                user_id: user_id.to_string(),
                status: PresenceStatus::Online,
                last_seen: now,
            });
    }

    /// Current record for a user, or None if the user has never connected
    /// this process lifetime.
    pub fn get(&self, user_id: &str) -> Option<PresenceRecord> {
        self.records.get(user_id).map(|rec| rec.value().clone())
    }

    /// Snapshot of every tracked record.
    pub fn all(&self) -> Vec<PresenceRecord> {
        self.records
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn upsert(&self, user_id: &str, status: PresenceStatus) {
        self.records.insert(
            user_id.to_string(),
            PresenceRecord {
                user_id: user_id.to_string(),
                status,
                last_seen: Utc::now(),
            },
        );
        tracing::debug!(user_id = %user_id, status = status.as_str(), "Presence updated");
    }
}

// --- REST endpoint handlers ---

/// GET /api/presence — Returns current presence for all tracked users. JWT auth required.
pub async fn get_presence(
    State(state): State<AppState>,
    _claims: Claims,
) -> Json<Vec<PresenceRecord>> {
    Json(state.presence.all())
}

/// GET /api/presence/{user_id} — Single user's record, 404 if never connected. JWT auth required.
pub async fn get_user_presence(
    State(state): State<AppState>,
    _claims: Claims,
    Path(user_id): Path<String>,
) -> Result<Json<PresenceRecord>, StatusCode> {
    state
        .presence
        .get(&user_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

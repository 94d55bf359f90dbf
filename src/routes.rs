use axum::{
    extract::{Path, State},
    middleware, Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::auth::middleware::{Claims, JwtSecret};
use crate::presence;
use crate::state::AppState;
use crate::ws::dispatch::Event;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    State(state): State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

#[derive(Debug, Deserialize)]
pub struct TaskEventRequest {
    pub action: String,
    #[serde(default)]
    pub data: Value,
}

/// POST /api/tasks/{task_id}/events — broadcast a task_update to all
/// connected clients. Called by the task CRUD service after a mutation.
/// JWT auth required.
async fn broadcast_task_event(
    State(state): State<AppState>,
    _claims: Claims,
    Path(task_id): Path<String>,
    Json(body): Json<TaskEventRequest>,
) -> Json<Value> {
    let event = Event::task_update(task_id, body.action, body.data);
    let delivered = state.dispatcher.broadcast_all(&event);
    Json(serde_json::json!({ "delivered": delivered }))
}

/// POST /api/notify/{user_id} — send a notification to one user's live
/// connections. No-op (delivered = 0) when the user is not connected;
/// notifications are not queued. JWT auth required.
async fn notify_user(
    State(state): State<AppState>,
    _claims: Claims,
    Path(user_id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let delivered = state.dispatcher.notify(&user_id, body);
    Json(serde_json::json!({ "delivered": delivered }))
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Authenticated routes (JWT required — Claims extractor validates token)
    let api_routes = Router::new()
        .route("/api/presence", axum::routing::get(presence::get_presence))
        .route(
            "/api/presence/{user_id}",
            axum::routing::get(presence::get_user_presence),
        )
        .route(
            "/api/tasks/{task_id}/events",
            axum::routing::post(broadcast_task_event),
        )
        .route("/api/notify/{user_id}", axum::routing::post(notify_user));

    // WebSocket endpoint (auth via query param, not JWT header)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(api_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::auth::jwt::{self, TOKEN_TYPE_ACCESS};
use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for WebSocket connection. Auth is via query param
/// ?token=JWT; the token is optional at the type level so a missing token
/// gets its own close code instead of a 400 rejection.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// WebSocket close codes:
/// 4001 = token expired
/// 4002 = token invalid (bad signature or not an access token)
/// 4003 = no token supplied
pub const CLOSE_TOKEN_EXPIRED: u16 = 4001;
pub const CLOSE_TOKEN_INVALID: u16 = 4002;
pub const CLOSE_NO_TOKEN: u16 = 4003;

/// GET /ws?token=JWT
/// WebSocket upgrade endpoint. Authenticates via query parameter.
/// On auth failure, upgrades then immediately closes with the matching close
/// code — the connection is never registered. On success, spawns an actor.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = params.token else {
        tracing::warn!("WebSocket connection attempt without token");
        return ws.on_upgrade(move |socket| close_with(socket, CLOSE_NO_TOKEN, "No token"));
    };

    match jwt::validate_access_token(&state.jwt_secret, &token) {
        Ok(claims) if claims.token_type == TOKEN_TYPE_ACCESS => {
            tracing::info!(user_id = %claims.sub, "WebSocket connection authenticated");
            ws.on_upgrade(move |socket| actor::run_connection(socket, state, claims.sub))
        }
        Ok(claims) => {
            tracing::warn!(
                user_id = %claims.sub,
                token_type = %claims.token_type,
                "WebSocket auth rejected non-access token"
            );
            ws.on_upgrade(move |socket| {
                close_with(socket, CLOSE_TOKEN_INVALID, "Not an access token")
            })
        }
        Err(err) => {
            let (close_code, reason) = match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    (CLOSE_TOKEN_EXPIRED, "Token expired")
                }
                _ => (CLOSE_TOKEN_INVALID, "Token invalid"),
            };

            tracing::warn!(
                close_code = close_code,
                reason = reason,
                "WebSocket auth failed"
            );

            ws.on_upgrade(move |socket| close_with(socket, close_code, reason))
        }
    }
}

/// Send a close frame with the given code and drop the socket.
async fn close_with(mut socket: WebSocket, code: u16, reason: &'static str) {
    let close_frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    let _ = socket.send(Message::Close(Some(close_frame))).await;
}

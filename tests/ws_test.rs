//! Integration tests for WebSocket connection, auth close codes, JSON
//! protocol dispatch, broadcast fan-out, and presence lifecycle over a live
//! server.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

type WsRead = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

/// Start the server on a random port and return (base_url, addr, jwt_secret).
async fn start_test_server() -> (String, SocketAddr, Vec<u8>) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let jwt_secret = tasksync_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let state = tasksync_server::state::AppState::new(jwt_secret.clone(), 30, 10);
    let app = tasksync_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    let base_url = format!("http://{}", addr);
    (base_url, addr, jwt_secret)
}

fn mint_token(secret: &[u8], user_id: &str) -> String {
    tasksync_server::auth::jwt::issue_access_token(secret, user_id)
        .expect("Failed to issue access token")
}

async fn connect(
    addr: SocketAddr,
    token: &str,
) -> (
    futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        Message,
    >,
    WsRead,
) {
    let ws_url = format!("ws://{}/ws?token={}", addr, token);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream.split()
}

/// Read the next JSON text frame, skipping WebSocket-level control frames.
async fn next_json(read: &mut WsRead) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
            .await
            .expect("Expected message within timeout")
            .expect("Stream ended unexpectedly")
            .expect("WebSocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).expect("valid JSON frame"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Expected text frame, got: {:?}", other),
        }
    }
}

/// Expect a close frame with the given application close code.
async fn expect_close_code(read: &mut WsRead, code: u16) {
    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Expected close message within timeout");

    match msg {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(
                frame.code,
                tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::from(code),
                "Unexpected close code"
            );
        }
        other => panic!("Expected close frame with code {}, got: {:?}", code, other),
    }
}

#[tokio::test]
async fn valid_token_connects_and_ping_gets_pong() {
    let (_base_url, addr, secret) = start_test_server().await;
    let token = mint_token(&secret, "user-1");

    let (mut write, mut read) = connect(addr, &token).await;

    write
        .send(Message::Text(json!({ "type": "ping" }).to_string().into()))
        .await
        .expect("Failed to send ping");

    let reply = next_json(&mut read).await;
    assert_eq!(reply["type"], "pong");
}

#[tokio::test]
async fn invalid_token_closes_with_4002() {
    let (_base_url, addr, _secret) = start_test_server().await;
    let (_write, mut read) = connect(addr, "not-a-jwt").await;
    expect_close_code(&mut read, 4002).await;
}

#[tokio::test]
async fn missing_token_closes_with_4003() {
    let (_base_url, addr, _secret) = start_test_server().await;

    let ws_url = format!("ws://{}/ws", addr);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("WebSocket should upgrade even without a token");
    let (_write, mut read) = ws_stream.split();
    expect_close_code(&mut read, 4003).await;
}

#[tokio::test]
async fn non_access_token_closes_with_4002() {
    let (_base_url, addr, secret) = start_test_server().await;

    // A structurally valid JWT of the wrong kind must be rejected
    let now = chrono::Utc::now().timestamp();
    let claims = tasksync_server::auth::middleware::Claims {
        sub: "user-1".to_string(),
        token_type: "refresh".to_string(),
        iat: now,
        exp: now + 900,
    };
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(&secret),
    )
    .unwrap();

    let (_write, mut read) = connect(addr, &token).await;
    expect_close_code(&mut read, 4002).await;
}

#[tokio::test]
async fn rejected_connection_never_appears_in_presence() {
    let (base_url, addr, secret) = start_test_server().await;

    let (_write, mut read) = connect(addr, "not-a-jwt").await;
    expect_close_code(&mut read, 4002).await;

    // An authenticated observer sees no trace of the rejected connection
    let observer_token = mint_token(&secret, "observer");
    let (_w, mut observer_read) = connect(addr, &observer_token).await;

    let client = reqwest::Client::new();
    let resp: serde_json::Value = client
        .get(format!("{}/api/presence", base_url))
        .bearer_auth(&observer_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let users: Vec<&str> = resp
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["user_id"].as_str().unwrap())
        .collect();
    assert_eq!(users, vec!["observer"]);

    // Keep the observer alive until the assertion is done
    let _ = tokio::time::timeout(Duration::from_millis(50), observer_read.next()).await;
}

#[tokio::test]
async fn task_status_is_broadcast_to_all_clients() {
    let (_base_url, addr, secret) = start_test_server().await;

    let (mut write_a, mut read_a) = connect(addr, &mint_token(&secret, "user-a")).await;
    let (_write_b, mut read_b) = connect(addr, &mint_token(&secret, "user-b")).await;

    write_a
        .send(Message::Text(
            json!({ "type": "task_status", "task_id": "task-7", "status": "completed" })
                .to_string()
                .into(),
        ))
        .await
        .expect("Failed to send task_status");

    // Sender and the other user both receive the fan-out
    for read in [&mut read_a, &mut read_b] {
        let event = next_json(read).await;
        assert_eq!(event["type"], "task_update");
        assert_eq!(event["action"], "status_changed");
        assert_eq!(event["task_id"], "task-7");
        assert_eq!(event["data"]["status"], "completed");
        assert!(event["timestamp"].is_string());
    }
}

#[tokio::test]
async fn malformed_message_is_ignored_and_connection_stays_active() {
    let (_base_url, addr, secret) = start_test_server().await;
    let token = mint_token(&secret, "user-1");
    let (mut write, mut read) = connect(addr, &token).await;

    write
        .send(Message::Text("this is not json".to_string().into()))
        .await
        .unwrap();
    write
        .send(Message::Text(
            json!({ "type": "no_such_type" }).to_string().into(),
        ))
        .await
        .unwrap();

    // Connection must survive: a ping still gets a pong
    write
        .send(Message::Text(json!({ "type": "ping" }).to_string().into()))
        .await
        .unwrap();
    let reply = next_json(&mut read).await;
    assert_eq!(reply["type"], "pong");
}

#[tokio::test]
async fn presence_lifecycle_over_rest() {
    let (base_url, addr, secret) = start_test_server().await;
    let token = mint_token(&secret, "user-1");
    let client = reqwest::Client::new();

    // Never connected: 404
    let resp = client
        .get(format!("{}/api/presence/user-1", base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Connected: online
    let (mut write, _read) = connect(addr, &token).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let record: serde_json::Value = client
        .get(format!("{}/api/presence/user-1", base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(record["status"], "online");

    // Disconnected: offline, record retained
    write.send(Message::Close(None)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let record: serde_json::Value = client
        .get(format!("{}/api/presence/user-1", base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(record["status"], "offline");
    assert!(record["last_seen"].is_string());
}

#[tokio::test]
async fn presence_rest_requires_auth() {
    let (base_url, _addr, _secret) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/api/presence", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn notify_endpoint_delivers_only_to_target_user() {
    let (base_url, addr, secret) = start_test_server().await;

    let (_wa, mut read_a) = connect(addr, &mint_token(&secret, "user-a")).await;
    let (_wb, mut read_b) = connect(addr, &mint_token(&secret, "user-b")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let caller_token = mint_token(&secret, "crud-service");
    let client = reqwest::Client::new();
    let resp: serde_json::Value = client
        .post(format!("{}/api/notify/user-a", base_url))
        .bearer_auth(&caller_token)
        .json(&json!({ "message": "task assigned to you" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["delivered"], 1);

    let event = next_json(&mut read_a).await;
    assert_eq!(event["type"], "notification");
    assert_eq!(event["data"]["message"], "task assigned to you");

    // user-b receives nothing
    let quiet = tokio::time::timeout(Duration::from_millis(300), read_b.next()).await;
    assert!(quiet.is_err(), "Expected no frame for the other user");

    // Notifying a user with no connections is a silent no-op
    let resp: serde_json::Value = client
        .post(format!("{}/api/notify/ghost", base_url))
        .bearer_auth(&caller_token)
        .json(&json!({ "message": "nobody home" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["delivered"], 0);
}

#[tokio::test]
async fn task_event_endpoint_broadcasts_to_all() {
    let (base_url, addr, secret) = start_test_server().await;

    let (_wa, mut read_a) = connect(addr, &mint_token(&secret, "user-a")).await;
    let (_wb, mut read_b) = connect(addr, &mint_token(&secret, "user-b")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let caller_token = mint_token(&secret, "crud-service");
    let client = reqwest::Client::new();
    let resp: serde_json::Value = client
        .post(format!("{}/api/tasks/task-3/events", base_url))
        .bearer_auth(&caller_token)
        .json(&json!({ "action": "updated", "data": { "title": "Buy milk" } }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["delivered"], 2);

    for read in [&mut read_a, &mut read_b] {
        let event = next_json(read).await;
        assert_eq!(event["type"], "task_update");
        assert_eq!(event["action"], "updated");
        assert_eq!(event["task_id"], "task-3");
        assert_eq!(event["data"]["title"], "Buy milk");
    }
}

#[tokio::test]
async fn connection_cleanup_allows_reconnect() {
    let (_base_url, addr, secret) = start_test_server().await;
    let token = mint_token(&secret, "cleanup-user");

    {
        let (mut write, _read) = connect(addr, &token).await;
        write.send(Message::Close(None)).await.unwrap();
    }

    // Give the server a moment to clean up
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Reconnect should work fine (connection was cleaned up)
    let (mut write, mut read) = connect(addr, &token).await;
    write
        .send(Message::Text(json!({ "type": "ping" }).to_string().into()))
        .await
        .unwrap();
    let reply = next_json(&mut read).await;
    assert_eq!(reply["type"], "pong");
}

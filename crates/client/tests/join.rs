use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use chadmeet_client::connection::{Connection, ConnectionState, JoinRequest};
use chadmeet_client::replay::ScriptedConnector;
use chadmeet_client::sdk::{ConnectError, RoomSession};
use chadmeet_client::token::TokenClient;
use serde_json::{Value, json};

/// Token server stub whose credentials can be switched on and off.
async fn spawn_token_server(configured: Arc<AtomicBool>) -> String {
    async fn token(State(configured): State<Arc<AtomicBool>>, Json(body): Json<Value>) -> impl IntoResponse {
        if !configured.load(Ordering::Relaxed) {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Server configuration error" })),
            );
        }
        let identity = body["participantName"].as_str().unwrap_or_default();
        (StatusCode::OK, Json(json!({ "token": format!("token-for-{identity}") })))
    }

    let router = axum::Router::new()
        .route("/api/token", post(token))
        .route(
            "/api/config",
            get(|| async {
                Json(json!({ "serverUrl": "ws://media.test:7880", "defaultRoom": "ChadMeetings" }))
            }),
        )
        .with_state(configured);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn request() -> JoinRequest {
    JoinRequest {
        room: "ChadMeetings".to_string(),
        participant: "alice".to_string(),
        server_url: None,
    }
}

#[tokio::test]
async fn join_fetches_token_and_connects() {
    let base = spawn_token_server(Arc::new(AtomicBool::new(true))).await;
    let tokens = TokenClient::new(&base);
    let connector = ScriptedConnector::new("alice");

    let mut connection = Connection::join(&tokens, &connector, &request()).await;
    assert_eq!(connection.state(), &ConnectionState::Connected);

    let joined = connection.take_joined().expect("session after connect");
    assert_eq!(joined.session.local_participant().identity, "alice");
    assert_eq!(connector.rooms().len(), 1);
}

#[tokio::test]
async fn token_failure_is_reported_then_retry_succeeds() {
    let configured = Arc::new(AtomicBool::new(false));
    let base = spawn_token_server(Arc::clone(&configured)).await;
    let tokens = TokenClient::new(&base);
    let connector = ScriptedConnector::new("alice");

    let mut connection = Connection::join(&tokens, &connector, &request()).await;
    match connection.state() {
        ConnectionState::Failed { message } => {
            assert!(message.contains("Server configuration error"), "{message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(connection.take_joined().is_none());
    assert!(connector.rooms().is_empty());

    configured.store(true, Ordering::Relaxed);
    assert_eq!(connection.retry().await, &ConnectionState::Connected);
    assert!(connection.take_joined().is_some());
}

#[tokio::test]
async fn media_server_failure_is_reported() {
    let base = spawn_token_server(Arc::new(AtomicBool::new(true))).await;
    let tokens = TokenClient::new(&base);
    let connector = ScriptedConnector::new("alice");
    connector.fail_with(Some(ConnectError::Unreachable("connection refused".to_string())));

    let mut request = request();
    request.server_url = Some("ws://unreachable:7880".to_string());
    let connection = Connection::join(&tokens, &connector, &request).await;

    assert!(matches!(
        connection.state(),
        ConnectionState::Failed { message } if message.contains("connection refused")
    ));
}

#[tokio::test]
async fn unreachable_token_server_is_reported() {
    // Nothing listens on port 9 of localhost.
    let tokens = TokenClient::new("http://127.0.0.1:9");
    let connector = ScriptedConnector::new("alice");

    let connection = Connection::join(&tokens, &connector, &request()).await;
    assert!(matches!(connection.state(), ConnectionState::Failed { .. }));
}

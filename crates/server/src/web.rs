use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chadmeet_protocol::{ChadMeetConfig, ClientConfigResponse, TokenRequest, TokenResponse};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;

use crate::token::{self, TokenError};

/// Shared application state.
pub struct AppState {
    pub config: ChadMeetConfig,
    pub started_at: std::time::Instant,
    /// Metrics counters (atomic for lock-free thread safety)
    pub metrics_tokens_issued: AtomicU64,
    pub metrics_tokens_rejected: AtomicU64,
}

impl AppState {
    pub fn new(config: ChadMeetConfig) -> Self {
        Self {
            config,
            started_at: std::time::Instant::now(),
            metrics_tokens_issued: AtomicU64::new(0),
            metrics_tokens_rejected: AtomicU64::new(0),
        }
    }
}

/// Failures of the token endpoint, each mapped to a status and `{error}` body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing roomName or participantName")]
    MissingFields,
    #[error("Server configuration error")]
    NotConfigured,
    #[error("Failed to mint token")]
    Mint(#[from] TokenError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFields => StatusCode::BAD_REQUEST,
            ApiError::NotConfigured | ApiError::Mint(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Middleware that adds security headers to every response.
async fn security_headers(
    request: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static(
            "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; \
             connect-src 'self' wss: ws:; img-src 'self' data:; media-src 'self' blob: mediastream:",
        ),
    );
    // Unlike most sites, a meeting page needs the capture devices.
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static(
            "camera=(self), microphone=(self), display-capture=(self), geolocation=()",
        ),
    );

    response
}

/// Build the Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/token", post(issue_token))
        .route("/api/config", get(client_config))
        .route("/api/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(RequestBodyLimitLayer::new(16_384)) // 16KB max request body
        .with_state(Arc::clone(&state));

    // Serve the built web client (configurable path, defaults to "web/dist")
    let serve_dir = ServeDir::new(&state.config.server.web_root);

    api.fallback_service(serve_dir)
        .layer(axum::middleware::from_fn(security_headers))
}

/// POST /api/token
///
/// Validate the request, then mint a join token with the configured
/// credentials. Field validation runs first so a malformed request is a 400
/// even on a server without credentials.
async fn issue_token(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let result = mint_for_request(&state, payload);
    match &result {
        Ok(_) => {
            state.metrics_tokens_issued.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            state.metrics_tokens_rejected.fetch_add(1, Ordering::Relaxed);
            match e {
                ApiError::MissingFields => tracing::warn!("Token request rejected: {e}"),
                _ => tracing::error!("Token request failed: {e:?}"),
            }
        }
    }
    result.map(Json)
}

fn mint_for_request(
    state: &AppState,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<TokenResponse, ApiError> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::debug!("Unreadable token request body: {rejection}");
            return Err(ApiError::MissingFields);
        }
    };
    let (room, participant) = request.fields().ok_or(ApiError::MissingFields)?;

    let credentials = state
        .config
        .livekit
        .credentials()
        .ok_or(ApiError::NotConfigured)?;

    let token = token::mint_join_token(
        credentials,
        room,
        participant,
        state.config.livekit.token_ttl_secs,
    )?;

    tracing::info!(room, participant, "Join token issued");
    Ok(TokenResponse { token })
}

/// GET /api/config - where clients should connect
async fn client_config(State(state): State<Arc<AppState>>) -> Json<ClientConfigResponse> {
    Json(ClientConfigResponse {
        server_url: state.config.livekit.url.clone(),
        default_room: state.config.room.default_room.clone(),
    })
}

/// GET /api/health - server health check
async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /metrics - Prometheus-compatible metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime_secs = state.started_at.elapsed().as_secs();
    let tokens_issued = state.metrics_tokens_issued.load(Ordering::Relaxed);
    let tokens_rejected = state.metrics_tokens_rejected.load(Ordering::Relaxed);
    let configured = u8::from(state.config.livekit.credentials().is_some());

    let body = format!(
        "# HELP chadmeet_uptime_seconds Server uptime in seconds\n\
         # TYPE chadmeet_uptime_seconds gauge\n\
         chadmeet_uptime_seconds {uptime_secs}\n\
         \n\
         # HELP chadmeet_credentials_configured Whether signing credentials are set\n\
         # TYPE chadmeet_credentials_configured gauge\n\
         chadmeet_credentials_configured {configured}\n\
         \n\
         # HELP chadmeet_tokens_issued_total Join tokens minted\n\
         # TYPE chadmeet_tokens_issued_total counter\n\
         chadmeet_tokens_issued_total {tokens_issued}\n\
         \n\
         # HELP chadmeet_tokens_rejected_total Token requests answered with an error\n\
         # TYPE chadmeet_tokens_rejected_total counter\n\
         chadmeet_tokens_rejected_total {tokens_rejected}\n"
    );

    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

use chadmeet_protocol::{ClientConfigResponse, ErrorResponse, TokenRequest, TokenResponse};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum TokenFetchError {
    #[error("token server unreachable: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token server answered {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Client for the join-token server.
#[derive(Debug, Clone)]
pub struct TokenClient {
    base_url: String,
    http: reqwest::Client,
}

impl TokenClient {
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request a join token for `participant` in `room`.
    pub async fn fetch(&self, room: &str, participant: &str) -> Result<String, TokenFetchError> {
        debug!(base_url = %self.base_url, room, participant, "Requesting join token");

        let response = self
            .http
            .post(format!("{}/api/token", self.base_url))
            .json(&TokenRequest::new(room, participant))
            .send()
            .await?;

        let response = check_status(response).await?;
        let body: TokenResponse = response.json().await?;
        Ok(body.token)
    }

    /// Ask the server where the media server lives.
    pub async fn client_config(&self) -> Result<ClientConfigResponse, TokenFetchError> {
        let response = self
            .http
            .get(format!("{}/api/config", self.base_url))
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

/// Map a non-2xx response to [`TokenFetchError::Rejected`] using its `{error}` body.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TokenFetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&text)
        .map(|e| e.error)
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("error").to_string());

    Err(TokenFetchError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use serde_json::{Value, json};

    /// Serve `router` on an ephemeral port and return its base URL.
    async fn spawn_server(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn fetch_returns_token() {
        let router = axum::Router::new().route(
            "/api/token",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["roomName"], "standup");
                assert_eq!(body["participantName"], "alice");
                Json(json!({ "token": "signed.jwt.value" }))
            }),
        );
        let client = TokenClient::new(spawn_server(router).await + "/");

        let token = client.fetch("standup", "alice").await.unwrap();
        assert_eq!(token, "signed.jwt.value");
    }

    #[tokio::test]
    async fn rejection_carries_server_message() {
        let router = axum::Router::new().route(
            "/api/token",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Server configuration error" })),
                )
            }),
        );
        let client = TokenClient::new(spawn_server(router).await);

        match client.fetch("standup", "alice").await {
            Err(TokenFetchError::Rejected { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "Server configuration error");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejection_without_json_body_uses_reason() {
        let router = axum::Router::new().route(
            "/api/token",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let client = TokenClient::new(spawn_server(router).await);

        match client.fetch("r", "p").await {
            Err(TokenFetchError::Rejected { status, message }) => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_config_is_parsed() {
        let router = axum::Router::new().route(
            "/api/config",
            get(|| async {
                Json(json!({ "serverUrl": "wss://media.example", "defaultRoom": "ChadMeetings" }))
            }),
        );
        let client = TokenClient::new(spawn_server(router).await);

        let config = client.client_config().await.unwrap();
        assert_eq!(config.server_url, "wss://media.example");
        assert_eq!(config.default_room, "ChadMeetings");
    }
}

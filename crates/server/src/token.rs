use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

use chadmeet_protocol::Credentials;
use jsonwebtoken::{EncodingKey, Header};
use serde::{Deserialize, Serialize};

/// Room permissions carried in the `video` claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    pub room: String,
    pub room_join: bool,
    pub can_publish: bool,
    pub can_subscribe: bool,
    pub can_publish_data: bool,
}

impl VideoGrant {
    /// Full participant grant: join, publish media, subscribe, send data.
    pub fn participant(room: &str) -> Self {
        Self {
            room: room.to_string(),
            room_join: true,
            can_publish: true,
            can_subscribe: true,
            can_publish_data: true,
        }
    }
}

/// Access token claims in the layout the media server expects.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// API key the token was signed with
    pub iss: String,
    /// Participant identity
    pub sub: String,
    /// Display name
    pub name: String,
    /// Not before (Unix timestamp)
    pub nbf: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Token id
    pub jti: String,
    pub video: VideoGrant,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("system clock error: {0}")]
    Clock(#[from] SystemTimeError),
    #[error("failed to encode token: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}

/// Mint an HS256 join token for `identity` in `room`.
///
/// The participant name doubles as identity and display name.
pub fn mint_join_token(
    credentials: Credentials<'_>,
    room: &str,
    identity: &str,
    ttl_secs: u64,
) -> Result<String, TokenError> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

    let claims = Claims {
        iss: credentials.api_key.to_string(),
        sub: identity.to_string(),
        name: identity.to_string(),
        nbf: now,
        exp: now.saturating_add(ttl_secs),
        jti: identity.to_string(),
        video: VideoGrant::participant(room),
    };

    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(credentials.api_secret.as_bytes()),
    )?;

    Ok(token)
}

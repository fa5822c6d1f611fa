use serde::{Deserialize, Serialize};

/// Largest payload accepted on the reliable data channel. Anything bigger is
/// split or dropped by the media server, so refuse it up front.
pub const MAX_DATA_PAYLOAD: usize = 15 * 1024;

/// Application messages carried over the room's data channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataMessage {
    /// Chat line typed by a participant
    Chat { message: String },
}

impl DataMessage {
    pub fn chat(message: impl Into<String>) -> Self {
        DataMessage::Chat {
            message: message.into(),
        }
    }

    /// Serialize to the UTF-8 JSON bytes published on the data channel.
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_DATA_PAYLOAD {
            return Err(EnvelopeError::TooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    /// Parse a payload received from the data channel.
    pub fn decode(payload: &[u8]) -> Result<Self, EnvelopeError> {
        if payload.is_empty() {
            return Err(EnvelopeError::Empty);
        }
        if payload.len() > MAX_DATA_PAYLOAD {
            return Err(EnvelopeError::TooLarge(payload.len()));
        }
        Ok(serde_json::from_slice(payload)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("empty payload")]
    Empty,
    #[error("payload too large: {0} bytes (max {MAX_DATA_PAYLOAD})")]
    TooLarge(usize),
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
}

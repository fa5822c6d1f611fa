use std::time::{SystemTime, UNIX_EPOCH};

use chadmeet_protocol::{DataMessage, EnvelopeError};
use tracing::debug;

use crate::sdk::{ParticipantInfo, RoomSession, SessionError};

/// Sender label for messages typed on this device.
pub const OWN_SENDER: &str = "You";
/// Sender label when the SDK gives neither name nor identity.
pub const UNKNOWN_SENDER: &str = "Unknown";

/// One line in the chat panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub from: String,
    pub message: String,
    pub timestamp_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("failed to encode chat message: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("failed to send chat message: {0}")]
    Send(#[from] SessionError),
}

/// Chat history for the current room, oldest first.
#[derive(Debug, Default)]
pub struct ChatLog {
    entries: Vec<ChatEntry>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    /// Publish `input` on the reliable data channel and append it as our own.
    ///
    /// Blank input is ignored and returns `Ok(None)`. A failed send leaves the
    /// log untouched; the caller decides whether to retry.
    pub async fn send<S: RoomSession>(
        &mut self,
        session: &S,
        input: &str,
    ) -> Result<Option<&ChatEntry>, ChatError> {
        if input.trim().is_empty() {
            return Ok(None);
        }

        let payload = DataMessage::chat(input).encode()?;
        session.publish_data(payload).await?;

        self.entries.push(ChatEntry {
            from: OWN_SENDER.to_string(),
            message: input.to_string(),
            timestamp_ms: now_ms(),
        });
        Ok(self.entries.last())
    }

    /// Append an incoming data-channel payload if it is a chat envelope.
    pub fn receive(
        &mut self,
        payload: &[u8],
        from: Option<&ParticipantInfo>,
    ) -> Option<&ChatEntry> {
        let message = match DataMessage::decode(payload) {
            Ok(DataMessage::Chat { message }) => message,
            Err(e) => {
                debug!("Ignoring data payload: {e}");
                return None;
            }
        };

        self.entries.push(ChatEntry {
            from: sender_label(from),
            message,
            timestamp_ms: now_ms(),
        });
        self.entries.last()
    }
}

/// Display name, else identity, else [`UNKNOWN_SENDER`].
pub fn sender_label(from: Option<&ParticipantInfo>) -> String {
    from.into_iter()
        .flat_map(|p| [p.name.as_str(), p.identity.as_str()])
        .find(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_SENDER)
        .to_string()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

use serde::{Deserialize, Serialize};

/// Join token request, as posted by the web client.
///
/// Both fields are optional at the type level so that a missing field is a
/// validation failure (400) rather than a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_name: Option<String>,
}

impl TokenRequest {
    pub fn new(room_name: impl Into<String>, participant_name: impl Into<String>) -> Self {
        Self {
            room_name: Some(room_name.into()),
            participant_name: Some(participant_name.into()),
        }
    }

    /// Room and participant names, or `None` if either is absent or empty.
    pub fn fields(&self) -> Option<(&str, &str)> {
        let room = self.room_name.as_deref().filter(|r| !r.is_empty())?;
        let participant = self
            .participant_name
            .as_deref()
            .filter(|p| !p.is_empty())?;
        Some((room, participant))
    }
}

/// Join token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Error body returned by every API endpoint on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Connection details handed to web clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfigResponse {
    /// Media server signaling URL
    pub server_url: String,
    /// Room joined when the user does not pick one
    pub default_room: String,
}

/// Where a published track comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSource {
    Camera,
    Microphone,
    ScreenShare,
    ScreenShareAudio,
    #[serde(other)]
    Unknown,
}

impl TrackSource {
    pub fn is_video(self) -> bool {
        matches!(self, TrackSource::Camera | TrackSource::ScreenShare)
    }

    pub fn is_audio(self) -> bool {
        matches!(
            self,
            TrackSource::Microphone | TrackSource::ScreenShareAudio
        )
    }
}

impl std::fmt::Display for TrackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TrackSource::Camera => "camera",
            TrackSource::Microphone => "microphone",
            TrackSource::ScreenShare => "screen_share",
            TrackSource::ScreenShareAudio => "screen_share_audio",
            TrackSource::Unknown => "unknown",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_request_uses_camel_case() {
        let req = TokenRequest::new("ChadMeetings", "alice");
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""roomName":"ChadMeetings""#));
        assert!(json.contains(r#""participantName":"alice""#));
    }

    #[test]
    fn token_request_from_browser_format() {
        let req: TokenRequest =
            serde_json::from_str(r#"{"roomName":"r1","participantName":"bob"}"#).unwrap();
        assert_eq!(req.fields(), Some(("r1", "bob")));
    }

    #[test]
    fn token_request_missing_field_deserializes() {
        let req: TokenRequest = serde_json::from_str(r#"{"roomName":"r1"}"#).unwrap();
        assert_eq!(req.room_name.as_deref(), Some("r1"));
        assert!(req.participant_name.is_none());
        assert!(req.fields().is_none());
    }

    #[test]
    fn token_request_empty_field_counts_as_missing() {
        let req = TokenRequest::new("", "bob");
        assert!(req.fields().is_none());
        let req = TokenRequest::new("room", "");
        assert!(req.fields().is_none());
    }

    #[test]
    fn client_config_uses_camel_case() {
        let resp = ClientConfigResponse {
            server_url: "wss://x".to_string(),
            default_room: "ChadMeetings".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""serverUrl":"wss://x""#));
        assert!(json.contains(r#""defaultRoom":"ChadMeetings""#));
    }

    #[test]
    fn track_source_snake_case() {
        let json = serde_json::to_string(&TrackSource::ScreenShare).unwrap();
        assert_eq!(json, r#""screen_share""#);
        let parsed: TrackSource = serde_json::from_str(r#""microphone""#).unwrap();
        assert_eq!(parsed, TrackSource::Microphone);
    }

    #[test]
    fn track_source_unrecognised_is_unknown() {
        let parsed: TrackSource = serde_json::from_str(r#""hologram""#).unwrap();
        assert_eq!(parsed, TrackSource::Unknown);
    }

    #[test]
    fn track_source_kinds() {
        assert!(TrackSource::Camera.is_video());
        assert!(TrackSource::ScreenShare.is_video());
        assert!(!TrackSource::Microphone.is_video());
        assert!(TrackSource::Microphone.is_audio());
        assert!(TrackSource::ScreenShareAudio.is_audio());
        assert!(!TrackSource::Unknown.is_audio());
    }
}

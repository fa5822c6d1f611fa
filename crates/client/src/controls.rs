use chadmeet_protocol::TrackSource;
use tracing::{info, warn};

use crate::sdk::{ParticipantSnapshot, RoomSession, SessionError};

/// Camera, microphone and screen-share switches for the local participant.
///
/// Flags only change when the SDK call succeeds, so a denied device prompt
/// leaves the button in its previous state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaControls {
    pub camera: bool,
    pub microphone: bool,
    pub screen_share: bool,
}

impl MediaControls {
    pub fn from_local(local: &ParticipantSnapshot) -> Self {
        let mut controls = Self::default();
        controls.sync(local);
        controls
    }

    /// Refresh from the local participant after a publish, unpublish, mute
    /// or unmute.
    pub fn sync(&mut self, local: &ParticipantSnapshot) {
        self.camera = local.is_enabled(TrackSource::Camera);
        self.microphone = local.is_enabled(TrackSource::Microphone);
        self.screen_share = local.publication(TrackSource::ScreenShare).is_some();
    }

    pub async fn toggle_camera<S: RoomSession>(&mut self, session: &S) -> Result<bool, SessionError> {
        let target = !self.camera;
        apply("camera", target, session.set_camera_enabled(target).await)?;
        self.camera = target;
        Ok(target)
    }

    pub async fn toggle_microphone<S: RoomSession>(
        &mut self,
        session: &S,
    ) -> Result<bool, SessionError> {
        let target = !self.microphone;
        apply("microphone", target, session.set_microphone_enabled(target).await)?;
        self.microphone = target;
        Ok(target)
    }

    pub async fn toggle_screen_share<S: RoomSession>(
        &mut self,
        session: &S,
    ) -> Result<bool, SessionError> {
        let target = !self.screen_share;
        apply(
            "screen share",
            target,
            session.set_screen_share_enabled(target).await,
        )?;
        self.screen_share = target;
        Ok(target)
    }
}

fn apply(what: &str, enabled: bool, result: Result<(), SessionError>) -> Result<(), SessionError> {
    match &result {
        Ok(()) => info!("{what} {}", if enabled { "on" } else { "off" }),
        Err(e) => warn!("Failed to switch {what} {}: {e}", if enabled { "on" } else { "off" }),
    }
    result
}

//! Seam between the room UI and the real-time media SDK.
//!
//! The SDK owns participants, publications and tracks; the UI only observes
//! them through snapshots and an event stream, and binds live tracks to
//! playback elements through [`MediaTrack::attach`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chadmeet_protocol::TrackSource;
use tokio::sync::mpsc;

/// A live media track handed out by the SDK.
pub trait MediaTrack: Send + Sync + fmt::Debug {
    /// Server-assigned track id.
    fn sid(&self) -> &str;
    /// True for tracks captured on this device.
    fn is_local(&self) -> bool;
    /// Bind this track as the element's media source.
    fn attach(&self, element: &mut dyn MediaElement) -> Result<(), AttachError>;
    /// Unbind this track from the element.
    fn detach(&self, element: &mut dyn MediaElement);
    /// Release the underlying capture device. Only meaningful for local tracks.
    fn stop(&self);
}

/// Playback element a track renders into (a `<video>` or `<audio>` tag).
pub trait MediaElement: Send {
    fn kind(&self) -> ElementKind;
    fn set_muted(&mut self, muted: bool);
    fn is_muted(&self) -> bool;
    /// Called by [`MediaTrack::attach`] with the track being bound.
    fn bind(&mut self, track_sid: &str);
    /// Called by [`MediaTrack::detach`].
    fn unbind(&mut self);
    /// Sid of the track currently rendered, if any.
    fn bound_track(&self) -> Option<&str>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Video,
    Audio,
}

/// Creates playback elements for a participant tile.
pub trait ElementFactory: Send {
    fn create(&self, identity: &str, kind: ElementKind) -> Box<dyn MediaElement>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttachError {
    #[error("track {0} has ended")]
    Ended(String),
    #[error("element cannot play track: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("room is disconnected")]
    Disconnected,
    #[error("{0}")]
    Sdk(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("could not reach media server: {0}")]
    Unreachable(String),
    #[error("media server refused the join token: {0}")]
    Refused(String),
}

/// One media publication of a participant.
#[derive(Debug, Clone)]
pub struct Publication {
    pub sid: String,
    pub source: TrackSource,
    pub muted: bool,
    /// Present once the track is subscribed (always for local publications).
    pub track: Option<Arc<dyn MediaTrack>>,
}

impl Publication {
    /// A publication is renderable when it has a live track and is not muted.
    pub fn available_track(&self) -> Option<&Arc<dyn MediaTrack>> {
        if self.muted { None } else { self.track.as_ref() }
    }
}

/// Identity and display name of a participant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub identity: String,
    pub name: String,
}

/// Point-in-time view of a participant as the SDK reports it.
#[derive(Debug, Clone)]
pub struct ParticipantSnapshot {
    pub identity: String,
    pub name: String,
    pub is_local: bool,
    pub is_speaking: bool,
    pub publications: Vec<Publication>,
}

impl ParticipantSnapshot {
    pub fn publication(&self, source: TrackSource) -> Option<&Publication> {
        self.publications.iter().find(|p| p.source == source)
    }

    /// True when `source` is published, has a track and is not muted.
    pub fn is_enabled(&self, source: TrackSource) -> bool {
        self.publication(source)
            .and_then(Publication::available_track)
            .is_some()
    }

    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            identity: self.identity.clone(),
            name: self.name.clone(),
        }
    }
}

/// Events emitted by a connected room, in SDK order.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    ParticipantConnected(ParticipantInfo),
    ParticipantDisconnected(ParticipantInfo),
    TrackPublished { participant: String, sid: String },
    TrackUnpublished { participant: String, sid: String },
    TrackSubscribed { participant: String, sid: String },
    TrackUnsubscribed { participant: String, sid: String },
    TrackMuted { participant: String, sid: String },
    TrackUnmuted { participant: String, sid: String },
    LocalTrackPublished { sid: String },
    LocalTrackUnpublished { sid: String },
    ActiveSpeakersChanged(Vec<String>),
    DataReceived {
        payload: Vec<u8>,
        from: Option<ParticipantInfo>,
    },
    Disconnected { reason: String },
}

/// A joined room.
pub trait RoomSession: Send + Sync {
    fn local_participant(&self) -> ParticipantSnapshot;
    /// Every participant in the room, local first.
    fn participants(&self) -> Vec<ParticipantSnapshot>;
    /// Publish on the reliable data channel.
    fn publish_data(&self, payload: Vec<u8>)
    -> impl Future<Output = Result<(), SessionError>> + Send;
    fn set_camera_enabled(
        &self,
        enabled: bool,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;
    fn set_microphone_enabled(
        &self,
        enabled: bool,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;
    fn set_screen_share_enabled(
        &self,
        enabled: bool,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;
    fn disconnect(&self) -> impl Future<Output = ()> + Send;
}

/// Opens room sessions against a media server.
pub trait RoomConnector: Send + Sync {
    type Session: RoomSession;

    fn connect(
        &self,
        url: &str,
        token: &str,
    ) -> impl Future<Output = Result<(Self::Session, mpsc::Receiver<RoomEvent>), ConnectError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NullTrack;

    impl MediaTrack for NullTrack {
        fn sid(&self) -> &str {
            "TR_null"
        }
        fn is_local(&self) -> bool {
            false
        }
        fn attach(&self, element: &mut dyn MediaElement) -> Result<(), AttachError> {
            element.bind(self.sid());
            Ok(())
        }
        fn detach(&self, element: &mut dyn MediaElement) {
            element.unbind();
        }
        fn stop(&self) {}
    }

    fn publication(muted: bool, subscribed: bool) -> Publication {
        Publication {
            sid: "TR_null".to_string(),
            source: TrackSource::Camera,
            muted,
            track: subscribed.then(|| Arc::new(NullTrack) as Arc<dyn MediaTrack>),
        }
    }

    #[test]
    fn availability_needs_track_and_unmuted() {
        assert!(publication(false, true).available_track().is_some());
        assert!(publication(true, true).available_track().is_none());
        assert!(publication(false, false).available_track().is_none());
    }

    #[test]
    fn snapshot_reports_enabled_sources() {
        let snapshot = ParticipantSnapshot {
            identity: "alice".to_string(),
            name: "Alice".to_string(),
            is_local: false,
            is_speaking: false,
            publications: vec![publication(false, true)],
        };
        assert!(snapshot.is_enabled(TrackSource::Camera));
        assert!(!snapshot.is_enabled(TrackSource::ScreenShare));
        assert!(!snapshot.is_enabled(TrackSource::Microphone));
    }
}

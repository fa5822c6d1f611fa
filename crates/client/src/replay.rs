//! Scripted in-memory room.
//!
//! Implements the SDK seam without a media server: a JSON-lines script of
//! room events mutates a local participant table and emits the matching
//! [`RoomEvent`]s. Elements are headless and only record what is bound to
//! them. Used by `chadmeet-client replay` and throughout the tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chadmeet_protocol::TrackSource;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::sdk::{
    AttachError, ConnectError, ElementFactory, ElementKind, MediaElement, MediaTrack,
    ParticipantInfo, ParticipantSnapshot, Publication, RoomConnector, RoomEvent, RoomSession,
    SessionError,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A track whose lifecycle is driven by the script.
#[derive(Debug)]
pub struct ScriptedTrack {
    sid: String,
    local: bool,
    stopped: AtomicBool,
    fail_attach: AtomicBool,
    attached: AtomicUsize,
    attach_calls: AtomicUsize,
}

impl ScriptedTrack {
    fn new(sid: &str, local: bool) -> Arc<Self> {
        Arc::new(Self {
            sid: sid.to_string(),
            local,
            stopped: AtomicBool::new(false),
            fail_attach: AtomicBool::new(false),
            attached: AtomicUsize::new(0),
            attach_calls: AtomicUsize::new(0),
        })
    }

    pub fn local(sid: &str) -> Arc<Self> {
        Self::new(sid, true)
    }

    pub fn remote(sid: &str) -> Arc<Self> {
        Self::new(sid, false)
    }

    /// Make subsequent attach calls fail.
    pub fn fail_attach(&self, fail: bool) {
        self.fail_attach.store(fail, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Number of elements currently rendering this track.
    pub fn attached_count(&self) -> usize {
        self.attached.load(Ordering::Relaxed)
    }

    /// Total successful attach calls.
    pub fn attach_calls(&self) -> usize {
        self.attach_calls.load(Ordering::Relaxed)
    }
}

impl MediaTrack for ScriptedTrack {
    fn sid(&self) -> &str {
        &self.sid
    }

    fn is_local(&self) -> bool {
        self.local
    }

    fn attach(&self, element: &mut dyn MediaElement) -> Result<(), AttachError> {
        if self.is_stopped() {
            return Err(AttachError::Ended(self.sid.clone()));
        }
        if self.fail_attach.load(Ordering::Relaxed) {
            return Err(AttachError::Unsupported(format!(
                "{:?} element rejected {}",
                element.kind(),
                self.sid
            )));
        }
        element.bind(&self.sid);
        self.attached.fetch_add(1, Ordering::Relaxed);
        self.attach_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn detach(&self, element: &mut dyn MediaElement) {
        if element.bound_track() == Some(self.sid.as_str()) {
            element.unbind();
            // Saturating: a detach without attach is a no-op.
            let _ = self
                .attached
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        }
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::Relaxed) {
            debug!(sid = %self.sid, "Track stopped");
        }
    }
}

/// Element that records its bound track instead of rendering.
#[derive(Debug)]
pub struct HeadlessElement {
    kind: ElementKind,
    muted: bool,
    bound: Option<String>,
}

impl HeadlessElement {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            muted: false,
            bound: None,
        }
    }
}

impl MediaElement for HeadlessElement {
    fn kind(&self) -> ElementKind {
        self.kind
    }
    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }
    fn is_muted(&self) -> bool {
        self.muted
    }
    fn bind(&mut self, track_sid: &str) {
        self.bound = Some(track_sid.to_string());
    }
    fn unbind(&mut self) {
        self.bound = None;
    }
    fn bound_track(&self) -> Option<&str> {
        self.bound.as_deref()
    }
}

#[derive(Debug, Clone, Default)]
pub struct HeadlessFactory;

impl ElementFactory for HeadlessFactory {
    fn create(&self, _identity: &str, kind: ElementKind) -> Box<dyn MediaElement> {
        Box::new(HeadlessElement::new(kind))
    }
}

/// One line of a replay script.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptEvent {
    ParticipantConnected {
        identity: String,
        #[serde(default)]
        name: String,
    },
    ParticipantDisconnected {
        identity: String,
    },
    TrackPublished {
        identity: String,
        sid: String,
        source: TrackSource,
        #[serde(default)]
        muted: bool,
    },
    TrackSubscribed {
        identity: String,
        sid: String,
    },
    TrackUnsubscribed {
        identity: String,
        sid: String,
    },
    TrackUnpublished {
        identity: String,
        sid: String,
    },
    TrackMuted {
        identity: String,
        sid: String,
    },
    TrackUnmuted {
        identity: String,
        sid: String,
    },
    ActiveSpeakers {
        identities: Vec<String>,
    },
    Data {
        #[serde(default)]
        from: Option<String>,
        payload: String,
    },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown participant: {0}")]
    UnknownParticipant(String),
    #[error("participant {identity} has no track {sid}")]
    UnknownTrack { identity: String, sid: String },
    #[error("room event receiver is gone")]
    Closed,
}

/// Parse a JSON-lines script. Blank lines and `#` comments are skipped.
pub fn parse_script(text: &str) -> Result<Vec<ScriptEvent>, ReplayError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| ReplayError::Parse {
                line: i + 1,
                source,
            })
        })
        .collect()
}

struct RoomState {
    local: ParticipantSnapshot,
    remotes: Vec<ParticipantSnapshot>,
    sent: Vec<Vec<u8>>,
    denied: Vec<TrackSource>,
    connected: bool,
    next_local_track: usize,
}

impl RoomState {
    fn participant_mut(&mut self, identity: &str) -> Result<&mut ParticipantSnapshot, ReplayError> {
        if self.local.identity == identity {
            return Ok(&mut self.local);
        }
        self.remotes
            .iter_mut()
            .find(|p| p.identity == identity)
            .ok_or_else(|| ReplayError::UnknownParticipant(identity.to_string()))
    }

    fn info(&self, identity: &str) -> ParticipantInfo {
        std::iter::once(&self.local)
            .chain(self.remotes.iter())
            .find(|p| p.identity == identity)
            .map(ParticipantSnapshot::info)
            .unwrap_or_else(|| ParticipantInfo {
                identity: identity.to_string(),
                name: String::new(),
            })
    }
}

fn publication_mut<'a>(
    participant: &'a mut ParticipantSnapshot,
    sid: &str,
) -> Result<&'a mut Publication, ReplayError> {
    let identity = participant.identity.clone();
    participant
        .publications
        .iter_mut()
        .find(|p| p.sid == sid)
        .ok_or_else(|| ReplayError::UnknownTrack {
            identity,
            sid: sid.to_string(),
        })
}

/// In-memory room session. Clones share the same room.
#[derive(Clone)]
pub struct ScriptedRoom {
    state: Arc<Mutex<RoomState>>,
    events: mpsc::Sender<RoomEvent>,
}

impl ScriptedRoom {
    pub fn new(identity: &str, name: &str) -> (Self, mpsc::Receiver<RoomEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let local = ParticipantSnapshot {
            identity: identity.to_string(),
            name: name.to_string(),
            is_local: true,
            is_speaking: false,
            publications: Vec::new(),
        };
        let room = Self {
            state: Arc::new(Mutex::new(RoomState {
                local,
                remotes: Vec::new(),
                sent: Vec::new(),
                denied: Vec::new(),
                connected: true,
                next_local_track: 1,
            })),
            events: tx,
        };
        (room, rx)
    }

    fn lock(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Payloads published on the data channel so far.
    pub fn sent_payloads(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    /// Make enabling `source` fail as if the user denied device access.
    pub fn deny_device(&self, source: TrackSource) {
        self.lock().denied.push(source);
    }

    /// Local capture tracks currently published.
    pub fn local_tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.lock()
            .local
            .publications
            .iter()
            .filter_map(|p| p.track.clone())
            .collect()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Apply every script event in order.
    pub async fn play(&self, script: Vec<ScriptEvent>) -> Result<(), ReplayError> {
        for event in script {
            self.apply(event).await?;
        }
        Ok(())
    }

    /// Mutate the room for one script event and emit the resulting event.
    pub async fn apply(&self, event: ScriptEvent) -> Result<(), ReplayError> {
        let room_event = self.mutate(event)?;
        self.events
            .send(room_event)
            .await
            .map_err(|_| ReplayError::Closed)
    }

    fn mutate(&self, event: ScriptEvent) -> Result<RoomEvent, ReplayError> {
        let mut state = self.lock();
        let room_event = match event {
            ScriptEvent::ParticipantConnected { identity, name } => {
                let info = ParticipantInfo {
                    identity: identity.clone(),
                    name: name.clone(),
                };
                state.remotes.push(ParticipantSnapshot {
                    identity,
                    name,
                    is_local: false,
                    is_speaking: false,
                    publications: Vec::new(),
                });
                RoomEvent::ParticipantConnected(info)
            }
            ScriptEvent::ParticipantDisconnected { identity } => {
                let pos = state
                    .remotes
                    .iter()
                    .position(|p| p.identity == identity)
                    .ok_or_else(|| ReplayError::UnknownParticipant(identity.clone()))?;
                let gone = state.remotes.remove(pos);
                RoomEvent::ParticipantDisconnected(gone.info())
            }
            ScriptEvent::TrackPublished {
                identity,
                sid,
                source,
                muted,
            } => {
                let participant = state.participant_mut(&identity)?;
                let is_local = participant.is_local;
                participant.publications.push(Publication {
                    sid: sid.clone(),
                    source,
                    muted,
                    // Local tracks exist from the start; remote ones on subscribe.
                    track: is_local.then(|| ScriptedTrack::local(&sid) as Arc<dyn MediaTrack>),
                });
                if is_local {
                    RoomEvent::LocalTrackPublished { sid }
                } else {
                    RoomEvent::TrackPublished {
                        participant: identity,
                        sid,
                    }
                }
            }
            ScriptEvent::TrackSubscribed { identity, sid } => {
                let participant = state.participant_mut(&identity)?;
                let publication = publication_mut(participant, &sid)?;
                publication.track = Some(ScriptedTrack::remote(&sid) as Arc<dyn MediaTrack>);
                RoomEvent::TrackSubscribed {
                    participant: identity,
                    sid,
                }
            }
            ScriptEvent::TrackUnsubscribed { identity, sid } => {
                let participant = state.participant_mut(&identity)?;
                publication_mut(participant, &sid)?.track = None;
                RoomEvent::TrackUnsubscribed {
                    participant: identity,
                    sid,
                }
            }
            ScriptEvent::TrackUnpublished { identity, sid } => {
                let participant = state.participant_mut(&identity)?;
                let is_local = participant.is_local;
                let pos = participant
                    .publications
                    .iter()
                    .position(|p| p.sid == sid)
                    .ok_or_else(|| ReplayError::UnknownTrack {
                        identity: identity.clone(),
                        sid: sid.clone(),
                    })?;
                let publication = participant.publications.remove(pos);
                if is_local {
                    if let Some(track) = publication.track {
                        track.stop();
                    }
                    RoomEvent::LocalTrackUnpublished { sid }
                } else {
                    RoomEvent::TrackUnpublished {
                        participant: identity,
                        sid,
                    }
                }
            }
            ScriptEvent::TrackMuted { identity, sid } => {
                let participant = state.participant_mut(&identity)?;
                publication_mut(participant, &sid)?.muted = true;
                RoomEvent::TrackMuted {
                    participant: identity,
                    sid,
                }
            }
            ScriptEvent::TrackUnmuted { identity, sid } => {
                let participant = state.participant_mut(&identity)?;
                publication_mut(participant, &sid)?.muted = false;
                RoomEvent::TrackUnmuted {
                    participant: identity,
                    sid,
                }
            }
            ScriptEvent::ActiveSpeakers { identities } => {
                let state = &mut *state;
                for p in std::iter::once(&mut state.local).chain(state.remotes.iter_mut()) {
                    p.is_speaking = identities.contains(&p.identity);
                }
                RoomEvent::ActiveSpeakersChanged(identities)
            }
            ScriptEvent::Data { from, payload } => RoomEvent::DataReceived {
                payload: payload.into_bytes(),
                from: from.map(|identity| state.info(&identity)),
            },
            ScriptEvent::Disconnected { reason } => {
                state.connected = false;
                RoomEvent::Disconnected { reason }
            }
        };
        Ok(room_event)
    }

    /// Queue an event from a local device toggle. The toggle may run on the
    /// task that drains the queue, so it must not wait for free capacity.
    fn emit(&self, event: RoomEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "Room event queue full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Room event dropped, nobody is listening");
            }
        }
    }

    /// Enable or disable a local capture source the way the SDK does:
    /// camera and microphone are muted when disabled, screen share is
    /// unpublished and its track stopped.
    fn set_source_enabled(&self, source: TrackSource, enabled: bool) -> Result<(), SessionError> {
        let event = {
            let mut state = self.lock();
            if !state.connected {
                return Err(SessionError::Disconnected);
            }
            if enabled && state.denied.contains(&source) {
                return Err(SessionError::Sdk(format!("Permission denied for {source}")));
            }

            let identity = state.local.identity.clone();
            let existing = state.local.publications.iter().position(|p| p.source == source);
            match (existing, enabled) {
                (Some(pos), false) if source == TrackSource::ScreenShare => {
                    let publication = state.local.publications.remove(pos);
                    if let Some(track) = publication.track {
                        track.stop();
                    }
                    Some(RoomEvent::LocalTrackUnpublished {
                        sid: publication.sid,
                    })
                }
                (Some(pos), enabled) => {
                    let publication = &mut state.local.publications[pos];
                    if publication.muted == !enabled {
                        None
                    } else {
                        publication.muted = !enabled;
                        let sid = publication.sid.clone();
                        Some(if enabled {
                            RoomEvent::TrackUnmuted {
                                participant: identity,
                                sid,
                            }
                        } else {
                            RoomEvent::TrackMuted {
                                participant: identity,
                                sid,
                            }
                        })
                    }
                }
                (None, true) => {
                    let sid = format!("TR_local_{source}_{}", state.next_local_track);
                    state.next_local_track += 1;
                    state.local.publications.push(Publication {
                        sid: sid.clone(),
                        source,
                        muted: false,
                        track: Some(ScriptedTrack::local(&sid) as Arc<dyn MediaTrack>),
                    });
                    Some(RoomEvent::LocalTrackPublished { sid })
                }
                (None, false) => None,
            }
        };

        if let Some(event) = event {
            self.emit(event);
        }
        Ok(())
    }
}

impl RoomSession for ScriptedRoom {
    fn local_participant(&self) -> ParticipantSnapshot {
        self.lock().local.clone()
    }

    fn participants(&self) -> Vec<ParticipantSnapshot> {
        let state = self.lock();
        std::iter::once(&state.local)
            .chain(state.remotes.iter())
            .cloned()
            .collect()
    }

    async fn publish_data(&self, payload: Vec<u8>) -> Result<(), SessionError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(SessionError::Disconnected);
        }
        state.sent.push(payload);
        Ok(())
    }

    async fn set_camera_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        self.set_source_enabled(TrackSource::Camera, enabled)
    }

    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        self.set_source_enabled(TrackSource::Microphone, enabled)
    }

    async fn set_screen_share_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        self.set_source_enabled(TrackSource::ScreenShare, enabled)
    }

    async fn disconnect(&self) {
        let mut state = self.lock();
        if state.connected {
            state.connected = false;
            info!(identity = %state.local.identity, "Left room");
        }
    }
}

/// Connector that hands out fresh [`ScriptedRoom`]s.
pub struct ScriptedConnector {
    name: String,
    failure: Mutex<Option<ConnectError>>,
    rooms: Mutex<Vec<ScriptedRoom>>,
}

impl ScriptedConnector {
    /// Rooms join as `name`, which is also the identity.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            failure: Mutex::new(None),
            rooms: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next connect attempts with `error` until cleared with `None`.
    pub fn fail_with(&self, error: Option<ConnectError>) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = error;
    }

    /// Rooms opened so far, oldest first.
    pub fn rooms(&self) -> Vec<ScriptedRoom> {
        self.rooms.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl RoomConnector for ScriptedConnector {
    type Session = ScriptedRoom;

    async fn connect(
        &self,
        url: &str,
        token: &str,
    ) -> Result<(ScriptedRoom, mpsc::Receiver<RoomEvent>), ConnectError> {
        if let Some(error) = self.failure.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            warn!(%url, "Scripted connect failing: {error}");
            return Err(error);
        }
        if token.is_empty() {
            return Err(ConnectError::Refused("empty token".to_string()));
        }
        let (room, events) = ScriptedRoom::new(&self.name, &self.name);
        self.rooms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(room.clone());
        info!(%url, identity = %self.name, "Connected to scripted room");
        Ok((room, events))
    }
}

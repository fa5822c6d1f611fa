//! Participant tile reconciliation.
//!
//! Every relevant room event re-derives each tile from the SDK's current
//! publication set. A playback element stays bound to exactly the track the
//! SDK reports; when the track object changes the old binding is detached and
//! a fresh element is bound.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chadmeet_protocol::TrackSource;
use tracing::{debug, info, warn};

use crate::sdk::{ElementFactory, ElementKind, MediaElement, MediaTrack, ParticipantSnapshot};

/// Per-participant render flags. Disposable; rebuilt from snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileState {
    pub has_camera: bool,
    pub has_screen: bool,
    pub has_audio: bool,
    pub is_speaking: bool,
}

/// What a tile shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileView {
    Avatar { initial: char },
    Camera,
    Screen,
    CameraAndScreen,
}

impl TileState {
    pub fn view(&self, initial: char) -> TileView {
        match (self.has_camera, self.has_screen) {
            (true, true) => TileView::CameraAndScreen,
            (false, true) => TileView::Screen,
            (true, false) => TileView::Camera,
            (false, false) => TileView::Avatar { initial },
        }
    }
}

/// Placeholder letter for a participant without video.
pub fn avatar_initial(name: &str, identity: &str) -> char {
    [name, identity]
        .iter()
        .find_map(|s| s.trim().chars().next())
        .and_then(|c| c.to_uppercase().next())
        .unwrap_or('U')
}

/// Element slots of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Camera,
    Screen,
    Microphone,
    ScreenAudio,
}

impl Slot {
    const ALL: [Slot; 4] = [Slot::Camera, Slot::Screen, Slot::Microphone, Slot::ScreenAudio];

    fn source(self) -> TrackSource {
        match self {
            Slot::Camera => TrackSource::Camera,
            Slot::Screen => TrackSource::ScreenShare,
            Slot::Microphone => TrackSource::Microphone,
            Slot::ScreenAudio => TrackSource::ScreenShareAudio,
        }
    }

    fn kind(self) -> ElementKind {
        match self {
            Slot::Camera | Slot::Screen => ElementKind::Video,
            Slot::Microphone | Slot::ScreenAudio => ElementKind::Audio,
        }
    }
}

/// Change to the rendered tile set produced by one reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileChange {
    Added { identity: String, view: TileView },
    Updated { identity: String, view: TileView },
    Removed { identity: String },
}

struct Binding {
    track: Arc<dyn MediaTrack>,
    element: Box<dyn MediaElement>,
}

impl Binding {
    fn release(mut self) {
        self.track.detach(self.element.as_mut());
    }
}

struct Tile {
    initial: char,
    state: TileState,
    bindings: HashMap<Slot, Binding>,
}

impl Tile {
    fn view(&self) -> TileView {
        self.state.view(self.initial)
    }
}

/// Keeps playback elements in sync with the room's published tracks.
pub struct TrackReconciler<F: ElementFactory> {
    factory: F,
    tiles: BTreeMap<String, Tile>,
    /// Local capture tracks seen in the latest pass; stopped on teardown.
    local_tracks: HashMap<String, Arc<dyn MediaTrack>>,
    torn_down: bool,
}

impl<F: ElementFactory> TrackReconciler<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            tiles: BTreeMap::new(),
            local_tracks: HashMap::new(),
            torn_down: false,
        }
    }

    /// Bring every tile in line with `participants`.
    pub fn reconcile(&mut self, participants: &[ParticipantSnapshot]) -> Vec<TileChange> {
        if self.torn_down {
            debug!("Reconcile after teardown ignored");
            return Vec::new();
        }

        let mut changes = Vec::new();

        let departed: Vec<String> = self
            .tiles
            .keys()
            .filter(|id| !participants.iter().any(|p| &p.identity == *id))
            .cloned()
            .collect();
        for identity in departed {
            if let Some(tile) = self.tiles.remove(&identity) {
                for (_, binding) in tile.bindings {
                    binding.release();
                }
            }
            debug!(%identity, "Tile removed");
            changes.push(TileChange::Removed { identity });
        }

        for participant in participants {
            if participant.is_local {
                self.track_local_media(participant);
            }

            let is_new = !self.tiles.contains_key(&participant.identity);
            let tile = self
                .tiles
                .entry(participant.identity.clone())
                .or_insert_with(|| Tile {
                    initial: avatar_initial(&participant.name, &participant.identity),
                    state: TileState::default(),
                    bindings: HashMap::new(),
                });
            tile.initial = avatar_initial(&participant.name, &participant.identity);
            let before = tile.view();
            let before_state = tile.state;

            for slot in Slot::ALL {
                sync_slot(&self.factory, tile, participant, slot);
            }
            tile.state = TileState {
                has_camera: tile.bindings.contains_key(&Slot::Camera),
                has_screen: tile.bindings.contains_key(&Slot::Screen),
                has_audio: participant.is_enabled(TrackSource::Microphone),
                is_speaking: participant.is_speaking,
            };

            let view = tile.view();
            let identity = participant.identity.clone();
            if is_new {
                changes.push(TileChange::Added { identity, view });
            } else if view != before || tile.state != before_state {
                changes.push(TileChange::Updated { identity, view });
            }
        }

        changes
    }

    /// Detach every element and stop every local capture track. Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        for (_, tile) in std::mem::take(&mut self.tiles) {
            for (_, binding) in tile.bindings {
                binding.release();
            }
        }
        for (sid, track) in self.local_tracks.drain() {
            debug!(%sid, "Stopping local track");
            track.stop();
        }
        info!("Room view torn down, local media released");
    }

    pub fn view(&self, identity: &str) -> Option<TileView> {
        self.tiles.get(identity).map(Tile::view)
    }

    pub fn state(&self, identity: &str) -> Option<TileState> {
        self.tiles.get(identity).map(|t| t.state)
    }

    /// Element currently bound in `slot` of a tile.
    pub fn element(&self, identity: &str, slot: Slot) -> Option<&dyn MediaElement> {
        self.tiles
            .get(identity)?
            .bindings
            .get(&slot)
            .map(|b| b.element.as_ref())
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.tiles.keys().map(String::as_str)
    }

    fn track_local_media(&mut self, local: &ParticipantSnapshot) {
        // The SDK stops tracks it unpublishes, so only current ones are held.
        self.local_tracks = local
            .publications
            .iter()
            .filter_map(|p| p.track.as_ref())
            .map(|t| (t.sid().to_string(), Arc::clone(t)))
            .collect();
    }
}

impl<F: ElementFactory> Drop for TrackReconciler<F> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Rebind one slot of a tile to whatever track the participant now offers.
fn sync_slot<F: ElementFactory>(
    factory: &F,
    tile: &mut Tile,
    participant: &ParticipantSnapshot,
    slot: Slot,
) {
    // Own microphone is never played back.
    let desired = if participant.is_local && slot.kind() == ElementKind::Audio {
        None
    } else {
        participant
            .publication(slot.source())
            .and_then(|p| p.available_track())
    };

    let unchanged = match (tile.bindings.get(&slot), desired) {
        (Some(bound), Some(track)) => {
            bound.track.sid() == track.sid() && Arc::ptr_eq(&bound.track, track)
        }
        (None, None) => true,
        _ => false,
    };
    if unchanged {
        return;
    }

    if let Some(old) = tile.bindings.remove(&slot) {
        debug!(identity = %participant.identity, ?slot, sid = old.track.sid(), "Detaching track");
        old.release();
    }

    let Some(track) = desired else {
        return;
    };

    let mut element = factory.create(&participant.identity, slot.kind());
    // Self-preview is silent; remote audio plays.
    element.set_muted(participant.is_local);
    match track.attach(element.as_mut()) {
        Ok(()) => {
            debug!(identity = %participant.identity, ?slot, sid = track.sid(), "Track attached");
            tile.bindings.insert(
                slot,
                Binding {
                    track: Arc::clone(track),
                    element,
                },
            );
        }
        Err(e) => {
            warn!(
                identity = %participant.identity,
                ?slot,
                sid = track.sid(),
                "Attach failed, showing placeholder: {e}"
            );
        }
    }
}

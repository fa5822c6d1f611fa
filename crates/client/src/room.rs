use std::future::Future;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::chat::ChatLog;
use crate::controls::MediaControls;
use crate::reconcile::{TileChange, TrackReconciler};
use crate::sdk::{ElementFactory, RoomEvent, RoomSession};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Why [`RoomView::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomExit {
    /// The SDK reported the room as disconnected.
    Disconnected { reason: String },
    /// The caller asked to leave.
    Left,
    /// The event stream closed without a disconnect event.
    StreamClosed,
}

/// User actions handled by the room loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomCommand {
    SendChat(String),
    ToggleCamera,
    ToggleMicrophone,
    ToggleScreenShare,
}

#[derive(Debug, thiserror::Error)]
#[error("room view is gone")]
pub struct ViewClosed;

/// Sends user actions to a [`RoomView`], including while it runs.
///
/// Commands are queued and applied in order by the room loop. Outcomes show
/// up in [`RoomView::chat`] and [`RoomView::controls`]; failures are logged.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    commands: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub async fn send(&self, command: RoomCommand) -> Result<(), ViewClosed> {
        self.commands.send(command).await.map_err(|_| ViewClosed)
    }

    pub async fn send_chat(&self, input: impl Into<String>) -> Result<(), ViewClosed> {
        self.send(RoomCommand::SendChat(input.into())).await
    }

    pub async fn toggle_camera(&self) -> Result<(), ViewClosed> {
        self.send(RoomCommand::ToggleCamera).await
    }

    pub async fn toggle_microphone(&self) -> Result<(), ViewClosed> {
        self.send(RoomCommand::ToggleMicrophone).await
    }

    pub async fn toggle_screen_share(&self) -> Result<(), ViewClosed> {
        self.send(RoomCommand::ToggleScreenShare).await
    }
}

/// Tiles, chat and controls of one joined room.
///
/// A view serves a single session: once [`RoomView::run`] returns, its
/// elements are detached and local media is released.
pub struct RoomView<F: ElementFactory> {
    reconciler: TrackReconciler<F>,
    chat: ChatLog,
    controls: MediaControls,
    commands_tx: mpsc::Sender<RoomCommand>,
    commands: mpsc::Receiver<RoomCommand>,
}

impl<F: ElementFactory> RoomView<F> {
    pub fn new(factory: F) -> Self {
        let (commands_tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        Self {
            reconciler: TrackReconciler::new(factory),
            chat: ChatLog::new(),
            controls: MediaControls::default(),
            commands_tx,
            commands,
        }
    }

    /// Handle for chat and device controls. Commands sent before
    /// [`RoomView::run`] starts are applied once it does.
    pub fn handle(&self) -> RoomHandle {
        RoomHandle {
            commands: self.commands_tx.clone(),
        }
    }

    pub fn tiles(&self) -> &TrackReconciler<F> {
        &self.reconciler
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    pub fn controls(&self) -> MediaControls {
        self.controls
    }

    /// Consume room events and user commands until the room disconnects or
    /// `shutdown` resolves, then release local media and leave the room.
    pub async fn run<S, Q>(
        &mut self,
        session: &S,
        mut events: mpsc::Receiver<RoomEvent>,
        shutdown: Q,
    ) -> RoomExit
    where
        S: RoomSession,
        Q: Future<Output = ()>,
    {
        self.refresh(session);
        self.controls.sync(&session.local_participant());

        tokio::pin!(shutdown);
        let exit = loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        warn!("Room event stream closed");
                        break RoomExit::StreamClosed;
                    };
                    if let Some(exit) = self.handle_event(session, event) {
                        break exit;
                    }
                }
                Some(command) = self.commands.recv() => {
                    self.handle_command(session, command).await;
                }
                _ = &mut shutdown => {
                    info!("Leaving room");
                    break RoomExit::Left;
                }
            }
        };

        // Pick up local tracks published after the last handled event.
        self.refresh(session);
        self.reconciler.teardown();
        session.disconnect().await;
        exit
    }

    async fn handle_command<S: RoomSession>(&mut self, session: &S, command: RoomCommand) {
        debug!(?command, "Room command");
        // Toggle failures are logged by the controls.
        match command {
            RoomCommand::SendChat(input) => {
                if let Err(e) = self.chat.send(session, &input).await {
                    warn!("Chat message not sent: {e}");
                }
            }
            RoomCommand::ToggleCamera => {
                let _ = self.controls.toggle_camera(session).await;
            }
            RoomCommand::ToggleMicrophone => {
                let _ = self.controls.toggle_microphone(session).await;
            }
            RoomCommand::ToggleScreenShare => {
                let _ = self.controls.toggle_screen_share(session).await;
            }
        }
    }

    fn handle_event<S: RoomSession>(&mut self, session: &S, event: RoomEvent) -> Option<RoomExit> {
        debug!(?event, "Room event");
        match event {
            RoomEvent::ParticipantConnected(info) => {
                info!(identity = %info.identity, name = %info.name, "Participant joined");
                self.refresh(session);
            }
            RoomEvent::ParticipantDisconnected(info) => {
                info!(identity = %info.identity, "Participant left");
                self.refresh(session);
            }
            RoomEvent::TrackPublished { .. }
            | RoomEvent::TrackUnpublished { .. }
            | RoomEvent::TrackSubscribed { .. }
            | RoomEvent::TrackUnsubscribed { .. }
            | RoomEvent::ActiveSpeakersChanged(_) => {
                self.refresh(session);
            }
            RoomEvent::TrackMuted { .. }
            | RoomEvent::TrackUnmuted { .. }
            | RoomEvent::LocalTrackPublished { .. }
            | RoomEvent::LocalTrackUnpublished { .. } => {
                self.refresh(session);
                self.controls.sync(&session.local_participant());
            }
            RoomEvent::DataReceived { payload, from } => {
                if let Some(entry) = self.chat.receive(&payload, from.as_ref()) {
                    info!(from = %entry.from, "Chat: {}", entry.message);
                }
            }
            RoomEvent::Disconnected { reason } => {
                info!(%reason, "Room disconnected");
                return Some(RoomExit::Disconnected { reason });
            }
        }
        None
    }

    fn refresh<S: RoomSession>(&mut self, session: &S) {
        for change in self.reconciler.reconcile(&session.participants()) {
            match change {
                TileChange::Added { identity, view } => info!(%identity, ?view, "Tile added"),
                TileChange::Updated { identity, view } => info!(%identity, ?view, "Tile updated"),
                TileChange::Removed { identity } => info!(%identity, "Tile removed"),
            }
        }
    }
}

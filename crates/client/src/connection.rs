use tokio::sync::mpsc;
use tracing::{error, info};

use crate::sdk::{ConnectError, RoomConnector, RoomEvent};
use crate::token::{TokenClient, TokenFetchError};

/// What the user asked to join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub room: String,
    pub participant: String,
    /// Media server URL; asked from the token server when unset.
    pub server_url: Option<String>,
}

/// Connection status shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Failed { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("could not get a join token: {0}")]
    Token(#[from] TokenFetchError),
    #[error("could not connect to the room: {0}")]
    Connect(#[from] ConnectError),
}

/// A connected room and its event stream.
pub struct Joined<S> {
    pub session: S,
    pub events: mpsc::Receiver<RoomEvent>,
}

/// One join attempt plus the manual retry action.
pub struct Connection<'a, C: RoomConnector> {
    tokens: &'a TokenClient,
    connector: &'a C,
    request: JoinRequest,
    state: ConnectionState,
    joined: Option<Joined<C::Session>>,
}

impl<'a, C: RoomConnector> Connection<'a, C> {
    /// Fetch a token and connect. Failure is reported through [`Self::state`].
    pub async fn join(tokens: &'a TokenClient, connector: &'a C, request: &JoinRequest) -> Self {
        let mut connection = Self {
            tokens,
            connector,
            request: request.clone(),
            state: ConnectionState::Connecting,
            joined: None,
        };
        connection.attempt().await;
        connection
    }

    /// Repeat the join after a failure. No-op once connected.
    pub async fn retry(&mut self) -> &ConnectionState {
        if self.state != ConnectionState::Connected {
            self.attempt().await;
        }
        &self.state
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Hand the session over to the room view.
    pub fn take_joined(&mut self) -> Option<Joined<C::Session>> {
        self.joined.take()
    }

    async fn attempt(&mut self) {
        self.state = ConnectionState::Connecting;
        match self.try_join().await {
            Ok(joined) => {
                info!(room = %self.request.room, participant = %self.request.participant, "Joined room");
                self.joined = Some(joined);
                self.state = ConnectionState::Connected;
            }
            Err(e) => {
                error!(room = %self.request.room, "Join failed: {e}");
                self.state = ConnectionState::Failed {
                    message: e.to_string(),
                };
            }
        }
    }

    async fn try_join(&self) -> Result<Joined<C::Session>, JoinError> {
        let server_url = match &self.request.server_url {
            Some(url) => url.clone(),
            None => self.tokens.client_config().await?.server_url,
        };
        let token = self
            .tokens
            .fetch(&self.request.room, &self.request.participant)
            .await?;
        let (session, events) = self.connector.connect(&server_url, &token).await?;
        Ok(Joined { session, events })
    }
}

mod cli;

use anyhow::Context;
use chadmeet_client::connection::{Connection, ConnectionState, JoinRequest, Joined};
use chadmeet_client::replay::{self, HeadlessFactory, ScriptedConnector, ScriptedRoom};
use chadmeet_client::room::{RoomExit, RoomView};
use chadmeet_client::token::TokenClient;
use cli::{Args, Command};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let argv: Vec<String> = std::env::args().collect();
    let args = cli::parse_args(&argv)?;

    match &args.command {
        Command::Token => print_token(&args).await,
        Command::Replay { script } => {
            let text = std::fs::read_to_string(script)
                .with_context(|| format!("Failed to read script: {}", script.display()))?;
            let events = replay::parse_script(&text).context("Invalid replay script")?;
            info!(script = %script.display(), events = events.len(), "Replaying room script");
            run_replay(&args, events).await
        }
    }
}

async fn print_token(args: &Args) -> anyhow::Result<()> {
    let client = TokenClient::new(&args.server);
    let token = client
        .fetch(&args.room, &args.name)
        .await
        .context("Token request failed")?;
    println!("{token}");
    Ok(())
}

async fn run_replay(args: &Args, script: Vec<replay::ScriptEvent>) -> anyhow::Result<()> {
    let (room, events) = if args.join {
        join_scripted(args).await?
    } else {
        ScriptedRoom::new(&args.name, &args.name)
    };

    let player = room.clone();
    let mut view = RoomView::new(HeadlessFactory);
    // Playback is driven from the shutdown future so a broken script ends the
    // run instead of leaving the view waiting.
    let shutdown = async move {
        tokio::select! {
            result = player.play(script) => match result {
                Ok(()) => {
                    let _ = tokio::signal::ctrl_c().await;
                }
                Err(e) => error!("Replay stopped early: {e}"),
            },
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for ctrl-c: {e}");
                }
            }
        }
    };
    let exit = view.run(&room, events, shutdown).await;

    match &exit {
        RoomExit::Disconnected { reason } => info!(%reason, "Replay finished"),
        RoomExit::Left => info!("Replay interrupted"),
        RoomExit::StreamClosed => info!("Replay event stream closed"),
    }
    for entry in view.chat().entries() {
        println!("[{}] {}: {}", entry.timestamp_ms, entry.from, entry.message);
    }
    Ok(())
}

/// Fetch a real join token, then connect to an in-memory room with it.
async fn join_scripted(
    args: &Args,
) -> anyhow::Result<(ScriptedRoom, tokio::sync::mpsc::Receiver<chadmeet_client::sdk::RoomEvent>)> {
    let tokens = TokenClient::new(&args.server);
    let connector = ScriptedConnector::new(&args.name);
    let request = JoinRequest {
        room: args.room.clone(),
        participant: args.name.clone(),
        server_url: None,
    };

    let mut connection = Connection::join(&tokens, &connector, &request).await;
    if let ConnectionState::Failed { message } = connection.state() {
        anyhow::bail!("Could not join {}: {message}", args.room);
    }
    let Joined { session, events } = connection
        .take_joined()
        .context("Connected without a session")?;
    Ok((session, events))
}

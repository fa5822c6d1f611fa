use std::path::PathBuf;

use anyhow::Context;

pub(crate) const DEFAULT_SERVER: &str = "http://localhost:3000";
pub(crate) const DEFAULT_ROOM: &str = "ChadMeetings";

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Command {
    /// Print a join token fetched from the token server.
    Token,
    /// Play a JSON-lines room script through the room view.
    Replay { script: PathBuf },
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Args {
    pub command: Command,
    pub server: String,
    pub room: String,
    pub name: String,
    /// Fetch a token before replaying, exercising the full join path.
    pub join: bool,
}

fn print_help() {
    println!("chadmeet-client - Chad Meet room client");
    println!();
    println!("USAGE:");
    println!("    chadmeet-client token [OPTIONS]");
    println!("    chadmeet-client replay <SCRIPT> [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --server <URL>       Token server base URL [default: {DEFAULT_SERVER}]");
    println!("    --room <NAME>        Room to join [default: {DEFAULT_ROOM}]");
    println!("    --name <NAME>        Participant name (required for token)");
    println!("    --join               replay: fetch a token from --server first");
    println!("    -V, --version        Print version and exit");
    println!("    -h, --help           Print this help and exit");
}

pub(crate) fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let mut command = None;
    let mut script = None;
    let mut server = DEFAULT_SERVER.to_string();
    let mut room = DEFAULT_ROOM.to_string();
    let mut name = None;
    let mut join = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-V" | "--version" => {
                println!("chadmeet-client {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "--server" => {
                i += 1;
                server = args.get(i).context("Missing --server value")?.clone();
            }
            "--room" => {
                i += 1;
                room = args.get(i).context("Missing --room value")?.clone();
            }
            "--name" => {
                i += 1;
                name = Some(args.get(i).context("Missing --name value")?.clone());
            }
            "--join" => join = true,
            "token" | "replay" if command.is_none() => command = Some(args[i].clone()),
            other if command.as_deref() == Some("replay") && script.is_none() => {
                script = Some(PathBuf::from(other));
            }
            other => anyhow::bail!("Unknown argument: {other}"),
        }
        i += 1;
    }

    let command = match command.as_deref() {
        Some("token") => Command::Token,
        Some("replay") => Command::Replay {
            script: script.context("replay needs a script path")?,
        },
        _ => anyhow::bail!("Expected a command: token or replay (see --help)"),
    };

    let name = match (&command, name) {
        (_, Some(name)) if !name.trim().is_empty() => name,
        (Command::Token, _) => anyhow::bail!("--name is required"),
        (Command::Replay { .. }, _) => "me".to_string(),
    };

    Ok(Args {
        command,
        server,
        room,
        name,
        join,
    })
}

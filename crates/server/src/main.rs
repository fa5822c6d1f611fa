mod config;
mod tls;
mod token;
mod web;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::web::AppState;

const DEFAULT_CONFIG: &str = "./config/chadmeet.toml";

#[derive(Debug, PartialEq, Eq)]
struct ServerArgs {
    config_path: PathBuf,
    port: Option<u16>,
}

fn print_help() {
    println!("chadmeet-server - Chad Meet token server");
    println!();
    println!("USAGE:");
    println!("    chadmeet-server [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <PATH>  Config file [default: {DEFAULT_CONFIG}]");
    println!("    -p, --port <PORT>    Listen port, overrides the config file");
    println!("    -V, --version        Print version and exit");
    println!("    -h, --help           Print this help and exit");
}

fn parse_args(args: &[String]) -> Result<ServerArgs> {
    let mut parsed = ServerArgs {
        config_path: PathBuf::from(DEFAULT_CONFIG),
        port: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-V" | "--version" => {
                println!("chadmeet-server {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "--config" | "-c" => {
                i += 1;
                let path = args.get(i).context("Missing --config value")?;
                parsed.config_path = PathBuf::from(path);
            }
            "--port" | "-p" => {
                i += 1;
                let port = args.get(i).context("Missing --port value")?;
                parsed.port = Some(
                    port.parse()
                        .with_context(|| format!("Invalid --port value: {port}"))?,
                );
            }
            other => anyhow::bail!("Unknown argument: {other} (see --help)"),
        }
        i += 1;
    }

    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let argv: Vec<String> = std::env::args().collect();
    let args = parse_args(&argv)?;

    // Load configuration
    let mut config = config::load_config(&args.config_path)?;
    if let Some(p) = args.port {
        config.server.port = p;
    }
    // Validate configuration semantics
    if let Err(issues) = config.validate() {
        let has_errors = issues.iter().any(|i| i.starts_with("ERROR:"));
        for issue in &issues {
            if issue.starts_with("ERROR:") {
                tracing::error!("{}", issue);
            } else {
                tracing::warn!("{}", issue);
            }
        }
        if has_errors {
            tracing::error!(
                "Configuration has {} issue(s). Fix the ERROR(s) above and restart.",
                issues.len()
            );
            std::process::exit(1);
        }
    }

    if !std::path::Path::new(&config.server.web_root).is_dir() {
        tracing::warn!(
            "Web root '{}' does not exist, only the API will be served. \
             Set server.web_root in the config to serve the client.",
            config.server.web_root
        );
    }

    let bind_addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .context("Invalid bind address")?;

    let tls_acceptor = if config.server.tls {
        rustls::crypto::ring::default_provider()
            .install_default()
            .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;
        Some(tls::build_acceptor(
            config.server.tls_cert.as_deref(),
            config.server.tls_key.as_deref(),
        )?)
    } else {
        None
    };

    let scheme = if tls_acceptor.is_some() { "https" } else { "http" };
    let livekit_url = config.livekit.url.clone();

    let state = Arc::new(AppState::new(config));

    let app = web::build_router(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id = %request_id,
                    )
                })
                .on_request(|_request: &axum::http::Request<_>, _span: &tracing::Span| {
                    tracing::event!(Level::INFO, "started");
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::event!(
                            Level::INFO,
                            status = %response.status().as_u16(),
                            duration_ms = %latency.as_millis(),
                            "completed"
                        );
                    },
                ),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    // Print startup banner
    tracing::info!("===========================================");
    tracing::info!("  Chad Meet Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("  Listening on {scheme}://{bind_addr}");
    tracing::info!("  Media server: {livekit_url}");
    tracing::info!("===========================================");

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {bind_addr}"))?;

    tracing::info!("Server ready, accepting connections");

    match tls_acceptor {
        Some(acceptor) => serve_tls(listener, acceptor, app).await?,
        None => {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    if let Err(e) = shutdown_signal().await {
                        tracing::error!("Failed to listen for shutdown signal: {e}");
                    }
                })
                .await
                .context("HTTP server error")?;
        }
    }

    tracing::info!("Chad Meet server shut down cleanly");

    Ok(())
}

/// Accept TLS connections and hand each one to hyper until a shutdown signal.
async fn serve_tls(
    listener: TcpListener,
    acceptor: tokio_rustls::TlsAcceptor,
    app: Router,
) -> Result<()> {
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!("Failed to accept TCP connection: {e}");
                        continue;
                    }
                };

                let acceptor = acceptor.clone();
                let app = app.clone();

                tokio::spawn(async move {
                    // TLS handshake timeout (10 seconds)
                    let tls_stream = match tokio::time::timeout(
                        std::time::Duration::from_secs(10),
                        acceptor.accept(stream),
                    ).await {
                        Ok(Ok(s)) => s,
                        Ok(Err(e)) => {
                            tracing::debug!(%peer_addr, "TLS handshake failed: {e}");
                            return;
                        }
                        Err(_) => {
                            tracing::debug!(%peer_addr, "TLS handshake timed out");
                            return;
                        }
                    };

                    let io = hyper_util::rt::TokioIo::new(tls_stream);
                    let hyper_service = hyper_util::service::TowerToHyperService::new(app);
                    let builder = hyper_util::server::conn::auto::Builder::new(
                        hyper_util::rt::TokioExecutor::new(),
                    );

                    if let Err(e) = builder.serve_connection(io, hyper_service).await {
                        tracing::debug!(%peer_addr, "Connection error: {e}");
                    }
                });
            }
            result = &mut shutdown => {
                result?;
                return Ok(());
            }
        }
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() -> Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("chadmeet-server")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_without_flags() {
        let args = parse_args(&argv(&[])).unwrap();
        assert_eq!(args.config_path, PathBuf::from(DEFAULT_CONFIG));
        assert_eq!(args.port, None);
    }

    #[test]
    fn config_and_port_flags() {
        let args = parse_args(&argv(&["-c", "/etc/chadmeet.toml", "--port", "8443"])).unwrap();
        assert_eq!(args.config_path, PathBuf::from("/etc/chadmeet.toml"));
        assert_eq!(args.port, Some(8443));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let err = parse_args(&argv(&["--prot", "8080"])).unwrap_err();
        assert!(err.to_string().contains("--prot"), "{err}");
    }

    #[test]
    fn bad_or_missing_port_is_rejected() {
        assert!(parse_args(&argv(&["--port", "http"])).is_err());
        assert!(parse_args(&argv(&["--port"])).is_err());
        assert!(parse_args(&argv(&["--config"])).is_err());
    }
}

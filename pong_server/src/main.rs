//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p pong_server
//!
//! Ports and rates come from the JSON file named by `PONG_CONFIG`, or the
//! defaults. The server waits for two players, then runs until SIGINT or
//! SIGTERM.

use std::process::ExitCode;

use anyhow::Context;
use pong_server::server::GameServer;
use pong_shared::{config::PongConfig, shutdown::Shutdown};
use tracing::{error, info, warn};

async fn run() -> anyhow::Result<()> {
    let cfg = PongConfig::from_env().context("load config")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        tcp_port = cfg.tcp_port,
        udp_port = cfg.udp_port,
        tick_hz = cfg.tick_hz,
        "Starting the server"
    );
    info!("You can stop the server with CTRL+C or with the kill command");

    let shutdown = Shutdown::new();
    shutdown.cancel_on_signal();

    let mut server = GameServer::bind(cfg).await.context("bind server")?;

    let joined = tokio::select! {
        res = server.accept_players() => Some(res),
        _ = shutdown.cancelled() => None,
    };
    match joined {
        Some(res) => res.context("join phase")?,
        None => {
            info!("Stopped before both players joined");
            return Ok(());
        }
    }

    server.run(&shutdown).await
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    if std::env::args().len() > 1 {
        warn!("The server takes no arguments, ignoring them");
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

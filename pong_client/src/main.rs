//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p pong_client -- <hostname>
//!
//! The client joins the server, then sends its intent every frame and logs
//! the reconciled state.
//!
//! Console commands:
//!   up | u             - Move the racket up
//!   down | d           - Move the racket down
//!   stop | here | s    - Stop the racket
//!   status             - Show ball, rackets and score
//!   quit               - Exit client

use std::{
    io::{BufRead, Write},
    process::ExitCode,
};

use anyhow::Context;
use pong_client::{
    client::GameClient,
    input::{parse_command, ConsoleCommand},
    view::ClientView,
};
use pong_shared::{config::PongConfig, shutdown::Shutdown};
use tokio::{
    sync::mpsc::{self, error::TryRecvError},
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{error, info, warn};

fn print_status(player: u16, view: &ClientView) {
    println!("player #{player}");
    println!(
        "  ball   ({:7.2}, {:7.2})",
        view.ball.position.x, view.ball.position.y
    );
    println!(
        "  left   ({:7.2}, {:7.2})  {} pts",
        view.left.position.x, view.left.position.y, view.score.left
    );
    println!(
        "  right  ({:7.2}, {:7.2})  {} pts",
        view.right.position.x, view.right.position.y, view.score.right
    );
}

async fn run(host: &str) -> anyhow::Result<()> {
    let cfg = PongConfig::from_env().context("load config")?;
    info!(version = env!("CARGO_PKG_VERSION"), %host, "Starting client");

    let shutdown = Shutdown::new();
    shutdown.cancel_on_signal();

    let mut client = GameClient::connect(host, &cfg)
        .await
        .with_context(|| format!("join {host}"))?;
    println!("You are player #{}", client.player_id());

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread. Dropping the sender on EOF ends the session.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Type 'up', 'down' or 'stop' to steer, 'status' for info, 'quit' to exit.");
    println!();

    let mut ticker = time::interval(cfg.frame_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = Instant::now();
    let mut score = client.view().score;

    'frames: loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.cancelled() => break,
        }

        loop {
            match console_rx.try_recv() {
                Ok(line) => match parse_command(&line) {
                    Some(ConsoleCommand::Intent(dir)) => client.set_intent(dir),
                    Some(ConsoleCommand::Status) => {
                        print_status(client.player_id(), client.view())
                    }
                    Some(ConsoleCommand::Quit) => break 'frames,
                    None => println!("Unknown command: {line}"),
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'frames,
            }
        }

        let now = Instant::now();
        let dt = (now - last).as_secs_f32();
        last = now;

        if let Err(e) = client.frame(dt).await {
            warn!(error = %e, "Frame failed");
        }

        let current = client.view().score;
        if current != score {
            info!(left = current.left, right = current.right, "Score");
            score = current;
        }
    }

    client.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [host] = args.as_slice() else {
        eprintln!("Usage: client <hostname>");
        return ExitCode::FAILURE;
    };

    match run(host).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Client failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

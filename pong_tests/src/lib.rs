//! Test harness shared by the socket-level integration tests.
//!
//! Spawns a [`GameServer`] on ephemeral loopback ports and joins scripted
//! clients to it.

use std::time::Duration;

use anyhow::Context;
use pong_client::GameClient;
use pong_server::server::{bind_ephemeral, GameServer};
use pong_shared::{config::PongConfig, protocol::StateSnapshot, shutdown::Shutdown};
use tokio::{task::JoinHandle, time};

/// How long a test waits for the server to stop or a snapshot to arrive.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(3);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// A server session running in the background.
pub struct RunningServer {
    pub cfg: PongConfig,
    pub shutdown: Shutdown,
    handle: JoinHandle<anyhow::Result<GameServer>>,
}

impl RunningServer {
    /// Binds a server and runs the join phase and then the session in a task.
    pub async fn start(tick_hz: u32) -> anyhow::Result<Self> {
        let (mut server, cfg) = bind_ephemeral(tick_hz).await?;
        let shutdown = Shutdown::new();
        let token = shutdown.clone();

        let handle = tokio::spawn(async move {
            let joined = tokio::select! {
                res = server.accept_players() => Some(res),
                _ = token.cancelled() => None,
            };
            match joined {
                Some(res) => res?,
                None => return Ok(server),
            }
            server.run(&token).await?;
            Ok(server)
        });

        Ok(Self {
            cfg,
            shutdown,
            handle,
        })
    }

    /// Joins a scripted client over loopback.
    pub async fn join(&self) -> anyhow::Result<GameClient> {
        GameClient::connect("127.0.0.1", &self.cfg).await
    }

    /// Cancels the session and returns the stopped server.
    pub async fn stop(self) -> anyhow::Result<GameServer> {
        self.shutdown.cancel();
        let joined = time::timeout(TEST_TIMEOUT, self.handle)
            .await
            .context("server did not stop")?;
        joined.context("server task panicked")?
    }
}

/// Runs client frames every 10ms until a snapshot arrives.
pub async fn wait_for_snapshot(client: &mut GameClient) -> anyhow::Result<StateSnapshot> {
    let wait = async {
        loop {
            if let Some(snap) = client.frame(0.01).await? {
                return Ok::<_, anyhow::Error>(snap);
            }
            time::sleep(Duration::from_millis(10)).await;
        }
    };
    time::timeout(TEST_TIMEOUT, wait)
        .await
        .context("no snapshot received")?
}

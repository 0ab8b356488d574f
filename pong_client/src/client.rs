//! Client implementation.
//!
//! The client maintains:
//! - A one-shot TCP handshake that assigns the player id
//! - A datagram socket shared with a receiver task (snapshots in, intents out)
//! - The current intent, re-sent every frame
//! - A [`ClientView`] reconciled from the latest snapshot

use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use pong_shared::{
    config::PongConfig,
    net::{join_receiver, receive_loop, DatagramSocket, ReliableConn},
    protocol::{Direction, PlayerId, Request, Response, StateSnapshot},
    queue::Queue,
};
use tokio::{net::lookup_host, task::JoinHandle};
use tracing::{debug, info};

use crate::{input::build_move, view::ClientView};

/// Receiver-side filter: only snapshots are queued.
fn accept_response(rep: &Response, from: SocketAddr) -> bool {
    match rep {
        Response::State(_) => true,
        other => {
            debug!(%from, ?other, "Ignoring response");
            false
        }
    }
}

/// Drains `queue` and returns the most recent snapshot, discarding older ones.
pub fn latest_state(queue: &Queue<Response>) -> Option<StateSnapshot> {
    queue.drain().into_iter().rev().find_map(|rep| match rep {
        Response::State(snap) => Some(snap),
        _ => None,
    })
}

/// Connects to the first address in `addrs` that accepts a TCP connection.
pub async fn connect_first(
    addrs: impl IntoIterator<Item = SocketAddr>,
) -> anyhow::Result<(ReliableConn, SocketAddr)> {
    let mut last_err = None;
    for addr in addrs {
        match ReliableConn::connect(addr).await {
            Ok(conn) => return Ok((conn, addr)),
            Err(e) => {
                debug!(%addr, error = %e, "Connect failed, trying next address");
                last_err = Some(e.context(format!("connect to {addr}")));
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no address to connect to")))
}

/// High-level game client.
pub struct GameClient {
    player_id: PlayerId,
    server_udp: SocketAddr,

    socket: Arc<DatagramSocket>,
    queue: Arc<Queue<Response>>,
    receiver: Option<JoinHandle<()>>,

    view: ClientView,
    intent: Direction,
    extrapolate: bool,
    snapshots: u64,
}

impl GameClient {
    /// Joins the server at `host` and starts the snapshot receiver.
    pub async fn connect(host: &str, cfg: &PongConfig) -> anyhow::Result<Self> {
        let addrs = lookup_host((host, cfg.tcp_port))
            .await
            .with_context(|| format!("resolve {host}"))?;
        let (mut conn, server_tcp) = connect_first(addrs)
            .await
            .with_context(|| format!("connect to {host}"))?;
        info!(server = %server_tcp, "Connected to server");

        // The UDP socket uses the address family of the connected peer.
        let bind = match server_tcp {
            SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let socket = DatagramSocket::bind(bind).await?;
        let udp_port = socket.local_addr().context("udp local_addr")?.port();

        conn.send(&Request::play(udp_port)).await?;

        let player_id = match conn.recv::<Response>().await? {
            Response::Player { id } => id,
            other => anyhow::bail!("expected PLAYER, got {other:?}"),
        };
        if let Err(e) = conn.close().await {
            debug!(error = %e, "TCP close failed");
        }

        let server_udp = SocketAddr::new(server_tcp.ip(), cfg.udp_port);
        info!(player = player_id, %server_udp, udp_port, "Joined the game");

        let socket = Arc::new(socket);
        let queue = Arc::new(Queue::new());
        let receiver = tokio::spawn(receive_loop(
            socket.clone(),
            queue.clone(),
            accept_response,
        ));

        Ok(Self {
            player_id,
            server_udp,
            socket,
            queue,
            receiver: Some(receiver),
            view: ClientView::new(),
            intent: Direction::Here,
            extrapolate: cfg.extrapolate,
            snapshots: 0,
        })
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn view(&self) -> &ClientView {
        &self.view
    }

    pub fn intent(&self) -> Direction {
        self.intent
    }

    pub fn set_intent(&mut self, intent: Direction) {
        if intent != self.intent {
            debug!(player = self.player_id, ?intent, "Intent changed");
        }
        self.intent = intent;
    }

    /// Number of snapshots applied so far.
    pub fn snapshots_applied(&self) -> u64 {
        self.snapshots
    }

    /// Sends the current intent to the server.
    pub async fn send_intent(&self) -> anyhow::Result<()> {
        let req = build_move(self.player_id, self.intent);
        self.socket.send_to(&req, self.server_udp).await
    }

    /// Applies the most recent queued snapshot, if any.
    pub fn sync(&mut self) -> Option<StateSnapshot> {
        let latest = latest_state(&self.queue)?;
        self.view.apply(&latest);
        self.snapshots += 1;
        Some(latest)
    }

    /// Runs one client frame: send intent, reconcile, then extrapolate when
    /// no fresh snapshot arrived.
    pub async fn frame(&mut self, dt: f32) -> anyhow::Result<Option<StateSnapshot>> {
        self.send_intent().await?;
        let latest = self.sync();
        if latest.is_none() && self.extrapolate {
            self.view.advance(dt);
        }
        Ok(latest)
    }

    /// Stops the receiver task.
    pub async fn shutdown(mut self) {
        if let Some(receiver) = self.receiver.take() {
            info!(player = self.player_id, "Leaving the game");
            join_receiver(&self.socket, &Response::End, receiver).await;
        }
    }
}

impl Drop for GameClient {
    fn drop(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
        }
    }
}

//! Server implementation.
//!
//! The server is authoritative: it owns the arena and is the only place where
//! ball, rackets and score change. A session goes through three phases:
//! - `WaitingForPlayers`: two clients join over TCP, one after the other.
//! - `Active`: a receiver task queues `MOVE` requests, the main loop advances
//!   the simulation and broadcasts a `STATE` snapshot every tick.
//! - `Terminated`: the shutdown token fired and the receiver was joined.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use pong_shared::{
    config::PongConfig,
    net::{join_receiver, receive_loop, DatagramSocket, ReliableListener},
    physics::Side,
    protocol::{
        BodyState, PlayerId, RacketState, Request, RequestKind, Response, StateSnapshot,
        WireMessage, LEFT_PLAYER, RIGHT_PLAYER, UNASSIGNED,
    },
    queue::Queue,
    rules::{Arena, RallyEvent},
    shutdown::Shutdown,
};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

/// Number of players in a session.
pub const PLAYER_COUNT: usize = 2;
/// How long a connecting client has to send its `PLAY` request.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    WaitingForPlayers,
    Active,
    Terminated,
}

/// A joined player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    /// Where snapshots are sent.
    pub remote: SocketAddr,
}

/// Racket controlled by a request origin.
fn side_of(origin: PlayerId) -> Option<Side> {
    match origin {
        LEFT_PLAYER => Some(Side::Left),
        RIGHT_PLAYER => Some(Side::Right),
        _ => None,
    }
}

/// Receiver-side filter: only requests from a joined player id are queued.
fn accept_request(req: &Request, from: SocketAddr) -> bool {
    if side_of(req.origin).is_some() {
        return true;
    }
    warn!(%from, origin = req.origin, "Discarding request with invalid origin");
    false
}

/// Game server.
pub struct GameServer {
    cfg: PongConfig,
    tcp: ReliableListener,
    udp: Arc<DatagramSocket>,

    phase: SessionPhase,
    players: Vec<Player>,
    arena: Arena,
    tick: u64,
}

impl GameServer {
    /// Binds the UDP socket and the TCP listener.
    pub async fn bind(cfg: PongConfig) -> anyhow::Result<Self> {
        let ip: IpAddr = cfg.bind_host.parse().context("parse bind_host")?;
        let udp = DatagramSocket::bind(SocketAddr::new(ip, cfg.udp_port))
            .await
            .with_context(|| format!("bind UDP port {}", cfg.udp_port))?;
        let tcp = ReliableListener::bind(SocketAddr::new(ip, cfg.tcp_port))
            .await
            .with_context(|| format!("bind TCP port {}", cfg.tcp_port))?;

        info!(tcp = %tcp.local_addr()?, udp = %udp.local_addr()?, "Server bound");

        Ok(Self {
            cfg,
            tcp,
            udp: Arc::new(udp),
            phase: SessionPhase::WaitingForPlayers,
            players: Vec::with_capacity(PLAYER_COUNT),
            arena: Arena::new(),
            tick: 0,
        })
    }

    pub fn local_tcp_addr(&self) -> anyhow::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    pub fn local_udp_addr(&self) -> anyhow::Result<SocketAddr> {
        self.udp.local_addr()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Number of ticks simulated so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Runs the join phase until both players are registered.
    ///
    /// A failing `accept` is returned as an error. A client that sends
    /// anything but a `PLAY` request is dropped and its id stays free.
    pub async fn accept_players(&mut self) -> anyhow::Result<()> {
        info!(port = self.local_tcp_addr()?.port(), "Waiting for players");

        while self.players.len() < PLAYER_COUNT {
            let id = self.players.len() as PlayerId + 1;
            if let Some(player) = self.accept_player(id).await? {
                self.players.push(player);
            }
        }

        self.phase = SessionPhase::Active;
        info!("Both players joined");
        Ok(())
    }

    async fn accept_player(&mut self, id: PlayerId) -> anyhow::Result<Option<Player>> {
        let (mut conn, peer) = self.tcp.accept().await?;
        info!(player = id, %peer, "Player connecting");

        let req = match time::timeout(HANDSHAKE_TIMEOUT, conn.recv::<Request>()).await {
            Ok(Ok(req)) => req,
            Ok(Err(e)) => {
                warn!(%peer, error = %e, "Handshake failed");
                return Ok(None);
            }
            Err(_) => {
                warn!(%peer, "Handshake timed out");
                return Ok(None);
            }
        };

        let port = match req {
            Request {
                origin: UNASSIGNED,
                kind: RequestKind::Play { port },
            } => port,
            other => {
                warn!(%peer, ?other, "Expected PLAY request");
                return Ok(None);
            }
        };

        if let Err(e) = conn.send(&Response::Player { id }).await {
            warn!(%peer, error = %e, "Could not send player id");
            return Ok(None);
        }
        if let Err(e) = conn.close().await {
            debug!(%peer, error = %e, "TCP close failed");
        }

        let remote = SocketAddr::new(peer.ip(), port);
        info!(player = id, %remote, "Player joined");
        Ok(Some(Player { id, remote }))
    }

    /// Runs the steady-state loop until `shutdown` fires.
    pub async fn run(&mut self, shutdown: &Shutdown) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.phase == SessionPhase::Active,
            "cannot run session in phase {:?}",
            self.phase
        );

        let queue = Arc::new(Queue::new());
        let receiver = tokio::spawn(receive_loop(
            self.udp.clone(),
            queue.clone(),
            accept_request,
        ));
        queue.clear();

        let period = self.cfg.tick_period();
        let mut last = Instant::now();

        while !shutdown.is_cancelled() {
            let start = Instant::now();
            let elapsed = start - last;
            last = start;

            self.step(elapsed.as_secs_f32(), &queue).await;

            let budget = period.saturating_sub(start.elapsed());
            if !budget.is_zero() {
                tokio::select! {
                    _ = queue.wait_if_empty(budget) => {}
                    _ = shutdown.cancelled() => {}
                }
            }
        }

        info!(ticks = self.tick, "Stopping the server");
        self.phase = SessionPhase::Terminated;
        join_receiver(&self.udp, &Request::end(), receiver).await;
        Ok(())
    }

    /// Executes one tick: advance, apply queued requests, broadcast.
    pub async fn step(&mut self, dt: f32, queue: &Queue<Request>) -> StateSnapshot {
        match self.arena.update(dt) {
            Some(RallyEvent::Point(side)) => {
                let score = self.arena.score;
                info!(?side, left = score.left, right = score.right, "Point scored");
            }
            Some(RallyEvent::Return(side)) => debug!(?side, "Ball returned"),
            None => {}
        }

        for req in queue.drain() {
            self.apply_request(req);
        }

        let snapshot = self.snapshot();
        self.broadcast(&snapshot).await;
        self.tick += 1;
        snapshot
    }

    /// Applies one queued request to the arena.
    pub fn apply_request(&mut self, req: Request) {
        let Some(side) = side_of(req.origin) else {
            warn!(origin = req.origin, "Discarding request with invalid origin");
            return;
        };

        match req.kind {
            RequestKind::Move { dir } => self.arena.racket_mut(side).set_move(dir.into()),
            other => warn!(origin = req.origin, ?other, "Unexpected request during play"),
        }
    }

    /// Current authoritative state.
    pub fn snapshot(&self) -> StateSnapshot {
        let racket = |side| {
            let r = self.arena.racket(side);
            RacketState {
                body: BodyState {
                    position: r.position(),
                    velocity: r.velocity(),
                },
                points: self.arena.score.of(side),
            }
        };

        StateSnapshot {
            ball: BodyState {
                position: self.arena.ball.position(),
                velocity: self.arena.ball.velocity(),
            },
            left: racket(Side::Left),
            right: racket(Side::Right),
        }
    }

    async fn broadcast(&self, snapshot: &StateSnapshot) {
        let payload = Response::State(*snapshot).to_bytes();
        for player in &self.players {
            if let Err(e) = self.udp.send_bytes_to(&payload, player.remote).await {
                debug!(player = player.id, error = %e, "Snapshot not sent");
            }
        }
    }
}

/// Helper for tests: binds both sockets to ephemeral loopback ports.
///
/// The returned config carries the ports actually bound.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(GameServer, PongConfig)> {
    let cfg = PongConfig {
        bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST).to_string(),
        tcp_port: 0,
        udp_port: 0,
        tick_hz,
        ..Default::default()
    };

    let server = GameServer::bind(cfg.clone()).await?;
    let cfg = PongConfig {
        tcp_port: server.local_tcp_addr()?.port(),
        udp_port: server.local_udp_addr()?.port(),
        ..cfg
    };
    Ok((server, cfg))
}

#[cfg(test)]
mod tests {
    use pong_shared::{
        physics::{Move, RACKET_VELOCITY, RACKET_Y_LIMIT},
        protocol::Direction,
    };

    use super::*;

    #[tokio::test]
    async fn move_requests_steer_the_matching_racket() -> anyhow::Result<()> {
        let (mut server, _cfg) = bind_ephemeral(100).await?;

        server.apply_request(Request::movement(LEFT_PLAYER, Direction::Up));
        server.apply_request(Request::movement(RIGHT_PLAYER, Direction::Down));
        assert_eq!(server.arena().left.intent(), Move::Up);
        assert_eq!(server.arena().right.intent(), Move::Down);

        server.apply_request(Request::movement(LEFT_PLAYER, Direction::Here));
        assert_eq!(server.arena().left.intent(), Move::Stop);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_requests_are_discarded() -> anyhow::Result<()> {
        let (mut server, _cfg) = bind_ephemeral(100).await?;

        server.apply_request(Request::movement(7, Direction::Up));
        server.apply_request(Request::movement(UNASSIGNED, Direction::Down));
        server.apply_request(Request {
            origin: LEFT_PLAYER,
            kind: RequestKind::Play { port: 1 },
        });

        assert_eq!(server.arena().left.intent(), Move::Stop);
        assert_eq!(server.arena().right.intent(), Move::Stop);
        Ok(())
    }

    #[tokio::test]
    async fn step_applies_requests_after_advancing() -> anyhow::Result<()> {
        let (mut server, _cfg) = bind_ephemeral(100).await?;
        let queue = Queue::new();

        queue.push(Request::movement(LEFT_PLAYER, Direction::Down));
        let first = server.step(0.105, &queue).await;
        // The intent arrived after this tick's advance.
        assert_eq!(first.left.body.position.y, 0.0);
        assert_eq!(first.left.body.velocity.y, 0.0);

        let second = server.step(0.1, &queue).await;
        assert!((second.left.body.position.y - 5.0).abs() < 1e-3);
        assert_eq!(second.left.body.velocity.y, RACKET_VELOCITY);
        assert_eq!(server.tick(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn held_up_climbs_every_tick_until_the_wall() -> anyhow::Result<()> {
        let (mut server, _cfg) = bind_ephemeral(100).await?;
        let queue = Queue::new();
        queue.push(Request::movement(LEFT_PLAYER, Direction::Up));
        let mut last = server.step(0.015, &queue).await.left.body.position.y;
        assert_eq!(last, 0.0);

        // 0.015s always covers at least one sub-step.
        for _ in 0..70 {
            let y = server.step(0.015, &queue).await.left.body.position.y;
            if last > -RACKET_Y_LIMIT {
                assert!(y < last, "racket did not climb: {last} -> {y}");
            } else {
                assert_eq!(y, -RACKET_Y_LIMIT);
            }
            last = y;
        }
        assert_eq!(last, -RACKET_Y_LIMIT);
        Ok(())
    }

    #[tokio::test]
    async fn snapshot_mirrors_arena() -> anyhow::Result<()> {
        let (mut server, _cfg) = bind_ephemeral(100).await?;
        let queue = Queue::new();
        let snap = server.step(0.25, &queue).await;

        assert_eq!(snap.ball.position, server.arena().ball.position());
        assert_eq!(snap.ball.velocity, server.arena().ball.velocity());
        assert_eq!(snap.left.body.position, server.arena().left.position());
        assert_eq!(snap.right.body.position, server.arena().right.position());
        assert_eq!(snap.left.points, 0);
        assert!(snap.ball.position.x < 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn run_requires_players() -> anyhow::Result<()> {
        let (mut server, _cfg) = bind_ephemeral(100).await?;
        assert_eq!(server.phase(), SessionPhase::WaitingForPlayers);
        assert!(server.run(&Shutdown::new()).await.is_err());
        Ok(())
    }
}

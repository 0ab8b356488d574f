//! Networking primitives.
//!
//! - TCP (`ReliableConn`): join handshake only, one length-prefixed frame per
//!   message.
//! - UDP (`DatagramSocket`): steady-state traffic, one message per datagram.
//! - `receive_loop`: the dedicated receiver feeding a [`Queue`] until a local
//!   end sentinel arrives.

use std::{
    fmt::Debug,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use bytes::{BufMut, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, UdpSocket},
    task::JoinHandle,
    time,
};
use tracing::{debug, warn};

use crate::{
    protocol::{ProtocolError, Request, Response, WireMessage},
    queue::Queue,
};

/// Upper bound for a TCP frame; every message is far smaller.
pub const MAX_FRAME_LEN: usize = 1024;
/// Receive buffer size for datagrams.
pub const MAX_DATAGRAM_LEN: usize = 1500;

/// Messages that carry a local end sentinel.
pub trait Sentinel {
    fn is_end(&self) -> bool;
}

impl Sentinel for Request {
    fn is_end(&self) -> bool {
        Request::is_end(self)
    }
}

impl Sentinel for Response {
    fn is_end(&self) -> bool {
        Response::is_end(self)
    }
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        Ok(Self::new(stream))
    }

    pub async fn send<M: WireMessage>(&mut self, msg: &M) -> anyhow::Result<()> {
        let payload = msg.to_bytes();
        let mut buf = BytesMut::with_capacity(4 + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(&payload);
        self.stream.write_all(&buf).await.context("tcp write")?;
        Ok(())
    }

    pub async fn recv<M: WireMessage>(&mut self) -> anyhow::Result<M> {
        let mut len_buf = [0u8; 4];
        self.stream
            .read_exact(&mut len_buf)
            .await
            .context("tcp read len")?;
        let len = u32::from_be_bytes(len_buf) as usize;
        anyhow::ensure!(len <= MAX_FRAME_LEN, "tcp frame too large: {len} bytes");

        let mut payload = vec![0u8; len];
        self.stream
            .read_exact(&mut payload)
            .await
            .context("tcp read payload")?;
        let msg = M::decode(&payload).context("decode msg")?;
        Ok(msg)
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Closes the write half so the peer sees end of stream.
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.stream.shutdown().await.context("tcp shutdown")?;
        Ok(())
    }
}

/// TCP server listener.
#[derive(Debug)]
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Unconnected UDP socket carrying one message per datagram.
///
/// Shared between the receiver task and the main loop through an `Arc`.
#[derive(Debug)]
pub struct DatagramSocket {
    socket: UdpSocket,
}

impl DatagramSocket {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(addr).await.context("udp bind")?;
        Ok(Self { socket })
    }

    pub async fn send_to<M: WireMessage>(&self, msg: &M, peer: SocketAddr) -> anyhow::Result<()> {
        self.send_bytes_to(&msg.to_bytes(), peer).await
    }

    /// Sends an already encoded message, for broadcasting one payload to
    /// several peers.
    pub async fn send_bytes_to(&self, payload: &[u8], peer: SocketAddr) -> anyhow::Result<()> {
        self.socket
            .send_to(payload, peer)
            .await
            .with_context(|| format!("udp send to {peer}"))?;
        Ok(())
    }

    /// Receives one datagram. Socket errors are returned as `Err`, decode
    /// errors are handed back alongside the sender.
    pub async fn recv_from<M: WireMessage>(
        &self,
    ) -> anyhow::Result<(Result<M, ProtocolError>, SocketAddr)> {
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        let (n, from) = self.socket.recv_from(&mut buf).await.context("udp recv")?;
        Ok((M::decode(&buf[..n]), from))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Address a local sender should use to reach this socket.
    pub fn wake_addr(&self) -> anyhow::Result<SocketAddr> {
        let local = self.local_addr()?;
        let ip = match local.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        Ok(SocketAddr::new(ip, local.port()))
    }

    /// Whether a datagram from `from` originates on this host.
    fn is_local(&self, from: SocketAddr) -> bool {
        from.ip().is_loopback()
            || self
                .local_addr()
                .map(|local| local.ip() == from.ip())
                .unwrap_or(false)
    }
}

/// Sends `sentinel` to `socket` from a throwaway local socket, unblocking its
/// receiver.
pub async fn send_sentinel<M: WireMessage>(
    socket: &DatagramSocket,
    sentinel: &M,
) -> anyhow::Result<()> {
    let target = socket.wake_addr()?;
    let bind = match target {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let waker = DatagramSocket::bind(bind).await?;
    waker.send_to(sentinel, target).await
}

/// How long [`join_receiver`] waits for the receiver after waking it.
pub const RECEIVER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Stops a [`receive_loop`] task by sending it `sentinel`, then joins it.
///
/// If the sentinel cannot be delivered, or the receiver does not stop in
/// time, the task is aborted instead.
pub async fn join_receiver<M: WireMessage>(
    socket: &DatagramSocket,
    sentinel: &M,
    mut receiver: JoinHandle<()>,
) {
    if let Err(e) = send_sentinel(socket, sentinel).await {
        warn!(error = %e, "Could not wake receiver, aborting it");
        receiver.abort();
    }

    match time::timeout(RECEIVER_JOIN_TIMEOUT, &mut receiver).await {
        Ok(Ok(())) => debug!("Receiver joined"),
        Ok(Err(e)) if e.is_cancelled() => debug!("Receiver aborted"),
        Ok(Err(e)) => warn!(error = %e, "Receiver task failed"),
        Err(_) => {
            warn!("Receiver did not stop, aborting it");
            receiver.abort();
        }
    }
}

/// Receives datagrams into `queue` until a local end sentinel arrives.
///
/// `accept` decides whether a decoded message is queued. Undecodable
/// datagrams and end sentinels from remote hosts are dropped with a warning.
pub async fn receive_loop<M, F>(socket: Arc<DatagramSocket>, queue: Arc<Queue<M>>, mut accept: F)
where
    M: WireMessage + Sentinel + Debug,
    F: FnMut(&M, SocketAddr) -> bool,
{
    loop {
        let (decoded, from) = match socket.recv_from::<M>().await {
            Ok(received) => received,
            Err(e) => {
                warn!(error = %e, "Datagram receive failed");
                continue;
            }
        };

        let msg = match decoded {
            Ok(msg) => msg,
            Err(e) => {
                warn!(%from, error = %e, "Discarding malformed datagram");
                continue;
            }
        };

        if msg.is_end() {
            if socket.is_local(from) {
                debug!("Receiver stopping");
                break;
            }
            warn!(%from, "Ignoring end sentinel from remote host");
            continue;
        }

        if accept(&msg, from) {
            queue.push(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Direction, RequestKind, LEFT_PLAYER};

    fn loopback() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    #[tokio::test]
    async fn reliable_roundtrip() -> anyhow::Result<()> {
        let listener = ReliableListener::bind(loopback()).await?;
        let addr = listener.local_addr()?;

        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await?;
            let req: Request = conn.recv().await?;
            conn.send(&Response::Player { id: 1 }).await?;
            Ok::<_, anyhow::Error>(req)
        });

        let mut conn = ReliableConn::connect(addr).await?;
        conn.send(&Request::play(4000)).await?;
        let rep: Response = conn.recv().await?;

        assert_eq!(rep, Response::Player { id: 1 });
        assert_eq!(server.await??, Request::play(4000));
        Ok(())
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() -> anyhow::Result<()> {
        let listener = ReliableListener::bind(loopback()).await?;
        let addr = listener.local_addr()?;

        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await?;
            conn.recv::<Request>().await
        });

        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(&(1u32 << 20).to_be_bytes()).await?;

        assert!(server.await?.is_err());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn receive_loop_queues_until_sentinel() -> anyhow::Result<()> {
        let socket = Arc::new(DatagramSocket::bind(loopback()).await?);
        let queue = Arc::new(Queue::new());
        let target = socket.local_addr()?;

        let only_moves =
            |req: &Request, _: SocketAddr| matches!(req.kind, RequestKind::Move { .. });
        let receiver = tokio::spawn(receive_loop(socket.clone(), queue.clone(), only_moves));

        let sender = DatagramSocket::bind(loopback()).await?;
        sender
            .send_to(&Request::movement(LEFT_PLAYER, Direction::Up), target)
            .await?;
        sender.send_to(&Request::play(1), target).await?;
        sender.send_bytes_to(&[0xff, 0xff, 0, 0], target).await?;
        sender
            .send_to(&Request::movement(LEFT_PLAYER, Direction::Down), target)
            .await?;

        assert!(queue.wait_if_empty(Duration::from_secs(1)).await);
        send_sentinel(&socket, &Request::end()).await?;
        tokio::time::timeout(Duration::from_secs(2), receiver).await??;

        let dirs: Vec<_> = queue.drain().into_iter().map(|r| r.kind).collect();
        assert_eq!(
            dirs,
            vec![
                RequestKind::Move { dir: Direction::Up },
                RequestKind::Move { dir: Direction::Down },
            ]
        );
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn join_receiver_stops_the_task() -> anyhow::Result<()> {
        let socket = Arc::new(DatagramSocket::bind(loopback()).await?);
        let queue: Arc<Queue<Response>> = Arc::new(Queue::new());
        let receiver = tokio::spawn(receive_loop(socket.clone(), queue, |_: &Response, _| true));

        let started = std::time::Instant::now();
        join_receiver(&socket, &Response::End, receiver).await;
        assert!(started.elapsed() < RECEIVER_JOIN_TIMEOUT);
        Ok(())
    }

    #[tokio::test]
    async fn wake_addr_maps_unspecified_to_loopback() -> anyhow::Result<()> {
        let any = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
        let socket = DatagramSocket::bind(any).await?;
        let wake = socket.wake_addr()?;
        assert!(wake.ip().is_loopback());
        assert_eq!(wake.port(), socket.local_addr()?.port());
        Ok(())
    }
}

//! Wire protocol.
//!
//! Every message starts with a big-endian `u16` discriminant followed by the
//! fields of that kind in declared order. Integers are big-endian, floats are
//! IEEE-754 `f32` in big-endian byte order. There is no padding and no length
//! prefix inside a message; trailing bytes after a complete message are
//! ignored.
//!
//! ```text
//! Request  = [type:u16][origin:u16] PLAY:[port:u16] | MOVE:[dir:u8] | END
//! Response = [type:u16] PLAYER:[id:u16] | STATE:[56 bytes] | END
//! ```

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use crate::{math::Vec2f, physics::Move};

/// Origin of requests sent before the server assigned an id.
pub const UNASSIGNED: PlayerId = 0;
/// Player id of the left racket.
pub const LEFT_PLAYER: PlayerId = 1;
/// Player id of the right racket.
pub const RIGHT_PLAYER: PlayerId = 2;

/// Player id as carried on the wire.
pub type PlayerId = u16;

/// Errors produced while decoding a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("message truncated: needed {needed} more bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    #[error("unknown request type {0}")]
    UnknownRequestType(u16),

    #[error("unknown response type {0}")]
    UnknownResponseType(u16),

    #[error("unknown direction {0}")]
    UnknownDirection(u8),
}

/// A message with a fixed binary layout.
pub trait WireMessage: Sized {
    fn encode(&self, buf: &mut BytesMut);

    fn decode(buf: &[u8]) -> Result<Self, ProtocolError>;

    fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(64);
        self.encode(&mut buf);
        buf
    }
}

fn need(buf: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if buf.remaining() < needed {
        return Err(ProtocolError::Truncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

fn get_u8(buf: &mut &[u8]) -> Result<u8, ProtocolError> {
    need(buf, 1)?;
    Ok(buf.get_u8())
}

fn get_u16(buf: &mut &[u8]) -> Result<u16, ProtocolError> {
    need(buf, 2)?;
    Ok(buf.get_u16())
}

fn get_u32(buf: &mut &[u8]) -> Result<u32, ProtocolError> {
    need(buf, 4)?;
    Ok(buf.get_u32())
}

fn get_vec2(buf: &mut &[u8]) -> Result<Vec2f, ProtocolError> {
    need(buf, 8)?;
    Ok(Vec2f::new(buf.get_f32(), buf.get_f32()))
}

fn put_vec2(buf: &mut BytesMut, v: Vec2f) {
    buf.put_f32(v.x);
    buf.put_f32(v.y);
}

/// Direction carried by a `MOVE` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Up = 1,
    Down = 2,
    /// No key held.
    #[default]
    Here = 3,
}

impl Direction {
    pub fn from_u8(v: u8) -> Result<Self, ProtocolError> {
        match v {
            1 => Ok(Direction::Up),
            2 => Ok(Direction::Down),
            3 => Ok(Direction::Here),
            other => Err(ProtocolError::UnknownDirection(other)),
        }
    }
}

impl From<Direction> for Move {
    fn from(dir: Direction) -> Self {
        match dir {
            Direction::Up => Move::Up,
            Direction::Down => Move::Down,
            Direction::Here => Move::Stop,
        }
    }
}

/// Client to server message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    /// Sender id, [`UNASSIGNED`] until the join completed.
    pub origin: PlayerId,
    pub kind: RequestKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Join request carrying the UDP port the client listens on.
    Play { port: u16 },
    /// Per-frame movement intent.
    Move { dir: Direction },
    /// Local shutdown signal.
    End,
}

impl RequestKind {
    const PLAY: u16 = 1;
    const MOVE: u16 = 2;
    const END: u16 = 3;

    fn tag(&self) -> u16 {
        match self {
            RequestKind::Play { .. } => Self::PLAY,
            RequestKind::Move { .. } => Self::MOVE,
            RequestKind::End => Self::END,
        }
    }
}

impl Request {
    pub fn play(port: u16) -> Self {
        Self {
            origin: UNASSIGNED,
            kind: RequestKind::Play { port },
        }
    }

    pub fn movement(origin: PlayerId, dir: Direction) -> Self {
        Self {
            origin,
            kind: RequestKind::Move { dir },
        }
    }

    pub fn end() -> Self {
        Self {
            origin: UNASSIGNED,
            kind: RequestKind::End,
        }
    }

    pub fn is_end(&self) -> bool {
        self.kind == RequestKind::End
    }

    /// Size of the encoded message in bytes.
    pub fn encoded_len(&self) -> usize {
        4 + match self.kind {
            RequestKind::Play { .. } => 2,
            RequestKind::Move { .. } => 1,
            RequestKind::End => 0,
        }
    }
}

impl WireMessage for Request {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.kind.tag());
        buf.put_u16(self.origin);
        match self.kind {
            RequestKind::Play { port } => buf.put_u16(port),
            RequestKind::Move { dir } => buf.put_u8(dir as u8),
            RequestKind::End => {}
        }
    }

    fn decode(mut buf: &[u8]) -> Result<Self, ProtocolError> {
        let buf = &mut buf;
        let tag = get_u16(buf)?;
        let origin = get_u16(buf)?;
        let kind = match tag {
            RequestKind::PLAY => RequestKind::Play {
                port: get_u16(buf)?,
            },
            RequestKind::MOVE => RequestKind::Move {
                dir: Direction::from_u8(get_u8(buf)?)?,
            },
            RequestKind::END => RequestKind::End,
            other => return Err(ProtocolError::UnknownRequestType(other)),
        };
        Ok(Self { origin, kind })
    }
}

/// Position and velocity of one body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyState {
    pub position: Vec2f,
    pub velocity: Vec2f,
}

/// Racket body plus the points of its side.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RacketState {
    pub body: BodyState,
    pub points: u32,
}

/// Authoritative snapshot of one server tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StateSnapshot {
    pub ball: BodyState,
    pub left: RacketState,
    pub right: RacketState,
}

impl StateSnapshot {
    /// Size of the fields following the discriminant.
    pub const PAYLOAD_LEN: usize = 6 * 8 + 2 * 4;

    fn encode(&self, buf: &mut BytesMut) {
        put_vec2(buf, self.ball.position);
        put_vec2(buf, self.ball.velocity);
        for racket in [&self.left, &self.right] {
            put_vec2(buf, racket.body.position);
            put_vec2(buf, racket.body.velocity);
            buf.put_u32(racket.points);
        }
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, ProtocolError> {
        let ball = BodyState {
            position: get_vec2(buf)?,
            velocity: get_vec2(buf)?,
        };
        let mut rackets = [RacketState::default(); 2];
        for racket in &mut rackets {
            racket.body.position = get_vec2(buf)?;
            racket.body.velocity = get_vec2(buf)?;
            racket.points = get_u32(buf)?;
        }
        let [left, right] = rackets;
        Ok(Self { ball, left, right })
    }
}

/// Server to client message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Response {
    /// Id assigned at join.
    Player { id: PlayerId },
    /// State broadcast of one tick.
    State(StateSnapshot),
    /// Local shutdown signal.
    End,
}

impl Response {
    const PLAYER: u16 = 1;
    const STATE: u16 = 2;
    const END: u16 = 3;

    fn tag(&self) -> u16 {
        match self {
            Response::Player { .. } => Self::PLAYER,
            Response::State(_) => Self::STATE,
            Response::End => Self::END,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Response::End)
    }

    /// Size of the encoded message in bytes.
    pub fn encoded_len(&self) -> usize {
        2 + match self {
            Response::Player { .. } => 2,
            Response::State(_) => StateSnapshot::PAYLOAD_LEN,
            Response::End => 0,
        }
    }
}

impl WireMessage for Response {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.tag());
        match self {
            Response::Player { id } => buf.put_u16(*id),
            Response::State(state) => state.encode(buf),
            Response::End => {}
        }
    }

    fn decode(mut buf: &[u8]) -> Result<Self, ProtocolError> {
        let buf = &mut buf;
        match get_u16(buf)? {
            Self::PLAYER => Ok(Response::Player { id: get_u16(buf)? }),
            Self::STATE => Ok(Response::State(StateSnapshot::decode(buf)?)),
            Self::END => Ok(Response::End),
            other => Err(ProtocolError::UnknownResponseType(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> StateSnapshot {
        StateSnapshot {
            ball: BodyState {
                position: Vec2f::new(12.5, -3.25),
                velocity: Vec2f::new(-100.0, 7.0),
            },
            left: RacketState {
                body: BodyState {
                    position: Vec2f::new(-75.0, 40.0),
                    velocity: Vec2f::new(0.0, 50.0),
                },
                points: 3,
            },
            right: RacketState {
                body: BodyState {
                    position: Vec2f::new(75.0, -12.0),
                    velocity: Vec2f::new(0.0, -50.0),
                },
                points: 11,
            },
        }
    }

    #[test]
    fn requests_roundtrip() {
        let requests = [
            Request::play(50123),
            Request::movement(LEFT_PLAYER, Direction::Up),
            Request::movement(RIGHT_PLAYER, Direction::Down),
            Request::movement(LEFT_PLAYER, Direction::Here),
            Request::end(),
        ];
        for req in requests {
            let bytes = req.to_bytes();
            assert_eq!(bytes.len(), req.encoded_len());
            assert_eq!(Request::decode(&bytes).unwrap(), req);
        }
    }

    #[test]
    fn responses_roundtrip() {
        let responses = [
            Response::Player { id: RIGHT_PLAYER },
            Response::State(sample_state()),
            Response::End,
        ];
        for rep in responses {
            let bytes = rep.to_bytes();
            assert_eq!(bytes.len(), rep.encoded_len());
            assert_eq!(Response::decode(&bytes).unwrap(), rep);
        }
    }

    #[test]
    fn request_layout_is_big_endian() {
        let bytes = Request::play(0x1234).to_bytes();
        assert_eq!(&bytes[..], &[0, 1, 0, 0, 0x12, 0x34]);

        let bytes = Request::movement(2, Direction::Down).to_bytes();
        assert_eq!(&bytes[..], &[0, 2, 0, 2, 2]);
    }

    #[test]
    fn state_layout() {
        let bytes = Response::State(sample_state()).to_bytes();
        assert_eq!(bytes.len(), 58);
        assert_eq!(&bytes[..2], &[0, 2]);
        assert_eq!(&bytes[2..6], &12.5f32.to_be_bytes());
        // left points follow ball pos/vel and left pos/vel
        assert_eq!(&bytes[2 + 32..2 + 36], &3u32.to_be_bytes());
        assert_eq!(&bytes[54..58], &11u32.to_be_bytes());
    }

    #[test]
    fn unknown_discriminants_are_rejected() {
        assert_eq!(
            Request::decode(&[0, 9, 0, 1]),
            Err(ProtocolError::UnknownRequestType(9))
        );
        assert_eq!(
            Response::decode(&[0, 0]),
            Err(ProtocolError::UnknownResponseType(0))
        );
        assert_eq!(
            Request::decode(&[0, 2, 0, 1, 7]),
            Err(ProtocolError::UnknownDirection(7))
        );
    }

    #[test]
    fn truncated_messages_are_rejected() {
        assert!(matches!(
            Request::decode(&[0, 1, 0]),
            Err(ProtocolError::Truncated { needed: 2, remaining: 1 })
        ));

        let bytes = Response::State(sample_state()).to_bytes();
        assert!(matches!(
            Response::decode(&bytes[..40]),
            Err(ProtocolError::Truncated { .. })
        ));
        assert!(Response::decode(&[]).is_err());
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut bytes = Response::Player { id: 1 }.to_bytes();
        bytes.extend_from_slice(&[0xde, 0xad]);
        assert_eq!(Response::decode(&bytes), Ok(Response::Player { id: 1 }));
    }

    #[test]
    fn here_means_stop() {
        assert_eq!(Move::from(Direction::Here), Move::Stop);
        assert_eq!(Move::from(Direction::Up), Move::Up);
        assert_eq!(Move::from(Direction::Down), Move::Down);
    }
}

//! `pong_server`
//!
//! Server-side systems:
//! - Two-player join phase over TCP
//! - Fixed-step simulation of the arena
//! - Receives `MOVE` requests
//! - Broadcasts `STATE` snapshots
//!
//! Networking model:
//! - TCP: join handshake only
//! - UDP: gameplay plane (intents/snapshots)

pub mod server;

pub use server::{GameServer, SessionPhase};

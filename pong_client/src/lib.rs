//! `pong_client`
//!
//! Client-side systems:
//! - Join handshake (TCP) and snapshot receiver (UDP)
//! - Console input and per-frame `MOVE` requests
//! - Reconciliation to the latest authoritative snapshot
//! - Optional dead reckoning between snapshots

pub mod client;
pub mod input;
pub mod view;

pub use client::GameClient;
pub use view::ClientView;

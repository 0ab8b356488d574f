//! `pong_shared`
//!
//! Libraries used by both the pong client and server.
//!
//! Design goals:
//! - Deterministic fixed-step simulation, independent of frame rate.
//! - Explicit binary wire format with validated decoding.
//! - Network receivers only move immutable messages through a [`queue::Queue`];
//!   all game state is mutated by the owning loop.
//! - No `unsafe`.

pub mod config;
pub mod math;
pub mod net;
pub mod physics;
pub mod protocol;
pub mod queue;
pub mod rules;
pub mod shutdown;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::physics::*;
    pub use crate::protocol::*;
    pub use crate::queue::*;
    pub use crate::rules::*;
    pub use crate::shutdown::*;
}

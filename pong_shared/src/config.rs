//! Configuration system.
//!
//! Both binaries read an optional JSON file named by `PONG_CONFIG`. Every
//! field has a default, so `{}` is a valid configuration.

use std::{path::Path, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "PONG_CONFIG";

pub const DEFAULT_TCP_PORT: u16 = 4242;
pub const DEFAULT_UDP_PORT: u16 = 4243;

/// Root configuration shared by client/server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PongConfig {
    /// Address the server binds both sockets to.
    pub bind_host: String,
    /// Server port for the join handshake.
    pub tcp_port: u16,
    /// Server port for steady-state datagrams.
    pub udp_port: u16,
    /// Server simulation/broadcast rate.
    pub tick_hz: u32,
    /// Client intent/reconciliation rate.
    pub frame_hz: u32,
    /// Client: move bodies by their last known velocity between snapshots.
    pub extrapolate: bool,
}

impl Default for PongConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            tick_hz: 100,
            frame_hz: 60,
            extrapolate: false,
        }
    }
}

fn period(hz: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(hz.max(1)))
}

impl PongConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    /// Loads the file named by `PONG_CONFIG`, or the defaults if unset.
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn tick_period(&self) -> Duration {
        period(self.tick_hz)
    }

    pub fn frame_period(&self) -> Duration {
        period(self.frame_hz)
    }
}

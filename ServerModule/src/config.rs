//! # Server Configuration
//!
//! Runtime settings for the scene server. The binary fills these from the
//! command line, optionally on top of a JSON config file.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tabletop_shared::constants::{animation, network, state_file};
use tabletop_shared::SurfaceBounds;

use crate::error::{SceneError, SceneResult};

/// Bounded retry used for each step of a watcher cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: state_file::MAX_READ_ATTEMPTS,
            delay_ms: state_file::RETRY_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address for the WebSocket / HTTP listener
    pub bind: SocketAddr,

    /// External state file kept in sync with the live scene
    pub state_file: PathBuf,

    /// How often the state file is polled, in milliseconds
    pub poll_interval_ms: u64,

    pub retry: RetryPolicy,

    /// Rewrite `last_modified` in the state file after each reconciliation
    pub write_back: bool,

    /// Interpolation time suggested in targeted updates
    pub animation_duration_ms: u64,

    /// Table surface; `None` means an unbounded scene
    pub surface: Option<SurfaceBounds>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: network::DEFAULT_BIND
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8080))),
            state_file: PathBuf::from(state_file::DEFAULT_PATH),
            poll_interval_ms: state_file::DEFAULT_POLL_INTERVAL_MS,
            retry: RetryPolicy::default(),
            write_back: true,
            animation_duration_ms: animation::DEFAULT_DURATION_MS,
            surface: Some(SurfaceBounds::default()),
        }
    }
}

impl ServerConfig {
    /// Load a config from a JSON file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> SceneResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SceneError::validation(format!("cannot read config {}: {}", path.display(), e)))?;
        let config: ServerConfig = serde_json::from_str(&text)
            .map_err(|e| SceneError::validation(format!("invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject settings the watcher cannot run with
    pub fn validate(&self) -> SceneResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(SceneError::validation("poll interval must be greater than zero"));
        }
        if self.retry.attempts == 0 {
            return Err(SceneError::validation("retry attempts must be at least 1"));
        }
        if let Some(surface) = &self.surface {
            if surface.width <= 0.0 || surface.depth <= 0.0 {
                return Err(SceneError::validation("surface width and depth must be positive"));
            }
        }
        Ok(())
    }
}

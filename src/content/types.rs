use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use strum_macros::{Display, EnumString};
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;

/// How many times content may be published into one room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ContentCardinality {
    /// Exactly one payload for the lifetime of the room
    OneShot,
    /// One payload per round; the host opens a new round to publish again
    MultiRound,
}

/// What a game engine hands back when asked to generate shareable content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedContent {
    pub data: Value,
    /// The exact configuration that produced `data`, including any seed
    pub config: Value,
}

/// Bounds on a player's wait for host content
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// `None` waits until the room closes or the caller cancels
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl WaitOptions {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.content_wait_timeout)
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

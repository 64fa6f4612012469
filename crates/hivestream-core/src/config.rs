//! Streamer configuration and state types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::StreamerError;

/// Configuration for a streamer instance.
///
/// Built once and handed to the streamer; it is never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    /// Application id that envelopes must carry in their `id` field.
    pub app_id: String,
    /// Top-level key under which the envelope sits in memos and JSON bodies.
    pub payload_identifier: String,
    /// Account the application runs as (used by contract broadcasts).
    pub username: String,
    /// Fallback cursor when the adapter has no saved state. `0` means
    /// "start at the current head".
    pub last_block_number: u64,
    /// Delay between head polls, and between retries of a missing block.
    pub poll_interval_ms: u64,
    /// Warn when the cursor lags the head by more than this many blocks.
    pub blocks_behind_warning: u64,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            app_id: "hivestream".into(),
            payload_identifier: "hive_stream".into(),
            username: String::new(),
            last_block_number: 0,
            poll_interval_ms: 1000,
            blocks_behind_warning: 25,
        }
    }
}

impl StreamerConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(raw: &str) -> Result<Self, StreamerError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| StreamerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StreamerError> {
        if self.app_id.is_empty() {
            return Err(StreamerError::Config("app_id must not be empty".into()));
        }
        if self.payload_identifier.is_empty() {
            return Err(StreamerError::Config(
                "payload_identifier must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Runtime state of the streamer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamerState {
    /// Not yet started.
    Idle,
    /// Replaying a backlog of blocks.
    CatchingUp,
    /// At the head, waiting for the next poll.
    Live,
    /// Stop requested, finishing the in-flight block.
    Stopping,
    /// Terminated.
    Stopped,
}

impl std::fmt::Display for StreamerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::CatchingUp => write!(f, "catching-up"),
            Self::Live => write!(f, "live"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

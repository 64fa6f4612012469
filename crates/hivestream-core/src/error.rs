//! Error types for the hivestream engine.

use thiserror::Error;

/// Errors that can occur while streaming, dispatching or scheduling.
#[derive(Debug, Error)]
pub enum StreamerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Block {block_number} is not available yet")]
    BlockUnavailable { block_number: u64 },

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid frequency '{0}'")]
    InvalidFrequency(String),

    #[error("Contract '{name}' is not registered")]
    UnknownContract { name: String },

    #[error("Contract '{contract}' has no action '{action}'")]
    UnknownAction { contract: String, action: String },

    #[error("Handler error in '{handler}': {reason}")]
    Handler { handler: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Streamer aborted: {reason}")]
    Aborted { reason: String },

    #[error("{0}")]
    Other(String),
}

impl StreamerError {
    /// Shorthand for a contract-side failure.
    pub fn handler(handler: impl Into<String>, reason: impl ToString) -> Self {
        Self::Handler {
            handler: handler.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` for conditions the catch-up loop retries (RPC hiccups,
    /// blocks that are not visible yet).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::BlockUnavailable { .. })
    }
}

impl From<serde_json::Error> for StreamerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Other(e.to_string())
    }
}

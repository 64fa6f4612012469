//! Fluent builder API for creating streamers.
//!
//! # Example
//!
//! ```rust,no_run
//! use hivestream_streamer::StreamerBuilder;
//!
//! let config = StreamerBuilder::new()
//!     .app_id("dice")
//!     .username("house")
//!     .from_block(82_000_000)
//!     .poll_interval_ms(3000)
//!     .build_config();
//! ```

use std::sync::Arc;

use hivestream_core::adapter::{MemoryAdapter, PersistenceAdapter};
use hivestream_core::client::BlockchainClient;
use hivestream_core::config::StreamerConfig;
use hivestream_core::error::StreamerError;

use crate::streamer::Streamer;

/// Fluent builder for [`StreamerConfig`] and [`Streamer`].
#[derive(Default)]
pub struct StreamerBuilder {
    config: StreamerConfig,
    client: Option<Arc<dyn BlockchainClient>>,
    adapter: Option<Arc<dyn PersistenceAdapter>>,
}

impl StreamerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn with_config(mut self, config: StreamerConfig) -> Self {
        self.config = config;
        self
    }

    /// Application id that payload envelopes must carry.
    pub fn app_id(mut self, id: impl Into<String>) -> Self {
        self.config.app_id = id.into();
        self
    }

    /// Envelope key in memos and custom JSON bodies.
    pub fn payload_identifier(mut self, key: impl Into<String>) -> Self {
        self.config.payload_identifier = key.into();
        self
    }

    /// Account used for contract broadcasts.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = username.into();
        self
    }

    /// Last processed block when the adapter has nothing saved.
    pub fn from_block(mut self, block: u64) -> Self {
        self.config.last_block_number = block;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn blocks_behind_warning(mut self, blocks: u64) -> Self {
        self.config.blocks_behind_warning = blocks;
        self
    }

    pub fn client(mut self, client: Arc<dyn BlockchainClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Persistence adapter. Defaults to an in-memory adapter.
    pub fn adapter(mut self, adapter: Arc<dyn PersistenceAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Build the `StreamerConfig` only.
    pub fn build_config(self) -> StreamerConfig {
        self.config
    }

    /// Validate the configuration and build a stopped [`Streamer`].
    pub fn build(self) -> Result<Streamer, StreamerError> {
        self.config.validate()?;
        let client = self
            .client
            .ok_or_else(|| StreamerError::Config("a blockchain client is required".into()))?;
        let adapter = self
            .adapter
            .unwrap_or_else(|| Arc::new(MemoryAdapter::new()));
        Ok(Streamer::new(self.config, client, adapter))
    }
}

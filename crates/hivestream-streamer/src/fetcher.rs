//! Block fetcher.
//!
//! Wraps a [`BlockchainClient`] and normalises "block not visible yet" into
//! [`StreamerError::BlockUnavailable`]. Also decodes condenser-API block JSON
//! for client implementations that talk to a node directly.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use hivestream_core::client::BlockchainClient;
use hivestream_core::error::StreamerError;
use hivestream_core::types::{Block, Operation, Transaction};

/// Fetcher used by the catch-up loop.
pub struct BlockFetcher {
    client: Arc<dyn BlockchainClient>,
}

impl BlockFetcher {
    pub fn new(client: Arc<dyn BlockchainClient>) -> Self {
        Self { client }
    }

    /// Fetch the current chain head block number.
    pub async fn head_block_number(&self) -> Result<u64, StreamerError> {
        Ok(self.client.get_chain_head().await?.head_block_number)
    }

    /// Fetch block `number`; a block the node does not have yet is an error.
    pub async fn block(&self, number: u64) -> Result<Block, StreamerError> {
        self.client
            .get_block(number)
            .await?
            .ok_or(StreamerError::BlockUnavailable {
                block_number: number,
            })
    }
}

/// Parse a node timestamp (`"2024-03-01T12:00:03"`, UTC, optional `Z`).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.strip_suffix('Z').unwrap_or(s);
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Convert a `condenser_api.get_block` result to a [`Block`].
///
/// Operations that cannot be decoded at all are skipped; unknown kinds are
/// kept as [`Operation::Other`].
pub fn block_from_json(v: &Value) -> Option<Block> {
    let transactions = v["transactions"]
        .as_array()?
        .iter()
        .map(|tx| Transaction {
            operations: tx["operations"]
                .as_array()
                .map(|ops| ops.iter().filter_map(Operation::from_json).collect())
                .unwrap_or_default(),
        })
        .collect();

    Some(Block {
        block_id: v["block_id"].as_str()?.to_string(),
        previous: v["previous"].as_str()?.to_string(),
        timestamp: parse_timestamp(v["timestamp"].as_str()?)?,
        transaction_ids: v["transaction_ids"]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        transactions,
    })
}

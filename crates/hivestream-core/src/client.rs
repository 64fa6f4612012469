//! Blockchain client boundary.
//!
//! The engine only needs the head number and individual blocks. Broadcast
//! methods exist for contracts, which reach them through
//! [`ContractContext`](crate::contract::ContractContext).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StreamerError;
use crate::types::Block;

/// Result of a head query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub head_block_number: u64,
}

/// A transfer to broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    /// Asset string, e.g. `"2.500 HIVE"`.
    pub amount: String,
    pub memo: String,
}

/// A vote to broadcast. `weight` is in basis points (-10000..=10000).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub voter: String,
    pub author: String,
    pub permlink: String,
    pub weight: i16,
}

/// A custom JSON operation to broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomJsonRequest {
    pub account: String,
    pub id: String,
    pub json: Value,
    /// Sign with the active key (`true`) or the posting key (`false`).
    pub use_active_key: bool,
}

/// Acknowledgement of a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReceipt {
    pub transaction_id: String,
}

/// Access to the chain. Implementations own transport, signing and retries
/// of individual RPC calls.
#[async_trait]
pub trait BlockchainClient: Send + Sync {
    /// Current head block number.
    async fn get_chain_head(&self) -> Result<ChainHead, StreamerError>;

    /// Fetch a block. `Ok(None)` means the block is not visible yet.
    async fn get_block(&self, block_number: u64) -> Result<Option<Block>, StreamerError>;

    async fn broadcast_transfer(
        &self,
        request: TransferRequest,
    ) -> Result<BroadcastReceipt, StreamerError>;

    async fn broadcast_vote(&self, request: VoteRequest) -> Result<BroadcastReceipt, StreamerError>;

    async fn broadcast_custom_json(
        &self,
        request: CustomJsonRequest,
    ) -> Result<BroadcastReceipt, StreamerError>;
}

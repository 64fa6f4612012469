//! Shared fixtures for unit tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::adapter::MemoryAdapter;
use crate::client::{
    BlockchainClient, BroadcastReceipt, ChainHead, CustomJsonRequest, TransferRequest,
    VoteRequest,
};
use crate::config::StreamerConfig;
use crate::contract::{ActionMeta, Actions, Contract, ContractContext};
use crate::error::StreamerError;
use crate::types::{Block, OperationContext};

/// Client that never has blocks and acknowledges every broadcast.
pub struct NullClient;

#[async_trait]
impl BlockchainClient for NullClient {
    async fn get_chain_head(&self) -> Result<ChainHead, StreamerError> {
        Ok(ChainHead { head_block_number: 0 })
    }

    async fn get_block(&self, _block_number: u64) -> Result<Option<Block>, StreamerError> {
        Ok(None)
    }

    async fn broadcast_transfer(
        &self,
        request: TransferRequest,
    ) -> Result<BroadcastReceipt, StreamerError> {
        Ok(BroadcastReceipt {
            transaction_id: format!("transfer:{}->{}", request.from, request.to),
        })
    }

    async fn broadcast_vote(&self, request: VoteRequest) -> Result<BroadcastReceipt, StreamerError> {
        Ok(BroadcastReceipt {
            transaction_id: format!("vote:{}", request.voter),
        })
    }

    async fn broadcast_custom_json(
        &self,
        request: CustomJsonRequest,
    ) -> Result<BroadcastReceipt, StreamerError> {
        Ok(BroadcastReceipt {
            transaction_id: format!("custom_json:{}", request.id),
        })
    }
}

pub fn config() -> Arc<StreamerConfig> {
    Arc::new(StreamerConfig {
        username: "house".into(),
        ..StreamerConfig::default()
    })
}

pub fn context() -> ContractContext {
    ContractContext::new(Arc::new(NullClient), Arc::new(MemoryAdapter::new()), config())
}

pub fn op_context(block_number: u64) -> OperationContext {
    OperationContext {
        block_number,
        block_id: format!("id-{block_number}"),
        previous_block_id: format!("id-{}", block_number.saturating_sub(1)),
        transaction_id: "trx".into(),
        block_time: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    }
}

/// Contract that records every hook and action it receives.
///
/// Actions: `bar` succeeds, `fail` always errors.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<String>>,
    metas: Mutex<Vec<ActionMeta>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn metas(&self) -> Vec<ActionMeta> {
        self.metas.lock().unwrap().clone()
    }

    fn push(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Contract for Recorder {
    fn actions() -> Actions<Self> {
        Actions::new()
            .on("bar", |rec: Arc<Self>, payload: Value, meta| async move {
                rec.push(format!("bar:{payload}"));
                rec.metas.lock().unwrap().push(meta);
                Ok(())
            })
            .on("fail", |rec: Arc<Self>, _payload, _meta| async move {
                rec.push("fail".into());
                Err(StreamerError::handler("recorder", "always fails"))
            })
    }

    async fn create(&self, _ctx: ContractContext) -> Result<(), StreamerError> {
        self.push("create".into());
        Ok(())
    }

    async fn destroy(&self) -> Result<(), StreamerError> {
        self.push("destroy".into());
        Ok(())
    }

    async fn update_block_info(&self, ctx: &OperationContext) {
        self.push(format!("block:{}", ctx.block_number));
    }
}

//! Scripted chain and witness contract shared by the streamer tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use hivestream_core::client::{
    BlockchainClient, BroadcastReceipt, ChainHead, CustomJsonRequest, TransferRequest,
    VoteRequest,
};
use hivestream_core::contract::{ActionMeta, Actions, Contract, ContractContext};
use hivestream_core::envelope::PayloadEnvelope;
use hivestream_core::error::StreamerError;
use hivestream_core::types::{Block, CustomJsonOp, Operation, OperationContext, Transaction, TransferOp};

/// Genesis time of the scripted chain; block `n` is produced `3 * n` seconds later.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

pub fn block_time(number: u64) -> DateTime<Utc> {
    t0() + Duration::seconds(3 * number as i64)
}

/// In-memory chain with scripted failures.
#[derive(Default)]
pub struct MockChain {
    head: Mutex<u64>,
    /// Operations per block; blocks without an entry are empty.
    ops: Mutex<BTreeMap<u64, Vec<Operation>>>,
    /// Number of head queries that fail before one succeeds.
    head_failures: Mutex<u32>,
    /// Number of fetches that report the block missing, per block.
    missing: Mutex<HashMap<u64, u32>>,
    requests: Mutex<Vec<u64>>,
    broadcasts: Mutex<Vec<String>>,
}

impl MockChain {
    pub fn with_head(head: u64) -> Arc<Self> {
        let chain = Self::default();
        *chain.head.lock().unwrap() = head;
        Arc::new(chain)
    }

    pub fn set_head(&self, head: u64) {
        *self.head.lock().unwrap() = head;
    }

    /// Put `op` in its own transaction in block `number`.
    pub fn push_op(&self, number: u64, op: Operation) {
        self.ops.lock().unwrap().entry(number).or_default().push(op);
    }

    pub fn fail_head(&self, times: u32) {
        *self.head_failures.lock().unwrap() = times;
    }

    pub fn hide_block(&self, number: u64, times: u32) {
        self.missing.lock().unwrap().insert(number, times);
    }

    /// Every block number requested so far, in request order.
    pub fn requests(&self) -> Vec<u64> {
        self.requests.lock().unwrap().clone()
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.broadcasts.lock().unwrap().clone()
    }

    fn block(&self, number: u64) -> Block {
        let ops = self.ops.lock().unwrap().get(&number).cloned().unwrap_or_default();
        let transaction_ids = (0..ops.len()).map(|i| format!("trx-{number}-{i}")).collect();
        Block {
            block_id: format!("id-{number}"),
            previous: format!("id-{}", number.saturating_sub(1)),
            timestamp: block_time(number),
            transaction_ids,
            transactions: ops
                .into_iter()
                .map(|op| Transaction { operations: vec![op] })
                .collect(),
        }
    }
}

#[async_trait]
impl BlockchainClient for MockChain {
    async fn get_chain_head(&self) -> Result<ChainHead, StreamerError> {
        let mut failures = self.head_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(StreamerError::Rpc("connection refused".into()));
        }
        Ok(ChainHead {
            head_block_number: *self.head.lock().unwrap(),
        })
    }

    async fn get_block(&self, block_number: u64) -> Result<Option<Block>, StreamerError> {
        self.requests.lock().unwrap().push(block_number);
        if let Some(remaining) = self.missing.lock().unwrap().get_mut(&block_number) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(None);
            }
        }
        if block_number > *self.head.lock().unwrap() {
            return Ok(None);
        }
        Ok(Some(self.block(block_number)))
    }

    async fn broadcast_transfer(
        &self,
        request: TransferRequest,
    ) -> Result<BroadcastReceipt, StreamerError> {
        let id = format!("transfer:{}->{}:{}", request.from, request.to, request.amount);
        self.broadcasts.lock().unwrap().push(id.clone());
        Ok(BroadcastReceipt { transaction_id: id })
    }

    async fn broadcast_vote(&self, request: VoteRequest) -> Result<BroadcastReceipt, StreamerError> {
        let id = format!("vote:{}/{}:{}", request.author, request.permlink, request.weight);
        self.broadcasts.lock().unwrap().push(id.clone());
        Ok(BroadcastReceipt { transaction_id: id })
    }

    async fn broadcast_custom_json(
        &self,
        request: CustomJsonRequest,
    ) -> Result<BroadcastReceipt, StreamerError> {
        let id = format!("custom_json:{}:{}", request.id, request.use_active_key);
        self.broadcasts.lock().unwrap().push(id.clone());
        Ok(BroadcastReceipt { transaction_id: id })
    }
}

/// Memo carrying a `hive_stream` envelope for the default app id.
pub fn memo(contract: &str, action: &str, payload: Value) -> String {
    PayloadEnvelope {
        id: "hivestream".into(),
        name: contract.into(),
        action: action.into(),
        payload,
    }
    .encode("hive_stream")
}

pub fn transfer(from: &str, to: &str, amount: &str, memo: String) -> Operation {
    Operation::Transfer(TransferOp {
        from: from.into(),
        to: to.into(),
        amount: amount.into(),
        memo,
    })
}

pub fn custom_json(posting: &[&str], active: &[&str], id: &str, json: String) -> Operation {
    Operation::CustomJson(CustomJsonOp {
        required_auths: active.iter().map(|s| s.to_string()).collect(),
        required_posting_auths: posting.iter().map(|s| s.to_string()).collect(),
        id: id.into(),
        json,
    })
}

/// Contract that records lifecycle hooks and action calls.
///
/// Actions: `tick` records the call, `fail` always errors.
#[derive(Default)]
pub struct Witness {
    calls: Mutex<Vec<String>>,
    blocks: Mutex<Vec<u64>>,
}

impl Witness {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn blocks(&self) -> Vec<u64> {
        self.blocks.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl Contract for Witness {
    fn actions() -> Actions<Self> {
        Actions::new()
            .on("tick", |witness: Arc<Self>, _payload, meta: ActionMeta| async move {
                let label = match meta {
                    ActionMeta::Scheduled { action_id, .. } => format!("tick:{action_id}"),
                    other => format!("tick:{}", other.sender().unwrap_or("?")),
                };
                witness.record(label);
                Ok(())
            })
            .on("fail", |_witness: Arc<Self>, _payload, _meta| async move {
                Err(StreamerError::handler("witness.fail", "always fails"))
            })
    }

    async fn create(&self, _ctx: ContractContext) -> Result<(), StreamerError> {
        self.record("create");
        Ok(())
    }

    async fn destroy(&self) -> Result<(), StreamerError> {
        self.record("destroy");
        Ok(())
    }

    async fn update_block_info(&self, ctx: &OperationContext) {
        self.blocks.lock().unwrap().push(ctx.block_number);
    }
}

pub fn empty_payload() -> Value {
    json!({})
}

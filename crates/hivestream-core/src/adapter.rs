//! Persistence adapter boundary and an in-memory implementation.
//!
//! The adapter stores the resume cursor and the scheduled-action table so the
//! streamer can restart where it left off, and receives raw/domain hooks for
//! every qualifying operation. Contracts use [`PersistenceAdapter::add_event`]
//! as a free-form audit log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;

use crate::action::ScheduledAction;
use crate::envelope::{CustomJsonMeta, PayloadEnvelope, TransferMeta};
use crate::error::StreamerError;
use crate::types::{CustomJsonOp, Operation, OperationContext, TransferOp};

/// Everything needed to resume streaming.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamState {
    /// Last fully processed block.
    pub last_block_number: u64,
    #[serde(default)]
    pub actions: Vec<ScheduledAction>,
}

/// One entry of the contract audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub date: DateTime<Utc>,
    pub contract_name: String,
    pub action: String,
    pub payload: Value,
    pub data: Value,
}

/// Durable state plus operation hooks.
///
/// Hook methods default to no-ops. Writes must be atomic per record if the
/// same store is used from outside the streamer.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Idempotent setup (tables, files). A failure aborts `start()`.
    async fn create(&self) -> Result<(), StreamerError> {
        Ok(())
    }

    /// Release resources. Called on `stop()`.
    async fn destroy(&self) -> Result<(), StreamerError> {
        Ok(())
    }

    /// Restore cursor and actions, or `None` on first run.
    async fn load_state(&self) -> Result<Option<StreamState>, StreamerError>;

    /// Persist cursor and actions.
    async fn save_state(&self, state: &StreamState) -> Result<(), StreamerError>;

    /// Actions currently stored, used to merge in externally added entries.
    async fn load_actions(&self) -> Result<Vec<ScheduledAction>, StreamerError> {
        Ok(self
            .load_state()
            .await?
            .map(|s| s.actions)
            .unwrap_or_default())
    }

    /// Raw hook, fired for every operation.
    async fn process_operation(
        &self,
        _op: &Operation,
        _ctx: &OperationContext,
    ) -> Result<(), StreamerError> {
        Ok(())
    }

    /// Fired for transfers carrying an envelope for a registered contract.
    async fn process_transfer(
        &self,
        _op: &TransferOp,
        _envelope: &PayloadEnvelope,
        _meta: &TransferMeta,
    ) -> Result<(), StreamerError> {
        Ok(())
    }

    /// Fired for custom JSON carrying an envelope for a registered contract.
    async fn process_custom_json(
        &self,
        _op: &CustomJsonOp,
        _envelope: &PayloadEnvelope,
        _meta: &CustomJsonMeta,
    ) -> Result<(), StreamerError> {
        Ok(())
    }

    /// Append to the contract audit log.
    async fn add_event(&self, _event: ContractEvent) -> Result<(), StreamerError> {
        Ok(())
    }
}

// ─── In-memory adapter (for testing) ─────────────────────────────────────────

/// Counters for the hooks an adapter received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookCounts {
    pub operations: u64,
    pub transfers: u64,
    pub custom_json: u64,
}

/// In-memory adapter for tests and ephemeral streamers.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct MemoryAdapter {
    state: Mutex<Option<StreamState>>,
    events: Mutex<Vec<ContractEvent>>,
    hooks: Mutex<HookCounts>,
    saves: Mutex<u64>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the adapter with a previously saved state.
    pub fn with_state(state: StreamState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            ..Self::default()
        }
    }

    /// The last saved state, if any.
    pub fn state(&self) -> Option<StreamState> {
        self.state.lock().unwrap().clone()
    }

    /// Add an action to the stored state without going through the streamer,
    /// as another process sharing the store would.
    pub fn push_stored_action(&self, action: ScheduledAction) {
        let mut state = self.state.lock().unwrap();
        state.get_or_insert_with(StreamState::default).actions.push(action);
    }

    pub fn events(&self) -> Vec<ContractEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn hook_counts(&self) -> HookCounts {
        *self.hooks.lock().unwrap()
    }

    /// Number of `save_state` calls so far.
    pub fn save_count(&self) -> u64 {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryAdapter {
    async fn load_state(&self) -> Result<Option<StreamState>, StreamerError> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn save_state(&self, state: &StreamState) -> Result<(), StreamerError> {
        *self.state.lock().unwrap() = Some(state.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }

    async fn process_operation(
        &self,
        _op: &Operation,
        _ctx: &OperationContext,
    ) -> Result<(), StreamerError> {
        self.hooks.lock().unwrap().operations += 1;
        Ok(())
    }

    async fn process_transfer(
        &self,
        _op: &TransferOp,
        _envelope: &PayloadEnvelope,
        _meta: &TransferMeta,
    ) -> Result<(), StreamerError> {
        self.hooks.lock().unwrap().transfers += 1;
        Ok(())
    }

    async fn process_custom_json(
        &self,
        _op: &CustomJsonOp,
        _envelope: &PayloadEnvelope,
        _meta: &CustomJsonMeta,
    ) -> Result<(), StreamerError> {
        self.hooks.lock().unwrap().custom_json += 1;
        Ok(())
    }

    async fn add_event(&self, event: ContractEvent) -> Result<(), StreamerError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

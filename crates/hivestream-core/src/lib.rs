//! hivestream-core — contracts, dispatch and time-based actions for the
//! hivestream engine.
//!
//! # Architecture
//!
//! ```text
//! Streamer (hivestream-streamer)
//!     │  per operation, in block order
//!     ├── Dispatcher ── PayloadEnvelope ── ContractRegistry ── ExecutionQueue ── Contract action
//!     │        └── Subscriptions / PersistenceAdapter hooks
//!     │  per block, after all operations
//!     ├── ActionScheduler ── ContractRegistry ── ExecutionQueue ── Contract action
//!     └── Cursor + actions ── PersistenceAdapter::save_state
//! ```

pub mod action;
pub mod adapter;
pub mod client;
pub mod config;
pub mod contract;
pub mod cursor;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod queue;
pub mod scheduler;
pub mod subscriptions;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use action::{Frequency, ScheduledAction};
pub use adapter::{ContractEvent, MemoryAdapter, PersistenceAdapter, StreamState};
pub use client::{BlockchainClient, BroadcastReceipt, ChainHead};
pub use config::{StreamerConfig, StreamerState};
pub use contract::{ActionMeta, Actions, Contract, ContractContext, ContractRegistry};
pub use cursor::Cursor;
pub use dispatcher::{Dispatch, Dispatcher};
pub use envelope::{CustomJsonMeta, PayloadEnvelope, TransferMeta};
pub use error::StreamerError;
pub use queue::{ExecutionQueue, Ticket};
pub use scheduler::{ActionScheduler, Completion, Firing};
pub use subscriptions::Subscriptions;
pub use telemetry::{init_tracing, LogConfig};
pub use types::{Block, CommentOp, CustomJsonOp, Operation, OperationContext, Transaction, TransferOp};

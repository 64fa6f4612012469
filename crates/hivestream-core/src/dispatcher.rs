//! Operation dispatcher — decodes envelopes and routes them to contracts.
//!
//! Per operation, in block order:
//! 1. adapter raw hook (`process_operation`)
//! 2. generic subscribers
//! 3. for transfers / custom JSON with an envelope naming a registered
//!    contract: adapter domain hook, then the action is queued on the
//!    contract's execution queue.
//!
//! Malformed or unroutable payloads are dropped here; they never surface as
//! errors to the block loop.

use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::adapter::PersistenceAdapter;
use crate::config::StreamerConfig;
use crate::contract::{ActionMeta, ContractRegistry, RegisteredContract};
use crate::envelope::{CustomJsonMeta, PayloadEnvelope, TransferMeta};
use crate::queue::Ticket;
use crate::subscriptions::Subscriptions;
use crate::types::{CustomJsonOp, Operation, OperationContext, TransferOp};

/// Outcome of dispatching one operation.
pub enum Dispatch {
    /// No contract action was queued.
    Ignored,
    /// An action was queued; the ticket resolves when it has run.
    Queued(Ticket<()>),
}

impl Dispatch {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued(_))
    }

    pub fn into_ticket(self) -> Option<Ticket<()>> {
        match self {
            Self::Queued(ticket) => Some(ticket),
            Self::Ignored => None,
        }
    }
}

/// Routes operations to hooks, subscribers and contracts.
pub struct Dispatcher {
    config: Arc<StreamerConfig>,
    registry: Arc<ContractRegistry>,
    adapter: Arc<dyn PersistenceAdapter>,
    subscriptions: Arc<Subscriptions>,
}

impl Dispatcher {
    pub fn new(
        config: Arc<StreamerConfig>,
        registry: Arc<ContractRegistry>,
        adapter: Arc<dyn PersistenceAdapter>,
        subscriptions: Arc<Subscriptions>,
    ) -> Self {
        Self {
            config,
            registry,
            adapter,
            subscriptions,
        }
    }

    /// Dispatch one operation. Does not wait for the queued action to run.
    pub async fn process_operation(&self, op: &Operation, ctx: &OperationContext) -> Dispatch {
        if let Err(e) = self.adapter.process_operation(op, ctx).await {
            warn!(block = ctx.block_number, op = op.name(), error = %e, "adapter operation hook failed");
        }

        self.subscriptions.notify(op, ctx);

        match op {
            Operation::Transfer(transfer) => self.route_transfer(transfer, ctx).await,
            Operation::CustomJson(custom) => self.route_custom_json(custom, ctx).await,
            Operation::Comment(_) | Operation::Other { .. } => Dispatch::Ignored,
        }
    }

    async fn route_transfer(&self, op: &TransferOp, ctx: &OperationContext) -> Dispatch {
        let Some((envelope, contract)) = self.resolve(&op.memo) else {
            return Dispatch::Ignored;
        };

        let meta = TransferMeta {
            sender: op.from.clone(),
            amount: op.amount.clone(),
        };
        if let Err(e) = self.adapter.process_transfer(op, &envelope, &meta).await {
            warn!(block = ctx.block_number, error = %e, "adapter transfer hook failed");
        }

        Self::submit(&contract, envelope, ActionMeta::Transfer(meta, ctx.clone()))
    }

    async fn route_custom_json(&self, op: &CustomJsonOp, ctx: &OperationContext) -> Dispatch {
        let Some((envelope, contract)) = self.resolve(&op.json) else {
            return Dispatch::Ignored;
        };
        let Some((sender, is_signed_with_active_key)) = op.signer() else {
            trace!(block = ctx.block_number, "custom json without signer");
            return Dispatch::Ignored;
        };

        let meta = CustomJsonMeta {
            sender: sender.to_string(),
            is_signed_with_active_key,
            id: op.id.clone(),
        };
        if let Err(e) = self.adapter.process_custom_json(op, &envelope, &meta).await {
            warn!(block = ctx.block_number, error = %e, "adapter custom json hook failed");
        }

        Self::submit(&contract, envelope, ActionMeta::CustomJson(meta, ctx.clone()))
    }

    /// Decode `raw` and find the contract it names.
    fn resolve(&self, raw: &str) -> Option<(PayloadEnvelope, Arc<RegisteredContract>)> {
        let envelope =
            PayloadEnvelope::decode(raw, &self.config.payload_identifier, &self.config.app_id)?;
        match self.registry.get(&envelope.name) {
            Some(contract) => Some((envelope, contract)),
            None => {
                trace!(contract = %envelope.name, "envelope for unknown contract");
                None
            }
        }
    }

    fn submit(
        contract: &RegisteredContract,
        envelope: PayloadEnvelope,
        meta: ActionMeta,
    ) -> Dispatch {
        let action = envelope.action;
        match contract.invoke(&action, envelope.payload, meta) {
            Some(ticket) => {
                debug!(contract = contract.name(), action = %action, "action queued");
                Dispatch::Queued(ticket)
            }
            None => {
                trace!(contract = contract.name(), action = %action, "contract has no such action");
                Dispatch::Ignored
            }
        }
    }
}

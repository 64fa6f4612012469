//! Contracts, their action tables, and the contract registry.
//!
//! A contract is an in-process handler registered under a name. Instead of
//! looking methods up by string at call time, each contract declares its
//! actions once through [`Contract::actions`]; the registry binds that table
//! to the instance when the contract is registered.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hivestream_core::contract::{ActionMeta, Actions, Contract};
//! use hivestream_core::error::StreamerError;
//! use serde_json::Value;
//!
//! struct Dice;
//!
//! impl Dice {
//!     async fn roll(&self, payload: Value, meta: ActionMeta) -> Result<(), StreamerError> {
//!         let _ = (payload, meta);
//!         Ok(())
//!     }
//! }
//!
//! #[async_trait::async_trait]
//! impl Contract for Dice {
//!     fn actions() -> Actions<Self> {
//!         Actions::new().on("roll", |dice: Arc<Self>, payload, meta| async move {
//!             dice.roll(payload, meta).await
//!         })
//!     }
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::adapter::{ContractEvent, PersistenceAdapter};
use crate::client::{
    BlockchainClient, BroadcastReceipt, CustomJsonRequest, TransferRequest, VoteRequest,
};
use crate::config::StreamerConfig;
use crate::envelope::{CustomJsonMeta, TransferMeta};
use crate::error::StreamerError;
use crate::queue::{ExecutionQueue, Ticket};
use crate::types::OperationContext;

/// Why an action is being invoked.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionMeta {
    /// A transfer whose memo carried the envelope.
    Transfer(TransferMeta, OperationContext),
    /// A custom JSON whose body carried the envelope.
    CustomJson(CustomJsonMeta, OperationContext),
    /// A time-based action firing.
    Scheduled {
        action_id: String,
        fired_at: DateTime<Utc>,
    },
}

impl ActionMeta {
    /// Block context, for on-chain triggers.
    pub fn context(&self) -> Option<&OperationContext> {
        match self {
            Self::Transfer(_, ctx) | Self::CustomJson(_, ctx) => Some(ctx),
            Self::Scheduled { .. } => None,
        }
    }

    /// The account that triggered the action, for on-chain triggers.
    pub fn sender(&self) -> Option<&str> {
        match self {
            Self::Transfer(meta, _) => Some(&meta.sender),
            Self::CustomJson(meta, _) => Some(&meta.sender),
            Self::Scheduled { .. } => None,
        }
    }
}

/// Future returned by an action.
pub type ActionFuture = BoxFuture<'static, Result<(), StreamerError>>;

type Method<C> = Arc<dyn Fn(Arc<C>, Value, ActionMeta) -> ActionFuture + Send + Sync>;
type BoundAction = Arc<dyn Fn(Value, ActionMeta) -> ActionFuture + Send + Sync>;

/// The named actions a contract exposes.
pub struct Actions<C> {
    methods: HashMap<String, Method<C>>,
}

impl<C: Send + Sync + 'static> Actions<C> {
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// Expose `f` under `name`. A later registration of the same name wins.
    pub fn on<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<C>, Value, ActionMeta) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), StreamerError>> + Send + 'static,
    {
        let method: Method<C> = Arc::new(move |contract, payload, meta| {
            Box::pin(f(contract, payload, meta))
        });
        self.methods.insert(name.into(), method);
        self
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    fn bind(self, contract: Arc<C>) -> HashMap<String, BoundAction> {
        self.methods
            .into_iter()
            .map(|(name, method)| {
                let contract = contract.clone();
                let bound: BoundAction =
                    Arc::new(move |payload, meta| method(contract.clone(), payload, meta));
                (name, bound)
            })
            .collect()
    }
}

impl<C: Send + Sync + 'static> Default for Actions<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for in-process contracts.
///
/// All lifecycle hooks are optional.
#[async_trait]
pub trait Contract: Send + Sync + 'static {
    /// The action table, built once per registration.
    fn actions() -> Actions<Self>
    where
        Self: Sized;

    /// Called on registration with access to engine services.
    async fn create(&self, _ctx: ContractContext) -> Result<(), StreamerError> {
        Ok(())
    }

    /// Called on unregistration.
    async fn destroy(&self) -> Result<(), StreamerError> {
        Ok(())
    }

    /// Called inside the contract's queue right before an on-chain action runs.
    async fn update_block_info(&self, _ctx: &OperationContext) {}
}

// ─── ContractContext ─────────────────────────────────────────────────────────

/// Engine services available to contracts.
#[derive(Clone)]
pub struct ContractContext {
    client: Arc<dyn BlockchainClient>,
    adapter: Arc<dyn PersistenceAdapter>,
    config: Arc<StreamerConfig>,
}

impl ContractContext {
    pub fn new(
        client: Arc<dyn BlockchainClient>,
        adapter: Arc<dyn PersistenceAdapter>,
        config: Arc<StreamerConfig>,
    ) -> Self {
        Self {
            client,
            adapter,
            config,
        }
    }

    /// The account the application runs as.
    pub fn username(&self) -> &str {
        &self.config.username
    }

    pub fn app_id(&self) -> &str {
        &self.config.app_id
    }

    pub fn client(&self) -> &Arc<dyn BlockchainClient> {
        &self.client
    }

    pub fn adapter(&self) -> &Arc<dyn PersistenceAdapter> {
        &self.adapter
    }

    /// Transfer from the configured account.
    pub async fn transfer(
        &self,
        to: impl Into<String>,
        amount: impl Into<String>,
        memo: impl Into<String>,
    ) -> Result<BroadcastReceipt, StreamerError> {
        self.client
            .broadcast_transfer(TransferRequest {
                from: self.config.username.clone(),
                to: to.into(),
                amount: amount.into(),
                memo: memo.into(),
            })
            .await
    }

    /// Vote as the configured account. `weight` is in basis points.
    pub async fn vote(
        &self,
        author: impl Into<String>,
        permlink: impl Into<String>,
        weight: i16,
    ) -> Result<BroadcastReceipt, StreamerError> {
        if !(-10_000..=10_000).contains(&weight) {
            return Err(StreamerError::Other(format!(
                "vote weight {weight} outside -10000..=10000"
            )));
        }
        self.client
            .broadcast_vote(VoteRequest {
                voter: self.config.username.clone(),
                author: author.into(),
                permlink: permlink.into(),
                weight,
            })
            .await
    }

    /// Broadcast a custom JSON as the configured account.
    pub async fn custom_json(
        &self,
        id: impl Into<String>,
        json: Value,
        use_active_key: bool,
    ) -> Result<BroadcastReceipt, StreamerError> {
        self.client
            .broadcast_custom_json(CustomJsonRequest {
                account: self.config.username.clone(),
                id: id.into(),
                json,
                use_active_key,
            })
            .await
    }

    /// Append to the adapter's audit log.
    pub async fn add_event(
        &self,
        date: DateTime<Utc>,
        contract_name: impl Into<String>,
        action: impl Into<String>,
        payload: Value,
        data: Value,
    ) -> Result<(), StreamerError> {
        self.adapter
            .add_event(ContractEvent {
                date,
                contract_name: contract_name.into(),
                action: action.into(),
                payload,
                data,
            })
            .await
    }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// A live contract: instance, bound actions and its execution queue.
pub struct RegisteredContract {
    name: String,
    contract: Arc<dyn Contract>,
    actions: HashMap<String, BoundAction>,
    queue: ExecutionQueue,
}

impl RegisteredContract {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_action(&self, action: &str) -> bool {
        self.actions.contains_key(action)
    }

    pub fn action_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn queue(&self) -> &ExecutionQueue {
        &self.queue
    }

    /// Queue `action` with `payload`. Returns `None` if the contract has no
    /// such action.
    ///
    /// On-chain triggers call `update_block_info` inside the same queued job,
    /// so the block context a contract sees always belongs to the invocation
    /// that is running.
    pub fn invoke(&self, action: &str, payload: Value, meta: ActionMeta) -> Option<Ticket<()>> {
        let method = self.actions.get(action)?.clone();
        let contract = self.contract.clone();
        Some(self.queue.submit(async move {
            if let Some(ctx) = meta.context() {
                contract.update_block_info(ctx).await;
            }
            method(payload, meta).await
        }))
    }
}

/// Name → contract map.
#[derive(Default)]
pub struct ContractRegistry {
    contracts: RwLock<HashMap<String, Arc<RegisteredContract>>>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `contract` under `name` and call its `create` hook.
    ///
    /// A `create` failure aborts the registration. An existing contract with
    /// the same name is replaced; invocations already queued on it still run.
    pub async fn register<C: Contract>(
        &self,
        name: impl Into<String>,
        contract: Arc<C>,
        ctx: ContractContext,
    ) -> Result<(), StreamerError> {
        let name = name.into();
        let actions = C::actions().bind(contract.clone());

        contract.create(ctx).await?;

        let entry = Arc::new(RegisteredContract {
            queue: ExecutionQueue::new(name.clone()),
            name: name.clone(),
            contract,
            actions,
        });
        let replaced = self
            .contracts
            .write()
            .unwrap()
            .insert(name.clone(), entry)
            .is_some();

        if replaced {
            debug!(contract = %name, "contract replaced");
        }
        info!(contract = %name, "contract registered");
        Ok(())
    }

    /// Call `destroy` and remove the contract. Returns `false` if unknown.
    pub async fn unregister(&self, name: &str) -> bool {
        let removed = self.contracts.write().unwrap().remove(name);
        match removed {
            Some(entry) => {
                if let Err(e) = entry.contract.destroy().await {
                    warn!(contract = %name, error = %e, "contract destroy failed");
                }
                info!(contract = %name, "contract unregistered");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<RegisteredContract>> {
        self.contracts.read().unwrap().get(name).cloned()
    }

    /// Returns `true` if `name` is registered and exposes `action`.
    pub fn resolves(&self, name: &str, action: &str) -> bool {
        self.get(name).map(|c| c.has_action(action)).unwrap_or(false)
    }

    /// Check that `name`/`action` resolve, with a descriptive error otherwise.
    pub fn ensure_resolves(&self, name: &str, action: &str) -> Result<(), StreamerError> {
        let contract = self.get(name).ok_or_else(|| StreamerError::UnknownContract {
            name: name.to_string(),
        })?;
        if !contract.has_action(action) {
            return Err(StreamerError::UnknownAction {
                contract: name.to_string(),
                action: action.to_string(),
            });
        }
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.contracts.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.contracts.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

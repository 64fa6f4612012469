//! The streamer — cursor tracking, catch-up loop and the public engine API.
//!
//! # Poll tick
//! 1. Query the chain head. Failure: log, count, retry next tick.
//! 2. Cold cursor (`0`): place it at `head - 1`.
//! 3. Warn when lagging more than `blocks_behind_warning`.
//! 4. Catch up: process `cursor + 1 ..= head` strictly in order. A block that
//!    is not available yet is retried every `poll_interval` until it shows up.
//!
//! # Per block
//! - dispatch every operation in transaction/operation order
//! - submit due time-based actions with the block timestamp as the clock
//! - advance the cursor and save cursor + actions through the adapter
//!
//! Neither step waits for a contract to finish: dispatched operations and
//! action firings run on the contracts' own queues. A firing's outcome is
//! applied and saved when it completes.
//!
//! # Saved state
//! The adapter's saved state is loaded once, before the first tick or the
//! first save, whichever comes first. Wiring contracts and actions before
//! `start()` therefore never overwrites the stored cursor.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Mutex as AsyncMutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use hivestream_core::action::ScheduledAction;
use hivestream_core::adapter::{PersistenceAdapter, StreamState};
use hivestream_core::client::BlockchainClient;
use hivestream_core::config::{StreamerConfig, StreamerState};
use hivestream_core::contract::{Contract, ContractContext, ContractRegistry};
use hivestream_core::cursor::Cursor;
use hivestream_core::dispatcher::{Dispatch, Dispatcher};
use hivestream_core::error::StreamerError;
use hivestream_core::scheduler::{ActionScheduler, Firing};
use hivestream_core::subscriptions::Subscriptions;
use hivestream_core::types::{
    Block, CommentOp, CustomJsonOp, Operation, OperationContext, TransferOp,
};

use crate::fetcher::BlockFetcher;

/// Counters for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamerStats {
    pub blocks_processed: u64,
    pub operations_dispatched: u64,
    pub actions_queued: u64,
    pub scheduled_fired: u64,
    /// Head queries that failed in a row; reset by the next success.
    pub consecutive_head_failures: u64,
    pub total_head_failures: u64,
    /// Block fetches that found the block missing and had to wait.
    pub block_retries: u64,
}

/// Result of one poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The head query failed; nothing was processed.
    HeadUnavailable,
    /// The cursor reached `head` after processing `processed` blocks.
    CaughtUp { processed: u64, head: u64 },
    /// A stop request interrupted the tick after `processed` blocks.
    Stopped { processed: u64 },
    /// The saved state could not be loaded; nothing was processed.
    StateUnavailable,
}

struct Inner {
    config: Arc<StreamerConfig>,
    client: Arc<dyn BlockchainClient>,
    adapter: Arc<dyn PersistenceAdapter>,
    fetcher: BlockFetcher,
    registry: Arc<ContractRegistry>,
    subscriptions: Arc<Subscriptions>,
    dispatcher: Dispatcher,
    scheduler: ActionScheduler,
    cursor: Mutex<Cursor>,
    last_block_time: Mutex<Option<DateTime<Utc>>>,
    state: Mutex<StreamerState>,
    stats: Mutex<StreamerStats>,
    /// Set once the adapter's saved state has been applied.
    restored: OnceCell<()>,
    /// Orders snapshots with their writes.
    save_lock: AsyncMutex<()>,
    shutdown: watch::Sender<bool>,
    task: AsyncMutex<Option<JoinHandle<()>>>,
}

/// The streaming engine. Cheap to clone; clones share one engine.
#[derive(Clone)]
pub struct Streamer {
    inner: Arc<Inner>,
}

impl Streamer {
    /// Create a stopped streamer. See also [`crate::StreamerBuilder`].
    pub fn new(
        config: StreamerConfig,
        client: Arc<dyn BlockchainClient>,
        adapter: Arc<dyn PersistenceAdapter>,
    ) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(ContractRegistry::new());
        let subscriptions = Arc::new(Subscriptions::new());
        let dispatcher = Dispatcher::new(
            config.clone(),
            registry.clone(),
            adapter.clone(),
            subscriptions.clone(),
        );
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                cursor: Mutex::new(Cursor::new(config.last_block_number)),
                fetcher: BlockFetcher::new(client.clone()),
                config,
                client,
                adapter,
                registry,
                subscriptions,
                dispatcher,
                scheduler: ActionScheduler::new(),
                last_block_time: Mutex::new(None),
                state: Mutex::new(StreamerState::Idle),
                stats: Mutex::new(StreamerStats::default()),
                restored: OnceCell::new(),
                save_lock: AsyncMutex::new(()),
                shutdown,
                task: AsyncMutex::new(None),
            }),
        }
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    /// Initialise the adapter, restore saved state and spawn the poll loop.
    ///
    /// Adapter setup and state loading errors are returned; everything after
    /// that is retried inside the loop.
    pub async fn start(&self) -> Result<(), StreamerError> {
        let mut task = self.inner.task.lock().await;
        if task.is_some() {
            return Err(StreamerError::Config("streamer already started".into()));
        }

        self.inner.adapter.create().await.map_err(|e| {
            error!(error = %e, "adapter setup failed");
            e
        })?;
        self.ensure_restored().await?;

        self.inner.shutdown.send_replace(false);
        *self.inner.state.lock().unwrap() = StreamerState::Live;

        let this = self.clone();
        *task = Some(tokio::spawn(async move { this.run_loop().await }));
        Ok(())
    }

    /// Stop polling, let the in-flight block finish, then release the adapter.
    ///
    /// Contract invocations that are already queued keep draining.
    pub async fn stop(&self) -> Result<(), StreamerError> {
        self.set_state(StreamerState::Stopping);
        self.inner.shutdown.send_replace(true);

        let handle = self.inner.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "poll task ended abnormally");
            }
        }

        self.set_state(StreamerState::Stopped);
        info!(block = self.last_block_number(), "Streamer stopped");
        self.inner.adapter.destroy().await
    }

    /// Apply the adapter's saved state, once. A failed load is retried by
    /// the next caller.
    async fn ensure_restored(&self) -> Result<(), StreamerError> {
        self.inner
            .restored
            .get_or_try_init(|| self.restore())
            .await
            .map(|_| ())
    }

    async fn restore(&self) -> Result<(), StreamerError> {
        match self.inner.adapter.load_state().await? {
            Some(saved) => {
                let restored = saved.actions.len();
                let added = self.inner.scheduler.merge(saved.actions);
                if saved.last_block_number > 0 {
                    *self.inner.cursor.lock().unwrap() = Cursor::new(saved.last_block_number);
                }
                info!(
                    block = self.last_block_number(),
                    actions = restored,
                    added,
                    "Resuming from saved state"
                );
            }
            None => {
                info!(block = self.last_block_number(), "No saved state, starting fresh");
            }
        }
        Ok(())
    }

    async fn run_loop(self) {
        let mut shutdown = self.inner.shutdown.subscribe();
        let interval = self.inner.config.poll_interval();

        info!(
            block = self.last_block_number(),
            interval_ms = self.inner.config.poll_interval_ms,
            "Starting poll loop"
        );

        while !*shutdown.borrow() {
            if let TickOutcome::Stopped { .. } = self.poll_once().await {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        debug!("poll loop exited");
    }

    /// Run a single poll tick (head query + catch-up).
    pub async fn poll_once(&self) -> TickOutcome {
        if let Err(e) = self.ensure_restored().await {
            error!(error = %e, "Could not load saved state");
            return TickOutcome::StateUnavailable;
        }

        let head = match self.inner.fetcher.head_block_number().await {
            Ok(head) => {
                self.inner.stats.lock().unwrap().consecutive_head_failures = 0;
                head
            }
            Err(e) => {
                let failures = {
                    let mut stats = self.inner.stats.lock().unwrap();
                    stats.consecutive_head_failures += 1;
                    stats.total_head_failures += 1;
                    stats.consecutive_head_failures
                };
                warn!(error = %e, failures, "Chain head unavailable, retrying next tick");
                return TickOutcome::HeadUnavailable;
            }
        };

        let start = {
            let mut cursor = self.inner.cursor.lock().unwrap();
            cursor.warm_up(head);
            *cursor
        };

        let lag = start.lag(head);
        if lag > self.inner.config.blocks_behind_warning {
            warn!(
                head,
                block = start.last_block_number,
                lag,
                "Streamer is behind the chain head"
            );
        }
        if lag > 0 {
            self.set_state(StreamerState::CatchingUp);
        }

        let mut processed = 0;
        loop {
            let next = self.inner.cursor.lock().unwrap().next_block();
            if next > head {
                break;
            }
            if self.stop_requested() {
                return TickOutcome::Stopped { processed };
            }
            let Some(block) = self.fetch_until_available(next).await else {
                return TickOutcome::Stopped { processed };
            };
            self.process_block(next, &block).await;
            processed += 1;
        }

        if processed > 0 {
            debug!(processed, head, "Caught up");
        }
        self.set_state(StreamerState::Live);
        TickOutcome::CaughtUp { processed, head }
    }

    /// Fetch `number`, waiting `poll_interval` between attempts. Returns
    /// `None` only when a stop is requested.
    async fn fetch_until_available(&self, number: u64) -> Option<Block> {
        let interval = self.inner.config.poll_interval();
        loop {
            match self.inner.fetcher.block(number).await {
                Ok(block) => return Some(block),
                Err(e) => {
                    self.inner.stats.lock().unwrap().block_retries += 1;
                    if e.is_transient() {
                        debug!(block = number, error = %e, "Block not available yet");
                    } else {
                        warn!(block = number, error = %e, "Block fetch failed, retrying");
                    }
                }
            }

            let mut shutdown = self.inner.shutdown.subscribe();
            if *shutdown.borrow() {
                return None;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => return None,
            }
        }
    }

    async fn process_block(&self, number: u64, block: &Block) {
        let mut dispatched = 0;
        let mut queued = 0;
        for (trx_id, op) in block.operations() {
            let ctx = OperationContext::for_block(number, block, trx_id);
            if self.inner.dispatcher.process_operation(op, &ctx).await.is_queued() {
                queued += 1;
            }
            dispatched += 1;
        }

        let firings = self
            .inner
            .scheduler
            .process_actions(block.timestamp, &self.inner.registry);
        let fired = firings.len();
        for firing in firings {
            self.spawn_settle(firing);
        }

        self.inner.cursor.lock().unwrap().advance(number);
        *self.inner.last_block_time.lock().unwrap() = Some(block.timestamp);
        {
            let mut stats = self.inner.stats.lock().unwrap();
            stats.blocks_processed += 1;
            stats.operations_dispatched += dispatched;
            stats.actions_queued += queued;
        }

        debug!(
            block = number,
            ops = dispatched,
            queued,
            fired,
            "Block processed"
        );

        self.flush().await;
    }

    /// Await a firing off the ingestion path. A success is saved before the
    /// action may fire again.
    fn spawn_settle(&self, firing: Firing) {
        let this = self.clone();
        tokio::spawn(async move {
            let Firing {
                action_id,
                fired_at,
                ticket,
            } = firing;
            let completion = this
                .inner
                .scheduler
                .complete(&action_id, fired_at, ticket.await);
            if completion.is_success() {
                this.inner.stats.lock().unwrap().scheduled_fired += 1;
                this.flush().await;
            }
            this.inner.scheduler.release(&action_id);
            debug!(action = %action_id, ?completion, "Time-based action settled");
        });
    }

    /// Save cursor and actions. Failures are logged; the in-memory cursor is
    /// kept either way.
    async fn flush(&self) {
        if let Err(e) = self.save_state().await {
            error!(block = self.last_block_number(), error = %e, "Failed to save state");
        }
    }

    /// Save cursor and actions, returning adapter errors.
    ///
    /// Loads the saved state first if that has not happened yet, so the
    /// stored cursor is never replaced by the configured default.
    pub async fn save_state(&self) -> Result<(), StreamerError> {
        self.ensure_restored().await?;
        let _guard = self.inner.save_lock.lock().await;
        let state = StreamState {
            last_block_number: self.last_block_number(),
            actions: self.inner.scheduler.snapshot(),
        };
        self.inner.adapter.save_state(&state).await
    }

    fn stop_requested(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    fn set_state(&self, state: StreamerState) {
        let mut current = self.inner.state.lock().unwrap();
        // Stop wins over the loop's own transitions.
        if matches!(*current, StreamerState::Stopping | StreamerState::Stopped)
            && matches!(state, StreamerState::CatchingUp | StreamerState::Live)
        {
            return;
        }
        *current = state;
    }

    // ─── Contracts ──────────────────────────────────────────────────────────

    /// Register `contract` under `name`, calling its `create` hook.
    pub async fn register_contract<C: Contract>(
        &self,
        name: impl Into<String>,
        contract: Arc<C>,
    ) -> Result<(), StreamerError> {
        self.inner
            .registry
            .register(name, contract, self.context())
            .await
    }

    /// Call the contract's `destroy` hook and remove it.
    pub async fn unregister_contract(&self, name: &str) -> bool {
        self.inner.registry.unregister(name).await
    }

    pub fn contract_names(&self) -> Vec<String> {
        self.inner.registry.names()
    }

    /// Engine services as handed to contracts.
    pub fn context(&self) -> ContractContext {
        ContractContext::new(
            self.inner.client.clone(),
            self.inner.adapter.clone(),
            self.inner.config.clone(),
        )
    }

    /// Dispatch a single operation outside the poll loop.
    pub async fn process_operation(&self, op: &Operation, ctx: &OperationContext) -> Dispatch {
        self.inner.dispatcher.process_operation(op, ctx).await
    }

    // ─── Time-based actions ─────────────────────────────────────────────────

    /// Register a time-based action.
    ///
    /// Fails if the contract or method does not resolve. Actions stored by
    /// the adapter but missing here are merged in first; a duplicate id is
    /// ignored.
    pub async fn register_action(&self, action: ScheduledAction) -> Result<(), StreamerError> {
        action.validate()?;
        self.inner
            .registry
            .ensure_resolves(&action.contract_name, &action.contract_method)?;

        if let Err(e) = self.ensure_restored().await {
            warn!(error = %e, "Could not load saved state");
        }
        match self.inner.adapter.load_actions().await {
            Ok(stored) => {
                let added = self.inner.scheduler.merge(stored);
                if added > 0 {
                    debug!(added, "Merged stored actions");
                }
            }
            Err(e) => warn!(error = %e, "Could not load stored actions"),
        }

        let id = action.id.clone();
        if self.inner.scheduler.insert(action) {
            info!(action = %id, "Action registered");
        }
        self.flush().await;
        Ok(())
    }

    pub async fn remove_action(&self, id: &str) -> bool {
        let found = self.inner.scheduler.remove(id);
        if found {
            self.flush().await;
        }
        found
    }

    pub fn get_action(&self, id: &str) -> Option<ScheduledAction> {
        self.inner.scheduler.get(id)
    }

    pub fn get_actions(&self) -> Vec<ScheduledAction> {
        self.inner.scheduler.snapshot()
    }

    /// Time-based action firings that have not settled yet.
    pub fn pending_actions(&self) -> usize {
        self.inner.scheduler.in_flight()
    }

    pub async fn set_action_enabled(&self, id: &str, enabled: bool) -> bool {
        let found = self.inner.scheduler.set_enabled(id, enabled);
        if found {
            self.flush().await;
        }
        found
    }

    /// Restart the action's interval from the last processed block time
    /// (wall clock before the first block).
    pub async fn reset_action(&self, id: &str) -> bool {
        let now = self.inner.last_block_time.lock().unwrap().unwrap_or_else(Utc::now);
        let found = self.inner.scheduler.reset(id, now);
        if found {
            self.flush().await;
        }
        found
    }

    // ─── Subscriptions ──────────────────────────────────────────────────────

    pub fn on_comment<F>(&self, callback: F)
    where
        F: Fn(&CommentOp, &OperationContext) + Send + Sync + 'static,
    {
        self.inner.subscriptions.on_comment(callback);
    }

    pub fn on_post<F>(&self, callback: F)
    where
        F: Fn(&CommentOp, &OperationContext) + Send + Sync + 'static,
    {
        self.inner.subscriptions.on_post(callback);
    }

    pub fn on_transfer<F>(&self, account: impl Into<String>, callback: F)
    where
        F: Fn(&TransferOp, &OperationContext) + Send + Sync + 'static,
    {
        self.inner.subscriptions.on_transfer(account, callback);
    }

    pub fn on_custom_json<F>(&self, callback: F)
    where
        F: Fn(&CustomJsonOp, &OperationContext) + Send + Sync + 'static,
    {
        self.inner.subscriptions.on_custom_json(callback);
    }

    pub fn on_custom_json_id<F>(&self, id: impl Into<String>, callback: F)
    where
        F: Fn(&CustomJsonOp, &OperationContext) + Send + Sync + 'static,
    {
        self.inner.subscriptions.on_custom_json_id(id, callback);
    }

    // ─── Convenience broadcasts ─────────────────────────────────────────────

    pub async fn transfer(
        &self,
        to: &str,
        amount: &str,
        memo: &str,
    ) -> Result<String, StreamerError> {
        Ok(self.context().transfer(to, amount, memo).await?.transaction_id)
    }

    pub async fn vote(&self, author: &str, permlink: &str, weight: i16) -> Result<String, StreamerError> {
        Ok(self.context().vote(author, permlink, weight).await?.transaction_id)
    }

    pub async fn custom_json(
        &self,
        id: &str,
        json: Value,
        use_active_key: bool,
    ) -> Result<String, StreamerError> {
        Ok(self
            .context()
            .custom_json(id, json, use_active_key)
            .await?
            .transaction_id)
    }

    // ─── Introspection ──────────────────────────────────────────────────────

    pub fn last_block_number(&self) -> u64 {
        self.inner.cursor.lock().unwrap().last_block_number
    }

    pub fn state(&self) -> StreamerState {
        *self.inner.state.lock().unwrap()
    }

    pub fn stats(&self) -> StreamerStats {
        *self.inner.stats.lock().unwrap()
    }

    pub fn config(&self) -> &StreamerConfig {
        &self.inner.config
    }
}

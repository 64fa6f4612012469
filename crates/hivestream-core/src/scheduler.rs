//! Action scheduler — fires time-based actions against blockchain time.
//!
//! The scheduler owns the live action table. The streamer calls
//! [`ActionScheduler::process_actions`] once per block with the block
//! timestamp. Due actions are submitted to their contract's execution queue
//! and come back as [`Firing`]s; the caller awaits each ticket off the
//! ingestion path and reports the outcome through
//! [`ActionScheduler::complete`]. Until [`ActionScheduler::release`] is
//! called the action is in flight and is not fired again.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{debug, error, info, trace};

use crate::action::ScheduledAction;
use crate::contract::{ActionMeta, ContractRegistry};
use crate::error::StreamerError;
use crate::queue::Ticket;

/// A submitted action invocation.
pub struct Firing {
    pub action_id: String,
    /// Block time the action fired at.
    pub fired_at: DateTime<Utc>,
    pub ticket: Ticket<()>,
}

/// How a firing ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Counted; the interval restarts from the firing time.
    Recorded,
    /// Counted and the execution limit was reached; the action is gone.
    Retired,
    /// The action errored and stays due.
    Failed,
    /// The action was removed while it was running.
    Gone,
}

impl Completion {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Recorded | Self::Retired)
    }
}

/// The live set of scheduled actions.
#[derive(Default)]
pub struct ActionScheduler {
    actions: Mutex<Vec<ScheduledAction>>,
    in_flight: Mutex<HashSet<String>>,
}

impl ActionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add actions that are not present yet. Returns how many were added.
    pub fn merge(&self, external: Vec<ScheduledAction>) -> usize {
        let mut actions = self.actions.lock().unwrap();
        let mut added = 0;
        for action in external {
            if !actions.iter().any(|a| a.id == action.id) {
                actions.push(action);
                added += 1;
            }
        }
        added
    }

    /// Append `action`. A duplicate id is a no-op and returns `false`.
    pub fn insert(&self, action: ScheduledAction) -> bool {
        let mut actions = self.actions.lock().unwrap();
        if actions.iter().any(|a| a.id == action.id) {
            debug!(action = %action.id, "duplicate action id ignored");
            return false;
        }
        actions.push(action);
        true
    }

    pub fn get(&self, id: &str) -> Option<ScheduledAction> {
        self.actions.lock().unwrap().iter().find(|a| a.id == id).cloned()
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut actions = self.actions.lock().unwrap();
        let before = actions.len();
        actions.retain(|a| a.id != id);
        actions.len() != before
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        self.update(id, |a| a.enabled = enabled)
    }

    /// Restart the interval of `id` from `now`.
    pub fn reset(&self, id: &str, now: DateTime<Utc>) -> bool {
        self.update(id, |a| a.reset(now))
    }

    /// Snapshot of all live actions.
    pub fn snapshot(&self) -> Vec<ScheduledAction> {
        self.actions.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.actions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of firings submitted but not yet released.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut ScheduledAction)) -> bool {
        match self.actions.lock().unwrap().iter_mut().find(|a| a.id == id) {
            Some(action) => {
                f(action);
                true
            }
            None => false,
        }
    }

    /// Submit every enabled, resolvable action that is due at `now` and not
    /// already in flight. Does not wait for any of them to run.
    pub fn process_actions(&self, now: DateTime<Utc>, registry: &ContractRegistry) -> Vec<Firing> {
        let due: Vec<ScheduledAction> = self
            .actions
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.is_due(now))
            .cloned()
            .collect();

        let mut firings = Vec::new();
        for action in due {
            if self.in_flight.lock().unwrap().contains(&action.id) {
                trace!(action = %action.id, "previous firing still running");
                continue;
            }
            let Some(contract) = registry.get(&action.contract_name) else {
                trace!(action = %action.id, contract = %action.contract_name, "contract not registered");
                continue;
            };
            let meta = ActionMeta::Scheduled {
                action_id: action.id.clone(),
                fired_at: now,
            };
            let Some(ticket) =
                contract.invoke(&action.contract_method, action.payload.clone(), meta)
            else {
                trace!(action = %action.id, method = %action.contract_method, "action method missing");
                continue;
            };

            self.in_flight.lock().unwrap().insert(action.id.clone());
            firings.push(Firing {
                action_id: action.id,
                fired_at: now,
                ticket,
            });
        }
        firings
    }

    /// Apply the outcome of a firing. The action stays in flight until
    /// [`release`](Self::release).
    pub fn complete(
        &self,
        id: &str,
        fired_at: DateTime<Utc>,
        outcome: Result<(), StreamerError>,
    ) -> Completion {
        if let Err(e) = outcome {
            error!(action = %id, error = %e, "time-based action failed");
            return Completion::Failed;
        }

        let mut actions = self.actions.lock().unwrap();
        let Some(pos) = actions.iter().position(|a| a.id == id) else {
            return Completion::Gone;
        };
        actions[pos].record_execution(fired_at);
        if actions[pos].is_exhausted() {
            let action = actions.remove(pos);
            info!(action = %action.id, executions = action.execution_count, "action reached max executions");
            return Completion::Retired;
        }
        Completion::Recorded
    }

    /// Allow `id` to fire again.
    pub fn release(&self, id: &str) {
        self.in_flight.lock().unwrap().remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Frequency;
    use crate::testing::{context, Recorder};
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn action(id: &str, freq: Frequency, method: &str) -> ScheduledAction {
        ScheduledAction::new(id, freq, "foo", method, json!({"id": id}), t0()).unwrap()
    }

    async fn registry() -> (ContractRegistry, Arc<Recorder>) {
        let registry = ContractRegistry::new();
        let rec = Arc::new(Recorder::default());
        registry.register("foo", rec.clone(), context()).await.unwrap();
        (registry, rec)
    }

    #[test]
    fn duplicate_insert_keeps_first() {
        let scheduler = ActionScheduler::new();
        assert!(scheduler.insert(action("a", Frequency::Minute1, "bar")));
        assert!(!scheduler.insert(action("a", Frequency::Hour1, "other")));
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.get("a").unwrap().frequency, Frequency::Minute1);
    }

    #[test]
    fn merge_only_adds_unknown_ids() {
        let scheduler = ActionScheduler::new();
        scheduler.insert(action("a", Frequency::Minute1, "bar"));
        let added = scheduler.merge(vec![
            action("a", Frequency::Hour1, "bar"),
            action("b", Frequency::Hour1, "bar"),
        ]);
        assert_eq!(added, 1);
        assert_eq!(scheduler.get("a").unwrap().frequency, Frequency::Minute1);
    }

    #[test]
    fn management_calls_report_presence() {
        let scheduler = ActionScheduler::new();
        scheduler.insert(action("a", Frequency::Minute1, "bar"));

        assert!(scheduler.set_enabled("a", false));
        assert!(!scheduler.get("a").unwrap().enabled);
        assert!(!scheduler.set_enabled("zzz", false));

        let later = t0() + Duration::hours(3);
        assert!(scheduler.reset("a", later));
        assert_eq!(scheduler.get("a").unwrap().scheduled_at, later);

        assert!(scheduler.remove("a"));
        assert!(!scheduler.remove("a"));
        assert!(scheduler.get("a").is_none());
    }

    async fn settle(scheduler: &ActionScheduler, firing: Firing) -> Completion {
        let outcome = firing.ticket.await;
        let completion = scheduler.complete(&firing.action_id, firing.fired_at, outcome);
        scheduler.release(&firing.action_id);
        completion
    }

    async fn run_due(
        scheduler: &ActionScheduler,
        now: DateTime<Utc>,
        registry: &ContractRegistry,
    ) -> Vec<Completion> {
        let mut completions = Vec::new();
        for firing in scheduler.process_actions(now, registry) {
            completions.push(settle(scheduler, firing).await);
        }
        completions
    }

    #[tokio::test]
    async fn fires_once_at_threshold_and_resets() {
        let (registry, rec) = registry().await;
        let scheduler = ActionScheduler::new();
        scheduler.insert(action("a", Frequency::Minute1, "bar"));

        let early = run_due(&scheduler, t0() + Duration::seconds(59), &registry).await;
        assert!(early.is_empty());

        let now = t0() + Duration::seconds(60);
        assert_eq!(run_due(&scheduler, now, &registry).await, vec![Completion::Recorded]);

        let a = scheduler.get("a").unwrap();
        assert_eq!(a.execution_count, 1);
        assert_eq!(a.scheduled_at, now);
        assert_eq!(a.last_execution_at, Some(now));

        // Reference time moved, so the same instant does not fire again.
        assert!(run_due(&scheduler, now, &registry).await.is_empty());
        assert_eq!(rec.calls(), vec!["create", r#"bar:{"id":"a"}"#]);
    }

    #[tokio::test]
    async fn failure_does_not_advance() {
        let (registry, _rec) = registry().await;
        let scheduler = ActionScheduler::new();
        scheduler.insert(action("f", Frequency::Seconds30, "fail"));

        let now = t0() + Duration::minutes(1);
        assert_eq!(run_due(&scheduler, now, &registry).await, vec![Completion::Failed]);

        let f = scheduler.get("f").unwrap();
        assert_eq!(f.execution_count, 0);
        assert_eq!(f.scheduled_at, t0());
        assert!(f.last_execution_at.is_none());
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[tokio::test]
    async fn max_executions_retires_action() {
        let (registry, _rec) = registry().await;
        let scheduler = ActionScheduler::new();
        scheduler.insert(action("once", Frequency::EveryBlock, "bar").with_max_executions(1));

        assert_eq!(run_due(&scheduler, t0(), &registry).await, vec![Completion::Retired]);
        assert!(scheduler.get("once").is_none());
        assert!(scheduler.is_empty());
    }

    #[tokio::test]
    async fn in_flight_action_is_not_fired_again() {
        let (registry, rec) = registry().await;
        let scheduler = ActionScheduler::new();
        scheduler.insert(action("tick", Frequency::EveryBlock, "bar"));

        let first = scheduler.process_actions(t0(), &registry);
        assert_eq!(first.len(), 1);
        assert_eq!(scheduler.in_flight(), 1);
        assert!(scheduler.process_actions(t0() + Duration::seconds(3), &registry).is_empty());

        for firing in first {
            assert_eq!(settle(&scheduler, firing).await, Completion::Recorded);
        }
        assert_eq!(scheduler.in_flight(), 0);
        assert_eq!(
            run_due(&scheduler, t0() + Duration::seconds(6), &registry).await,
            vec![Completion::Recorded]
        );
        assert_eq!(rec.calls().len(), 3);
    }

    #[tokio::test]
    async fn removed_while_running_is_gone() {
        let (registry, _rec) = registry().await;
        let scheduler = ActionScheduler::new();
        scheduler.insert(action("a", Frequency::EveryBlock, "bar"));

        let firings = scheduler.process_actions(t0(), &registry);
        assert!(scheduler.remove("a"));
        for firing in firings {
            assert_eq!(settle(&scheduler, firing).await, Completion::Gone);
        }
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[tokio::test]
    async fn disabled_and_unresolvable_actions_are_skipped() {
        let (registry, rec) = registry().await;
        let scheduler = ActionScheduler::new();
        scheduler.insert(action("off", Frequency::EveryBlock, "bar").disabled());
        scheduler.insert(
            ScheduledAction::new("ghost", Frequency::EveryBlock, "gone", "bar", json!({}), t0())
                .unwrap(),
        );
        scheduler.insert(action("nomethod", Frequency::EveryBlock, "missing"));

        assert!(scheduler.process_actions(t0(), &registry).is_empty());
        assert_eq!(scheduler.in_flight(), 0);
        assert_eq!(rec.calls(), vec!["create"]);
        assert_eq!(scheduler.len(), 3);
    }
}

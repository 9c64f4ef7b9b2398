//! Linkage dispatcher
//!
//! A trigger at one device fans out to every enabled linkage rule that matches
//! it. Each match gets a PENDING execution log row immediately; the action then
//! runs as a deferred pool task and the row moves to SUCCESS or FAILED exactly
//! once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, instrument, warn, Instrument};

use super::actuation::ControlCommand;
use super::audit::AuditEntry;
use super::context::EngineContext;
use super::error::{EngineError, EngineResult, RetryPolicy};
use super::worker_pool::TaskHandle;
use crate::events::trigger;
use crate::rule_span;
use crate::rules::LinkageRule;
use crate::store::{load_counter, StateKey};
use crate::types::{
    CommandSource, ControlAction, DeviceId, DoorId, ExecutionId, ExecutionStatus, RuleId,
};

/// One (rule, trigger) execution record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkageExecutionLog {
    /// Row identifier
    pub id: ExecutionId,
    /// Rule executed
    pub rule_id: RuleId,
    /// Trigger event name
    pub trigger_event: String,
    /// Device the action was sent to
    pub target_device_id: DeviceId,
    /// Door the action addressed, if any
    pub target_door_id: Option<DoorId>,
    /// Action sent
    pub action_type: ControlAction,
    /// Lifecycle state
    pub status: ExecutionStatus,
    /// Send attempts made, including retries
    pub attempts: u32,
    /// When the row was created
    pub created_at: DateTime<Utc>,
    /// When the action finished
    pub executed_at: Option<DateTime<Utc>>,
    /// Device response on success
    pub response_payload: Option<String>,
    /// Failure detail
    pub error_message: Option<String>,
}

impl LinkageExecutionLog {
    fn pending(rule: &LinkageRule, trigger_event: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: ExecutionId::new(),
            rule_id: rule.id,
            trigger_event: trigger_event.to_string(),
            target_device_id: rule.target_device_id,
            target_door_id: rule.target_door_id,
            action_type: rule.action_type,
            status: ExecutionStatus::Pending,
            attempts: 0,
            created_at,
            executed_at: None,
            response_payload: None,
            error_message: None,
        }
    }

    fn succeeded(mut self, payload: String, attempts: u32, at: DateTime<Utc>) -> Self {
        self.status = ExecutionStatus::Success;
        self.attempts = attempts;
        self.executed_at = Some(at);
        self.response_payload = Some(payload);
        self
    }

    fn failed(mut self, error: String, attempts: u32, at: DateTime<Utc>) -> Self {
        self.status = ExecutionStatus::Failed;
        self.attempts = attempts;
        self.executed_at = Some(at);
        self.error_message = Some(error);
        self
    }

    /// Whether the action succeeded
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Rows kept by [`LinkageLogBook::new`]
pub const DEFAULT_LOG_CAPACITY: usize = 10_000;

#[derive(Debug, Default)]
struct LogBookInner {
    order: VecDeque<ExecutionId>,
    rows: HashMap<ExecutionId, LinkageExecutionLog>,
}

impl LogBookInner {
    fn is_final(&self, id: &ExecutionId) -> bool {
        self.rows.get(id).map_or(true, |row| row.status.is_terminal())
    }

    /// Drop the oldest final rows until at most `capacity` remain
    fn evict(&mut self, capacity: usize) -> usize {
        let mut excess = self.order.len().saturating_sub(capacity);
        let mut evicted = 0;

        while excess > 0 && self.order.front().map_or(false, |id| self.is_final(id)) {
            if let Some(id) = self.order.pop_front() {
                self.rows.remove(&id);
            }
            excess -= 1;
            evicted += 1;
        }

        // A PENDING row at the front; skip past it
        if excess > 0 {
            let LogBookInner { order, rows } = self;
            order.retain(|id| {
                let pending = rows.get(id).map_or(false, |row| !row.status.is_terminal());
                if excess == 0 || pending {
                    return true;
                }
                rows.remove(id);
                excess -= 1;
                evicted += 1;
                false
            });
        }
        evicted
    }
}

/// Recent linkage executions, in creation order
///
/// Holds at most `capacity` rows. When full, the oldest SUCCESS or FAILED
/// rows make room; PENDING rows are never evicted, so the book can exceed its
/// capacity while more than `capacity` actions are outstanding.
#[derive(Debug)]
pub struct LinkageLogBook {
    capacity: usize,
    inner: Mutex<LogBookInner>,
}

impl Default for LinkageLogBook {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkageLogBook {
    /// Create an empty log book holding [`DEFAULT_LOG_CAPACITY`] rows
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    /// Create an empty log book holding at most `capacity` final rows
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(LogBookInner::default()),
        }
    }

    /// Rows kept before the oldest final ones are evicted
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn open(&self, row: LinkageExecutionLog) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.order.push_back(row.id);
            inner.rows.insert(row.id, row);
            let evicted = inner.evict(self.capacity);
            if evicted > 0 {
                debug!("Evicted {} finished linkage row(s)", evicted);
            }
        }
    }

    /// Apply a final status; a row that is already final is left untouched
    fn close(&self, row: &LinkageExecutionLog) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        match inner.rows.get_mut(&row.id) {
            Some(existing) if !existing.status.is_terminal() => {
                *existing = row.clone();
                true
            }
            _ => false,
        }
    }

    /// Row by id
    pub fn get(&self, id: ExecutionId) -> Option<LinkageExecutionLog> {
        self.inner.lock().ok()?.rows.get(&id).cloned()
    }

    /// Every row, oldest first
    pub fn all(&self) -> Vec<LinkageExecutionLog> {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .order
                    .iter()
                    .filter_map(|id| inner.rows.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rows of one rule, oldest first
    pub fn for_rule(&self, rule: RuleId) -> Vec<LinkageExecutionLog> {
        self.all()
            .into_iter()
            .filter(|row| row.rule_id == rule)
            .collect()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.order.len()).unwrap_or(0)
    }

    /// Whether no row exists
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Executions started by one dispatch
#[derive(Debug)]
pub struct LinkageSummary {
    /// Rules handed to the worker pool
    pub dispatched: usize,
    /// Rules the pool refused; their rows are already FAILED
    pub refused: usize,
    /// Log row per matching rule, in dispatch order
    pub execution_ids: Vec<ExecutionId>,
    /// Completion handle per dispatched rule
    pub handles: Vec<TaskHandle<LinkageExecutionLog>>,
}

impl LinkageSummary {
    /// Wait for every execution
    pub async fn join_all(self) -> Vec<EngineResult<LinkageExecutionLog>> {
        let mut results = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            results.push(handle.join().await);
        }
        results
    }
}

/// Matches triggers to linkage rules and executes their actions
#[derive(Debug, Clone)]
pub struct LinkageDispatcher {
    ctx: EngineContext,
    logs: Arc<LinkageLogBook>,
    retry: RetryPolicy,
}

impl LinkageDispatcher {
    pub(crate) fn new(ctx: EngineContext) -> Self {
        let retry = RetryPolicy::for_linkage(&ctx.config);
        let logs = Arc::new(LinkageLogBook::with_capacity(ctx.config.linkage_log_capacity));
        Self { ctx, logs, retry }
    }

    /// Dispatch every enabled rule matching the trigger, highest priority first
    #[instrument(skip(self), fields(device = %device))]
    pub async fn dispatch(
        &self,
        device: DeviceId,
        door: Option<DoorId>,
        trigger_event: &str,
    ) -> EngineResult<LinkageSummary> {
        let mut rules: Vec<LinkageRule> = self
            .ctx
            .catalog
            .linkage_rules_for_device(device)
            .await?
            .into_iter()
            .filter(|rule| {
                rule.enabled && rule.matches_trigger(device, door) && rule.accepts_event(trigger_event)
            })
            .collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut summary = LinkageSummary {
            dispatched: 0,
            refused: 0,
            execution_ids: Vec::with_capacity(rules.len()),
            handles: Vec::with_capacity(rules.len()),
        };

        for rule in rules {
            let rule_id = rule.id;
            let pending = self.open(&rule, trigger_event).await;
            summary.execution_ids.push(pending.id);
            match self.schedule(rule, pending, CommandSource::Linkage).await {
                Ok(handle) => {
                    summary.handles.push(handle);
                    summary.dispatched += 1;
                }
                Err(e) => {
                    warn!("Linkage {} not started: {}", rule_id, e);
                    summary.refused += 1;
                }
            }
        }

        if summary.refused > 0 {
            warn!(
                "Linkage trigger {} at {}: {} rule(s) dispatched, {} refused",
                trigger_event, device, summary.dispatched, summary.refused
            );
        } else if summary.dispatched > 0 {
            info!(
                "Linkage trigger {} at {}: {} rule(s) dispatched",
                trigger_event, device, summary.dispatched
            );
        } else {
            debug!("No linkage rule matched {} at {}", trigger_event, device);
        }
        Ok(summary)
    }

    /// Run one rule through the normal execution path with the TEST trigger
    ///
    /// The rule's enabled flag and condition expression are not consulted.
    pub async fn test(&self, rule_id: RuleId) -> EngineResult<LinkageExecutionLog> {
        let rule = self
            .ctx
            .catalog
            .linkage_rule(rule_id)
            .await?
            .ok_or(EngineError::RuleNotFound(rule_id))?;
        info!("Testing linkage rule {}", rule_id);

        let pending = self.open(&rule, trigger::TEST).await;
        self.schedule(rule, pending, CommandSource::LinkageTest)
            .await?
            .join()
            .await
    }

    async fn open(&self, rule: &LinkageRule, trigger_event: &str) -> LinkageExecutionLog {
        let pending = LinkageExecutionLog::pending(rule, trigger_event, self.ctx.clock.now());
        self.logs.open(pending.clone());
        self.ctx.emit(AuditEntry::Linkage(pending.clone()));
        self.ctx.stats.record_linkage_dispatched();

        if let Err(e) = self
            .ctx
            .store
            .increment(&StateKey::linkage_pending(rule.id))
            .await
        {
            warn!("Pending counter for {} not updated: {}", rule.id, e);
        }
        pending
    }

    async fn schedule(
        &self,
        rule: LinkageRule,
        pending: LinkageExecutionLog,
        source: CommandSource,
    ) -> EngineResult<TaskHandle<LinkageExecutionLog>> {
        let delay = Duration::from_secs(rule.delay_seconds);
        let dispatcher = self.clone();
        let rule_id = rule.id;
        let row = pending.clone();

        let submitted = self.ctx.pool.submit_after("linkage_execute", delay, async move {
            dispatcher.execute(rule, row, source).await
        });

        match submitted {
            Ok(handle) => Ok(handle),
            Err(e) => {
                let failed = pending.failed(e.to_string(), 0, self.ctx.clock.now());
                self.finish(rule_id, failed);
                self.release_pending(rule_id).await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        rule: LinkageRule,
        pending: LinkageExecutionLog,
        source: CommandSource,
    ) -> LinkageExecutionLog {
        let span = rule_span!(
            "linkage_execute",
            rule = rule.id.value(),
            target = rule.target_device_id.value(),
        );

        async move {
            let command = ControlCommand::new(rule.target_device_id, rule.action_type, source)
                .for_door(rule.target_door_id)
                .for_rule(rule.id);
            let label = format!("linkage {} {}", rule.id, rule.action_type);

            let outcome = self
                .retry
                .execute(&label, |_| {
                    let actuator = Arc::clone(&self.ctx.actuator);
                    let command = command.clone();
                    async move { actuator.send(command).await }
                })
                .await;

            let now = self.ctx.clock.now();
            let row = match outcome.result {
                Ok(response) => pending.succeeded(response.payload, outcome.attempts, now),
                Err(e) => {
                    warn!("Linkage {} failed: {}", rule.id, e);
                    pending.failed(e.to_string(), outcome.attempts, now)
                }
            };
            self.finish(rule.id, row.clone());
            self.release_pending(rule.id).await;
            row
        }
        .instrument(span)
        .await
    }

    async fn release_pending(&self, rule: RuleId) {
        if let Err(e) = self.ctx.store.decrement(&StateKey::linkage_pending(rule)).await {
            warn!("Pending counter for {} not updated: {}", rule, e);
        }
    }

    fn finish(&self, rule: RuleId, row: LinkageExecutionLog) {
        if !self.logs.close(&row) {
            warn!("Linkage row {} for {} was already final", row.id, rule);
            return;
        }
        if row.is_success() {
            self.ctx.stats.record_linkage_succeeded();
        } else {
            self.ctx.stats.record_linkage_failed();
        }
        debug!("Linkage row {} for {} is {}", row.id, rule, row.status);
        self.ctx.emit(AuditEntry::Linkage(row));
    }

    /// Every execution row, oldest first
    pub fn logs(&self) -> Vec<LinkageExecutionLog> {
        self.logs.all()
    }

    /// Execution rows of one rule, oldest first
    pub fn logs_for_rule(&self, rule: RuleId) -> Vec<LinkageExecutionLog> {
        self.logs.for_rule(rule)
    }

    /// Execution row by id
    pub fn log(&self, id: ExecutionId) -> Option<LinkageExecutionLog> {
        self.logs.get(id)
    }

    /// Executions of `rule` that have not reached a final state
    pub async fn pending_count(&self, rule: RuleId) -> EngineResult<i64> {
        Ok(load_counter(self.ctx.store.as_ref(), &StateKey::linkage_pending(rule)).await?)
    }
}

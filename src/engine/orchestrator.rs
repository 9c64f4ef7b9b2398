//! Engine orchestration
//!
//! [`AccessRuleEngine`] owns the collaborators and wires the components
//! together: the passback decision is made on the caller's path, and accepted
//! events are handed to the interlock controller and linkage dispatcher on the
//! worker pool.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::actuation::{ActuationClient, SimulatedActuator, TimedActuator};
use super::audit::{
    AuditEmitter, AuditEntry, AuditRecorder, AuditStats, InMemoryAuditRecorder, PassbackRecord,
    DEFAULT_AUDIT_BUFFER,
};
use super::clock::{Clock, SystemClock};
use super::context::EngineContext;
use super::error::EngineResult;
use super::interlock::{InterlockController, InterlockState, InterlockSummary};
use super::linkage::{LinkageDispatcher, LinkageExecutionLog, LinkageSummary};
use super::passback::{PassbackChecker, PassbackStatus, SoftException};
use super::statistics::{EngineStatistics, StatisticsSnapshot};
use super::worker_pool::{PoolStats, WorkerPool};
use crate::engine_event;
use crate::events::{trigger, AccessEvent, Decision};
use crate::facility::FacilityRegistry;
use crate::rules::{CachedRuleCatalog, InMemoryRuleCatalog, RuleCatalog};
use crate::store::{load_counter, MemoryStateStore, StateKey, StateStore};
use crate::types::{
    AreaId, DeviceId, Direction, DoorAction, DoorId, EngineConfig, ExecutionId, RuleId, UserId,
};

/// Assembles an [`AccessRuleEngine`]
///
/// Collaborators that are not supplied fall back to the in-process
/// implementations.
#[derive(Debug)]
pub struct AccessRuleEngineBuilder {
    config: EngineConfig,
    registry: FacilityRegistry,
    catalog: Option<Arc<dyn RuleCatalog>>,
    store: Option<Arc<dyn StateStore>>,
    actuator: Option<Arc<dyn ActuationClient>>,
    recorder: Option<Arc<dyn AuditRecorder>>,
    clock: Option<Arc<dyn Clock>>,
    audit_buffer: usize,
}

impl AccessRuleEngineBuilder {
    /// Rule catalog to evaluate
    pub fn with_catalog(mut self, catalog: Arc<dyn RuleCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// State store for passback, interlock and counter state
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Device layer
    pub fn with_actuator(mut self, actuator: Arc<dyn ActuationClient>) -> Self {
        self.actuator = Some(actuator);
        self
    }

    /// Audit sink
    pub fn with_recorder(mut self, recorder: Arc<dyn AuditRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Time source for lock and log timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Capacity of the audit channel
    pub fn with_audit_buffer(mut self, size: usize) -> Self {
        self.audit_buffer = size;
        self
    }

    /// Validate the configuration and start the engine
    ///
    /// Must be called inside a tokio runtime; the audit drain task is spawned
    /// here.
    pub fn build(self) -> EngineResult<AccessRuleEngine> {
        self.config.validate()?;

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let store: Arc<dyn StateStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStateStore::with_clock(Arc::clone(&clock))),
        };
        let catalog: Arc<dyn RuleCatalog> = match self.catalog {
            Some(catalog) => catalog,
            None => Arc::new(InMemoryRuleCatalog::new()),
        };
        let catalog: Arc<dyn RuleCatalog> = if self.config.rule_cache_ttl_secs > 0 {
            Arc::new(CachedRuleCatalog::new(catalog, self.config.rule_cache_ttl()))
        } else {
            catalog
        };
        let actuator: Arc<dyn ActuationClient> = match self.actuator {
            Some(actuator) => actuator,
            None => Arc::new(SimulatedActuator::new()),
        };
        let recorder: Arc<dyn AuditRecorder> = match self.recorder {
            Some(recorder) => recorder,
            None => Arc::new(InMemoryAuditRecorder::new()),
        };

        let registry = Arc::new(self.registry);
        let config = Arc::new(self.config);
        let ctx = EngineContext {
            actuator: Arc::new(TimedActuator::new(actuator, config.actuation_timeout())),
            audit: Arc::new(AuditEmitter::with_buffer_size(recorder, self.audit_buffer)),
            pool: WorkerPool::new(config.worker_count),
            stats: Arc::new(EngineStatistics::new()),
            config: Arc::clone(&config),
            registry: Arc::clone(&registry),
            catalog,
            store: Arc::clone(&store),
            clock,
        };

        let facility = registry.stats();
        info!(
            "Access rule engine ready: {} areas ({} policed), {} devices, {} doors, {} workers",
            facility.areas,
            facility.policed_areas,
            facility.devices,
            facility.doors,
            config.worker_count
        );

        Ok(AccessRuleEngine {
            passback: PassbackChecker::new(registry, store, config),
            interlock: InterlockController::new(ctx.clone()),
            linkage: LinkageDispatcher::new(ctx.clone()),
            ctx,
        })
    }
}

/// Passback, interlock and linkage enforcement for one facility
#[derive(Debug, Clone)]
pub struct AccessRuleEngine {
    ctx: EngineContext,
    passback: PassbackChecker,
    interlock: InterlockController,
    linkage: LinkageDispatcher,
}

impl AccessRuleEngine {
    /// Start assembling an engine for `registry`
    pub fn builder(config: EngineConfig, registry: FacilityRegistry) -> AccessRuleEngineBuilder {
        AccessRuleEngineBuilder {
            config,
            registry,
            catalog: None,
            store: None,
            actuator: None,
            recorder: None,
            clock: None,
            audit_buffer: DEFAULT_AUDIT_BUFFER,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    /// Facility metadata in use
    pub fn registry(&self) -> &FacilityRegistry {
        &self.ctx.registry
    }

    /// Evaluate passback for `event` and audit the decision
    ///
    /// No interlock or linkage work is started.
    pub async fn check_passback(&self, event: &AccessEvent) -> Decision {
        let stats = &self.ctx.stats;
        stats.record_event();

        let outcome = self.passback.check(event).await;
        match &outcome.decision {
            Decision::Deny { reason } if reason.is_system_error() => stats.record_system_error(),
            Decision::Deny { .. } => stats.record_denied(),
            Decision::Allow { soft_violation } => {
                stats.record_allowed();
                if *soft_violation {
                    stats.record_soft_violation();
                }
                if event.skip_passback {
                    stats.record_skipped();
                }
            }
        }

        self.ctx.emit(AuditEntry::Passback(PassbackRecord {
            event: event.clone(),
            decision: outcome.decision.clone(),
            policy: outcome.policy,
            recorded_at: self.ctx.clock.now(),
        }));
        outcome.decision
    }

    /// Full event flow: passback on the caller's path, then interlock and
    /// linkage in the background for accepted events
    #[instrument(skip(self, event), fields(event = %event.summary()))]
    pub async fn handle_event(&self, event: &AccessEvent) -> Decision {
        let decision = self.check_passback(event).await;
        if !decision.is_allowed() {
            return decision;
        }

        self.update_occupancy(event).await;

        let engine = self.clone();
        let (area, door, device) = (event.area_id, event.door_id, event.device_id);
        let submitted = self.ctx.pool.submit("event_fan_out", async move {
            let (interlock, linkage) = tokio::join!(
                engine.trigger_interlock(area, door, DoorAction::AccessGranted),
                engine.dispatch_linkage(device, Some(door), trigger::ACCESS_GRANTED),
            );
            if let Err(e) = interlock {
                warn!("Interlock evaluation for {} failed: {}", area, e);
            }
            if let Err(e) = linkage {
                warn!("Linkage dispatch for {} failed: {}", device, e);
            }
        });
        if let Err(e) = submitted {
            warn!("Follow-up work for {} not started: {}", event.summary(), e);
        }

        decision
    }

    async fn update_occupancy(&self, event: &AccessEvent) {
        let key = StateKey::occupancy(event.area_id);
        let updated = match event.direction {
            Direction::In => self.ctx.store.increment(&key).await,
            Direction::Out => self.ctx.store.decrement(&key).await,
        };
        match updated {
            Ok(count) => {
                engine_event!(debug, "occupancy", "occupancy updated", area = event.area_id.value(), count = count)
            }
            Err(e) => warn!("Occupancy for {} not updated: {}", event.area_id, e),
        }
    }

    /// Evaluate interlock rules for an action at `door` in `area`
    pub async fn trigger_interlock(
        &self,
        area: AreaId,
        door: DoorId,
        action: DoorAction,
    ) -> EngineResult<InterlockSummary> {
        self.interlock.trigger(area, door, action).await
    }

    /// Dispatch linkage rules for a trigger at `device`
    pub async fn dispatch_linkage(
        &self,
        device: DeviceId,
        door: Option<DoorId>,
        trigger_event: &str,
    ) -> EngineResult<LinkageSummary> {
        self.linkage.dispatch(device, door, trigger_event).await
    }

    /// Release the side of `rule` opposite `requesting_area`
    pub async fn manual_unlock(&self, rule: RuleId, requesting_area: AreaId) -> EngineResult<bool> {
        self.interlock.manual_unlock(rule, requesting_area).await
    }

    /// Execute one linkage rule with the TEST trigger and wait for the result
    pub async fn test_linkage(&self, rule: RuleId) -> EngineResult<LinkageExecutionLog> {
        self.linkage.test(rule).await
    }

    /// Soft passback exceptions recorded for `user`
    pub async fn soft_exceptions(&self, user: UserId) -> EngineResult<Vec<SoftException>> {
        Ok(self.passback.soft_exceptions(user).await?)
    }

    /// Clear every passback entry of `user`
    pub async fn reset_passback(&self, user: UserId) -> EngineResult<usize> {
        Ok(self.passback.reset(user).await?)
    }

    /// Passback entries held for `user` at `device` and `area`
    pub async fn passback_status(
        &self,
        user: UserId,
        device: DeviceId,
        area: AreaId,
    ) -> EngineResult<PassbackStatus> {
        Ok(self.passback.status(user, device, area).await?)
    }

    /// Lock currently held on `area`
    pub async fn interlock_status(&self, area: AreaId) -> EngineResult<Option<InterlockState>> {
        self.interlock.status(area).await
    }

    /// Every linkage execution row, oldest first
    pub fn linkage_logs(&self) -> Vec<LinkageExecutionLog> {
        self.linkage.logs()
    }

    /// Linkage execution rows of one rule
    pub fn linkage_logs_for_rule(&self, rule: RuleId) -> Vec<LinkageExecutionLog> {
        self.linkage.logs_for_rule(rule)
    }

    /// Linkage execution row by id
    pub fn linkage_log(&self, id: ExecutionId) -> Option<LinkageExecutionLog> {
        self.linkage.log(id)
    }

    /// Unfinished executions of a linkage rule
    pub async fn linkage_pending(&self, rule: RuleId) -> EngineResult<i64> {
        self.linkage.pending_count(rule).await
    }

    /// People currently counted inside `area`
    pub async fn area_occupancy(&self, area: AreaId) -> EngineResult<i64> {
        Ok(load_counter(self.ctx.store.as_ref(), &StateKey::occupancy(area)).await?)
    }

    /// Engine counters
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Audit delivery counters
    pub fn audit_stats(&self) -> AuditStats {
        self.ctx.audit.stats()
    }

    /// Worker pool counters
    pub fn pool_stats(&self) -> PoolStats {
        self.ctx.pool.stats()
    }

    /// Wait for all background work, deferred unlocks included, and for the
    /// audit channel to empty
    pub async fn drain(&self) {
        self.ctx.pool.drain().await;
        self.ctx.audit.flush().await;
        debug!("Engine drained");
    }

    /// Stop accepting background work, then drain
    pub async fn shutdown(&self) {
        self.ctx.pool.shutdown().await;
        self.ctx.audit.flush().await;
        info!("{}", self.statistics().summary());
    }
}

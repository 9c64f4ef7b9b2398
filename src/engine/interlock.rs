//! Interlock controller
//!
//! Access through one side of an interlock locks the other side. Every
//! matching rule runs as its own pool task, so a failing device or store never
//! holds up a sibling rule. TIMER rules schedule a deferred release that only
//! clears the exact lock it was created for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::actuation::ControlCommand;
use super::audit::{AuditEntry, InterlockRecord};
use super::context::EngineContext;
use super::error::{EngineError, EngineResult};
use super::worker_pool::TaskHandle;
use crate::engine_event;
use crate::rules::{InterlockRule, InterlockTarget};
use crate::store::{load_json, save_json, StateKey};
use crate::types::{AreaId, CommandSource, ControlAction, DeviceId, DoorAction, DoorId, RuleId};

/// Lock held on an area; present in the store only while locked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterlockState {
    /// Always true for a stored state
    pub locked: bool,
    /// When the lock was set
    pub locked_at: DateTime<Utc>,
    /// Rule that set it
    pub rule_id: RuleId,
    /// Door that was locked
    pub locked_door_id: DoorId,
    /// Identifies this particular lock for the deferred release
    pub lock_token: Uuid,
}

impl InterlockState {
    fn new(rule_id: RuleId, door: DoorId, locked_at: DateTime<Utc>) -> Self {
        Self {
            locked: true,
            locked_at,
            rule_id,
            locked_door_id: door,
            lock_token: Uuid::new_v4(),
        }
    }
}

/// What one fired rule did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterlockFiring {
    /// Rule that fired
    pub rule_id: RuleId,
    /// Side that was locked
    pub target: InterlockTarget,
    /// Device owning the target door, if known
    pub device_id: Option<DeviceId>,
    /// Whether the lock state reached the store
    pub state_recorded: bool,
    /// Whether the device accepted LOCK
    pub locked: bool,
    /// Whether a deferred release was scheduled
    pub unlock_scheduled: bool,
}

/// Rules evaluated by one trigger
#[derive(Debug)]
pub struct InterlockSummary {
    /// Rules submitted for execution
    pub fired: usize,
    /// Rules that matched the area but did not fire
    pub skipped: usize,
    /// One handle per fired rule
    pub handles: Vec<TaskHandle<InterlockFiring>>,
}

impl InterlockSummary {
    /// Wait for every fired rule
    pub async fn join_all(self) -> Vec<EngineResult<InterlockFiring>> {
        let mut results = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            results.push(handle.join().await);
        }
        results
    }
}

/// Evaluates and executes interlock rules
#[derive(Debug, Clone)]
pub struct InterlockController {
    ctx: EngineContext,
}

impl InterlockController {
    pub(crate) fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Fire every enabled rule that pairs `area` with another side
    ///
    /// Door closings never fire a rule.
    #[instrument(skip(self), fields(area = %area, door = %door, action = %action))]
    pub async fn trigger(
        &self,
        area: AreaId,
        door: DoorId,
        action: DoorAction,
    ) -> EngineResult<InterlockSummary> {
        let rules = self.ctx.catalog.interlock_rules_for_area(area).await?;
        let mut summary = InterlockSummary {
            fired: 0,
            skipped: 0,
            handles: Vec::new(),
        };

        for rule in rules {
            let target = match (action, rule.enabled) {
                (DoorAction::Close, _) | (_, false) => None,
                _ => rule.target_for(area),
            };
            let Some(target) = target else {
                debug!("Interlock {} not fired from {}", rule.id, area);
                self.ctx.stats.record_interlock_skipped();
                summary.skipped += 1;
                continue;
            };

            let controller = self.clone();
            let handle = self
                .ctx
                .pool
                .submit("interlock_fire", async move { controller.fire(rule, target).await })?;
            self.ctx.stats.record_interlock_fired();
            summary.fired += 1;
            summary.handles.push(handle);
        }

        if summary.fired > 0 {
            info!(
                "Interlock trigger at {} door {}: {} fired, {} skipped",
                area, door, summary.fired, summary.skipped
            );
        }
        Ok(summary)
    }

    #[instrument(skip(self, rule), fields(rule = %rule.id, target = %target.area_id))]
    async fn fire(&self, rule: InterlockRule, target: InterlockTarget) -> InterlockFiring {
        let state = InterlockState::new(rule.id, target.door_id, self.ctx.clock.now());
        let key = StateKey::interlock(target.area_id);

        // Lock flag first; a failing store must not prevent the physical lock.
        let stored = match save_json(self.ctx.store.as_ref(), &key, &state, None).await {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!("Interlock {} could not record lock on {}: {}", rule.id, target.area_id, e);
                None
            }
        };

        let device = self.ctx.registry.device_for_door(target.door_id);
        let locked = self
            .actuate(rule.id, target, device, ControlAction::Lock, CommandSource::Interlock)
            .await;
        if !locked {
            self.ctx.stats.record_lock_failure();
        }

        let mut unlock_scheduled = false;
        if let (true, Some(expected)) = (rule.auto_unlocks(), stored.clone()) {
            let controller = self.clone();
            let delay = std::time::Duration::from_secs(rule.unlock_delay_seconds);
            match self.ctx.pool.submit_after("interlock_timer_unlock", delay, async move {
                controller.release_on_timer(rule.id, target, expected).await
            }) {
                Ok(_) => unlock_scheduled = true,
                Err(e) => warn!("Interlock {} release not scheduled: {}", rule.id, e),
            }
        }

        engine_event!(
            info,
            "interlock",
            "interlock fired",
            rule = rule.id.value(),
            target_area = target.area_id.value(),
            locked = locked,
            unlock_scheduled = unlock_scheduled,
        );

        InterlockFiring {
            rule_id: rule.id,
            target,
            device_id: device,
            state_recorded: stored.is_some(),
            locked,
            unlock_scheduled,
        }
    }

    async fn release_on_timer(&self, rule: RuleId, target: InterlockTarget, expected: String) -> bool {
        let key = StateKey::interlock(target.area_id);
        match self.ctx.store.delete_if_equals(&key, &expected).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Interlock {} on {} already released", rule, target.area_id);
                return false;
            }
            Err(e) => {
                warn!("Interlock {} timer release on {} failed: {}", rule, target.area_id, e);
                return false;
            }
        }

        self.ctx.stats.record_auto_unlock();
        let device = self.ctx.registry.device_for_door(target.door_id);
        self.actuate(rule, target, device, ControlAction::Unlock, CommandSource::InterlockTimer)
            .await
    }

    /// Send one command for a rule and audit the outcome
    async fn actuate(
        &self,
        rule: RuleId,
        target: InterlockTarget,
        device: Option<DeviceId>,
        action: ControlAction,
        source: CommandSource,
    ) -> bool {
        let result = match device {
            Some(device_id) => {
                let command = ControlCommand::new(device_id, action, source)
                    .for_door(Some(target.door_id))
                    .for_rule(rule);
                self.ctx
                    .actuator
                    .send(command)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }
            None => Err(format!("no device owns door {}", target.door_id)),
        };

        if let Err(e) = &result {
            warn!("Interlock {} {} on {} failed: {}", rule, action, target.door_id, e);
        }

        self.ctx.emit(AuditEntry::Interlock(InterlockRecord {
            rule_id: rule,
            area_id: target.area_id,
            door_id: target.door_id,
            device_id: device,
            action,
            source,
            success: result.is_ok(),
            error: result.as_ref().err().cloned(),
            recorded_at: self.ctx.clock.now(),
        }));
        result.is_ok()
    }

    /// Release the side opposite `requesting_area` immediately
    ///
    /// Works whether or not a timer is pending and whether or not the rule is
    /// currently enabled. Returns whether the device accepted UNLOCK.
    #[instrument(skip(self))]
    pub async fn manual_unlock(&self, rule_id: RuleId, requesting_area: AreaId) -> EngineResult<bool> {
        let rule = self
            .ctx
            .catalog
            .interlock_rule(rule_id)
            .await?
            .ok_or(EngineError::RuleNotFound(rule_id))?;
        let target = rule
            .opposite_side(requesting_area)
            .ok_or(EngineError::AreaNotInRule {
                rule: rule_id,
                area: requesting_area,
            })?;

        match self.ctx.store.delete(&StateKey::interlock(target.area_id)).await {
            Ok(true) => debug!("Cleared interlock state on {}", target.area_id),
            Ok(false) => debug!("No interlock state held on {}", target.area_id),
            Err(e) => warn!("Could not clear interlock state on {}: {}", target.area_id, e),
        }

        self.ctx.stats.record_manual_unlock();
        let device = self.ctx.registry.device_for_door(target.door_id);
        let accepted = self
            .actuate(rule_id, target, device, ControlAction::Unlock, CommandSource::ManualUnlock)
            .await;
        info!(
            "Manual unlock of {} via {}: {}",
            target.area_id,
            rule_id,
            if accepted { "accepted" } else { "failed" }
        );
        Ok(accepted)
    }

    /// Lock currently held on `area`
    pub async fn status(&self, area: AreaId) -> EngineResult<Option<InterlockState>> {
        Ok(load_json(self.ctx.store.as_ref(), &StateKey::interlock(area)).await?)
    }
}

//! Passback checking
//!
//! One policy per area, dispatched through [`PassbackChecker::check`]. The
//! checker reads and writes scoped entries in the state store and fails closed:
//! unknown metadata or an unreachable store produces a denial.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::events::{AccessEvent, Decision, DenyReason};
use crate::facility::FacilityRegistry;
use crate::store::{load_json, save_json, StateKey, StateStore, StoreError};
use crate::types::{AreaId, DeviceId, Direction, EngineConfig, PassbackPolicy, UserId};

/// Last recorded passage for one scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassbackEntry {
    /// Direction of the passage
    pub direction: Direction,
    /// When it happened
    pub timestamp: DateTime<Utc>,
    /// Reader that reported it
    pub device_id: DeviceId,
    /// Area it happened in
    pub area_id: AreaId,
}

impl PassbackEntry {
    fn from_event(event: &AccessEvent) -> Self {
        Self {
            direction: event.direction,
            timestamp: event.occurred_at,
            device_id: event.device_id,
            area_id: event.area_id,
        }
    }

    /// Whether this entry is younger than `window` at `now`
    pub fn within(&self, now: DateTime<Utc>, window: ChronoDuration) -> bool {
        now.signed_duration_since(self.timestamp) < window
    }
}

/// A passage admitted despite a SOFT violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftException {
    /// When the passage happened
    pub occurred_at: DateTime<Utc>,
    /// Reader that reported it
    pub device_id: DeviceId,
    /// Area it happened in
    pub area_id: AreaId,
}

/// Passback entries currently held for a user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassbackStatus {
    /// Device-scope entry (HARD/SOFT)
    pub device: Option<PassbackEntry>,
    /// Area-scope entry (AREA)
    pub area: Option<PassbackEntry>,
    /// Site-wide history (GLOBAL), oldest first
    pub global: Vec<PassbackEntry>,
}

/// Result of one passback check
#[derive(Debug, Clone, PartialEq)]
pub struct PassbackOutcome {
    /// Allow or deny
    pub decision: Decision,
    /// Policy that was evaluated, `None` when the check was skipped or the
    /// area has no policy
    pub policy: Option<PassbackPolicy>,
}

impl PassbackOutcome {
    fn unpoliced(decision: Decision) -> Self {
        Self {
            decision,
            policy: None,
        }
    }
}

/// Evaluates access events against their area's passback policy
#[derive(Debug, Clone)]
pub struct PassbackChecker {
    registry: Arc<FacilityRegistry>,
    store: Arc<dyn StateStore>,
    config: Arc<EngineConfig>,
}

impl PassbackChecker {
    /// Create a checker over `registry` and `store`
    pub fn new(
        registry: Arc<FacilityRegistry>,
        store: Arc<dyn StateStore>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    /// Decide whether `event` may pass
    #[instrument(skip(self, event), fields(user = %event.user_id, area = %event.area_id, direction = %event.direction))]
    pub async fn check(&self, event: &AccessEvent) -> PassbackOutcome {
        if event.skip_passback {
            info!("Passback skipped by override for {}", event.summary());
            return PassbackOutcome::unpoliced(Decision::allow());
        }

        let Some(device) = self.registry.get_device(event.device_id) else {
            warn!("Denying {}: unknown device", event.summary());
            return PassbackOutcome::unpoliced(Decision::deny(DenyReason::UnknownDevice(
                event.device_id,
            )));
        };

        let Some(area_policy) = self.registry.passback_policy(event.area_id) else {
            warn!("Denying {}: unknown area", event.summary());
            return PassbackOutcome::unpoliced(Decision::deny(DenyReason::UnknownArea(
                event.area_id,
            )));
        };

        // The device's registered area decides which policy applies.
        if device.area_id != event.area_id {
            warn!(
                "Denying {}: {} belongs to {}",
                event.summary(),
                device.id,
                device.area_id
            );
            return PassbackOutcome::unpoliced(Decision::deny(DenyReason::AreaMismatch {
                device: event.device_id,
                registered: device.area_id,
                reported: event.area_id,
            }));
        }

        let policy = match area_policy {
            None => {
                debug!("No passback policy for {}", event.area_id);
                return PassbackOutcome::unpoliced(Decision::allow());
            }
            Some(policy) => policy,
        };

        let decision = match self.evaluate(policy, event).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!("Passback state unavailable, failing closed: {}", e);
                Decision::deny(DenyReason::StateUnavailable(e.to_string()))
            }
        };

        match &decision {
            Decision::Deny { reason } => info!("{} denied: {}", event.summary(), reason),
            Decision::Allow { soft_violation: true } => {
                info!("{} allowed with SOFT violation", event.summary())
            }
            Decision::Allow { .. } => debug!("{} allowed under {}", event.summary(), policy),
        }

        PassbackOutcome {
            decision,
            policy: Some(policy),
        }
    }

    async fn evaluate(
        &self,
        policy: PassbackPolicy,
        event: &AccessEvent,
    ) -> Result<Decision, StoreError> {
        match policy {
            PassbackPolicy::Hard => self.check_device_scope(event, false).await,
            PassbackPolicy::Soft => self.check_device_scope(event, true).await,
            PassbackPolicy::Area => self.check_area_scope(event).await,
            PassbackPolicy::Global => self.check_global_scope(event).await,
        }
    }

    fn ttl(&self, policy: PassbackPolicy) -> Option<std::time::Duration> {
        Some(self.config.state_ttl_for(policy))
    }

    async fn check_device_scope(
        &self,
        event: &AccessEvent,
        soft: bool,
    ) -> Result<Decision, StoreError> {
        let policy = if soft {
            PassbackPolicy::Soft
        } else {
            PassbackPolicy::Hard
        };
        let key = StateKey::passback_device(event.user_id, event.device_id);
        let window = self.config.window_for(policy);

        let prior: Option<PassbackEntry> = load_json(self.store.as_ref(), &key).await?;
        let violation = prior
            .as_ref()
            .is_some_and(|entry| entry.within(event.occurred_at, window));

        if violation && !soft {
            return Ok(Decision::deny(DenyReason::Violation(policy)));
        }

        save_json(
            self.store.as_ref(),
            &key,
            &PassbackEntry::from_event(event),
            self.ttl(policy),
        )
        .await?;

        if violation {
            self.record_soft_exception(event).await?;
            Ok(Decision::allow_soft_violation())
        } else {
            Ok(Decision::allow())
        }
    }

    async fn check_area_scope(&self, event: &AccessEvent) -> Result<Decision, StoreError> {
        let key = StateKey::passback_area(event.user_id, event.area_id);
        let window = self.config.window_for(PassbackPolicy::Area);

        let prior: Option<PassbackEntry> = load_json(self.store.as_ref(), &key).await?;
        if let Some(entry) = prior {
            if entry.within(event.occurred_at, window) && entry.direction == event.direction {
                return Ok(Decision::deny(DenyReason::Violation(PassbackPolicy::Area)));
            }
        }

        save_json(
            self.store.as_ref(),
            &key,
            &PassbackEntry::from_event(event),
            self.ttl(PassbackPolicy::Area),
        )
        .await?;
        Ok(Decision::allow())
    }

    async fn check_global_scope(&self, event: &AccessEvent) -> Result<Decision, StoreError> {
        let key = StateKey::passback_global(event.user_id);
        let window = self.config.window_for(PassbackPolicy::Global);
        let ttl = self.config.state_ttl_for(PassbackPolicy::Global);

        let mut history: Vec<PassbackEntry> = load_json(self.store.as_ref(), &key)
            .await?
            .unwrap_or_default();

        if history
            .iter()
            .any(|entry| entry.within(event.occurred_at, window))
        {
            return Ok(Decision::deny(DenyReason::Violation(PassbackPolicy::Global)));
        }

        // Prune by age first, then cap by count keeping the newest.
        let retention = ChronoDuration::from_std(ttl).unwrap_or(window);
        history.retain(|entry| entry.within(event.occurred_at, retention));
        history.push(PassbackEntry::from_event(event));
        let limit = self.config.global_history_limit.max(1);
        if history.len() > limit {
            let excess = history.len() - limit;
            history.drain(..excess);
        }

        save_json(self.store.as_ref(), &key, &history, Some(ttl)).await?;
        Ok(Decision::allow())
    }

    async fn record_soft_exception(&self, event: &AccessEvent) -> Result<(), StoreError> {
        let key = StateKey::passback_exception(event.user_id);
        let mut exceptions: Vec<SoftException> = load_json(self.store.as_ref(), &key)
            .await?
            .unwrap_or_default();
        exceptions.push(SoftException {
            occurred_at: event.occurred_at,
            device_id: event.device_id,
            area_id: event.area_id,
        });
        save_json(
            self.store.as_ref(),
            &key,
            &exceptions,
            Some(self.config.soft_exception_ttl()),
        )
        .await?;
        Ok(())
    }

    /// Soft exceptions recorded for `user` within the exception lifetime
    pub async fn soft_exceptions(&self, user: UserId) -> Result<Vec<SoftException>, StoreError> {
        let key = StateKey::passback_exception(user);
        Ok(load_json(self.store.as_ref(), &key).await?.unwrap_or_default())
    }

    /// Clear every passback scope entry of `user`, returning how many were removed
    pub async fn reset(&self, user: UserId) -> Result<usize, StoreError> {
        let removed = self
            .store
            .delete_prefix(&StateKey::passback_user_prefix(user))
            .await?;
        info!("Passback state reset for {} ({} entries)", user, removed);
        Ok(removed)
    }

    /// Entries currently held for `user` at `device` and `area`
    pub async fn status(
        &self,
        user: UserId,
        device: DeviceId,
        area: AreaId,
    ) -> Result<PassbackStatus, StoreError> {
        let store = self.store.as_ref();
        Ok(PassbackStatus {
            device: load_json(store, &StateKey::passback_device(user, device)).await?,
            area: load_json(store, &StateKey::passback_area(user, area)).await?,
            global: load_json(store, &StateKey::passback_global(user))
                .await?
                .unwrap_or_default(),
        })
    }
}

//! Rule catalog access
//!
//! The catalog collaborator owns rule CRUD; the engine only reads. Lookups
//! return disabled rows too, and callers filter on `enabled` at evaluation time.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::{InterlockRule, LinkageRule};
use crate::types::{AreaId, DeviceId, RuleId};

/// Rule catalog failures
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Catalog backend could not serve the request
    #[error("rule catalog unavailable: {0}")]
    Unavailable(String),

    /// Catalog file could not be read
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog file could not be parsed
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    /// Catalog content is inconsistent
    #[error("invalid catalog: {0}")]
    Invalid(String),
}

/// Read-only view of interlock and linkage rules
#[async_trait]
pub trait RuleCatalog: Send + Sync + fmt::Debug {
    /// Interlock rules with `area` on either side
    async fn interlock_rules_for_area(&self, area: AreaId)
        -> Result<Vec<InterlockRule>, CatalogError>;

    /// One interlock rule
    async fn interlock_rule(&self, id: RuleId) -> Result<Option<InterlockRule>, CatalogError>;

    /// Linkage rules triggered by `device`
    async fn linkage_rules_for_device(
        &self,
        device: DeviceId,
    ) -> Result<Vec<LinkageRule>, CatalogError>;

    /// One linkage rule
    async fn linkage_rule(&self, id: RuleId) -> Result<Option<LinkageRule>, CatalogError>;
}

/// Catalog held in process memory
#[derive(Debug, Default)]
pub struct InMemoryRuleCatalog {
    interlocks: RwLock<HashMap<RuleId, InterlockRule>>,
    linkages: RwLock<HashMap<RuleId, LinkageRule>>,
}

fn poisoned<T>(_: T) -> CatalogError {
    CatalogError::Unavailable("catalog lock poisoned".to_string())
}

impl InMemoryRuleCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog from rule lists
    pub fn with_rules(interlocks: Vec<InterlockRule>, linkages: Vec<LinkageRule>) -> Self {
        Self {
            interlocks: RwLock::new(interlocks.into_iter().map(|r| (r.id, r)).collect()),
            linkages: RwLock::new(linkages.into_iter().map(|r| (r.id, r)).collect()),
        }
    }

    /// Insert or replace an interlock rule
    pub fn upsert_interlock(&self, rule: InterlockRule) -> Result<(), CatalogError> {
        self.interlocks.write().map_err(poisoned)?.insert(rule.id, rule);
        Ok(())
    }

    /// Insert or replace a linkage rule
    pub fn upsert_linkage(&self, rule: LinkageRule) -> Result<(), CatalogError> {
        self.linkages.write().map_err(poisoned)?.insert(rule.id, rule);
        Ok(())
    }

    /// Toggle an interlock rule, returning whether it exists
    pub fn set_interlock_enabled(&self, id: RuleId, enabled: bool) -> Result<bool, CatalogError> {
        let mut rules = self.interlocks.write().map_err(poisoned)?;
        Ok(rules.get_mut(&id).map(|rule| rule.enabled = enabled).is_some())
    }

    /// Toggle a linkage rule, returning whether it exists
    pub fn set_linkage_enabled(&self, id: RuleId, enabled: bool) -> Result<bool, CatalogError> {
        let mut rules = self.linkages.write().map_err(poisoned)?;
        Ok(rules.get_mut(&id).map(|rule| rule.enabled = enabled).is_some())
    }

    /// Number of interlock and linkage rules
    pub fn counts(&self) -> (usize, usize) {
        let interlocks = self.interlocks.read().map(|r| r.len()).unwrap_or(0);
        let linkages = self.linkages.read().map(|r| r.len()).unwrap_or(0);
        (interlocks, linkages)
    }
}

#[async_trait]
impl RuleCatalog for InMemoryRuleCatalog {
    async fn interlock_rules_for_area(
        &self,
        area: AreaId,
    ) -> Result<Vec<InterlockRule>, CatalogError> {
        let rules = self.interlocks.read().map_err(poisoned)?;
        let mut matching: Vec<InterlockRule> =
            rules.values().filter(|r| r.involves(area)).cloned().collect();
        matching.sort_by_key(|r| r.id);
        Ok(matching)
    }

    async fn interlock_rule(&self, id: RuleId) -> Result<Option<InterlockRule>, CatalogError> {
        Ok(self.interlocks.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn linkage_rules_for_device(
        &self,
        device: DeviceId,
    ) -> Result<Vec<LinkageRule>, CatalogError> {
        let rules = self.linkages.read().map_err(poisoned)?;
        let mut matching: Vec<LinkageRule> = rules
            .values()
            .filter(|r| r.trigger_device_id == device)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.id);
        Ok(matching)
    }

    async fn linkage_rule(&self, id: RuleId) -> Result<Option<LinkageRule>, CatalogError> {
        Ok(self.linkages.read().map_err(poisoned)?.get(&id).cloned())
    }
}

#[derive(Debug)]
struct Cached<T> {
    loaded_at: Instant,
    rules: Vec<T>,
}

/// Short-lived cache in front of another catalog
///
/// Only the per-area and per-device list lookups are cached. Single-rule
/// lookups (manual unlock, rule test) always go to the inner catalog.
pub struct CachedRuleCatalog {
    inner: Arc<dyn RuleCatalog>,
    ttl: Duration,
    by_area: Mutex<HashMap<AreaId, Cached<InterlockRule>>>,
    by_device: Mutex<HashMap<DeviceId, Cached<LinkageRule>>>,
}

impl fmt::Debug for CachedRuleCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedRuleCatalog")
            .field("inner", &self.inner)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CachedRuleCatalog {
    /// Wrap `inner` with a cache whose entries live for `ttl`
    pub fn new(inner: Arc<dyn RuleCatalog>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            by_area: Mutex::new(HashMap::new()),
            by_device: Mutex::new(HashMap::new()),
        }
    }

    /// Drop every cached list
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.by_area.lock() {
            cache.clear();
        }
        if let Ok(mut cache) = self.by_device.lock() {
            cache.clear();
        }
        debug!("Rule cache invalidated");
    }

    fn fresh<K, T>(&self, cache: &Mutex<HashMap<K, Cached<T>>>, key: &K) -> Option<Vec<T>>
    where
        K: std::hash::Hash + Eq,
        T: Clone,
    {
        let cache = cache.lock().ok()?;
        cache
            .get(key)
            .filter(|entry| entry.loaded_at.elapsed() < self.ttl)
            .map(|entry| entry.rules.clone())
    }

    fn remember<K, T>(&self, cache: &Mutex<HashMap<K, Cached<T>>>, key: K, rules: &[T])
    where
        K: std::hash::Hash + Eq,
        T: Clone,
    {
        if let Ok(mut cache) = cache.lock() {
            cache.insert(
                key,
                Cached {
                    loaded_at: Instant::now(),
                    rules: rules.to_vec(),
                },
            );
        }
    }
}

#[async_trait]
impl RuleCatalog for CachedRuleCatalog {
    async fn interlock_rules_for_area(
        &self,
        area: AreaId,
    ) -> Result<Vec<InterlockRule>, CatalogError> {
        if let Some(rules) = self.fresh(&self.by_area, &area) {
            trace!(area = %area, "Interlock rule cache hit");
            return Ok(rules);
        }
        let rules = self.inner.interlock_rules_for_area(area).await?;
        self.remember(&self.by_area, area, &rules);
        Ok(rules)
    }

    async fn interlock_rule(&self, id: RuleId) -> Result<Option<InterlockRule>, CatalogError> {
        self.inner.interlock_rule(id).await
    }

    async fn linkage_rules_for_device(
        &self,
        device: DeviceId,
    ) -> Result<Vec<LinkageRule>, CatalogError> {
        if let Some(rules) = self.fresh(&self.by_device, &device) {
            trace!(device = %device, "Linkage rule cache hit");
            return Ok(rules);
        }
        let rules = self.inner.linkage_rules_for_device(device).await?;
        self.remember(&self.by_device, device, &rules);
        Ok(rules)
    }

    async fn linkage_rule(&self, id: RuleId) -> Result<Option<LinkageRule>, CatalogError> {
        self.inner.linkage_rule(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ControlAction, DoorId, InterlockMode, UnlockCondition};

    fn interlock(id: u64, a: u64, b: u64) -> InterlockRule {
        InterlockRule::new(
            RuleId(id),
            (AreaId(a), DoorId(a * 10)),
            (AreaId(b), DoorId(b * 10)),
            InterlockMode::Bidirectional,
            UnlockCondition::Manual,
            0,
        )
    }

    #[tokio::test]
    async fn test_in_memory_lookups() {
        let catalog = InMemoryRuleCatalog::with_rules(
            vec![interlock(1, 1, 2), interlock(2, 2, 3), interlock(3, 4, 5)],
            vec![LinkageRule::new(RuleId(9), DeviceId(1), DeviceId(2), ControlAction::Capture)],
        );

        let for_area_2 = catalog.interlock_rules_for_area(AreaId(2)).await.unwrap();
        let ids: Vec<RuleId> = for_area_2.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![RuleId(1), RuleId(2)]);

        assert_eq!(catalog.linkage_rules_for_device(DeviceId(1)).await.unwrap().len(), 1);
        assert!(catalog.linkage_rules_for_device(DeviceId(2)).await.unwrap().is_empty());
        assert!(catalog.interlock_rule(RuleId(3)).await.unwrap().is_some());
        assert!(catalog.linkage_rule(RuleId(3)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disabled_rules_are_still_returned() {
        let catalog = InMemoryRuleCatalog::with_rules(vec![interlock(1, 1, 2)], vec![]);
        assert!(catalog.set_interlock_enabled(RuleId(1), false).unwrap());
        assert!(!catalog.set_interlock_enabled(RuleId(42), false).unwrap());

        let rules = catalog.interlock_rules_for_area(AreaId(1)).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert!(!rules[0].enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expires_after_ttl() {
        let inner = Arc::new(InMemoryRuleCatalog::with_rules(vec![interlock(1, 1, 2)], vec![]));
        let cached = CachedRuleCatalog::new(inner.clone(), Duration::from_secs(5));

        assert_eq!(cached.interlock_rules_for_area(AreaId(1)).await.unwrap().len(), 1);

        inner.upsert_interlock(interlock(2, 1, 3)).unwrap();
        assert_eq!(cached.interlock_rules_for_area(AreaId(1)).await.unwrap().len(), 1);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cached.interlock_rules_for_area(AreaId(1)).await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_reload() {
        let inner = Arc::new(InMemoryRuleCatalog::new());
        let cached = CachedRuleCatalog::new(inner.clone(), Duration::from_secs(60));

        assert!(cached.linkage_rules_for_device(DeviceId(1)).await.unwrap().is_empty());
        inner
            .upsert_linkage(LinkageRule::new(RuleId(1), DeviceId(1), DeviceId(2), ControlAction::Alert))
            .unwrap();
        assert!(cached.linkage_rules_for_device(DeviceId(1)).await.unwrap().is_empty());

        cached.invalidate();
        assert_eq!(cached.linkage_rules_for_device(DeviceId(1)).await.unwrap().len(), 1);
    }
}

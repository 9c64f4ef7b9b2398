//! In-process state store
//!
//! A mutex-guarded map with per-key expiry evaluated against an injected clock.
//! Suitable for a single engine process and for tests; every operation is
//! atomic with respect to the others.
//!
//! Expired entries are dropped when a read or write touches them, and writes
//! sweep the whole map at most once per [`SWEEP_INTERVAL_SECS`] of clock time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, trace};

use super::{StateKey, StateStore, StoreError};
use crate::engine::clock::{Clock, SystemClock};

/// Clock seconds between opportunistic sweeps of expired entries
pub const SWEEP_INTERVAL_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Mutex-backed [`StateStore`] with TTL support
#[derive(Debug)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
    last_sweep: AtomicI64,
}

impl MemoryStateStore {
    /// Create a store that expires entries against the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store that expires entries against `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let last_sweep = AtomicI64::new(clock.now().timestamp());
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            unavailable: AtomicBool::new(false),
            last_sweep,
        }
    }

    /// Simulate a backend outage; every operation fails while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    /// Whether no live entries remain
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries physically held, expired ones not yet evicted included
    pub fn held(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        Ok(self.sweep(&mut entries, now))
    }

    fn sweep(&self, entries: &mut HashMap<String, Entry>, now: DateTime<Utc>) -> usize {
        self.last_sweep.store(now.timestamp(), Ordering::Relaxed);
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Purged {} expired state entries", removed);
        }
        removed
    }

    fn sweep_if_due(&self, entries: &mut HashMap<String, Entry>, now: DateTime<Utc>) {
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now.timestamp().saturating_sub(last) >= SWEEP_INTERVAL_SECS {
            self.sweep(entries, now);
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store marked unavailable".to_string()));
        }
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("state map lock poisoned".to_string()))
    }

    fn expiry(&self, ttl: Option<Duration>) -> Result<Option<DateTime<Utc>>, StoreError> {
        match ttl {
            None => Ok(None),
            Some(ttl) => {
                let delta = chrono::Duration::from_std(ttl)
                    .map_err(|e| StoreError::InvalidTtl(e.to_string()))?;
                self.clock
                    .now()
                    .checked_add_signed(delta)
                    .map(Some)
                    .ok_or_else(|| {
                        StoreError::InvalidTtl(format!(
                            "{}s runs past the end of the clock",
                            ttl.as_secs()
                        ))
                    })
            }
        }
    }

    fn add(&self, key: &StateKey, delta: i64) -> Result<i64, StoreError> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        self.sweep_if_due(&mut entries, now);

        let (current, expires_at) = match entries.get(key.as_str()) {
            Some(entry) if entry.is_live(now) => {
                let value = entry.value.parse::<i64>().map_err(|_| StoreError::NotACounter {
                    key: key.to_string(),
                    value: entry.value.clone(),
                })?;
                (value, entry.expires_at)
            }
            _ => (0, None),
        };

        let next = current + delta;
        entries.insert(
            key.as_str().to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        trace!(key = %key, value = next, "Counter updated");
        Ok(next)
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &StateKey) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        let value = match entries.get(key.as_str()) {
            None => return Ok(None),
            Some(entry) => entry.is_live(now).then(|| entry.value.clone()),
        };
        if value.is_none() {
            entries.remove(key.as_str());
            trace!(key = %key, "Expired state entry evicted");
        }
        Ok(value)
    }

    async fn set(
        &self,
        key: &StateKey,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let expires_at = self.expiry(ttl)?;
        let now = self.clock.now();
        let mut entries = self.lock()?;
        self.sweep_if_due(&mut entries, now);
        entries.insert(key.as_str().to_string(), Entry { value, expires_at });
        trace!(key = %key, ?ttl, "State entry written");
        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        Ok(entries
            .remove(key.as_str())
            .map_or(false, |entry| entry.is_live(now)))
    }

    async fn increment(&self, key: &StateKey) -> Result<i64, StoreError> {
        self.add(key, 1)
    }

    async fn decrement(&self, key: &StateKey) -> Result<i64, StoreError> {
        self.add(key, -1)
    }

    async fn delete_if_equals(&self, key: &StateKey, expected: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        let matches = entries
            .get(key.as_str())
            .map_or(false, |entry| entry.is_live(now) && entry.value == expected);
        if matches {
            entries.remove(key.as_str());
        }
        Ok(matches)
    }

    async fn delete_prefix(&self, prefix: &StateKey) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        let doomed: Vec<String> = entries
            .keys()
            .filter(|key| key.starts_with(prefix.as_str()))
            .cloned()
            .collect();

        let mut removed = 0;
        for key in doomed {
            if let Some(entry) = entries.remove(&key) {
                if entry.is_live(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

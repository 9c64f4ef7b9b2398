//! Shared state store
//!
//! Passback history, soft exceptions, interlock lock flags, pending linkage
//! counts and area occupancy all live behind the [`StateStore`] trait. Values are
//! opaque strings; [`load_json`] and [`save_json`] layer typed access on top.
//!
//! # Usage Example
//!
//! ```rust
//! use access_rule_engine::store::*;
//! use access_rule_engine::types::AreaId;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = MemoryStateStore::new();
//! let key = StateKey::occupancy(AreaId(1));
//! assert_eq!(store.increment(&key).await.unwrap(), 1);
//! # }
//! ```

pub mod key;
pub mod memory;

pub use key::StateKey;
pub use memory::MemoryStateStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// State store failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend could not be reached or is not serving requests
    #[error("state store unavailable: {0}")]
    Unavailable(String),

    /// Stored value could not be encoded or decoded
    #[error("state value serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Counter operation on a non-numeric value
    #[error("key {key} holds non-numeric value {value:?}")]
    NotACounter {
        /// Offending key
        key: String,
        /// Value found there
        value: String,
    },

    /// TTL could not be represented
    #[error("invalid ttl: {0}")]
    InvalidTtl(String),
}

impl StoreError {
    /// Whether repeating the operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Key-value store with per-key expiry and atomic primitives
///
/// Every method is a single atomic operation; callers never perform
/// read-modify-write on a lock flag.
#[async_trait]
pub trait StateStore: Send + Sync + std::fmt::Debug {
    /// Read a live value
    async fn get(&self, key: &StateKey) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one; `None` never expires
    async fn set(&self, key: &StateKey, value: String, ttl: Option<Duration>)
        -> Result<(), StoreError>;

    /// Remove a key, reporting whether a live value was present
    async fn delete(&self, key: &StateKey) -> Result<bool, StoreError>;

    /// Add one to a counter (missing counts as zero), returning the new value
    async fn increment(&self, key: &StateKey) -> Result<i64, StoreError>;

    /// Subtract one from a counter (missing counts as zero), returning the new value
    async fn decrement(&self, key: &StateKey) -> Result<i64, StoreError>;

    /// Remove a key only if it currently holds exactly `expected`
    async fn delete_if_equals(&self, key: &StateKey, expected: &str) -> Result<bool, StoreError>;

    /// Remove every key starting with `prefix`, returning the live count removed
    async fn delete_prefix(&self, prefix: &StateKey) -> Result<usize, StoreError>;
}

/// Read and decode a JSON value
pub async fn load_json<T>(store: &dyn StateStore, key: &StateKey) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned,
{
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode and write a JSON value, returning the exact text stored
pub async fn save_json<T>(
    store: &dyn StateStore,
    key: &StateKey,
    value: &T,
    ttl: Option<Duration>,
) -> Result<String, StoreError>
where
    T: Serialize + ?Sized,
{
    let raw = serde_json::to_string(value)?;
    store.set(key, raw.clone(), ttl).await?;
    Ok(raw)
}

/// Read a counter written by `increment`/`decrement`; absent means zero
pub async fn load_counter(store: &dyn StateStore, key: &StateKey) -> Result<i64, StoreError> {
    match store.get(key).await? {
        None => Ok(0),
        Some(raw) => raw.trim().parse().map_err(|_| StoreError::NotACounter {
            key: key.to_string(),
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        count: u32,
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let store = MemoryStateStore::new();
        let key = StateKey::passback_global(UserId(5));

        let raw = save_json(&store, &key, &Sample { count: 3 }, None).await.unwrap();
        assert_eq!(raw, r#"{"count":3}"#);

        let loaded: Option<Sample> = load_json(&store, &key).await.unwrap();
        assert_eq!(loaded, Some(Sample { count: 3 }));
    }

    #[tokio::test]
    async fn test_corrupt_value_is_serialization_error() {
        let store = MemoryStateStore::new();
        let key = StateKey::passback_global(UserId(5));
        store.set(&key, "{broken".to_string(), None).await.unwrap();

        let loaded: Result<Option<Sample>, _> = load_json(&store, &key).await;
        assert!(matches!(loaded, Err(StoreError::Serialization(_))));
    }
}

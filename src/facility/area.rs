//! Area metadata
//!
//! An area is a physical zone guarded by one or more readers. Each area may carry
//! one passback policy.

use crate::types::{AreaId, PassbackPolicy};
use serde::{Deserialize, Serialize};

/// A physical zone of the facility
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    /// Unique identifier for the area
    pub id: AreaId,
    /// Human-readable name of the area
    pub name: String,
    /// Passback policy enforced at this area's readers, if any
    #[serde(default)]
    pub passback_policy: Option<PassbackPolicy>,
}

impl Area {
    /// Create an area without a passback policy
    pub fn new(id: AreaId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            passback_policy: None,
        }
    }

    /// Set the passback policy
    pub fn with_policy(mut self, policy: PassbackPolicy) -> Self {
        self.passback_policy = Some(policy);
        self
    }

    /// Check whether any passback policy is configured
    pub fn enforces_passback(&self) -> bool {
        self.passback_policy.is_some()
    }
}

//! Scoped state keys
//!
//! Every key the engine touches is built here. Each concern owns a stable
//! prefix so a whole concern, or one user's slice of it, can be addressed with a
//! single prefix operation.

use crate::types::{AreaId, DeviceId, RuleId, UserId};
use std::fmt;

const PASSBACK: &str = "passback";
const PASSBACK_EXCEPTION: &str = "passback_exception";
const INTERLOCK: &str = "interlock";
const LINKAGE: &str = "linkage";
const OCCUPANCY: &str = "occupancy";

/// A fully built state store key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey(String);

impl StateKey {
    /// Device-scope passback entry for a user
    pub fn passback_device(user: UserId, device: DeviceId) -> Self {
        Self(format!("{PASSBACK}:{user}:device:{device}"))
    }

    /// Area-scope passback entry for a user
    pub fn passback_area(user: UserId, area: AreaId) -> Self {
        Self(format!("{PASSBACK}:{user}:area:{area}"))
    }

    /// Site-wide passback history for a user
    pub fn passback_global(user: UserId) -> Self {
        Self(format!("{PASSBACK}:{user}:global"))
    }

    /// Prefix covering every passback scope entry of a user
    pub fn passback_user_prefix(user: UserId) -> Self {
        Self(format!("{PASSBACK}:{user}:"))
    }

    /// Soft passback exception list for a user
    pub fn passback_exception(user: UserId) -> Self {
        Self(format!("{PASSBACK_EXCEPTION}:{user}"))
    }

    /// Interlock lock flag for an area
    pub fn interlock(area: AreaId) -> Self {
        Self(format!("{INTERLOCK}:{area}"))
    }

    /// Count of a linkage rule's executions still pending
    pub fn linkage_pending(rule: RuleId) -> Self {
        Self(format!("{LINKAGE}:pending:{rule}"))
    }

    /// Occupancy counter for an area
    pub fn occupancy(area: AreaId) -> Self {
        Self(format!("{OCCUPANCY}:{area}"))
    }

    /// Raw key text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StateKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(
            StateKey::passback_device(UserId(1), DeviceId(10)).as_str(),
            "passback:USER_1:device:DEV_10"
        );
        assert_eq!(
            StateKey::passback_area(UserId(1), AreaId(2)).as_str(),
            "passback:USER_1:area:AREA_2"
        );
        assert_eq!(StateKey::passback_global(UserId(1)).as_str(), "passback:USER_1:global");
        assert_eq!(StateKey::interlock(AreaId(2)).as_str(), "interlock:AREA_2");
        assert_eq!(StateKey::occupancy(AreaId(2)).as_str(), "occupancy:AREA_2");
        assert_eq!(StateKey::linkage_pending(RuleId(4)).as_str(), "linkage:pending:RULE_4");
    }

    #[test]
    fn test_user_prefix_excludes_exceptions_and_other_users() {
        let prefix = StateKey::passback_user_prefix(UserId(1));
        assert!(StateKey::passback_global(UserId(1)).as_str().starts_with(prefix.as_str()));
        assert!(!StateKey::passback_exception(UserId(1)).as_str().starts_with(prefix.as_str()));
        assert!(!StateKey::passback_global(UserId(11)).as_str().starts_with(prefix.as_str()));
    }
}

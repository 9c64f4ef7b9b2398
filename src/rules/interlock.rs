//! Interlock rule rows
//!
//! An interlock pairs two areas so that access through one side locks the
//! other. Rules are read-only to the engine.

use crate::types::{AreaId, DoorId, InterlockMode, RuleId, UnlockCondition};
use serde::{Deserialize, Serialize};

fn enabled_by_default() -> bool {
    true
}

/// Mutual-exclusion rule between two areas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterlockRule {
    /// Catalog identifier
    pub id: RuleId,
    /// Primary side area
    pub area_a: AreaId,
    /// Primary side door
    pub door_a: DoorId,
    /// Secondary side area
    pub area_b: AreaId,
    /// Secondary side door
    pub door_b: DoorId,
    /// Which side may trigger the rule
    pub mode: InterlockMode,
    /// How the locked side is released
    pub unlock_condition: UnlockCondition,
    /// Delay before a TIMER release
    #[serde(default)]
    pub unlock_delay_seconds: u64,
    /// Catalog ordering hint; all matching rules fire regardless
    #[serde(default)]
    pub priority: i32,
    /// Disabled rules never fire
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

/// The side of an interlock that gets locked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterlockTarget {
    /// Area to lock
    pub area_id: AreaId,
    /// Door to lock
    pub door_id: DoorId,
}

impl InterlockRule {
    /// Create an enabled rule between two sides
    pub fn new(
        id: RuleId,
        (area_a, door_a): (AreaId, DoorId),
        (area_b, door_b): (AreaId, DoorId),
        mode: InterlockMode,
        unlock_condition: UnlockCondition,
        unlock_delay_seconds: u64,
    ) -> Self {
        Self {
            id,
            area_a,
            door_a,
            area_b,
            door_b,
            mode,
            unlock_condition,
            unlock_delay_seconds,
            priority: 0,
            enabled: true,
        }
    }

    /// Whether the area is one of the two sides
    pub fn involves(&self, area: AreaId) -> bool {
        self.area_a == area || self.area_b == area
    }

    /// Side opposite `area`, ignoring the rule's direction
    pub fn opposite_side(&self, area: AreaId) -> Option<InterlockTarget> {
        if area == self.area_a {
            Some(InterlockTarget {
                area_id: self.area_b,
                door_id: self.door_b,
            })
        } else if area == self.area_b {
            Some(InterlockTarget {
                area_id: self.area_a,
                door_id: self.door_a,
            })
        } else {
            None
        }
    }

    /// Side to lock when access happens in `trigger_area`
    ///
    /// UNIDIRECTIONAL rules only fire from `area_a`.
    pub fn target_for(&self, trigger_area: AreaId) -> Option<InterlockTarget> {
        match self.mode {
            InterlockMode::Bidirectional => self.opposite_side(trigger_area),
            InterlockMode::Unidirectional if trigger_area == self.area_a => {
                self.opposite_side(trigger_area)
            }
            InterlockMode::Unidirectional => None,
        }
    }

    /// Whether the locked side releases itself
    pub fn auto_unlocks(&self) -> bool {
        self.unlock_condition == UnlockCondition::Timer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(mode: InterlockMode) -> InterlockRule {
        InterlockRule::new(
            RuleId(1),
            (AreaId(1), DoorId(10)),
            (AreaId(2), DoorId(20)),
            mode,
            UnlockCondition::Timer,
            10,
        )
    }

    #[test]
    fn test_bidirectional_targets() {
        let rule = rule(InterlockMode::Bidirectional);
        assert_eq!(rule.target_for(AreaId(1)).unwrap().area_id, AreaId(2));
        assert_eq!(rule.target_for(AreaId(2)).unwrap().door_id, DoorId(10));
        assert!(rule.target_for(AreaId(3)).is_none());
    }

    #[test]
    fn test_unidirectional_only_from_primary() {
        let rule = rule(InterlockMode::Unidirectional);
        assert_eq!(rule.target_for(AreaId(1)).unwrap().area_id, AreaId(2));
        assert!(rule.target_for(AreaId(2)).is_none());
        assert!(rule.opposite_side(AreaId(2)).is_some());
    }

    #[test]
    fn test_catalog_row_defaults() {
        let rule: InterlockRule = serde_json::from_str(
            r#"{"id": 7, "area_a": 1, "door_a": 10, "area_b": 2, "door_b": 20,
                "mode": "BIDIRECTIONAL", "unlock_condition": "MANUAL"}"#,
        )
        .unwrap();
        assert!(rule.enabled);
        assert!(!rule.auto_unlocks());
        assert_eq!(rule.unlock_delay_seconds, 0);
    }
}

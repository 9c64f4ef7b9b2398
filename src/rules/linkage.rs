//! Linkage rule rows
//!
//! A linkage rule turns a trigger on one device into an action on another,
//! optionally after a delay and only for trigger events its condition accepts.

use crate::types::{ControlAction, DeviceId, DoorId, RuleId};
use serde::{Deserialize, Serialize};

fn enabled_by_default() -> bool {
    true
}

/// Cascading action rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkageRule {
    /// Catalog identifier
    pub id: RuleId,
    /// Device whose events trigger the rule
    pub trigger_device_id: DeviceId,
    /// Restricts the trigger to one door of the device
    #[serde(default)]
    pub trigger_door_id: Option<DoorId>,
    /// Device receiving the action
    pub target_device_id: DeviceId,
    /// Door on the target device, when the action addresses one
    #[serde(default)]
    pub target_door_id: Option<DoorId>,
    /// Command sent to the target
    pub action_type: ControlAction,
    /// Delay before the action is sent
    #[serde(default)]
    pub delay_seconds: u64,
    /// Trigger event filter
    ///
    /// Absent, empty or `*` accepts every event. Otherwise a comma-separated
    /// list of event names; a leading `!` excludes a name.
    #[serde(default)]
    pub condition_expression: Option<String>,
    /// Higher values are scheduled first
    #[serde(default)]
    pub priority: i32,
    /// Disabled rules never fire
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl LinkageRule {
    /// Create an enabled rule with no delay and no condition
    pub fn new(
        id: RuleId,
        trigger_device_id: DeviceId,
        target_device_id: DeviceId,
        action_type: ControlAction,
    ) -> Self {
        Self {
            id,
            trigger_device_id,
            trigger_door_id: None,
            target_device_id,
            target_door_id: None,
            action_type,
            delay_seconds: 0,
            condition_expression: None,
            priority: 0,
            enabled: true,
        }
    }

    /// Restrict the trigger to one door
    pub fn on_door(mut self, door: DoorId) -> Self {
        self.trigger_door_id = Some(door);
        self
    }

    /// Address a door on the target device
    pub fn targeting_door(mut self, door: DoorId) -> Self {
        self.target_door_id = Some(door);
        self
    }

    /// Delay the action
    pub fn delayed(mut self, seconds: u64) -> Self {
        self.delay_seconds = seconds;
        self
    }

    /// Set the condition expression
    pub fn when(mut self, expression: impl Into<String>) -> Self {
        self.condition_expression = Some(expression.into());
        self
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Whether a trigger at `device`/`door` addresses this rule
    pub fn matches_trigger(&self, device: DeviceId, door: Option<DoorId>) -> bool {
        if self.trigger_device_id != device {
            return false;
        }
        match self.trigger_door_id {
            None => true,
            Some(required) => door == Some(required),
        }
    }

    /// Whether the condition expression accepts `event`
    pub fn accepts_event(&self, event: &str) -> bool {
        let expression = match self.condition_expression.as_deref().map(str::trim) {
            None | Some("") | Some("*") => return true,
            Some(expression) => expression,
        };

        let mut has_positive = false;
        let mut positive_hit = false;

        for token in expression.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if let Some(excluded) = token.strip_prefix('!') {
                if excluded.trim().eq_ignore_ascii_case(event) {
                    return false;
                }
            } else {
                has_positive = true;
                if token == "*" || token.eq_ignore_ascii_case(event) {
                    positive_hit = true;
                }
            }
        }

        !has_positive || positive_hit
    }
}

//! Access events
//!
//! This module contains the inbound access event structure and the trigger
//! event names used when accepted events are offered to the linkage dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AreaId, DeviceId, Direction, DoorId, UserId, VerifyMethod};

/// Well-known trigger event names matched by linkage condition expressions
pub mod trigger {
    /// An access was granted by the passback checker
    pub const ACCESS_GRANTED: &str = "ACCESS_GRANTED";
    /// An access was denied
    pub const ACCESS_DENIED: &str = "ACCESS_DENIED";
    /// A door was reported open
    pub const DOOR_OPEN: &str = "DOOR_OPEN";
    /// A door was reported closed
    pub const DOOR_CLOSE: &str = "DOOR_CLOSE";
    /// Operator-initiated rule test
    pub const TEST: &str = "TEST";
}

fn default_verify_method() -> VerifyMethod {
    VerifyMethod::Card
}

/// An access attempt reported by a door controller
///
/// Events are immutable once received and are consumed exactly once by the
/// engine. `occurred_at` is assigned at receipt when the wire form omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessEvent {
    /// Badge holder making the attempt
    pub user_id: UserId,
    /// Reader that reported the attempt
    pub device_id: DeviceId,
    /// Area the reader guards
    pub area_id: AreaId,
    /// Door the reader controls
    pub door_id: DoorId,
    /// Direction of travel
    pub direction: Direction,
    /// How the credential was verified
    #[serde(default = "default_verify_method")]
    pub verify_method: VerifyMethod,
    /// Server-assigned receipt time
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
    /// Administrator special passage; bypasses passback evaluation
    #[serde(default)]
    pub skip_passback: bool,
}

impl AccessEvent {
    /// Create a card-verified event stamped with the current time
    pub fn new(
        user_id: UserId,
        device_id: DeviceId,
        area_id: AreaId,
        door_id: DoorId,
        direction: Direction,
    ) -> Self {
        Self {
            user_id,
            device_id,
            area_id,
            door_id,
            direction,
            verify_method: VerifyMethod::Card,
            occurred_at: Utc::now(),
            skip_passback: false,
        }
    }

    /// Set the receipt time
    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    /// Set the verification method
    pub fn verified_by(mut self, method: VerifyMethod) -> Self {
        self.verify_method = method;
        self
    }

    /// Mark the event as an administrator special passage
    pub fn with_skip_passback(mut self) -> Self {
        self.skip_passback = true;
        self
    }

    /// Short label for log lines
    pub fn summary(&self) -> String {
        format!(
            "{} {} at {}/{} ({})",
            self.user_id, self.direction, self.area_id, self.door_id, self.device_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_access_event_builders() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let event = AccessEvent::new(UserId(1), DeviceId(2), AreaId(3), DoorId(4), Direction::In)
            .at(at)
            .verified_by(VerifyMethod::Face)
            .with_skip_passback();

        assert_eq!(event.occurred_at, at);
        assert_eq!(event.verify_method, VerifyMethod::Face);
        assert!(event.skip_passback);
        assert_eq!(event.summary(), "USER_1 IN at AREA_3/DOOR_4 (DEV_2)");
    }

    #[test]
    fn test_wire_form_defaults() {
        let before = Utc::now();
        let event: AccessEvent = serde_json::from_str(
            r#"{"user_id": 7, "device_id": "DEV_1", "area_id": 1, "door_id": 10, "direction": "OUT"}"#,
        )
        .unwrap();

        assert_eq!(event.user_id, UserId(7));
        assert_eq!(event.direction, Direction::Out);
        assert_eq!(event.verify_method, VerifyMethod::Card);
        assert!(!event.skip_passback);
        assert!(event.occurred_at >= before);
    }
}

//! Admit/deny decisions
//!
//! Every denial carries a reason that renders as an operator-readable message.

use serde::{Serialize, Serializer};
use std::fmt;

use crate::types::{AreaId, DeviceId, PassbackPolicy};

/// Why an access event was denied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// A passback policy rejected the event
    Violation(PassbackPolicy),
    /// The reporting device is not known to the facility registry
    UnknownDevice(DeviceId),
    /// The event's area is not known to the facility registry
    UnknownArea(AreaId),
    /// Passback state could not be read or written
    StateUnavailable(String),
    /// The event names an area other than the one its device is registered in
    AreaMismatch {
        /// Reporting device
        device: DeviceId,
        /// Area the registry places the device in
        registered: AreaId,
        /// Area carried by the event
        reported: AreaId,
    },
}

impl DenyReason {
    /// Whether the denial came from a system fault rather than a policy
    pub fn is_system_error(&self) -> bool {
        !matches!(self, DenyReason::Violation(_))
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::Violation(policy) => write!(f, "{} violation", policy),
            DenyReason::UnknownDevice(device) => {
                write!(f, "system error: unknown device {}", device)
            }
            DenyReason::UnknownArea(area) => write!(f, "system error: unknown area {}", area),
            DenyReason::StateUnavailable(detail) => {
                write!(f, "system error: passback state unavailable ({})", detail)
            }
            DenyReason::AreaMismatch {
                device,
                registered,
                reported,
            } => write!(
                f,
                "system error: {} is registered in {}, not {}",
                device, registered, reported
            ),
        }
    }
}

impl Serialize for DenyReason {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Outcome of a passback check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "UPPERCASE")]
pub enum Decision {
    /// The door may open
    Allow {
        /// A SOFT policy saw a repeat inside its window
        soft_violation: bool,
    },
    /// The door stays closed
    Deny {
        /// Human-readable reason
        reason: DenyReason,
    },
}

impl Decision {
    /// Plain allow
    pub fn allow() -> Self {
        Decision::Allow {
            soft_violation: false,
        }
    }

    /// Allow flagged as a soft passback violation
    pub fn allow_soft_violation() -> Self {
        Decision::Allow {
            soft_violation: true,
        }
    }

    /// Deny with a reason
    pub fn deny(reason: DenyReason) -> Self {
        Decision::Deny { reason }
    }

    /// Whether the event was admitted
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }

    /// Whether the event was admitted despite a SOFT violation
    pub fn is_soft_violation(&self) -> bool {
        matches!(
            self,
            Decision::Allow {
                soft_violation: true
            }
        )
    }

    /// Denial reason, if denied
    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            Decision::Allow { .. } => None,
            Decision::Deny { reason } => Some(reason),
        }
    }

    /// Denial reason rendered for operators, if denied
    pub fn reason(&self) -> Option<String> {
        self.deny_reason().map(ToString::to_string)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow {
                soft_violation: false,
            } => write!(f, "ALLOW"),
            Decision::Allow {
                soft_violation: true,
            } => write!(f, "ALLOW (soft violation)"),
            Decision::Deny { reason } => write!(f, "DENY: {}", reason),
        }
    }
}

//! Enumeration types for the access rule engine
//!
//! This module contains all enumeration types used throughout the engine:
//! travel direction, verification method, passback policies and scopes,
//! interlock modes, device control actions and execution states.
//!
//! Wire names follow the catalog collaborator's upper-case convention
//! (`"HARD"`, `"BIDIRECTIONAL"`, `"UNLOCK"`), while `Display` produces the
//! human-readable form used in operator-facing messages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of travel through a door
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Entering the area
    In,
    /// Leaving the area
    Out,
}

impl Direction {
    /// The opposite direction
    pub fn opposite(&self) -> Self {
        match self {
            Direction::In => Direction::Out,
            Direction::Out => Direction::In,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "IN"),
            Direction::Out => write!(f, "OUT"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in" | "entry" | "enter" => Ok(Direction::In),
            "out" | "exit" => Ok(Direction::Out),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

/// How the credential was verified at the reader
///
/// Verification itself is an opaque collaborator call; the engine only carries
/// the method through to audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerifyMethod {
    /// Proximity or smart card
    Card,
    /// Face recognition
    Face,
    /// Fingerprint
    Fingerprint,
    /// PIN or password
    Password,
    /// QR code
    QrCode,
    /// Several factors combined
    MultiFactor,
}

impl fmt::Display for VerifyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyMethod::Card => write!(f, "Card"),
            VerifyMethod::Face => write!(f, "Face"),
            VerifyMethod::Fingerprint => write!(f, "Fingerprint"),
            VerifyMethod::Password => write!(f, "Password"),
            VerifyMethod::QrCode => write!(f, "QR Code"),
            VerifyMethod::MultiFactor => write!(f, "Multi-Factor"),
        }
    }
}

impl FromStr for VerifyMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "card" => Ok(VerifyMethod::Card),
            "face" => Ok(VerifyMethod::Face),
            "fingerprint" | "finger" => Ok(VerifyMethod::Fingerprint),
            "password" | "pin" => Ok(VerifyMethod::Password),
            "qr code" | "qrcode" | "qr_code" | "qr" => Ok(VerifyMethod::QrCode),
            "multi-factor" | "multifactor" | "multi_factor" => Ok(VerifyMethod::MultiFactor),
            _ => Err(format!("Unknown verify method: {}", s)),
        }
    }
}

/// Passback policy configured for an area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PassbackPolicy {
    /// Deny any repeat at the same device inside the window
    Hard,
    /// Allow repeats at the same device but record them as exceptions
    Soft,
    /// Require IN and OUT to alternate within an area
    Area,
    /// Deny any repeat anywhere on site inside the window
    Global,
}

impl PassbackPolicy {
    /// Scope at which this policy tracks state
    pub fn scope(&self) -> PassbackScope {
        match self {
            PassbackPolicy::Hard | PassbackPolicy::Soft => PassbackScope::Device,
            PassbackPolicy::Area => PassbackScope::Area,
            PassbackPolicy::Global => PassbackScope::Global,
        }
    }
}

impl fmt::Display for PassbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassbackPolicy::Hard => write!(f, "HARD"),
            PassbackPolicy::Soft => write!(f, "SOFT"),
            PassbackPolicy::Area => write!(f, "AREA"),
            PassbackPolicy::Global => write!(f, "GLOBAL"),
        }
    }
}

impl FromStr for PassbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hard" => Ok(PassbackPolicy::Hard),
            "soft" => Ok(PassbackPolicy::Soft),
            "area" => Ok(PassbackPolicy::Area),
            "global" => Ok(PassbackPolicy::Global),
            _ => Err(format!("Unknown passback policy: {}", s)),
        }
    }
}

/// Granularity at which passback state is tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassbackScope {
    /// One entry per user per device
    Device,
    /// One entry per user per area
    Area,
    /// One bounded history per user across the site
    Global,
}

impl fmt::Display for PassbackScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassbackScope::Device => write!(f, "device"),
            PassbackScope::Area => write!(f, "area"),
            PassbackScope::Global => write!(f, "global"),
        }
    }
}

/// Which side of an interlock pair may trigger it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InterlockMode {
    /// Either side locks the other
    Bidirectional,
    /// Only side A (the primary) locks side B
    Unidirectional,
}

impl fmt::Display for InterlockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterlockMode::Bidirectional => write!(f, "Bidirectional"),
            InterlockMode::Unidirectional => write!(f, "Unidirectional"),
        }
    }
}

impl FromStr for InterlockMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bidirectional" | "both" => Ok(InterlockMode::Bidirectional),
            "unidirectional" | "one-way" | "oneway" => Ok(InterlockMode::Unidirectional),
            _ => Err(format!("Unknown interlock mode: {}", s)),
        }
    }
}

/// How an interlocked area gets released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UnlockCondition {
    /// Automatically after the rule's unlock delay
    Timer,
    /// Only by an operator
    Manual,
}

impl fmt::Display for UnlockCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnlockCondition::Timer => write!(f, "Timer"),
            UnlockCondition::Manual => write!(f, "Manual"),
        }
    }
}

/// What happened at the triggering door when an interlock is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DoorAction {
    /// An access was granted at the door
    AccessGranted,
    /// The door was opened
    Open,
    /// The door was closed
    Close,
}

impl fmt::Display for DoorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoorAction::AccessGranted => write!(f, "ACCESS_GRANTED"),
            DoorAction::Open => write!(f, "OPEN"),
            DoorAction::Close => write!(f, "CLOSE"),
        }
    }
}

impl FromStr for DoorAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "access_granted" | "access granted" | "granted" => Ok(DoorAction::AccessGranted),
            "open" | "door_open" => Ok(DoorAction::Open),
            "close" | "closed" | "door_close" => Ok(DoorAction::Close),
            _ => Err(format!("Unknown door action: {}", s)),
        }
    }
}

/// Command sent to a device through the actuation client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ControlAction {
    /// Lock the door
    Lock,
    /// Unlock (release) the door
    Unlock,
    /// Take a camera capture
    Capture,
    /// Raise an alarm
    Alert,
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlAction::Lock => write!(f, "LOCK"),
            ControlAction::Unlock => write!(f, "UNLOCK"),
            ControlAction::Capture => write!(f, "CAPTURE"),
            ControlAction::Alert => write!(f, "ALERT"),
        }
    }
}

impl FromStr for ControlAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lock" => Ok(ControlAction::Lock),
            "unlock" => Ok(ControlAction::Unlock),
            "capture" | "snapshot" => Ok(ControlAction::Capture),
            "alert" | "alarm" => Ok(ControlAction::Alert),
            _ => Err(format!("Unknown control action: {}", s)),
        }
    }
}

/// Which engine path issued a control command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandSource {
    /// Interlock rule fired
    Interlock,
    /// Timer-driven interlock release
    InterlockTimer,
    /// Operator manual unlock
    ManualUnlock,
    /// Linkage rule fired
    Linkage,
    /// Operator rule test
    LinkageTest,
}

impl fmt::Display for CommandSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandSource::Interlock => write!(f, "interlock"),
            CommandSource::InterlockTimer => write!(f, "interlock-timer"),
            CommandSource::ManualUnlock => write!(f, "manual-unlock"),
            CommandSource::Linkage => write!(f, "linkage"),
            CommandSource::LinkageTest => write!(f, "linkage-test"),
        }
    }
}

/// Lifecycle of a linkage execution log row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    /// Created, action not yet completed
    Pending,
    /// Device accepted the command
    Success,
    /// Command failed, timed out or could not be sent
    Failed,
}

impl ExecutionStatus {
    /// Whether the row has reached a final state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Pending)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Pending => write!(f, "PENDING"),
            ExecutionStatus::Success => write!(f, "SUCCESS"),
            ExecutionStatus::Failed => write!(f, "FAILED"),
        }
    }
}

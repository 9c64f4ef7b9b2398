//! Devices and doors
//!
//! Devices are the addressable endpoints of the device-communication layer.
//! Doors are owned by exactly one device; commands aimed at a door are sent to
//! its owning device.

use crate::types::{AreaId, DeviceId, DoorId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of addressable device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceKind {
    /// Reader/controller that owns one or more doors
    #[default]
    DoorController,
    /// Camera accepting CAPTURE commands
    Camera,
    /// Siren or alarm panel accepting ALERT commands
    Alarm,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::DoorController => write!(f, "Door Controller"),
            DeviceKind::Camera => write!(f, "Camera"),
            DeviceKind::Alarm => write!(f, "Alarm"),
        }
    }
}

/// An addressable device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Unique identifier for the device
    pub id: DeviceId,
    /// Area the device is installed in
    pub area_id: AreaId,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Kind of device
    #[serde(default)]
    pub kind: DeviceKind,
}

impl Device {
    /// Create a door controller
    pub fn new(id: DeviceId, area_id: AreaId, name: impl Into<String>) -> Self {
        Self {
            id,
            area_id,
            name: name.into(),
            kind: DeviceKind::DoorController,
        }
    }

    /// Set the device kind
    pub fn with_kind(mut self, kind: DeviceKind) -> Self {
        self.kind = kind;
        self
    }
}

/// A single door
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Door {
    /// Unique identifier for the door
    pub id: DoorId,
    /// Device that controls the door
    pub device_id: DeviceId,
    /// Area the door leads into
    pub area_id: AreaId,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
}

impl Door {
    /// Create a door
    pub fn new(id: DoorId, device_id: DeviceId, area_id: AreaId, name: impl Into<String>) -> Self {
        Self {
            id,
            device_id,
            area_id,
            name: name.into(),
        }
    }
}

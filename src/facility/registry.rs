//! Facility registry and metadata lookup
//!
//! This module contains the FacilityRegistry struct, which indexes the areas,
//! devices and doors of a site so the passback checker and interlock controller
//! can resolve event metadata without touching the rule catalog.

use crate::facility::{Area, Device, Door};
use crate::types::{AreaId, DeviceId, DoorId, PassbackPolicy};
use serde::Serialize;
use std::collections::HashMap;

/// Indexed collection of areas, devices and doors
#[derive(Debug, Clone, Default)]
pub struct FacilityRegistry {
    areas: HashMap<AreaId, Area>,
    devices: HashMap<DeviceId, Device>,
    doors: HashMap<DoorId, Door>,
}

impl FacilityRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from flat lists
    pub fn from_parts(areas: Vec<Area>, devices: Vec<Device>, doors: Vec<Door>) -> Self {
        let mut registry = Self::new();
        for area in areas {
            registry.add_area(area);
        }
        for device in devices {
            registry.add_device(device);
        }
        for door in doors {
            registry.add_door(door);
        }
        registry
    }

    /// Add or replace an area
    pub fn add_area(&mut self, area: Area) {
        self.areas.insert(area.id, area);
    }

    /// Add or replace a device
    pub fn add_device(&mut self, device: Device) {
        self.devices.insert(device.id, device);
    }

    /// Add or replace a door
    pub fn add_door(&mut self, door: Door) {
        self.doors.insert(door.id, door);
    }

    /// Get an area by ID
    pub fn get_area(&self, area_id: AreaId) -> Option<&Area> {
        self.areas.get(&area_id)
    }

    /// Get a device by ID
    pub fn get_device(&self, device_id: DeviceId) -> Option<&Device> {
        self.devices.get(&device_id)
    }

    /// Get a door by ID
    pub fn get_door(&self, door_id: DoorId) -> Option<&Door> {
        self.doors.get(&door_id)
    }

    /// Device that owns a door
    pub fn device_for_door(&self, door_id: DoorId) -> Option<DeviceId> {
        self.doors.get(&door_id).map(|door| door.device_id)
    }

    /// Passback policy configured for an area, if the area exists
    pub fn passback_policy(&self, area_id: AreaId) -> Option<Option<PassbackPolicy>> {
        self.areas.get(&area_id).map(|area| area.passback_policy)
    }

    /// All doors leading into an area
    pub fn doors_in_area(&self, area_id: AreaId) -> Vec<&Door> {
        let mut doors: Vec<&Door> = self
            .doors
            .values()
            .filter(|door| door.area_id == area_id)
            .collect();
        doors.sort_by_key(|door| door.id);
        doors
    }

    /// Check if an area exists in the registry
    pub fn area_exists(&self, area_id: AreaId) -> bool {
        self.areas.contains_key(&area_id)
    }

    /// Check if a device exists in the registry
    pub fn device_exists(&self, device_id: DeviceId) -> bool {
        self.devices.contains_key(&device_id)
    }

    /// Validate referential integrity between areas, devices and doors
    pub fn validate(&self) -> Result<(), String> {
        if self.areas.is_empty() {
            return Err("Registry must contain at least one area".to_string());
        }

        for device in self.devices.values() {
            if !self.areas.contains_key(&device.area_id) {
                return Err(format!(
                    "Device {} references unknown area {}",
                    device.id, device.area_id
                ));
            }
        }

        for door in self.doors.values() {
            if !self.devices.contains_key(&door.device_id) {
                return Err(format!(
                    "Door {} references unknown device {}",
                    door.id, door.device_id
                ));
            }
            if !self.areas.contains_key(&door.area_id) {
                return Err(format!(
                    "Door {} references unknown area {}",
                    door.id, door.area_id
                ));
            }
        }

        Ok(())
    }

    /// Counts of registered entities
    pub fn stats(&self) -> FacilityStats {
        FacilityStats {
            areas: self.areas.len(),
            policed_areas: self.areas.values().filter(|a| a.enforces_passback()).count(),
            devices: self.devices.len(),
            doors: self.doors.len(),
        }
    }
}

/// Counts of registered facility entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FacilityStats {
    /// Total areas
    pub areas: usize,
    /// Areas with a passback policy
    pub policed_areas: usize,
    /// Total devices
    pub devices: usize,
    /// Total doors
    pub doors: usize,
}

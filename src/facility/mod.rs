//! Facility metadata
//!
//! This module models the physical site the engine protects: areas with their
//! passback policies, the devices installed in them, and the doors those devices
//! control.
//!
//! # Usage Example
//!
//! ```rust
//! use access_rule_engine::facility::*;
//! use access_rule_engine::types::*;
//!
//! let registry = FacilityRegistry::from_parts(
//!     vec![Area::new(AreaId(1), "Vault").with_policy(PassbackPolicy::Hard)],
//!     vec![Device::new(DeviceId(10), AreaId(1), "Vault reader")],
//!     vec![Door::new(DoorId(100), DeviceId(10), AreaId(1), "Vault door")],
//! );
//!
//! assert!(registry.validate().is_ok());
//! assert_eq!(registry.device_for_door(DoorId(100)), Some(DeviceId(10)));
//! ```

pub mod area;
pub mod device;
pub mod registry;

// Re-export all public types for convenience
pub use area::Area;
pub use device::{Device, DeviceKind, Door};
pub use registry::{FacilityRegistry, FacilityStats};

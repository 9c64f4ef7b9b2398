//! Core types and identifiers for the access rule engine
//!
//! This module contains fundamental types, identifiers, and configuration structures
//! used throughout the engine.
//!
//! # Overview
//!
//! - **Identifiers**: numeric newtypes for users, devices, areas, doors and rules
//! - **Enums**: directions, passback policies, interlock modes, control actions
//! - **Configuration**: engine configuration with validation and CLI support
//!
//! # Usage Example
//!
//! ```rust
//! use access_rule_engine::types::*;
//!
//! let device = DeviceId(12);
//! assert_eq!(device.to_string(), "DEV_12");
//!
//! let policy: PassbackPolicy = "hard".parse().unwrap();
//! assert_eq!(policy.scope(), PassbackScope::Device);
//!
//! let config = EngineConfig {
//!     hard_window_secs: 120,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

pub mod config;
pub mod enums;
pub mod identifiers;

// Re-export all public types for convenience
pub use config::*;
pub use enums::*;
pub use identifiers::*;

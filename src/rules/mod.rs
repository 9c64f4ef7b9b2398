//! Interlock and linkage rules
//!
//! Rule rows are supplied by the catalog collaborator and are read-only to the
//! engine:
//!
//! - **InterlockRule**: locks one area of a pair when the other sees access
//! - **LinkageRule**: sends an action to a target device when a trigger fires
//! - **RuleCatalog**: async lookup trait, with in-memory and cached implementations
//! - **SiteCatalog**: JSON file bundling facility metadata and rules
//!
//! # Usage Example
//!
//! ```rust
//! use access_rule_engine::rules::*;
//! use access_rule_engine::types::*;
//!
//! let rule = LinkageRule::new(RuleId(1), DeviceId(5), DeviceId(9), ControlAction::Unlock)
//!     .on_door(DoorId(50))
//!     .when("DOOR_OPEN");
//!
//! assert!(rule.matches_trigger(DeviceId(5), Some(DoorId(50))));
//! assert!(rule.accepts_event("DOOR_OPEN"));
//! assert!(!rule.accepts_event("DOOR_CLOSE"));
//! ```

pub mod catalog;
pub mod interlock;
pub mod linkage;
pub mod site;

// Re-export all public types for convenience
pub use catalog::{CachedRuleCatalog, CatalogError, InMemoryRuleCatalog, RuleCatalog};
pub use interlock::{InterlockRule, InterlockTarget};
pub use linkage::LinkageRule;
pub use site::SiteCatalog;

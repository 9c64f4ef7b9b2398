//! Access events and decisions
//!
//! - **AccessEvent**: an entry/exit attempt reported by a door controller
//! - **Decision**: the admit/deny outcome of a passback check
//! - **trigger**: well-known trigger event names for linkage rules
//!
//! # Usage Example
//!
//! ```rust
//! use access_rule_engine::events::*;
//! use access_rule_engine::types::*;
//!
//! let event = AccessEvent::new(UserId(1), DeviceId(10), AreaId(1), DoorId(100), Direction::In);
//! assert!(!event.skip_passback);
//!
//! let decision = Decision::deny(DenyReason::Violation(PassbackPolicy::Hard));
//! assert_eq!(decision.reason().as_deref(), Some("HARD violation"));
//! ```

pub mod access_event;
pub mod decision;

// Re-export all public types for convenience
pub use access_event::*;
pub use decision::*;

//! Access Rule Engine
//!
//! Real-time enforcement of physical access-control rules: door controllers
//! report entry and exit attempts, and the engine decides whether to admit them
//! and which follow-up actions to chain.
//!
//! # Overview
//!
//! For every live access event the engine
//!
//! - **detects passback violations** under one of four per-area policies
//!   (HARD, SOFT, AREA, GLOBAL),
//! - **enforces interlocks** between paired areas, locking the opposite door
//!   and optionally releasing it after a delay,
//! - **dispatches linkage actions** (lock, unlock, capture, alert) to other
//!   devices, logging every execution.
//!
//! Rule catalogs, device communication and audit persistence are external
//! collaborators reached through traits; in-process implementations of each
//! ship with the crate.
//!
//! ## Quick Start
//!
//! ```rust
//! use access_rule_engine::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = FacilityRegistry::from_parts(
//!     vec![
//!         Area::new(AreaId(1), "Airlock Outer").with_policy(PassbackPolicy::Area),
//!         Area::new(AreaId(2), "Airlock Inner"),
//!     ],
//!     vec![
//!         Device::new(DeviceId(1), AreaId(1), "Outer Reader"),
//!         Device::new(DeviceId(2), AreaId(2), "Inner Reader"),
//!     ],
//!     vec![
//!         Door::new(DoorId(1), DeviceId(1), AreaId(1), "Outer Door"),
//!         Door::new(DoorId(2), DeviceId(2), AreaId(2), "Inner Door"),
//!     ],
//! );
//! let catalog = InMemoryRuleCatalog::with_rules(
//!     vec![InterlockRule::new(
//!         RuleId(1),
//!         (AreaId(1), DoorId(1)),
//!         (AreaId(2), DoorId(2)),
//!         InterlockMode::Bidirectional,
//!         UnlockCondition::Manual,
//!         0,
//!     )],
//!     vec![],
//! );
//!
//! let engine = AccessRuleEngine::builder(EngineConfig::default(), registry)
//!     .with_catalog(Arc::new(catalog))
//!     .build()?;
//!
//! let event = AccessEvent::new(UserId(42), DeviceId(1), AreaId(1), DoorId(1), Direction::In);
//! assert!(engine.handle_event(&event).await.is_allowed());
//!
//! engine.drain().await;
//! assert!(engine.interlock_status(AreaId(2)).await?.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`types`]: identifiers, enums and configuration
//! - [`events`]: access events and passback decisions
//! - [`facility`]: areas, devices, doors and the metadata registry
//! - [`rules`]: interlock and linkage rule rows and the rule catalog
//! - [`store`]: key-value state store with scoped keys
//! - [`engine`]: passback checker, interlock controller, linkage dispatcher
//!   and the orchestrating [`AccessRuleEngine`]
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//! │   Types     │    │   Events    │    │  Facility   │
//! │             │    │             │    │             │
//! │ Identifiers │◄───┤ AccessEvent │◄───┤ Registry    │
//! │ Enums       │    │ Decision    │    │ Areas/Doors │
//! │ Config      │    │             │    │             │
//! └─────────────┘    └─────────────┘    └─────────────┘
//!        ▲                   ▲                   ▲
//!        │                   │                   │
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//! │   Rules     │    │   Store     │    │   Engine    │
//! │             │    │             │    │             │
//! │ Interlock   │◄───┤ StateKey    │◄───┤ Passback    │
//! │ Linkage     │    │ TTL entries │    │ Interlock   │
//! │ Catalog     │    │ Counters    │    │ Linkage     │
//! └─────────────┘    └─────────────┘    └─────────────┘
//! ```
#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]

// Module declarations
pub mod engine;
pub mod events;
pub mod facility;
pub mod rules;
pub mod store;
pub mod types;

// Core types and identifiers
pub use types::{
    AreaId, CliArgs, CommandSource, ConfigError, ConfigValidationError, ControlAction, DeviceId,
    Direction, DoorAction, DoorId, EngineConfig, ExecutionId, ExecutionStatus, InterlockMode,
    PassbackPolicy, PassbackScope, RuleId, UnlockCondition, UserId, VerifyMethod,
};

// Events and decisions
pub use events::{AccessEvent, Decision, DenyReason};

// Facility metadata
pub use facility::{Area, Device, DeviceKind, Door, FacilityRegistry, FacilityStats};

// Rules
pub use rules::{
    CachedRuleCatalog, CatalogError, InMemoryRuleCatalog, InterlockRule, LinkageRule, RuleCatalog,
    SiteCatalog,
};

// State store
pub use store::{MemoryStateStore, StateKey, StateStore, StoreError};

// Engine
pub use engine::{
    AccessRuleEngine, ActuationClient, ActuationError, AuditRecorder, EngineError, EngineResult,
    InMemoryAuditRecorder, InterlockState, InterlockSummary, LinkageExecutionLog, LinkageSummary,
    SimulatedActuator, StatisticsSnapshot,
};

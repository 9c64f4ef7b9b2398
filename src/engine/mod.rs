//! Rule enforcement engine
//!
//! This module contains the passback checker, the interlock controller, the
//! linkage dispatcher and the machinery they share: the bounded worker pool,
//! the actuation and audit collaborators, error handling, logging and counters.
//! [`AccessRuleEngine`] ties them together.
//!
//! # Usage Example
//!
//! ```rust
//! use access_rule_engine::engine::AccessRuleEngine;
//! use access_rule_engine::events::AccessEvent;
//! use access_rule_engine::facility::{Area, Device, FacilityRegistry};
//! use access_rule_engine::types::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = FacilityRegistry::from_parts(
//!     vec![Area::new(AreaId(1), "Server Room").with_policy(PassbackPolicy::Hard)],
//!     vec![Device::new(DeviceId(10), AreaId(1), "Server Room Reader")],
//!     vec![],
//! );
//! let engine = AccessRuleEngine::builder(EngineConfig::default(), registry).build()?;
//!
//! let event = AccessEvent::new(UserId(7), DeviceId(10), AreaId(1), DoorId(1), Direction::In);
//! assert!(engine.handle_event(&event).await.is_allowed());
//!
//! let again = AccessEvent::new(UserId(7), DeviceId(10), AreaId(1), DoorId(1), Direction::Out);
//! let decision = engine.handle_event(&again).await;
//! assert_eq!(decision.reason().as_deref(), Some("HARD violation"));
//!
//! engine.drain().await;
//! # Ok(())
//! # }
//! ```

pub mod actuation;
pub mod audit;
pub mod clock;
mod context;
pub mod error;
pub mod interlock;
pub mod linkage;
pub mod logging;
pub mod orchestrator;
pub mod passback;
pub mod statistics;
pub mod worker_pool;

// Re-export commonly used types
pub use actuation::{
    ActuationClient, ActuationError, ControlCommand, ControlResponse, SentCommand,
    SimulatedActuator, SimulatedFault, TimedActuator,
};
pub use audit::{
    AuditEmitter, AuditEntry, AuditError, AuditRecorder, AuditStats, InMemoryAuditRecorder,
    InterlockRecord, JsonlAuditRecorder, PassbackRecord,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{EngineError, EngineResult, RetryOutcome, RetryPolicy, Retryable};
pub use interlock::{InterlockController, InterlockFiring, InterlockState, InterlockSummary};
pub use linkage::{LinkageDispatcher, LinkageExecutionLog, LinkageLogBook, LinkageSummary};
pub use logging::{LoggingConfig, LoggingGuard};
pub use orchestrator::{AccessRuleEngine, AccessRuleEngineBuilder};
pub use passback::{PassbackChecker, PassbackEntry, PassbackOutcome, PassbackStatus, SoftException};
pub use statistics::{EngineStatistics, StatisticsSnapshot};
pub use worker_pool::{InFlight, InFlightGuard, PoolStats, TaskHandle, WorkerPool};

//! Collaborators shared by the engine components

use std::sync::Arc;

use super::actuation::ActuationClient;
use super::audit::{AuditEmitter, AuditEntry};
use super::clock::Clock;
use super::statistics::EngineStatistics;
use super::worker_pool::WorkerPool;
use crate::facility::FacilityRegistry;
use crate::rules::RuleCatalog;
use crate::store::StateStore;
use crate::types::EngineConfig;

#[derive(Debug, Clone)]
pub(crate) struct EngineContext {
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) registry: Arc<FacilityRegistry>,
    pub(crate) catalog: Arc<dyn RuleCatalog>,
    pub(crate) store: Arc<dyn StateStore>,
    pub(crate) actuator: Arc<dyn ActuationClient>,
    pub(crate) audit: Arc<AuditEmitter>,
    pub(crate) pool: WorkerPool,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) stats: Arc<EngineStatistics>,
}

impl EngineContext {
    pub(crate) fn emit(&self, entry: AuditEntry) {
        self.audit.emit(entry);
    }
}

//! Audit recording
//!
//! Every passback decision, interlock command and linkage log transition is
//! handed to an [`AuditRecorder`]. The engine never waits on the recorder:
//! entries go through an [`AuditEmitter`], a bounded channel drained by a
//! background task. A full channel drops the entry and counts the drop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::linkage::LinkageExecutionLog;
use super::worker_pool::{InFlight, InFlightGuard};
use crate::events::{AccessEvent, Decision};
use crate::types::{
    AreaId, CommandSource, ControlAction, DeviceId, DoorId, PassbackPolicy, RuleId,
};

/// Channel capacity for audit entries awaiting the recorder
pub const DEFAULT_AUDIT_BUFFER: usize = 4096;

/// Audit recorder failures
#[derive(Debug, Error)]
pub enum AuditError {
    /// Write to the audit sink failed
    #[error("audit write failed: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be encoded
    #[error("audit serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Recorder cannot accept entries
    #[error("audit recorder unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of one passback check
#[derive(Debug, Clone, Serialize)]
pub struct PassbackRecord {
    /// Event that was checked
    pub event: AccessEvent,
    /// Decision reached
    pub decision: Decision,
    /// Policy evaluated, if the area had one and the check was not skipped
    pub policy: Option<PassbackPolicy>,
    /// When the decision was made
    pub recorded_at: DateTime<Utc>,
}

/// One interlock command and its outcome
#[derive(Debug, Clone, Serialize)]
pub struct InterlockRecord {
    /// Rule behind the command
    pub rule_id: RuleId,
    /// Area that was locked or released
    pub area_id: AreaId,
    /// Door that was locked or released
    pub door_id: DoorId,
    /// Device the command went to, when it could be resolved
    pub device_id: Option<DeviceId>,
    /// LOCK or UNLOCK
    pub action: ControlAction,
    /// Which path issued the command
    pub source: CommandSource,
    /// Whether the device accepted the command
    pub success: bool,
    /// Failure detail
    pub error: Option<String>,
    /// When the outcome was known
    pub recorded_at: DateTime<Utc>,
}

/// Anything the engine reports for later reporting
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEntry {
    /// Passback decision
    Passback(PassbackRecord),
    /// Interlock command
    Interlock(InterlockRecord),
    /// Linkage log row snapshot
    Linkage(LinkageExecutionLog),
}

/// Audit/report collaborator
#[async_trait]
pub trait AuditRecorder: Send + Sync + std::fmt::Debug {
    /// Persist one entry
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

/// Recorder that keeps entries in memory
#[derive(Debug, Default)]
pub struct InMemoryAuditRecorder {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry recorded so far
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Recorded passback decisions
    pub fn passback_records(&self) -> Vec<PassbackRecord> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                AuditEntry::Passback(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    /// Recorded interlock commands
    pub fn interlock_records(&self) -> Vec<InterlockRecord> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                AuditEntry::Interlock(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    /// Recorded linkage log snapshots
    pub fn linkage_records(&self) -> Vec<LinkageExecutionLog> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                AuditEntry::Linkage(log) => Some(log),
                _ => None,
            })
            .collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditRecorder for InMemoryAuditRecorder {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .map_err(|_| AuditError::Unavailable("audit buffer lock poisoned".to_string()))?
            .push(entry);
        Ok(())
    }
}

/// Recorder that appends one JSON object per line to a file
#[derive(Debug)]
pub struct JsonlAuditRecorder {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlAuditRecorder {
    /// Create or truncate the output file
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, AuditError> {
        let file = File::create(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

#[async_trait]
impl AuditRecorder for JsonlAuditRecorder {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let line = serde_json::to_string(&entry)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| AuditError::Unavailable("audit file lock poisoned".to_string()))?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Audit delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    /// Entries handed to the emitter
    pub emitted: u64,
    /// Entries dropped because the buffer was full
    pub dropped: u64,
    /// Entries the recorder failed to persist
    pub failed: u64,
}

#[derive(Debug, Default)]
struct EmitterCounters {
    emitted: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Fire-and-forget front end for an [`AuditRecorder`]
#[derive(Debug)]
pub struct AuditEmitter {
    sender: mpsc::Sender<(AuditEntry, InFlightGuard)>,
    in_flight: Arc<InFlight>,
    counters: Arc<EmitterCounters>,
}

impl AuditEmitter {
    /// Start the drain task for `recorder` with the default buffer
    pub fn spawn(recorder: Arc<dyn AuditRecorder>) -> Self {
        Self::with_buffer_size(recorder, DEFAULT_AUDIT_BUFFER)
    }

    /// Start the drain task for `recorder` with a custom buffer
    pub fn with_buffer_size(recorder: Arc<dyn AuditRecorder>, size: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<(AuditEntry, InFlightGuard)>(size.max(1));
        let counters = Arc::new(EmitterCounters::default());
        let task_counters = Arc::clone(&counters);

        tokio::spawn(async move {
            while let Some((entry, _guard)) = receiver.recv().await {
                if let Err(e) = recorder.record(entry).await {
                    task_counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!("Audit record failed: {}", e);
                }
            }
            debug!("Audit drain task finished");
        });

        Self {
            sender,
            in_flight: InFlight::new(),
            counters,
        }
    }

    /// Queue an entry; never blocks
    pub fn emit(&self, entry: AuditEntry) {
        self.counters.emitted.fetch_add(1, Ordering::Relaxed);
        let guard = self.in_flight.enter();
        if self.sender.try_send((entry, guard)).is_err() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("Audit buffer full, entry dropped");
        }
    }

    /// Wait until every queued entry has reached the recorder
    pub async fn flush(&self) {
        self.in_flight.wait_idle().await;
    }

    /// Delivery counters
    pub fn stats(&self) -> AuditStats {
        AuditStats {
            emitted: self.counters.emitted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

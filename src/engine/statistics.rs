//! Statistics collection and reporting
//!
//! In-process counters for passback, interlock and linkage activity. Counters
//! are lock-free and shared across tasks; [`EngineStatistics::snapshot`] copies
//! them into a serializable report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! counters {
    ($($(#[$meta:meta])* $field:ident => $incr:ident),* $(,)?) => {
        /// Live engine counters
        #[derive(Debug, Default)]
        pub struct EngineStatistics {
            $($field: AtomicU64,)*
        }

        impl EngineStatistics {
            $(
                $(#[$meta])*
                pub fn $incr(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*

            /// Copy the current counter values
            pub fn snapshot(&self) -> StatisticsSnapshot {
                StatisticsSnapshot {
                    $($field: self.$field.load(Ordering::Relaxed),)*
                }
            }
        }

        /// Point-in-time copy of the engine counters
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct StatisticsSnapshot {
            $(
                $(#[$meta])*
                pub $field: u64,
            )*
        }
    };
}

counters! {
    /// Access events received
    events_processed => record_event,
    /// Events admitted by the passback checker
    passback_allowed => record_allowed,
    /// Events denied by a passback policy
    passback_denied => record_denied,
    /// Events admitted despite a SOFT violation
    soft_violations => record_soft_violation,
    /// Events denied because of missing metadata or state failures
    system_errors => record_system_error,
    /// Events admitted through the administrator override
    passback_skipped => record_skipped,
    /// Interlock rules that fired
    interlock_fired => record_interlock_fired,
    /// Interlock rules matched by area but not fired
    interlock_skipped => record_interlock_skipped,
    /// LOCK commands that failed
    interlock_lock_failures => record_lock_failure,
    /// Timer-driven releases that sent UNLOCK
    auto_unlocks => record_auto_unlock,
    /// Operator releases
    manual_unlocks => record_manual_unlock,
    /// Linkage executions created
    linkage_dispatched => record_linkage_dispatched,
    /// Linkage executions that succeeded
    linkage_succeeded => record_linkage_succeeded,
    /// Linkage executions that failed
    linkage_failed => record_linkage_failed,
}

impl EngineStatistics {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatisticsSnapshot {
    fn percentage(part: u64, whole: u64) -> f64 {
        if whole == 0 {
            0.0
        } else {
            part as f64 / whole as f64 * 100.0
        }
    }

    /// Share of processed events that were denied
    pub fn denial_percentage(&self) -> f64 {
        Self::percentage(self.passback_denied + self.system_errors, self.events_processed)
    }

    /// Share of finished linkage executions that succeeded
    pub fn linkage_success_percentage(&self) -> f64 {
        Self::percentage(
            self.linkage_succeeded,
            self.linkage_succeeded + self.linkage_failed,
        )
    }

    /// Linkage executions without a final status yet
    pub fn linkage_pending(&self) -> u64 {
        self.linkage_dispatched
            .saturating_sub(self.linkage_succeeded + self.linkage_failed)
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        format!(
            "Engine Summary: {} events | Allowed: {} ({} soft) | Denied: {} + {} system errors ({:.1}%) | Interlocks: {} fired, {} lock failures | Linkage: {} dispatched, {} ok, {} failed",
            self.events_processed,
            self.passback_allowed,
            self.soft_violations,
            self.passback_denied,
            self.system_errors,
            self.denial_percentage(),
            self.interlock_fired,
            self.interlock_lock_failures,
            self.linkage_dispatched,
            self.linkage_succeeded,
            self.linkage_failed
        )
    }
}

impl fmt::Display for StatisticsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Engine Statistics ===")?;
        writeln!(f, "Events processed: {}", self.events_processed)?;
        writeln!(f)?;
        writeln!(f, "Passback:")?;
        writeln!(f, "  Allowed: {}", self.passback_allowed)?;
        writeln!(f, "  Soft violations: {}", self.soft_violations)?;
        writeln!(f, "  Skipped (override): {}", self.passback_skipped)?;
        writeln!(
            f,
            "  Denied: {} policy, {} system error ({:.1}%)",
            self.passback_denied,
            self.system_errors,
            self.denial_percentage()
        )?;
        writeln!(f)?;
        writeln!(f, "Interlock:")?;
        writeln!(f, "  Fired: {}", self.interlock_fired)?;
        writeln!(f, "  Skipped: {}", self.interlock_skipped)?;
        writeln!(f, "  Lock failures: {}", self.interlock_lock_failures)?;
        writeln!(
            f,
            "  Releases: {} timer, {} manual",
            self.auto_unlocks, self.manual_unlocks
        )?;
        writeln!(f)?;
        writeln!(f, "Linkage:")?;
        writeln!(f, "  Dispatched: {}", self.linkage_dispatched)?;
        writeln!(
            f,
            "  Succeeded: {} ({:.1}%)",
            self.linkage_succeeded,
            self.linkage_success_percentage()
        )?;
        writeln!(f, "  Failed: {}", self.linkage_failed)?;
        write!(f, "  Pending: {}", self.linkage_pending())
    }
}

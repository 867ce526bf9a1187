//! TrackProcessesUseCase: survive a host crash without leaking guests.
//!
//! While a guest is embedded its process identity is persisted.  If the host
//! dies abruptly, the guest windows are left frameless and owned by a window
//! that no longer exists, often invisible.  On the next start
//! [`ProcessLifecycleTracker::reconcile_zombies`] walks the ledger and cleans
//! up:
//!
//! | Situation                                   | Action          |
//! |---------------------------------------------|-----------------|
//! | process already gone                        | nothing         |
//! | pid reused by another program (start time)  | nothing         |
//! | process alive with a visible top-level window | leave running |
//! | process alive with no visible window        | terminate       |
//!
//! The ledger is cleared afterwards in every case.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tabhost_core::{ProcessId, TrackedProcessRecord};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::infrastructure::native::WindowSystem;
use crate::infrastructure::process::{ProcessError, ProcessInspector};
use crate::infrastructure::storage::tracker_file::{StoreError, TrackerStore};

/// Error type for tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What reconciliation did with each ledger entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub killed: Vec<ProcessId>,
    pub skipped_pid_reuse: Vec<ProcessId>,
    pub exited: Vec<ProcessId>,
    pub left_running: Vec<ProcessId>,
    pub kill_failed: Vec<ProcessId>,
}

impl ReconcileReport {
    pub fn total(&self) -> usize {
        self.killed.len()
            + self.skipped_pid_reuse.len()
            + self.exited.len()
            + self.left_running.len()
            + self.kill_failed.len()
    }
}

/// Persists embedded process identities and reconciles them after a crash.
pub struct ProcessLifecycleTracker {
    store: Arc<dyn TrackerStore>,
    processes: Arc<dyn ProcessInspector>,
    windows: Arc<dyn WindowSystem>,
    tolerance: Duration,
    /// Serializes read-modify-write cycles on the ledger.
    lock: Mutex<()>,
}

impl ProcessLifecycleTracker {
    pub fn new(
        store: Arc<dyn TrackerStore>,
        processes: Arc<dyn ProcessInspector>,
        windows: Arc<dyn WindowSystem>,
        tolerance: Duration,
    ) -> Self {
        Self {
            store,
            processes,
            windows,
            tolerance,
            lock: Mutex::new(()),
        }
    }

    /// Resolves and persists the identity of `pid`.
    pub fn add(&self, pid: ProcessId) -> Result<TrackedProcessRecord, TrackerError> {
        let identity = self.processes.identity(pid)?;
        let record = TrackedProcessRecord {
            process_id: pid,
            process_name: identity.name,
            start_time_ms: identity.start_time_ms,
        };

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = self.store.load()?;
        records.retain(|r| r.process_id != pid);
        records.push(record.clone());
        self.store.save(&records)?;
        debug!("tracking pid {pid} ({})", record.process_name);
        Ok(record)
    }

    /// Forgets `pid`.  Returns `false` if it was not tracked.
    pub fn remove(&self, pid: ProcessId) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = self.store.load()?;
        let before = records.len();
        records.retain(|r| r.process_id != pid);
        if records.len() == before {
            return Ok(false);
        }
        self.store.save(&records)?;
        debug!("stopped tracking pid {pid}");
        Ok(true)
    }

    /// Forgets every process.
    pub fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.store.clear()
    }

    pub fn records(&self) -> Result<Vec<TrackedProcessRecord>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.store.load()
    }

    /// Cleans up guests orphaned by a previous host crash.  Run once at startup.
    pub fn reconcile_zombies(&self) -> Result<ReconcileReport, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let records = match self.store.load() {
            Ok(records) => records,
            Err(StoreError::Json(e)) => {
                warn!("discarding unreadable tracker file: {e}");
                self.store.clear()?;
                return Ok(ReconcileReport::default());
            }
            Err(e) => return Err(e),
        };
        let mut report = ReconcileReport::default();

        for record in &records {
            let pid = record.process_id;
            let identity = match self.processes.identity(pid) {
                Ok(identity) => identity,
                Err(ProcessError::NotFound(_)) => {
                    report.exited.push(pid);
                    continue;
                }
                Err(e) => {
                    debug!("cannot verify pid {pid}, leaving it alone: {e}");
                    report.left_running.push(pid);
                    continue;
                }
            };

            if !record.same_start_time(identity.start_time_ms, self.tolerance)
                || !record.process_name.eq_ignore_ascii_case(&identity.name)
            {
                info!("pid {pid} now belongs to {}, skipping", identity.name);
                report.skipped_pid_reuse.push(pid);
                continue;
            }

            if self.has_visible_window(pid) {
                report.left_running.push(pid);
                continue;
            }

            match self.processes.terminate(pid) {
                Ok(()) => {
                    warn!("terminated orphaned guest {} (pid {pid})", record.process_name);
                    report.killed.push(pid);
                }
                Err(e) => {
                    warn!("failed to terminate orphaned guest pid {pid}: {e}");
                    report.kill_failed.push(pid);
                }
            }
        }

        self.store.clear()?;
        if report.total() > 0 {
            info!(
                "reconciled {} tracked processes ({} killed)",
                report.total(),
                report.killed.len()
            );
        }
        Ok(report)
    }

    fn has_visible_window(&self, pid: ProcessId) -> bool {
        self.windows
            .top_level_windows()
            .into_iter()
            .filter_map(|h| self.windows.window_info(h).ok())
            .any(|info| info.process_id == pid && info.visible && !info.is_tool_window())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

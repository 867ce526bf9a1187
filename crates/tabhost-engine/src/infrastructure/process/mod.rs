//! Process inspection and control.
//!
//! The engine needs a handful of facts about guest processes: their identity
//! (name and start time) for the crash-recovery ledger, whether they run
//! elevated, whether they are still alive, and a way to terminate or launch
//! them.  All of that goes through [`ProcessInspector`].
//!
//! # Testability
//!
//! [`mock::FakeProcessTable`] is an in-memory process table used by the unit
//! and integration tests.

use std::path::{Path, PathBuf};

use tabhost_core::ProcessId;
use thiserror::Error;

pub mod mock;

#[cfg(target_os = "windows")]
pub mod windows;

/// Identity of a live process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub process_id: ProcessId,
    /// Executable file name, e.g. `notepad.exe`.
    pub name: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub start_time_ms: u64,
}

/// Error type for process operations.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("process {0} not found")]
    NotFound(ProcessId),

    #[error("access to process {0} denied")]
    AccessDenied(ProcessId),

    #[error("failed to terminate process {pid}: {message}")]
    TerminateFailed { pid: ProcessId, message: String },

    #[error("failed to query process {pid}: {message}")]
    QueryFailed { pid: ProcessId, message: String },

    #[error("failed to launch {program:?}: {source}")]
    SpawnFailed {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Trait abstracting process queries and control.
pub trait ProcessInspector: Send + Sync {
    /// The id of the process running the engine.
    fn current_process_id(&self) -> ProcessId;

    /// Resolves the identity of a live process.
    fn identity(&self, pid: ProcessId) -> Result<ProcessIdentity, ProcessError>;

    /// `true` while the process has not exited.
    fn is_running(&self, pid: ProcessId) -> bool;

    /// `true` if the process runs with an elevated token.
    fn is_elevated(&self, pid: ProcessId) -> Result<bool, ProcessError>;

    /// `true` if the engine's own process is elevated.
    fn current_is_elevated(&self) -> bool;

    /// Forcefully terminates the process.
    fn terminate(&self, pid: ProcessId) -> Result<(), ProcessError>;

    /// Launches `program` with `args` and returns the new process id.
    fn spawn(&self, program: &Path, args: &[String]) -> Result<ProcessId, ProcessError>;
}

/// Launches a program through `std::process`, detached from the engine.
///
/// The child handle is dropped immediately; the guest's lifetime is managed
/// through its windows and the tracked-process ledger, not through `wait`.
pub fn spawn_detached(program: &Path, args: &[String]) -> Result<ProcessId, ProcessError> {
    std::process::Command::new(program)
        .args(args)
        .spawn()
        .map(|child| child.id())
        .map_err(|source| ProcessError::SpawnFailed {
            program: program.to_path_buf(),
            source,
        })
}

/// Converts a Windows `FILETIME` value (100 ns ticks since 1601-01-01) into
/// milliseconds since the Unix epoch.
pub fn filetime_to_unix_ms(ticks: u64) -> u64 {
    const EPOCH_DIFFERENCE_MS: u64 = 11_644_473_600_000;
    (ticks / 10_000).saturating_sub(EPOCH_DIFFERENCE_MS)
}

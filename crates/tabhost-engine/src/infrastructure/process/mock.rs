//! In-memory process table for unit and integration testing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tabhost_core::ProcessId;

use super::{ProcessError, ProcessIdentity, ProcessInspector};

/// First pid handed out by [`FakeProcessTable::spawn`].
const FIRST_SPAWNED_PID: ProcessId = 5000;

#[derive(Debug, Clone)]
struct FakeProcess {
    identity: ProcessIdentity,
    running: bool,
    elevated: bool,
    access_denied: bool,
    terminate_fails: bool,
}

#[derive(Debug)]
struct TableState {
    processes: HashMap<ProcessId, FakeProcess>,
    current_pid: ProcessId,
    current_elevated: bool,
    next_pid: ProcessId,
    terminated: Vec<ProcessId>,
    spawned: Vec<(PathBuf, Vec<String>)>,
}

/// A recording, in-memory [`ProcessInspector`].
pub struct FakeProcessTable {
    state: Mutex<TableState>,
}

impl FakeProcessTable {
    /// Creates a table whose own (engine) process id is `current_pid`.
    pub fn new(current_pid: ProcessId) -> Self {
        Self {
            state: Mutex::new(TableState {
                processes: HashMap::new(),
                current_pid,
                current_elevated: false,
                next_pid: FIRST_SPAWNED_PID,
                terminated: Vec::new(),
                spawned: Vec::new(),
            }),
        }
    }

    /// Adds a running, non-elevated process.
    pub fn add(&self, pid: ProcessId, name: &str, start_time_ms: u64) {
        self.state.lock().expect("lock poisoned").processes.insert(
            pid,
            FakeProcess {
                identity: ProcessIdentity {
                    process_id: pid,
                    name: name.to_string(),
                    start_time_ms,
                },
                running: true,
                elevated: false,
                access_denied: false,
                terminate_fails: false,
            },
        );
    }

    pub fn set_elevated(&self, pid: ProcessId, elevated: bool) {
        self.update(pid, |p| p.elevated = elevated);
    }

    /// Makes token queries for `pid` fail with access denied.
    pub fn deny_access(&self, pid: ProcessId) {
        self.update(pid, |p| p.access_denied = true);
    }

    pub fn set_current_elevated(&self, elevated: bool) {
        self.state.lock().expect("lock poisoned").current_elevated = elevated;
    }

    /// Marks the process as exited.
    pub fn exit(&self, pid: ProcessId) {
        self.update(pid, |p| p.running = false);
    }

    /// Makes every future `terminate(pid)` fail.
    pub fn fail_terminate(&self, pid: ProcessId) {
        self.update(pid, |p| p.terminate_fails = true);
    }

    /// Pids passed to a successful `terminate`, in order.
    pub fn terminated(&self) -> Vec<ProcessId> {
        self.state.lock().expect("lock poisoned").terminated.clone()
    }

    /// Every `(program, args)` passed to `spawn`, in order.
    pub fn spawned(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.state.lock().expect("lock poisoned").spawned.clone()
    }

    /// The pid the next `spawn` will return.
    pub fn next_spawn_pid(&self) -> ProcessId {
        self.state.lock().expect("lock poisoned").next_pid
    }

    fn update(&self, pid: ProcessId, f: impl FnOnce(&mut FakeProcess)) {
        if let Some(process) = self
            .state
            .lock()
            .expect("lock poisoned")
            .processes
            .get_mut(&pid)
        {
            f(process);
        }
    }
}

impl ProcessInspector for FakeProcessTable {
    fn current_process_id(&self) -> ProcessId {
        self.state.lock().expect("lock poisoned").current_pid
    }

    fn identity(&self, pid: ProcessId) -> Result<ProcessIdentity, ProcessError> {
        let state = self.state.lock().expect("lock poisoned");
        match state.processes.get(&pid) {
            Some(p) if p.running => Ok(p.identity.clone()),
            _ => Err(ProcessError::NotFound(pid)),
        }
    }

    fn is_running(&self, pid: ProcessId) -> bool {
        let state = self.state.lock().expect("lock poisoned");
        state.processes.get(&pid).is_some_and(|p| p.running)
    }

    fn is_elevated(&self, pid: ProcessId) -> Result<bool, ProcessError> {
        let state = self.state.lock().expect("lock poisoned");
        match state.processes.get(&pid) {
            Some(p) if p.access_denied => Err(ProcessError::AccessDenied(pid)),
            Some(p) => Ok(p.elevated),
            None => Err(ProcessError::NotFound(pid)),
        }
    }

    fn current_is_elevated(&self) -> bool {
        self.state.lock().expect("lock poisoned").current_elevated
    }

    fn terminate(&self, pid: ProcessId) -> Result<(), ProcessError> {
        let mut state = self.state.lock().expect("lock poisoned");
        let process = state
            .processes
            .get_mut(&pid)
            .filter(|p| p.running)
            .ok_or(ProcessError::NotFound(pid))?;
        if process.terminate_fails {
            return Err(ProcessError::TerminateFailed {
                pid,
                message: "injected failure".to_string(),
            });
        }
        process.running = false;
        state.terminated.push(pid);
        Ok(())
    }

    fn spawn(&self, program: &Path, args: &[String]) -> Result<ProcessId, ProcessError> {
        let mut state = self.state.lock().expect("lock poisoned");
        let pid = state.next_pid;
        state.next_pid += 1;
        state.spawned.push((program.to_path_buf(), args.to_vec()));
        let name = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        state.processes.insert(
            pid,
            FakeProcess {
                identity: ProcessIdentity {
                    process_id: pid,
                    name,
                    start_time_ms: 0,
                },
                running: true,
                elevated: false,
                access_denied: false,
                terminate_fails: false,
            },
        );
        Ok(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exited_process_has_no_identity() {
        // Arrange
        let table = FakeProcessTable::new(1);
        table.add(10, "notepad.exe", 123);
        assert!(table.identity(10).is_ok());

        // Act
        table.exit(10);

        // Assert
        assert!(matches!(table.identity(10), Err(ProcessError::NotFound(10))));
        assert!(!table.is_running(10));
    }

    #[test]
    fn test_terminate_records_and_stops_process() {
        let table = FakeProcessTable::new(1);
        table.add(10, "notepad.exe", 123);

        table.terminate(10).expect("terminate should succeed");

        assert_eq!(table.terminated(), vec![10]);
        assert!(!table.is_running(10));
        assert!(table.terminate(10).is_err());
    }

    #[test]
    fn test_spawn_assigns_sequential_pids() {
        let table = FakeProcessTable::new(1);
        let first = table.next_spawn_pid();

        let pid = table
            .spawn(Path::new("C:/Windows/notepad.exe"), &["a.txt".to_string()])
            .unwrap();

        assert_eq!(pid, first);
        assert_eq!(table.identity(pid).unwrap().name, "notepad.exe");
        assert_eq!(table.next_spawn_pid(), first + 1);
        assert_eq!(table.spawned()[0].1, vec!["a.txt".to_string()]);
    }
}

//! ShutdownUseCase: wait for guest processes to exit, then escalate.
//!
//! Closing a guest application is a polite request (a close message) that the
//! guest may take its time over, show a "save changes?" prompt for, or ignore.
//! The engine therefore waits in the background:
//!
//! 1. Poll every pid at a fixed interval until all have exited.
//! 2. If the deadline passes, terminate whatever is still running and log a
//!    warning for each escalation.
//! 3. If the wait is cancelled (a newer shutdown superseded it), stop without
//!    killing anything.
//!
//! Only one shutdown wait is current at a time.  [`ShutdownCoordinator`] hands
//! out a fresh generation number and child token per shutdown and cancels the
//! previous one, so a stale result can be recognised and dropped.

use std::sync::Arc;
use std::time::Duration;

use tabhost_core::ProcessId;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::infrastructure::process::ProcessInspector;

/// What happened to each process a shutdown waited for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitReport {
    pub exited: Vec<ProcessId>,
    pub killed: Vec<ProcessId>,
    pub kill_failed: Vec<ProcessId>,
    /// `true` if the wait was cancelled before it finished.
    pub cancelled: bool,
}

impl ExitReport {
    /// `true` if every process is gone and the wait ran to completion.
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.kill_failed.is_empty()
    }
}

/// Hands out one cancellation scope per shutdown.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    root: CancellationToken,
    current: Option<CancellationToken>,
    generation: u64,
}

impl ShutdownCoordinator {
    pub fn new(root: CancellationToken) -> Self {
        Self {
            root,
            current: None,
            generation: 0,
        }
    }

    /// Starts a new shutdown, cancelling any earlier one still waiting.
    pub fn begin(&mut self) -> (u64, CancellationToken) {
        if let Some(previous) = self.current.take() {
            info!("superseding shutdown generation {}", self.generation);
            previous.cancel();
        }
        self.generation += 1;
        let token = self.root.child_token();
        self.current = Some(token.clone());
        (self.generation, token)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current.is_some() && generation == self.generation
    }

    /// Marks the current shutdown as finished.
    pub fn finish(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.current = None;
        true
    }

    pub fn in_progress(&self) -> bool {
        self.current.is_some()
    }
}

/// Waits until every pid in `pids` exits, terminating stragglers after
/// `timeout`.
pub async fn await_exit_or_kill(
    processes: Arc<dyn ProcessInspector>,
    pids: Vec<ProcessId>,
    poll_interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> ExitReport {
    let mut report = ExitReport::default();
    let mut pending = pids;
    let deadline = Instant::now() + timeout;

    loop {
        pending.retain(|pid| {
            let running = processes.is_running(*pid);
            if !running {
                report.exited.push(*pid);
            }
            running
        });
        if pending.is_empty() {
            return report;
        }
        if Instant::now() >= deadline {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                report.cancelled = true;
                return report;
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    for pid in pending {
        warn!(
            "process {pid} did not exit within {} ms, terminating",
            timeout.as_millis()
        );
        match processes.terminate(pid) {
            Ok(()) => report.killed.push(pid),
            Err(e) if !processes.is_running(pid) => {
                info!("process {pid} exited during escalation ({e})");
                report.exited.push(pid);
            }
            Err(e) => {
                warn!("failed to terminate process {pid}: {e}");
                report.kill_failed.push(pid);
            }
        }
    }
    report
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::process::mock::FakeProcessTable;

    const POLL: Duration = Duration::from_millis(1);

    fn table(pids: &[ProcessId]) -> Arc<FakeProcessTable> {
        let table = Arc::new(FakeProcessTable::new(1));
        for pid in pids {
            table.add(*pid, "guest.exe", 0);
        }
        table
    }

    #[tokio::test]
    async fn test_already_exited_processes_need_no_kill() {
        // Arrange
        let processes = table(&[10, 11]);
        processes.exit(10);
        processes.exit(11);

        // Act
        let report = await_exit_or_kill(
            processes.clone(),
            vec![10, 11],
            POLL,
            Duration::from_millis(50),
            CancellationToken::new(),
        )
        .await;

        // Assert
        assert_eq!(report.exited, vec![10, 11]);
        assert!(report.killed.is_empty());
        assert!(report.is_clean());
        assert!(processes.terminated().is_empty());
    }

    #[tokio::test]
    async fn test_process_exiting_mid_wait_is_not_killed() {
        // Arrange
        let processes = table(&[10]);
        let exiting = processes.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            exiting.exit(10);
        });

        // Act
        let report = await_exit_or_kill(
            processes.clone(),
            vec![10],
            POLL,
            Duration::from_secs(5),
            CancellationToken::new(),
        )
        .await;

        // Assert
        assert_eq!(report.exited, vec![10]);
        assert!(processes.terminated().is_empty());
    }

    #[tokio::test]
    async fn test_stragglers_are_terminated_after_timeout() {
        let processes = table(&[10, 11]);
        processes.exit(10);

        let report = await_exit_or_kill(
            processes.clone(),
            vec![10, 11],
            POLL,
            Duration::from_millis(10),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.exited, vec![10]);
        assert_eq!(report.killed, vec![11]);
        assert_eq!(processes.terminated(), vec![11]);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_failed_termination_is_reported() {
        let processes = table(&[10]);
        processes.fail_terminate(10);

        let report = await_exit_or_kill(
            processes.clone(),
            vec![10],
            POLL,
            Duration::from_millis(5),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.kill_failed, vec![10]);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_cancelled_wait_kills_nothing() {
        // Arrange
        let processes = table(&[10]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        // Act
        let report = await_exit_or_kill(
            processes.clone(),
            vec![10],
            POLL,
            Duration::from_secs(5),
            cancel,
        )
        .await;

        // Assert
        assert!(report.cancelled);
        assert!(processes.terminated().is_empty());
        assert!(processes.is_running(10));
    }

    #[test]
    fn test_new_shutdown_cancels_previous_generation() {
        // Arrange
        let mut coordinator = ShutdownCoordinator::new(CancellationToken::new());

        // Act
        let (first, first_token) = coordinator.begin();
        let (second, second_token) = coordinator.begin();

        // Assert
        assert!(first_token.is_cancelled());
        assert!(!second_token.is_cancelled());
        assert!(!coordinator.is_current(first));
        assert!(!coordinator.finish(first));
        assert!(coordinator.finish(second));
        assert!(!coordinator.in_progress());
    }

    #[test]
    fn test_root_cancellation_reaches_current_shutdown() {
        let root = CancellationToken::new();
        let mut coordinator = ShutdownCoordinator::new(root.clone());
        let (_, token) = coordinator.begin();

        root.cancel();

        assert!(token.is_cancelled());
    }
}

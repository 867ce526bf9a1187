//! AwaitWindowUseCase: bounded, cancellable polling.
//!
//! A freshly launched program needs a moment before its main window exists,
//! and a guest asked to close needs a moment before its process exits.  Both
//! waits are the same shape: probe, sleep a fixed interval, repeat a bounded
//! number of times, and stop immediately when cancelled.
//!
//! Waits run as background Tokio tasks and post their result back to the
//! control loop, so the control loop itself never blocks.

use std::future::Future;
use std::time::Duration;

use tabhost_core::{ProcessId, WindowClassRules, WindowHandle, WindowStyle};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::native::WindowSystem;

/// How long and how often to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl WaitPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            interval,
        }
    }

    /// Builds a policy that gives up after roughly `timeout`.
    pub fn for_timeout(timeout: Duration, interval: Duration) -> Self {
        let interval_ms = interval.as_millis().max(1);
        let attempts = timeout.as_millis().div_ceil(interval_ms);
        Self::new(u32::try_from(attempts).unwrap_or(u32::MAX), interval)
    }

    pub fn total(&self) -> Duration {
        self.interval * self.attempts
    }
}

/// Error type for waits.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WaitError {
    #[error("gave up after {attempts} attempts")]
    TimedOut { attempts: u32 },

    #[error("wait was cancelled")]
    Cancelled,
}

/// Calls `probe` until it yields a value, the attempts run out, or `cancel`
/// fires.
///
/// The probe runs once immediately, then once after every interval.
pub async fn wait_until<T, F>(
    policy: WaitPolicy,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<T, WaitError>
where
    F: FnMut() -> Option<T>,
{
    for attempt in 1..=policy.attempts {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled);
        }
        if let Some(value) = probe() {
            return Ok(value);
        }
        if attempt == policy.attempts {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(WaitError::Cancelled),
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }
    Err(WaitError::TimedOut {
        attempts: policy.attempts,
    })
}

/// Runs `task` unless `cancel` fires first.
pub async fn cancellable<T>(
    cancel: &CancellationToken,
    task: impl Future<Output = T>,
) -> Result<T, WaitError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(WaitError::Cancelled),
        value = task => Ok(value),
    }
}

/// The first visible, unowned, titled top-level window of `pid` that could
/// be embedded.
pub fn first_window_of(
    windows: &dyn WindowSystem,
    pid: ProcessId,
    rules: &WindowClassRules,
) -> Option<WindowHandle> {
    windows
        .top_level_windows()
        .into_iter()
        .filter_map(|h| windows.window_info(h).ok())
        .find(|info| {
            info.process_id == pid
                && info.visible
                && info.owner.is_none()
                && !info.is_tool_window()
                && !info.style.contains(WindowStyle::CHILD)
                && !info.title.trim().is_empty()
                && !rules.is_unsupported(&info.class_name)
        })
        .map(|info| info.handle)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

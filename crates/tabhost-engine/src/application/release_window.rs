//! ReleaseWindowUseCase: give a guest back to the desktop.
//!
//! Release undoes embed in reverse order:
//!
//! 1. Unhook, so none of the following steps feeds back into the engine.
//! 2. Clear the clip region.
//! 3. Detach from the host (desktop parent for true children, no owner for
//!    popups).
//! 4. Restore the original style, ex-style, and rectangle, then show-restore.
//! 5. Reconcile the taskbar: drop the engine's own registration and put the
//!    shell's entry back if the original ex-style made it a taskbar window.
//!
//! Each native step is best-effort: a failure is logged and the release
//! continues, because leaving a guest half-captured is worse than a window
//! whose rectangle is slightly off.

use std::sync::Arc;

use tabhost_core::{EmbeddedSession, HostingMode, WindowHandle};
use tracing::{info, warn};

use crate::application::hook_dispatcher::HookDispatcher;
use crate::infrastructure::native::{
    NativeError, PositionFlags, ShowCommand, TaskbarIntegration, WindowSystem,
};

/// What a release call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Detached and restored to the original attributes.
    Restored,
    /// Detached without restoring attributes.
    Detached,
    /// The window no longer exists; only the hooks were released.
    WindowGone,
    /// The session had already been released.
    AlreadyReleased,
}

/// Restores guests to the desktop.
pub struct ReleaseProtocol {
    windows: Arc<dyn WindowSystem>,
    taskbar: Arc<dyn TaskbarIntegration>,
}

impl ReleaseProtocol {
    pub fn new(windows: Arc<dyn WindowSystem>, taskbar: Arc<dyn TaskbarIntegration>) -> Self {
        Self { windows, taskbar }
    }

    /// Releases `session`.  Idempotent.
    pub fn release(
        &self,
        session: &mut EmbeddedSession,
        hooks: &HookDispatcher,
        restore: bool,
    ) -> ReleaseOutcome {
        if !session.mark_released() {
            return ReleaseOutcome::AlreadyReleased;
        }
        hooks.detach(session);

        let handle = session.handle();
        if session.is_closed() || !self.windows.is_window(handle) {
            info!("released {handle} (window already gone)");
            return ReleaseOutcome::WindowGone;
        }

        log_failure(handle, "clearing clip region", self.windows.set_clip_region(handle, None));
        let detached = match session.hosting_mode() {
            HostingMode::TrueChild => self.windows.set_parent(handle, None),
            HostingMode::RepositionedPopup => self.windows.set_owner(handle, None),
        };
        log_failure(handle, "detaching from host", detached);

        if restore {
            let original = *session.original();
            log_failure(handle, "restoring style", self.windows.set_style(handle, original.style));
            log_failure(
                handle,
                "restoring ex-style",
                self.windows.set_ex_style(handle, original.ex_style),
            );
            log_failure(
                handle,
                "restoring rectangle",
                self.windows
                    .set_position(handle, original.rect, PositionFlags::RESTYLE),
            );
        }
        log_failure(handle, "show-restore", self.windows.show(handle, ShowCommand::Restore));

        if session.taskbar_registered {
            log_failure(handle, "removing taskbar entry", self.taskbar.delete_tab(handle));
            session.taskbar_registered = false;
        }
        if session.original().ex_style.shows_in_taskbar() {
            log_failure(handle, "re-adding taskbar entry", self.taskbar.add_tab(handle));
        }

        info!("released {handle} to the desktop");
        if restore {
            ReleaseOutcome::Restored
        } else {
            ReleaseOutcome::Detached
        }
    }
}

fn log_failure(handle: WindowHandle, step: &str, result: Result<(), NativeError>) {
    if let Err(e) = result {
        warn!("release of {handle}: {step} failed: {e}");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

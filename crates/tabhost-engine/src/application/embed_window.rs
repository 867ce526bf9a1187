//! EmbedWindowUseCase: capture a foreign top-level window.
//!
//! # What does "embedding" a window mean? (for beginners)
//!
//! Every top-level window on the desktop has a frame (title bar, borders), a
//! taskbar button, and no parent.  To make another program's window look like
//! part of our host UI we:
//!
//! 1. Take a snapshot of the style bits and rectangle it has right now, so it
//!    can be put back later.
//! 2. Strip its frame bits so only the client content remains.
//! 3. Attach it to the host.  Console windows become real child windows of
//!    the host's content window (their paint pipeline needs it).  Everything
//!    else stays top-level but becomes *owned* by the host frame, which keeps
//!    it above the host in z-order and minimizes it together with the host.
//! 4. Move it onto the slot, show it, and hide or keep its taskbar button as
//!    the user's policy says.
//!
//! A failed reparent rolls back the style changes so the guest never stays
//! half-captured.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tabhost_core::{
    EmbeddedSession, HostingMode, OriginalAttributes, ProcessId, Rect, TaskbarPolicy,
    WindowClassRules, WindowHandle, WindowStyle,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::session_registry::SessionRegistry;
use crate::infrastructure::native::{
    NativeError, PositionFlags, ShowCommand, TaskbarIntegration, WindowSystem,
};
use crate::infrastructure::process::{ProcessError, ProcessInspector};

/// Reasons an embed attempt is refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmbedError {
    #[error("window {0} is already embedded")]
    AlreadyEmbedded(WindowHandle),

    #[error("process {0} runs elevated and the host does not")]
    Elevated(ProcessId),

    #[error("window {0} is not a live top-level window")]
    InvalidWindow(WindowHandle),

    #[error("window class {0:?} cannot be embedded")]
    ClassUnsupported(String),

    #[error("window {0} belongs to the host process")]
    OwnWindow(WindowHandle),

    #[error("failed to attach window to the host: {0}")]
    ReparentFailed(NativeError),
}

/// Everything the embedder needs to know about one capture.
#[derive(Debug, Clone, Copy)]
pub struct EmbedRequest {
    pub handle: WindowHandle,
    /// The host's top-level frame (owner of popup guests).
    pub host_window: WindowHandle,
    /// The host's content window (parent of true-child guests).
    pub content_window: WindowHandle,
    /// The slot to occupy, in screen coordinates.
    pub slot: Rect,
    pub taskbar: TaskbarPolicy,
}

/// Captures windows into [`EmbeddedSession`]s.
pub struct Embedder {
    windows: Arc<dyn WindowSystem>,
    taskbar: Arc<dyn TaskbarIntegration>,
    processes: Arc<dyn ProcessInspector>,
    rules: WindowClassRules,
    ignore_window: Duration,
}

impl Embedder {
    pub fn new(
        windows: Arc<dyn WindowSystem>,
        taskbar: Arc<dyn TaskbarIntegration>,
        processes: Arc<dyn ProcessInspector>,
        rules: WindowClassRules,
        ignore_window: Duration,
    ) -> Self {
        Self {
            windows,
            taskbar,
            processes,
            rules,
            ignore_window,
        }
    }

    pub fn rules(&self) -> &WindowClassRules {
        &self.rules
    }

    /// Captures `request.handle`.
    ///
    /// The returned session is not yet registered or hooked; the caller owns
    /// those steps.
    ///
    /// # Errors
    ///
    /// See [`EmbedError`].  On `ReparentFailed` the window's style bits have
    /// been restored.
    pub fn embed(
        &self,
        request: &EmbedRequest,
        registry: &SessionRegistry,
        now: Instant,
    ) -> Result<EmbeddedSession, EmbedError> {
        let handle = request.handle;
        if registry.contains(handle) {
            return Err(EmbedError::AlreadyEmbedded(handle));
        }
        if handle.is_null() || !self.windows.is_window(handle) {
            return Err(EmbedError::InvalidWindow(handle));
        }
        let info = self
            .windows
            .window_info(handle)
            .map_err(|_| EmbedError::InvalidWindow(handle))?;
        if info.style.contains(WindowStyle::CHILD) {
            return Err(EmbedError::InvalidWindow(handle));
        }
        if info.process_id == self.processes.current_process_id() {
            return Err(EmbedError::OwnWindow(handle));
        }
        if self.rules.is_unsupported(&info.class_name) {
            return Err(EmbedError::ClassUnsupported(info.class_name));
        }
        self.check_elevation(info.process_id)?;

        let mode = self.rules.hosting_mode(&info.class_name);
        let original = OriginalAttributes {
            style: info.style,
            ex_style: info.ex_style,
            rect: info.rect,
        };
        let mut session =
            EmbeddedSession::new(handle, info.process_id, mode, original, self.ignore_window);

        // ── Restyle and attach ───────────────────────────────────────────────
        let style = original.style.embedded(mode);
        let ex_style = original
            .ex_style
            .with_taskbar_visibility(!request.taskbar.is_hidden());
        if let Err(e) = self.windows.set_style(handle, style) {
            warn!("failed to strip frame of {handle}: {e}");
        }
        if let Err(e) = self.windows.set_ex_style(handle, ex_style) {
            warn!("failed to apply taskbar ex-style to {handle}: {e}");
        }

        let attached = match mode {
            HostingMode::TrueChild => self
                .windows
                .set_parent(handle, Some(request.content_window)),
            HostingMode::RepositionedPopup => {
                self.windows.set_owner(handle, Some(request.host_window))
            }
        };
        if let Err(e) = attached {
            warn!("reparenting {handle} failed, rolling back styles: {e}");
            self.rollback(handle, &original);
            return Err(EmbedError::ReparentFailed(e));
        }

        // ── Place and show ───────────────────────────────────────────────────
        let placement = self.initial_placement(mode, request);
        session.arm_gate_at(now);
        if let Err(e) = self
            .windows
            .set_position(handle, placement, PositionFlags::RESTYLE)
        {
            warn!("initial placement of {handle} failed: {e}");
        }
        if let Err(e) = self.windows.show(handle, ShowCommand::ShowNoActivate) {
            warn!("failed to show {handle}: {e}");
        }
        session.placement = Some(placement);
        session.slot = Some(request.slot);

        // ── Taskbar ──────────────────────────────────────────────────────────
        if request.taskbar.is_hidden() {
            if let Err(e) = self.taskbar.delete_tab(handle) {
                warn!("failed to remove taskbar entry of {handle}: {e}");
            }
        } else {
            match self.taskbar.add_tab(handle) {
                Ok(()) => session.taskbar_registered = true,
                Err(e) => warn!("failed to register taskbar entry of {handle}: {e}"),
            }
        }

        info!(
            "embedded {handle} (pid {}, class {:?}) as {mode:?}",
            info.process_id, info.class_name
        );
        Ok(session)
    }

    fn check_elevation(&self, pid: ProcessId) -> Result<(), EmbedError> {
        if self.processes.current_is_elevated() {
            return Ok(());
        }
        match self.processes.is_elevated(pid) {
            Ok(true) | Err(ProcessError::AccessDenied(_)) => Err(EmbedError::Elevated(pid)),
            Ok(false) => Ok(()),
            Err(e) => {
                debug!("could not determine elevation of pid {pid}: {e}");
                Ok(())
            }
        }
    }

    /// The slot origin in the coordinate space `set_position` expects.
    fn initial_placement(&self, mode: HostingMode, request: &EmbedRequest) -> Rect {
        let slot = request.slot;
        match mode {
            HostingMode::RepositionedPopup => slot,
            HostingMode::TrueChild => {
                let origin = self
                    .windows
                    .client_rect(request.content_window)
                    .map(|c| (c.x, c.y))
                    .unwrap_or((slot.x, slot.y));
                Rect::new(slot.x - origin.0, slot.y - origin.1, slot.width, slot.height)
            }
        }
    }

    fn rollback(&self, handle: WindowHandle, original: &OriginalAttributes) {
        if let Err(e) = self.windows.set_style(handle, original.style) {
            warn!("rollback of style for {handle} failed: {e}");
        }
        if let Err(e) = self.windows.set_ex_style(handle, original.ex_style) {
            warn!("rollback of ex-style for {handle} failed: {e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

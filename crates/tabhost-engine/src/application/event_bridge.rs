//! EventBridge: the guest event state machine.
//!
//! Every filtered hook event ends up in [`EventBridge::handle_event`], which
//! looks at the session it concerns and decides which [`HostAction`]s follow.
//! The bridge never calls back into the host itself; the engine executes the
//! returned actions in order.
//!
//! # Per-session state (for beginners)
//!
//! ```text
//!            MoveSizeStart                MoveSizeEnd
//!   Idle  ─────────────────►  Moving  ─────────────────►  Idle
//!    │                          │                          + MoveHostBy (rest of the drag)
//!    │ LocationChange           │ LocationChange           + SnapGuestToSlot
//!    ▼                          ▼
//!  maximized? → RestoreGuest + ToggleHostMaximize
//!  drifted?   → SnapGuestToSlot
//!                             MoveHostBy (drag delta)
//! ```
//!
//! Two mechanisms keep the engine from reacting to its own actions:
//!
//! - Each session's **ignore gate** is armed whenever the engine moves the
//!   guest; a `LocationChange` inside the gate window is an echo and is
//!   dropped.
//! - While the engine is driving guests (`host_driving_guest`), every
//!   session-level event is dropped outright.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tabhost_core::{
    EmbeddedSession, HostingMode, InteractionState, ProcessId, Rect, SuppressionLedger,
    SyncGuards, WindowClassRules, WindowHandle, WindowInfo, WindowStyle,
};
use tracing::{debug, trace};

use crate::application::hook_dispatcher::GuestEvent;
use crate::application::host::{HostAction, HostContainer};
use crate::application::session_registry::SessionRegistry;
use crate::infrastructure::native::WindowSystem;
use crate::infrastructure::process::ProcessInspector;

/// User-configured exclusions for candidate detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionFilter {
    /// Executable names, compared case-insensitively.
    pub excluded_processes: Vec<String>,
    /// Window class names, compared case-insensitively.
    pub excluded_classes: Vec<String>,
}

impl DetectionFilter {
    pub fn excludes_class(&self, class_name: &str) -> bool {
        self.excluded_classes
            .iter()
            .any(|c| c.eq_ignore_ascii_case(class_name))
    }

    pub fn excludes_process(&self, process_name: &str) -> bool {
        self.excluded_processes
            .iter()
            .any(|p| p.eq_ignore_ascii_case(process_name))
    }
}

/// Engine state the bridge reads and mutates while handling one event.
pub struct BridgeContext<'a> {
    pub sessions: &'a mut SessionRegistry,
    pub suppression: &'a mut SuppressionLedger,
    pub guards: &'a SyncGuards,
    pub host: &'a dyn HostContainer,
    pub now: Instant,
}

/// Translates guest events into host actions.
pub struct EventBridge {
    windows: Arc<dyn WindowSystem>,
    processes: Arc<dyn ProcessInspector>,
    rules: WindowClassRules,
    filter: DetectionFilter,
    host_pid: ProcessId,
    last_foreground: Option<WindowHandle>,
    /// Last observed guest rect per ongoing drag.
    drag_last: HashMap<WindowHandle, Rect>,
}

impl EventBridge {
    pub fn new(
        windows: Arc<dyn WindowSystem>,
        processes: Arc<dyn ProcessInspector>,
        rules: WindowClassRules,
        filter: DetectionFilter,
    ) -> Self {
        let host_pid = processes.current_process_id();
        Self {
            windows,
            processes,
            rules,
            filter,
            host_pid,
            last_foreground: None,
            drag_last: HashMap::new(),
        }
    }

    /// The most recent foreground window seen by the bridge.
    pub fn last_foreground(&self) -> Option<WindowHandle> {
        self.last_foreground
    }

    /// Handles one event and returns the resulting actions in execution order.
    pub fn handle_event(&mut self, event: GuestEvent, ctx: &mut BridgeContext<'_>) -> Vec<HostAction> {
        if event.is_session_level() && ctx.guards.host_driving_guest() {
            trace!("dropping {event:?} while the host drives its guests");
            return Vec::new();
        }
        match event {
            GuestEvent::MoveSizeStart(h) => self.on_move_size_start(h, ctx),
            GuestEvent::MoveSizeEnd(h) => self.on_move_size_end(h, ctx),
            GuestEvent::LocationChange(h) => self.on_location_change(h, ctx),
            GuestEvent::MinimizeStart(h) => self.on_minimize_start(h, ctx),
            GuestEvent::Destroyed(h) => self.on_destroyed(h, ctx),
            GuestEvent::Shown(h) => self.on_shown(h, ctx),
            GuestEvent::Foreground(h) => self.on_foreground(h, ctx),
        }
    }

    /// Forgets per-window bridge state for a session that went away.
    pub fn forget(&mut self, handle: WindowHandle) {
        self.drag_last.remove(&handle);
        if self.last_foreground == Some(handle) {
            self.last_foreground = None;
        }
    }

    // ── Session-level events ─────────────────────────────────────────────────

    fn on_move_size_start(&mut self, h: WindowHandle, ctx: &mut BridgeContext<'_>) -> Vec<HostAction> {
        let content = ctx.host.content_window();
        let Some(session) = ctx.sessions.get_mut(h) else {
            return Vec::new();
        };
        session.state = InteractionState::Moving;
        if let Some(rect) = self.observed_rect(session, content) {
            self.drag_last.insert(h, rect);
        }
        debug!("drag of {h} started");
        Vec::new()
    }

    fn on_move_size_end(&mut self, h: WindowHandle, ctx: &mut BridgeContext<'_>) -> Vec<HostAction> {
        let content = ctx.host.content_window();
        let Some(session) = ctx.sessions.get_mut(h) else {
            return Vec::new();
        };
        session.state = InteractionState::Idle;
        let mut actions = Vec::new();
        let last = self.drag_last.remove(&h);
        if let (Some(last), Some(current)) = (last, self.observed_rect(session, content)) {
            let (dx, dy) = (current.x - last.x, current.y - last.y);
            if dx != 0 || dy != 0 {
                actions.push(HostAction::MoveHostBy { dx, dy });
            }
        }
        actions.push(HostAction::SnapGuestToSlot(h));
        debug!("drag of {h} ended");
        actions
    }

    fn on_location_change(&mut self, h: WindowHandle, ctx: &mut BridgeContext<'_>) -> Vec<HostAction> {
        let content = ctx.host.content_window();
        let now = ctx.now;
        let Some(session) = ctx.sessions.get_mut(h) else {
            return Vec::new();
        };

        if session.state == InteractionState::Moving {
            let Some(current) = self.observed_rect(session, content) else {
                return Vec::new();
            };
            let last = self.drag_last.insert(h, current).unwrap_or(current);
            let (dx, dy) = (current.x - last.x, current.y - last.y);
            return if dx != 0 || dy != 0 {
                vec![HostAction::MoveHostBy { dx, dy }]
            } else {
                Vec::new()
            };
        }

        if session.is_gated_at(now) {
            trace!("location change of {h} is an echo");
            return Vec::new();
        }

        if self.windows.is_maximized(h) {
            if session.was_maximized {
                return Vec::new();
            }
            session.was_maximized = true;
            return vec![HostAction::RestoreGuest(h), HostAction::ToggleHostMaximize];
        }
        session.was_maximized = false;
        if self.windows.is_minimized(h) {
            return Vec::new();
        }

        match (self.observed_rect(session, content), session.placement) {
            (Some(current), Some(placement)) if current != placement => {
                debug!("{h} drifted from {placement:?} to {current:?}");
                vec![HostAction::SnapGuestToSlot(h)]
            }
            _ => Vec::new(),
        }
    }

    fn on_minimize_start(&mut self, h: WindowHandle, ctx: &mut BridgeContext<'_>) -> Vec<HostAction> {
        let now = ctx.now;
        let Some(session) = ctx.sessions.get_mut(h) else {
            return Vec::new();
        };
        if session.is_gated_at(now) {
            return Vec::new();
        }
        vec![HostAction::RestoreGuest(h), HostAction::MinimizeHost]
    }

    // ── Global events ────────────────────────────────────────────────────────

    fn on_destroyed(&mut self, h: WindowHandle, ctx: &mut BridgeContext<'_>) -> Vec<HostAction> {
        let Some(session) = ctx.sessions.get_mut(h) else {
            return Vec::new();
        };
        if !session.mark_closed() {
            return Vec::new();
        }
        self.forget(h);
        vec![HostAction::GuestClosed(h)]
    }

    fn on_shown(&mut self, h: WindowHandle, ctx: &mut BridgeContext<'_>) -> Vec<HostAction> {
        if ctx.sessions.contains(h) {
            return Vec::new();
        }
        let Ok(info) = self.windows.window_info(h) else {
            return Vec::new();
        };
        if info.process_id == self.host_pid || !ctx.sessions.owns_process(info.process_id) {
            return Vec::new();
        }

        if self.rules.is_dialog(&info) {
            let guest = info
                .owner
                .filter(|owner| ctx.sessions.contains(*owner))
                .or_else(|| ctx.sessions.session_for_process(info.process_id));
            return match guest {
                Some(guest) => vec![HostAction::PinDialog { dialog: h, guest }],
                None => Vec::new(),
            };
        }

        if self.qualifies_as_candidate(&info, ctx) {
            debug!("offering {h} ({:?}) for embedding", info.title);
            vec![HostAction::OfferCandidate(info)]
        } else {
            Vec::new()
        }
    }

    fn on_foreground(&mut self, h: WindowHandle, ctx: &mut BridgeContext<'_>) -> Vec<HostAction> {
        let prior = self.last_foreground.replace(h);
        let Some(session) = ctx.sessions.get(h) else {
            return Vec::new();
        };
        if ctx.host.is_active() {
            return Vec::new();
        }
        if let Some(prior) = prior.filter(|p| *p != h) {
            if let Ok(prior_info) = self.windows.window_info(prior) {
                if self.rules.is_ephemeral(&prior_info.class_name)
                    || prior_info.process_id == session.process_id()
                    || prior_info.process_id == self.host_pid
                {
                    trace!("foreground of {h} follows {prior}; host stays put");
                    return Vec::new();
                }
            }
        }
        vec![HostAction::BringHostToFront]
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    /// The guest's current rect in the same space as its recorded placement.
    fn observed_rect(&self, session: &EmbeddedSession, content: WindowHandle) -> Option<Rect> {
        let rect = self.windows.window_rect(session.handle()).ok()?;
        match session.hosting_mode() {
            HostingMode::RepositionedPopup => Some(rect),
            HostingMode::TrueChild => {
                let origin = self.windows.client_rect(content).ok()?;
                Some(rect.offset(-origin.x, -origin.y))
            }
        }
    }

    fn qualifies_as_candidate(&self, info: &WindowInfo, ctx: &mut BridgeContext<'_>) -> bool {
        if !info.visible
            || info.owner.is_some()
            || info.is_tool_window()
            || info.style.contains(WindowStyle::CHILD)
            || info.title.trim().is_empty()
            || self.rules.is_unsupported(&info.class_name)
            || self.filter.excludes_class(&info.class_name)
        {
            return false;
        }
        if !self.filter.excluded_processes.is_empty() {
            if let Ok(identity) = self.processes.identity(info.process_id) {
                if self.filter.excludes_process(&identity.name) {
                    return false;
                }
            }
        }
        !ctx.suppression.is_suppressed_at(info.handle, ctx.now)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! HookDispatcher: owns every native event hook the engine registers.
//!
//! Two kinds of hooks exist:
//!
//! - **Per-session** hooks (move/size, location, minimize) are registered
//!   against the guest's process when it is embedded and unregistered when it
//!   is released.  Their handles live in the session itself, so a session can
//!   never be dropped while still holding a hook without the dispatcher
//!   noticing.  Sessions of the same process share one registration per
//!   category; it is unregistered when the last of them detaches.
//! - **Global** hooks (destroy, show, foreground) are registered once for the
//!   whole desktop and live for the lifetime of the engine.
//!
//! A registration failure disables only that one category.  The engine keeps
//! working with reduced fidelity (for example, no maximize mirroring) instead
//! of refusing to embed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tabhost_core::{EmbeddedSession, HookCategory, HookHandle, ProcessId, WindowHandle};
use tracing::{debug, warn};

use crate::infrastructure::hooks::{HookEventKind, HookRegistrar, HookScope, RawHookEvent};

/// A hook event about a window, after filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestEvent {
    MoveSizeStart(WindowHandle),
    MoveSizeEnd(WindowHandle),
    LocationChange(WindowHandle),
    MinimizeStart(WindowHandle),
    Destroyed(WindowHandle),
    Shown(WindowHandle),
    Foreground(WindowHandle),
}

impl GuestEvent {
    pub fn window(&self) -> WindowHandle {
        match self {
            GuestEvent::MoveSizeStart(h)
            | GuestEvent::MoveSizeEnd(h)
            | GuestEvent::LocationChange(h)
            | GuestEvent::MinimizeStart(h)
            | GuestEvent::Destroyed(h)
            | GuestEvent::Shown(h)
            | GuestEvent::Foreground(h) => *h,
        }
    }

    /// `true` for events delivered by the per-session hooks.
    pub fn is_session_level(&self) -> bool {
        matches!(
            self,
            GuestEvent::MoveSizeStart(_)
                | GuestEvent::MoveSizeEnd(_)
                | GuestEvent::LocationChange(_)
                | GuestEvent::MinimizeStart(_)
        )
    }
}

/// Registers, tracks, and unregisters hooks.
pub struct HookDispatcher {
    registrar: Arc<dyn HookRegistrar>,
    global: Vec<(HookCategory, HookHandle)>,
    /// Per-process registrations and how many sessions hold each one.
    shared: Mutex<HashMap<(ProcessId, HookCategory), SharedHook>>,
}

#[derive(Debug, Clone, Copy)]
struct SharedHook {
    hook: HookHandle,
    holders: usize,
}

impl HookDispatcher {
    pub fn new(registrar: Arc<dyn HookRegistrar>) -> Self {
        Self {
            registrar,
            global: Vec::new(),
            shared: Mutex::new(HashMap::new()),
        }
    }

    /// Registers the desktop-wide hooks that are not registered yet.
    ///
    /// Returns the categories that failed.
    pub fn install_global(&mut self) -> Vec<HookCategory> {
        let mut failed = Vec::new();
        for category in HookCategory::GLOBAL {
            if self.global.iter().any(|(c, _)| *c == category) {
                continue;
            }
            match self.registrar.register(category, HookScope::Global) {
                Ok(hook) => self.global.push((category, hook)),
                Err(e) => {
                    warn!("global {category:?} hook unavailable, continuing without it: {e}");
                    failed.push(category);
                }
            }
        }
        failed
    }

    /// Unregisters every global hook.
    pub fn uninstall_global(&mut self) {
        for (category, hook) in self.global.drain(..) {
            if let Err(e) = self.registrar.unregister(hook) {
                warn!("failed to unregister global {category:?} hook: {e}");
            }
        }
    }

    pub fn global_hooks(&self) -> &[(HookCategory, HookHandle)] {
        &self.global
    }

    /// Registers the per-session hooks for `session`'s process, reusing the
    /// registrations of other sessions of the same process.
    ///
    /// Returns the categories that failed.
    pub fn attach(&self, session: &mut EmbeddedSession) -> Vec<HookCategory> {
        let pid = session.process_id();
        let scope = HookScope::Process(pid);
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        let mut failed = Vec::new();
        for category in HookCategory::PER_SESSION {
            if session.has_hook(category) {
                continue;
            }
            if let Some(entry) = shared.get_mut(&(pid, category)) {
                entry.holders += 1;
                session.add_hook(category, entry.hook);
                continue;
            }
            match self.registrar.register(category, scope) {
                Ok(hook) => {
                    shared.insert((pid, category), SharedHook { hook, holders: 1 });
                    session.add_hook(category, hook);
                }
                Err(e) => {
                    warn!(
                        "{category:?} hook for {} unavailable, continuing without it: {e}",
                        session.handle()
                    );
                    failed.push(category);
                }
            }
        }
        failed
    }

    /// Releases every hook held by `session`.  Safe to call twice.
    ///
    /// A shared registration is unregistered once no session holds it.
    /// Returns how many hooks the session gave up.
    pub fn detach(&self, session: &mut EmbeddedSession) -> usize {
        let pid = session.process_id();
        let hooks = session.take_hooks();
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        for (category, hook) in &hooks {
            if let Some(entry) = shared.get_mut(&(pid, *category)) {
                if entry.hook == *hook && entry.holders > 1 {
                    entry.holders -= 1;
                    continue;
                }
                if entry.hook == *hook {
                    shared.remove(&(pid, *category));
                }
            }
            if let Err(e) = self.registrar.unregister(*hook) {
                debug!(
                    "unregistering {category:?} hook of {} failed: {e}",
                    session.handle()
                );
            }
        }
        hooks.len()
    }
}

/// Filters a raw callback down to a [`GuestEvent`].
///
/// Events about sub-objects (caret, scroll bars, menu items) are dropped.
pub fn translate(event: &RawHookEvent) -> Option<GuestEvent> {
    if !event.targets_window() {
        return None;
    }
    let window = event.window;
    Some(match event.kind {
        HookEventKind::MoveSizeStart => GuestEvent::MoveSizeStart(window),
        HookEventKind::MoveSizeEnd => GuestEvent::MoveSizeEnd(window),
        HookEventKind::LocationChange => GuestEvent::LocationChange(window),
        HookEventKind::MinimizeStart => GuestEvent::MinimizeStart(window),
        HookEventKind::Destroy => GuestEvent::Destroyed(window),
        HookEventKind::Show => GuestEvent::Shown(window),
        HookEventKind::Foreground => GuestEvent::Foreground(window),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

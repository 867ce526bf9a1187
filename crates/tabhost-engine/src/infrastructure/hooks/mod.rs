//! WinEvent hook infrastructure.
//!
//! The engine learns about guest activity (drag start/end, moves, minimize,
//! destruction, new windows, focus changes) through out-of-context WinEvent
//! hooks.  Each [`HookCategory`] maps to one event range; per-session
//! categories are registered against the guest's process, global ones against
//! the whole desktop.
//!
//! # Callback discipline
//!
//! Hook callbacks run on the hook thread, never on the engine's control task.
//! They do nothing except build a [`RawHookEvent`] and hand it to the
//! [`HookSink`], which posts it to the control queue and returns.  All state
//! changes happen later, serially, on the control task.
//!
//! # Testability
//!
//! The [`HookRegistrar`] trait lets tests use [`mock::MockHookRegistrar`],
//! which records registrations, can fail chosen categories, and can emit
//! synthetic events.

use std::sync::Arc;

use tabhost_core::{HookCategory, HookHandle, ProcessId, WindowHandle};
use thiserror::Error;

pub mod mock;

#[cfg(target_os = "windows")]
pub mod windows;

// ── Native event identifiers ──────────────────────────────────────────────────

pub const EVENT_SYSTEM_FOREGROUND: u32 = 0x0003;
pub const EVENT_SYSTEM_MOVESIZESTART: u32 = 0x000A;
pub const EVENT_SYSTEM_MOVESIZEEND: u32 = 0x000B;
pub const EVENT_SYSTEM_MINIMIZESTART: u32 = 0x0016;
pub const EVENT_OBJECT_DESTROY: u32 = 0x8001;
pub const EVENT_OBJECT_SHOW: u32 = 0x8002;
pub const EVENT_OBJECT_LOCATIONCHANGE: u32 = 0x800B;

/// `idObject` of events that concern the window itself.
pub const OBJID_WINDOW: i32 = 0;
/// `idChild` of events that concern the object itself, not a sub-element.
pub const CHILDID_SELF: i32 = 0;

/// Returns the inclusive `(eventMin, eventMax)` range registered for `category`.
pub fn event_range(category: HookCategory) -> (u32, u32) {
    match category {
        HookCategory::MoveSize => (EVENT_SYSTEM_MOVESIZESTART, EVENT_SYSTEM_MOVESIZEEND),
        HookCategory::Location => (EVENT_OBJECT_LOCATIONCHANGE, EVENT_OBJECT_LOCATIONCHANGE),
        HookCategory::Minimize => (EVENT_SYSTEM_MINIMIZESTART, EVENT_SYSTEM_MINIMIZESTART),
        HookCategory::Destroy => (EVENT_OBJECT_DESTROY, EVENT_OBJECT_DESTROY),
        HookCategory::Show => (EVENT_OBJECT_SHOW, EVENT_OBJECT_SHOW),
        HookCategory::Foreground => (EVENT_SYSTEM_FOREGROUND, EVENT_SYSTEM_FOREGROUND),
    }
}

// ── Event types ───────────────────────────────────────────────────────────────

/// The native event kinds the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEventKind {
    MoveSizeStart,
    MoveSizeEnd,
    LocationChange,
    MinimizeStart,
    Destroy,
    Show,
    Foreground,
}

impl HookEventKind {
    /// Maps a native event id to a kind.  Unknown ids yield `None`.
    pub fn from_event(event: u32) -> Option<Self> {
        match event {
            EVENT_SYSTEM_MOVESIZESTART => Some(Self::MoveSizeStart),
            EVENT_SYSTEM_MOVESIZEEND => Some(Self::MoveSizeEnd),
            EVENT_OBJECT_LOCATIONCHANGE => Some(Self::LocationChange),
            EVENT_SYSTEM_MINIMIZESTART => Some(Self::MinimizeStart),
            EVENT_OBJECT_DESTROY => Some(Self::Destroy),
            EVENT_OBJECT_SHOW => Some(Self::Show),
            EVENT_SYSTEM_FOREGROUND => Some(Self::Foreground),
            _ => None,
        }
    }
}

/// A hook callback, exactly as delivered by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHookEvent {
    pub hook: HookHandle,
    pub kind: HookEventKind,
    pub window: WindowHandle,
    pub object_id: i32,
    pub child_id: i32,
    pub thread_id: u32,
    /// Milliseconds since system start.
    pub timestamp_ms: u32,
}

impl RawHookEvent {
    /// Builds an event about the window object itself.
    pub fn for_window(hook: HookHandle, kind: HookEventKind, window: WindowHandle) -> Self {
        Self {
            hook,
            kind,
            window,
            object_id: OBJID_WINDOW,
            child_id: CHILDID_SELF,
            thread_id: 0,
            timestamp_ms: 0,
        }
    }

    /// `true` if the event concerns the window itself rather than a caret,
    /// scrollbar, or other sub-object.
    pub fn targets_window(&self) -> bool {
        self.object_id == OBJID_WINDOW && self.child_id == CHILDID_SELF && !self.window.is_null()
    }
}

/// Where a hook listens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookScope {
    /// Events from one process only.
    Process(ProcessId),
    /// Events from every process on the desktop.
    Global,
}

impl HookScope {
    /// The `idProcess` argument of the native registration.
    pub fn process_id(&self) -> u32 {
        match self {
            HookScope::Process(pid) => *pid,
            HookScope::Global => 0,
        }
    }
}

/// Receives raw events from the hook thread.
pub type HookSink = Arc<dyn Fn(RawHookEvent) + Send + Sync>;

/// Error type for hook registration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error("failed to register {category:?} hook: {reason}")]
    RegistrationFailed {
        category: HookCategory,
        reason: String,
    },

    #[error("hook {0:?} is not registered")]
    UnknownHook(HookHandle),

    #[error("hook thread is not running: {0}")]
    Unavailable(String),
}

/// Trait abstracting native hook registration.
///
/// The production implementation uses `SetWinEventHook`; tests use
/// [`mock::MockHookRegistrar`].
pub trait HookRegistrar: Send + Sync {
    /// Registers one category of events for `scope`.
    fn register(&self, category: HookCategory, scope: HookScope) -> Result<HookHandle, HookError>;

    /// Unregisters a hook.  Events already queued may still arrive afterwards.
    fn unregister(&self, hook: HookHandle) -> Result<(), HookError>;
}

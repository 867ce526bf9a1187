//! The embedded-session record.
//!
//! An [`EmbeddedSession`] exists for exactly as long as one guest window is
//! captured.  It carries two kinds of data:
//!
//! - **Original attributes** ([`OriginalAttributes`]): the style, ex-style and
//!   rectangle the window had *before* capture.  They are captured once in
//!   [`EmbeddedSession::new`] and there is no API to change them, so release
//!   always restores what the window looked like when it was embedded.
//! - **Live state**: hook handles, taskbar registration, interaction state,
//!   the placement the engine last applied, and the echo gate.

use std::time::{Duration, Instant};

use super::geometry::Rect;
use super::sync_gate::IgnoreGate;
use super::tiling::TileGroupId;
use super::window::{ExtendedStyle, HostingMode, ProcessId, WindowHandle, WindowStyle};

/// Opaque identifier of a registered native event hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookHandle(pub u64);

/// The event categories the engine subscribes to.
///
/// Per-session categories are registered against the guest's process; global
/// categories are registered once for the whole desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookCategory {
    /// Move/size loop start and end.
    MoveSize,
    /// Object location changes.
    Location,
    /// Minimize start.
    Minimize,
    /// Window destruction (global).
    Destroy,
    /// Window shown (global).
    Show,
    /// Foreground changes (global).
    Foreground,
}

impl HookCategory {
    pub const PER_SESSION: [HookCategory; 3] = [
        HookCategory::MoveSize,
        HookCategory::Location,
        HookCategory::Minimize,
    ];

    pub const GLOBAL: [HookCategory; 3] = [
        HookCategory::Destroy,
        HookCategory::Show,
        HookCategory::Foreground,
    ];
}

/// Whether the user is currently dragging/resizing the guest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InteractionState {
    #[default]
    Idle,
    Moving,
}

/// Attributes captured at embed time and restored at release time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginalAttributes {
    pub style: WindowStyle,
    pub ex_style: ExtendedStyle,
    pub rect: Rect,
}

/// One captured guest window.
#[derive(Debug, Clone)]
pub struct EmbeddedSession {
    handle: WindowHandle,
    process_id: ProcessId,
    hosting_mode: HostingMode,
    original: OriginalAttributes,
    closed: bool,
    released: bool,
    hooks: Vec<(HookCategory, HookHandle)>,
    /// `true` while the engine holds its own taskbar registration for the guest.
    pub taskbar_registered: bool,
    pub state: InteractionState,
    pub was_maximized: bool,
    /// The rectangle the engine last applied, in the coordinate space of the
    /// hosting mode (parent-relative for true children, screen otherwise).
    pub placement: Option<Rect>,
    /// The slot the session is currently assigned, in screen coordinates.
    pub slot: Option<Rect>,
    pub gate: IgnoreGate,
    /// Non-owning back-reference to the tile group this session belongs to.
    pub group: Option<TileGroupId>,
}

impl EmbeddedSession {
    pub fn new(
        handle: WindowHandle,
        process_id: ProcessId,
        hosting_mode: HostingMode,
        original: OriginalAttributes,
        ignore_window: Duration,
    ) -> Self {
        Self {
            handle,
            process_id,
            hosting_mode,
            original,
            closed: false,
            released: false,
            hooks: Vec::new(),
            taskbar_registered: false,
            state: InteractionState::Idle,
            was_maximized: false,
            placement: None,
            slot: None,
            gate: IgnoreGate::new(ignore_window),
            group: None,
        }
    }

    pub fn handle(&self) -> WindowHandle {
        self.handle
    }

    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn hosting_mode(&self) -> HostingMode {
        self.hosting_mode
    }

    pub fn original(&self) -> &OriginalAttributes {
        &self.original
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Marks the guest as closed.
    ///
    /// Returns `true` only for the first call, so a destroy notification that
    /// arrives twice produces a single "guest closed" outcome.
    pub fn mark_closed(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        true
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Marks the session as released.  Returns `true` only for the first call.
    pub fn mark_released(&mut self) -> bool {
        !std::mem::replace(&mut self.released, true)
    }

    pub fn add_hook(&mut self, category: HookCategory, hook: HookHandle) {
        self.hooks.push((category, hook));
    }

    pub fn hooks(&self) -> &[(HookCategory, HookHandle)] {
        &self.hooks
    }

    pub fn has_hook(&self, category: HookCategory) -> bool {
        self.hooks.iter().any(|(c, _)| *c == category)
    }

    /// Removes and returns every hook handle.  A second call returns nothing.
    pub fn take_hooks(&mut self) -> Vec<(HookCategory, HookHandle)> {
        std::mem::take(&mut self.hooks)
    }

    /// Arms the echo gate at `now`.
    pub fn arm_gate_at(&mut self, now: Instant) {
        self.gate.arm_at(now);
    }

    pub fn is_gated_at(&mut self, now: Instant) -> bool {
        self.gate.is_armed_at(now)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! The host application as seen from the engine.
//!
//! The engine never draws anything itself.  Everything it needs from the host
//! UI goes through two small seams:
//!
//! - [`HostContainer`] answers "where is the slot?" and "is the host active?",
//!   and receives [`HostAction`]s: requests such as "move yourself by this
//!   delta" or notifications such as "this guest has closed".
//! - [`PolicyProvider`] answers the user-facing policy questions (taskbar
//!   visibility, close behavior) at the moment the engine needs them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tabhost_core::{CloseBehavior, Rect, TaskbarPolicy, WindowHandle, WindowInfo};

/// A request or notification from the engine to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    /// The user dragged a guest; move the host window by the same delta.
    MoveHostBy { dx: i32, dy: i32 },
    /// A guest was maximized; maximize (or restore) the host instead.
    ToggleHostMaximize,
    /// A guest was minimized; minimize the host instead.
    MinimizeHost,
    /// A guest was activated while the host was in the background.
    BringHostToFront,
    /// Undo an OS-level maximize/minimize of the guest.
    RestoreGuest(WindowHandle),
    /// Re-apply the layout to a guest that drifted from its slot.
    SnapGuestToSlot(WindowHandle),
    /// The guest window was destroyed by its owner.
    GuestClosed(WindowHandle),
    /// A new top-level window from a guest process may be embedded.
    OfferCandidate(WindowInfo),
    /// A guest opened a modal dialog; keep it above the host.
    PinDialog {
        dialog: WindowHandle,
        guest: WindowHandle,
    },
    /// The close policy asks the host to exit.
    ExitHost,
}

/// The host window and its content area.
pub trait HostContainer: Send + Sync {
    /// The host's top-level frame window.
    fn host_window(&self) -> WindowHandle;

    /// The child window guests are embedded into.
    fn content_window(&self) -> WindowHandle;

    /// The slot guests are laid out in, in screen coordinates.
    ///
    /// `None` while the host has no usable content area (destroyed or not
    /// yet shown).
    fn slot_rect(&self) -> Option<Rect>;

    /// `true` while the host (or one of its guests) has foreground activation.
    fn is_active(&self) -> bool;

    /// Carries out or records one action.
    fn apply(&self, action: &HostAction);
}

/// Read-only access to the host's policy settings.
pub trait PolicyProvider: Send + Sync {
    fn hide_guests_from_taskbar(&self) -> bool;

    fn close_behavior(&self) -> CloseBehavior;

    fn taskbar_policy(&self) -> TaskbarPolicy {
        TaskbarPolicy::from_hide_flag(self.hide_guests_from_taskbar())
    }
}

/// A [`PolicyProvider`] holding plain values that can be changed at runtime.
#[derive(Debug)]
pub struct StaticPolicy {
    hide_from_taskbar: AtomicBool,
    close_behavior: Mutex<CloseBehavior>,
}

impl StaticPolicy {
    pub fn new(hide_from_taskbar: bool, close_behavior: CloseBehavior) -> Self {
        Self {
            hide_from_taskbar: AtomicBool::new(hide_from_taskbar),
            close_behavior: Mutex::new(close_behavior),
        }
    }

    pub fn set_hide_guests_from_taskbar(&self, hide: bool) {
        self.hide_from_taskbar.store(hide, Ordering::Relaxed);
    }

    pub fn set_close_behavior(&self, behavior: CloseBehavior) {
        if let Ok(mut current) = self.close_behavior.lock() {
            *current = behavior;
        }
    }
}

impl Default for StaticPolicy {
    fn default() -> Self {
        Self::new(true, CloseBehavior::default())
    }
}

impl PolicyProvider for StaticPolicy {
    fn hide_guests_from_taskbar(&self) -> bool {
        self.hide_from_taskbar.load(Ordering::Relaxed)
    }

    fn close_behavior(&self) -> CloseBehavior {
        self.close_behavior
            .lock()
            .map(|b| *b)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_policy_defaults() {
        let policy = StaticPolicy::default();
        assert!(policy.hide_guests_from_taskbar());
        assert_eq!(policy.close_behavior(), CloseBehavior::ReleaseToDesktop);
        assert_eq!(policy.taskbar_policy(), TaskbarPolicy::Hide);
    }

    #[test]
    fn test_static_policy_changes_apply_immediately() {
        // Arrange
        let policy = StaticPolicy::default();

        // Act
        policy.set_hide_guests_from_taskbar(false);
        policy.set_close_behavior(CloseBehavior::CloseHostApp);

        // Assert
        assert_eq!(policy.taskbar_policy(), TaskbarPolicy::Show);
        assert_eq!(policy.close_behavior(), CloseBehavior::CloseHostApp);
    }
}

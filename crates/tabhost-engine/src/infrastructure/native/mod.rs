//! Native window-system adapter.
//!
//! Every Win32 call the engine makes against a window goes through the
//! [`WindowSystem`] trait: reading attributes, rewriting styles, reparenting,
//! positioning, clipping, and show-state changes.  Taskbar button management
//! is a separate, smaller seam ([`TaskbarIntegration`]) because it is backed
//! by a COM object rather than plain window calls.
//!
//! # Coordinate conventions
//!
//! - [`WindowSystem::window_rect`] and [`WindowSystem::client_rect`] always
//!   answer in **screen** coordinates.
//! - [`WindowSystem::set_position`] takes a rectangle in the coordinate space
//!   of the window's parent: parent-client coordinates for a child window,
//!   screen coordinates for a top-level window.  This is what `SetWindowPos`
//!   itself expects.
//!
//! # Testability
//!
//! [`mock::FakeDesktop`] is an in-memory desktop implementing both traits.
//! It records every call so tests can assert on order and arguments.

use tabhost_core::{ExtendedStyle, Rect, WindowHandle, WindowInfo, WindowStyle};
use thiserror::Error;

pub mod mock;

#[cfg(target_os = "windows")]
pub mod windows;

/// Error type for native window operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NativeError {
    /// The handle does not (or no longer) identify a window.
    #[error("window {0} does not exist")]
    InvalidWindow(WindowHandle),

    /// A native call returned failure.
    #[error("{call} failed for window {handle}: {message}")]
    CallFailed {
        call: &'static str,
        handle: WindowHandle,
        message: String,
    },

    /// The operation is not available on this platform.
    #[error("platform not supported: {0}")]
    UnsupportedPlatform(String),
}

/// Show-state commands understood by [`WindowSystem::show`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShowCommand {
    /// Show without taking activation.
    ShowNoActivate,
    Hide,
    /// Restore from minimized or maximized.
    Restore,
    Minimize,
    Maximize,
}

/// Flags accompanying [`WindowSystem::set_position`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PositionFlags {
    /// Discard the window's current client contents instead of copying them
    /// to the new position (`SWP_NOCOPYBITS`).
    pub no_copy_bits: bool,
    /// Do not activate the window (`SWP_NOACTIVATE`).
    pub no_activate: bool,
    /// Keep the current z-order (`SWP_NOZORDER`).
    pub no_z_order: bool,
    /// Re-evaluate the non-client area after a style change (`SWP_FRAMECHANGED`).
    pub frame_changed: bool,
}

impl PositionFlags {
    /// Flags used for every engine-driven layout pass.
    pub const LAYOUT: PositionFlags = PositionFlags {
        no_copy_bits: true,
        no_activate: true,
        no_z_order: true,
        frame_changed: false,
    };

    /// Flags used right after rewriting a window's style bits.
    pub const RESTYLE: PositionFlags = PositionFlags {
        no_copy_bits: true,
        no_activate: true,
        no_z_order: true,
        frame_changed: true,
    };
}

/// Abstraction over the native window manager.
///
/// The production implementation calls Win32; tests use [`mock::FakeDesktop`].
pub trait WindowSystem: Send + Sync {
    /// Returns `true` if `handle` identifies a live window.
    fn is_window(&self, handle: WindowHandle) -> bool;

    /// Reads a snapshot of the window's attributes.
    fn window_info(&self, handle: WindowHandle) -> Result<WindowInfo, NativeError>;

    /// The window rectangle, including the non-client area, in screen coordinates.
    fn window_rect(&self, handle: WindowHandle) -> Result<Rect, NativeError>;

    /// The client rectangle in screen coordinates.
    fn client_rect(&self, handle: WindowHandle) -> Result<Rect, NativeError>;

    fn set_style(&self, handle: WindowHandle, style: WindowStyle) -> Result<(), NativeError>;

    fn set_ex_style(&self, handle: WindowHandle, ex_style: ExtendedStyle)
        -> Result<(), NativeError>;

    /// Makes `handle` a child of `parent`, or a top-level window when `parent`
    /// is `None`.
    fn set_parent(
        &self,
        handle: WindowHandle,
        parent: Option<WindowHandle>,
    ) -> Result<(), NativeError>;

    /// Sets (or clears) the owner of a top-level window.
    fn set_owner(&self, handle: WindowHandle, owner: Option<WindowHandle>)
        -> Result<(), NativeError>;

    /// Moves and sizes the window.  See the module docs for coordinates.
    fn set_position(
        &self,
        handle: WindowHandle,
        rect: Rect,
        flags: PositionFlags,
    ) -> Result<(), NativeError>;

    /// Places `handle` directly behind `above` in the z-order without moving
    /// or activating it.
    fn place_behind(&self, handle: WindowHandle, above: WindowHandle) -> Result<(), NativeError>;

    /// Applies a window-relative clip region, or removes it when `region` is
    /// `None`.
    fn set_clip_region(&self, handle: WindowHandle, region: Option<Rect>)
        -> Result<(), NativeError>;

    fn show(&self, handle: WindowHandle, command: ShowCommand) -> Result<(), NativeError>;

    fn is_minimized(&self, handle: WindowHandle) -> bool;

    fn is_maximized(&self, handle: WindowHandle) -> bool;

    /// The window that currently has foreground activation, if any.
    fn foreground_window(&self) -> Option<WindowHandle>;

    fn set_foreground(&self, handle: WindowHandle) -> Result<(), NativeError>;

    /// Posts a non-blocking close request (`WM_CLOSE`).
    fn post_close(&self, handle: WindowHandle) -> Result<(), NativeError>;

    /// Enumerates every top-level window on the desktop.
    fn top_level_windows(&self) -> Vec<WindowHandle>;
}

/// Abstraction over the shell taskbar's button list (`ITaskbarList`).
pub trait TaskbarIntegration: Send + Sync {
    /// Adds a taskbar button for `handle`.
    fn add_tab(&self, handle: WindowHandle) -> Result<(), NativeError>;

    /// Removes the taskbar button for `handle`.
    fn delete_tab(&self, handle: WindowHandle) -> Result<(), NativeError>;
}

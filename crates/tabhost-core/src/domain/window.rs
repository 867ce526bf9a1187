//! Window identity, style bitmasks, and window-class rules.
//!
//! # Why window classes matter (for beginners)
//!
//! Every native window is created from a *window class*: a registered name
//! such as `"ConsoleWindowClass"`, `"#32770"` (the standard dialog) or
//! `"Shell_TrayWnd"` (the taskbar itself).  The class tells the engine a lot
//! about how the window will behave once captured:
//!
//! - A few classes paint correctly only as *real child windows*.  Those are
//!   embedded in [`HostingMode::TrueChild`].
//! - Everything else (modern UI frameworks in particular) breaks its own
//!   rendering and input pipeline when forced to be a child, so it stays a
//!   top-level window that the engine repositions and clips:
//!   [`HostingMode::RepositionedPopup`].
//! - Menus, tooltips, IME windows, and shell surfaces must never be captured.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::geometry::Rect;

/// Operating-system process identifier.
pub type ProcessId = u32;

/// Opaque identifier for a native top-level window.
///
/// The value is the raw handle widened to 64 bits.  Keeping it as a plain
/// integer makes it `Send`, hashable, and printable, which raw pointer-based
/// handle types are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowHandle(pub u64);

impl WindowHandle {
    /// The null handle.  Used as "desktop root" when reparenting.
    pub const NULL: WindowHandle = WindowHandle(0);

    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Window style bitmask (`GWL_STYLE`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WindowStyle(pub u32);

impl WindowStyle {
    pub const BORDER: u32 = 0x0080_0000;
    pub const DLGFRAME: u32 = 0x0040_0000;
    /// `WS_CAPTION` is `WS_BORDER | WS_DLGFRAME`.
    pub const CAPTION: u32 = 0x00C0_0000;
    pub const SYSMENU: u32 = 0x0008_0000;
    pub const THICKFRAME: u32 = 0x0004_0000;
    pub const MINIMIZEBOX: u32 = 0x0002_0000;
    pub const MAXIMIZEBOX: u32 = 0x0001_0000;
    pub const CHILD: u32 = 0x4000_0000;
    pub const POPUP: u32 = 0x8000_0000;
    pub const VISIBLE: u32 = 0x1000_0000;
    pub const MINIMIZE: u32 = 0x2000_0000;
    pub const MAXIMIZE: u32 = 0x0100_0000;

    /// Every bit that draws or reacts to a native frame.
    pub const FRAME_BITS: u32 = Self::CAPTION
        | Self::THICKFRAME
        | Self::SYSMENU
        | Self::BORDER
        | Self::DLGFRAME
        | Self::MINIMIZEBOX
        | Self::MAXIMIZEBOX;

    pub const fn contains(&self, bits: u32) -> bool {
        self.0 & bits == bits
    }

    pub const fn with(self, bits: u32) -> Self {
        Self(self.0 | bits)
    }

    pub const fn without(self, bits: u32) -> Self {
        Self(self.0 & !bits)
    }

    /// Computes the style a captured window receives in `mode`.
    ///
    /// The frame is always stripped.  A true child also becomes `WS_CHILD`,
    /// which is mutually exclusive with `WS_POPUP`.
    pub const fn embedded(self, mode: HostingMode) -> Self {
        let stripped = self.without(Self::FRAME_BITS);
        match mode {
            HostingMode::TrueChild => stripped.without(Self::POPUP).with(Self::CHILD),
            HostingMode::RepositionedPopup => stripped.without(Self::CHILD),
        }
    }
}

/// Extended window style bitmask (`GWL_EXSTYLE`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ExtendedStyle(pub u32);

impl ExtendedStyle {
    pub const DLGMODALFRAME: u32 = 0x0000_0001;
    pub const TOPMOST: u32 = 0x0000_0008;
    pub const TOOLWINDOW: u32 = 0x0000_0080;
    pub const APPWINDOW: u32 = 0x0004_0000;
    pub const LAYERED: u32 = 0x0008_0000;
    pub const NOACTIVATE: u32 = 0x0800_0000;

    pub const fn contains(&self, bits: u32) -> bool {
        self.0 & bits == bits
    }

    pub const fn with(self, bits: u32) -> Self {
        Self(self.0 | bits)
    }

    pub const fn without(self, bits: u32) -> Self {
        Self(self.0 & !bits)
    }

    /// Applies the taskbar-visibility policy.
    ///
    /// The shell shows a button for a window with `WS_EX_APPWINDOW` and hides
    /// it for `WS_EX_TOOLWINDOW`, so exactly one of the two is set.
    pub const fn with_taskbar_visibility(self, visible: bool) -> Self {
        if visible {
            self.without(Self::TOOLWINDOW).with(Self::APPWINDOW)
        } else {
            self.without(Self::APPWINDOW).with(Self::TOOLWINDOW)
        }
    }

    /// Returns `true` if a window with this ex-style gets a taskbar button.
    pub const fn shows_in_taskbar(&self) -> bool {
        !self.contains(Self::TOOLWINDOW)
    }
}

/// How a captured window is attached to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostingMode {
    /// A real child of the host content window, clipped by its parent.
    TrueChild,
    /// A top-level window owned by the host, repositioned and clipped by hand.
    RepositionedPopup,
}

/// Snapshot of the attributes of one native window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub process_id: ProcessId,
    pub class_name: String,
    pub title: String,
    pub style: WindowStyle,
    pub ex_style: ExtendedStyle,
    /// Window rectangle in screen coordinates.
    pub rect: Rect,
    pub visible: bool,
    /// The owner window, if any (`GW_OWNER`).
    pub owner: Option<WindowHandle>,
}

impl WindowInfo {
    /// Returns `true` for windows the shell treats as tool windows.
    pub fn is_tool_window(&self) -> bool {
        self.ex_style.contains(ExtendedStyle::TOOLWINDOW)
    }
}

// ── Class rules ───────────────────────────────────────────────────────────────

/// Class whose paint pipeline assumes true-child semantics.
pub const DEFAULT_TRUE_CHILD_CLASSES: &[&str] = &["ConsoleWindowClass"];

/// Classes that are never embedded.
pub const DEFAULT_UNSUPPORTED_CLASSES: &[&str] = &[
    "#32768", // menu
    "#32770", // standard dialog, pinned instead of embedded
    "Shell_TrayWnd",
    "Shell_SecondaryTrayWnd",
    "Progman",
    "WorkerW",
    "tooltips_class32",
    "IME",
    "MSCTFIME UI",
    "SysShadow",
    "Windows.UI.Core.CoreWindow",
    "TaskManagerWindow",
    "NotifyIconOverflowWindow",
];

/// Short-lived classes whose foreground activation is never a real focus switch.
pub const DEFAULT_EPHEMERAL_CLASSES: &[&str] = &[
    "#32768",
    "tooltips_class32",
    "IME",
    "MSCTFIME UI",
    "SysShadow",
    "Xaml_WindowedPopupClass",
    "DropDown",
];

/// Classes treated as dialogs when spawned by a guest process.
pub const DEFAULT_DIALOG_CLASSES: &[&str] = &["#32770"];

/// Class-name based decisions about embeddability.
///
/// Comparisons are case-insensitive because class atoms are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClassRules {
    pub true_child_classes: Vec<String>,
    pub unsupported_classes: Vec<String>,
    pub ephemeral_classes: Vec<String>,
    pub dialog_classes: Vec<String>,
}

impl Default for WindowClassRules {
    fn default() -> Self {
        fn owned(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }
        Self {
            true_child_classes: owned(DEFAULT_TRUE_CHILD_CLASSES),
            unsupported_classes: owned(DEFAULT_UNSUPPORTED_CLASSES),
            ephemeral_classes: owned(DEFAULT_EPHEMERAL_CLASSES),
            dialog_classes: owned(DEFAULT_DIALOG_CLASSES),
        }
    }
}

impl WindowClassRules {
    /// Chooses the hosting mode for a window of class `class_name`.
    pub fn hosting_mode(&self, class_name: &str) -> HostingMode {
        if contains_class(&self.true_child_classes, class_name) {
            HostingMode::TrueChild
        } else {
            HostingMode::RepositionedPopup
        }
    }

    pub fn is_unsupported(&self, class_name: &str) -> bool {
        contains_class(&self.unsupported_classes, class_name)
    }

    pub fn is_ephemeral(&self, class_name: &str) -> bool {
        contains_class(&self.ephemeral_classes, class_name)
    }

    /// Returns `true` if `info` looks like a modal dialog.
    pub fn is_dialog(&self, info: &WindowInfo) -> bool {
        contains_class(&self.dialog_classes, &info.class_name)
            || info.ex_style.contains(ExtendedStyle::DLGMODALFRAME)
    }
}

fn contains_class(list: &[String], class_name: &str) -> bool {
    list.iter().any(|c| c.eq_ignore_ascii_case(class_name))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_style_strips_frame_for_popup() {
        // Arrange: a typical overlapped window
        let original = WindowStyle(
            WindowStyle::CAPTION
                | WindowStyle::THICKFRAME
                | WindowStyle::SYSMENU
                | WindowStyle::MINIMIZEBOX
                | WindowStyle::MAXIMIZEBOX
                | WindowStyle::VISIBLE,
        );

        // Act
        let embedded = original.embedded(HostingMode::RepositionedPopup);

        // Assert
        assert_eq!(embedded, WindowStyle(WindowStyle::VISIBLE));
    }

    #[test]
    fn test_embedded_style_for_true_child_sets_child_and_clears_popup() {
        let original = WindowStyle(WindowStyle::POPUP | WindowStyle::CAPTION);
        let embedded = original.embedded(HostingMode::TrueChild);
        assert!(embedded.contains(WindowStyle::CHILD));
        assert!(!embedded.contains(WindowStyle::POPUP));
        assert!(!embedded.contains(WindowStyle::BORDER));
    }

    #[test]
    fn test_taskbar_visibility_toggles_tool_and_app_bits() {
        let hidden = ExtendedStyle(ExtendedStyle::APPWINDOW).with_taskbar_visibility(false);
        assert!(hidden.contains(ExtendedStyle::TOOLWINDOW));
        assert!(!hidden.contains(ExtendedStyle::APPWINDOW));
        assert!(!hidden.shows_in_taskbar());

        let shown = hidden.with_taskbar_visibility(true);
        assert!(shown.contains(ExtendedStyle::APPWINDOW));
        assert!(shown.shows_in_taskbar());
    }

    #[test]
    fn test_hosting_mode_classification() {
        let rules = WindowClassRules::default();
        assert_eq!(rules.hosting_mode("ConsoleWindowClass"), HostingMode::TrueChild);
        assert_eq!(rules.hosting_mode("consolewindowclass"), HostingMode::TrueChild);
        assert_eq!(
            rules.hosting_mode("Chrome_WidgetWin_1"),
            HostingMode::RepositionedPopup
        );
    }

    #[test]
    fn test_unsupported_and_ephemeral_classes() {
        let rules = WindowClassRules::default();
        assert!(rules.is_unsupported("Shell_TrayWnd"));
        assert!(rules.is_unsupported("#32768"));
        assert!(!rules.is_unsupported("Notepad"));
        assert!(rules.is_ephemeral("tooltips_class32"));
        assert!(!rules.is_ephemeral("Notepad"));
    }

    #[test]
    fn test_window_handle_display_is_hex() {
        assert_eq!(WindowHandle(0x1A2B).to_string(), "0x00001A2B");
    }
}

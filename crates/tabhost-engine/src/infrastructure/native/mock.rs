//! In-memory desktop for unit and integration testing.
//!
//! [`FakeDesktop`] implements [`WindowSystem`] and [`TaskbarIntegration`]
//! against a plain map of windows.  Each window carries a constant non-client
//! frame ([`Insets`]) so `client_rect` is always `window_rect` shrunk by the
//! frame, which is enough to exercise the layout engine's inset compensation.
//!
//! Every mutating call is appended to a [`DesktopCall`] log.  The `user_*`
//! helpers change window state *without* logging, to simulate the user or the
//! guest application acting on its own.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tabhost_core::{
    ExtendedStyle, Insets, ProcessId, Rect, WindowHandle, WindowInfo, WindowStyle,
};

use super::{NativeError, PositionFlags, ShowCommand, TaskbarIntegration, WindowSystem};

/// One recorded mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesktopCall {
    SetStyle(WindowHandle, WindowStyle),
    SetExStyle(WindowHandle, ExtendedStyle),
    SetParent(WindowHandle, Option<WindowHandle>),
    SetOwner(WindowHandle, Option<WindowHandle>),
    SetPosition(WindowHandle, Rect),
    PlaceBehind(WindowHandle, WindowHandle),
    SetClipRegion(WindowHandle, Option<Rect>),
    Show(WindowHandle, ShowCommand),
    SetForeground(WindowHandle),
    PostClose(WindowHandle),
    AddTab(WindowHandle),
    DeleteTab(WindowHandle),
}

/// Calls that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    SetParent(WindowHandle),
    SetOwner(WindowHandle),
    SetPosition(WindowHandle),
    Taskbar,
}

/// State of one fake window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeWindow {
    /// Attributes; `info.rect` is always the screen rectangle.
    pub info: WindowInfo,
    pub parent: Option<WindowHandle>,
    pub frame: Insets,
    pub clip: Option<Rect>,
    pub minimized: bool,
    pub maximized: bool,
    pub close_requested: bool,
    /// The window this one was last placed directly behind.
    pub behind: Option<WindowHandle>,
}

impl FakeWindow {
    fn client(&self) -> Rect {
        let r = self.info.rect;
        Rect::from_edges(
            r.x + self.frame.left,
            r.y + self.frame.top,
            r.right() - self.frame.right,
            r.bottom() - self.frame.bottom,
        )
    }
}

#[derive(Default)]
struct DesktopState {
    windows: HashMap<WindowHandle, FakeWindow>,
    foreground: Option<WindowHandle>,
    taskbar: HashSet<WindowHandle>,
    calls: Vec<DesktopCall>,
    failures: HashSet<FailPoint>,
}

/// A recording, in-memory desktop.
#[derive(Default)]
pub struct FakeDesktop {
    state: Mutex<DesktopState>,
}

/// Builds the attributes of an ordinary, visible, framed application window.
pub fn overlapped_window(
    handle: WindowHandle,
    process_id: ProcessId,
    class_name: &str,
    title: &str,
    rect: Rect,
) -> WindowInfo {
    WindowInfo {
        handle,
        process_id,
        class_name: class_name.to_string(),
        title: title.to_string(),
        style: WindowStyle(
            WindowStyle::CAPTION
                | WindowStyle::THICKFRAME
                | WindowStyle::SYSMENU
                | WindowStyle::MINIMIZEBOX
                | WindowStyle::MAXIMIZEBOX
                | WindowStyle::VISIBLE,
        ),
        ex_style: ExtendedStyle(ExtendedStyle::APPWINDOW),
        rect,
        visible: true,
        owner: None,
    }
}

impl FakeDesktop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a top-level window with no frame.
    pub fn add_window(&self, info: WindowInfo) {
        self.add_window_with_frame(info, Insets::default());
    }

    /// Adds a top-level window whose client area is inset by `frame`.
    ///
    /// Visible, unowned windows that show in the taskbar start with a
    /// taskbar button, as they would on a real desktop.
    pub fn add_window_with_frame(&self, info: WindowInfo, frame: Insets) {
        let mut state = self.state.lock().expect("lock poisoned");
        if info.visible && info.owner.is_none() && info.ex_style.shows_in_taskbar() {
            state.taskbar.insert(info.handle);
        }
        state.windows.insert(
            info.handle,
            FakeWindow {
                info,
                parent: None,
                frame,
                clip: None,
                minimized: false,
                maximized: false,
                close_requested: false,
                behind: None,
            },
        );
    }

    /// Returns a snapshot of the window, if it exists.
    pub fn window(&self, handle: WindowHandle) -> Option<FakeWindow> {
        self.state
            .lock()
            .expect("lock poisoned")
            .windows
            .get(&handle)
            .cloned()
    }

    /// Returns every recorded call in order.
    pub fn calls(&self) -> Vec<DesktopCall> {
        self.state.lock().expect("lock poisoned").calls.clone()
    }

    /// Returns the recorded calls that concern `handle`.
    pub fn calls_for(&self, handle: WindowHandle) -> Vec<DesktopCall> {
        self.calls()
            .into_iter()
            .filter(|call| call_target(call) == handle)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().expect("lock poisoned").calls.clear();
    }

    pub fn fail(&self, point: FailPoint) {
        self.state.lock().expect("lock poisoned").failures.insert(point);
    }

    pub fn has_tab(&self, handle: WindowHandle) -> bool {
        self.state
            .lock()
            .expect("lock poisoned")
            .taskbar
            .contains(&handle)
    }

    /// Removes the window, as if its owning process destroyed it.
    pub fn user_destroy(&self, handle: WindowHandle) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.windows.remove(&handle);
        state.taskbar.remove(&handle);
        if state.foreground == Some(handle) {
            state.foreground = None;
        }
    }

    /// Gives `handle` foreground activation without logging a call.
    pub fn user_activate(&self, handle: Option<WindowHandle>) {
        self.state.lock().expect("lock poisoned").foreground = handle;
    }

    /// Moves the window to the screen rectangle `rect` without logging a call.
    pub fn user_move(&self, handle: WindowHandle, rect: Rect) {
        if let Some(window) = self
            .state
            .lock()
            .expect("lock poisoned")
            .windows
            .get_mut(&handle)
        {
            window.info.rect = rect;
        }
    }

    /// Maximizes the window to `rect` without logging a call.
    pub fn user_maximize(&self, handle: WindowHandle, rect: Rect) {
        if let Some(window) = self
            .state
            .lock()
            .expect("lock poisoned")
            .windows
            .get_mut(&handle)
        {
            window.maximized = true;
            window.info.rect = rect;
        }
    }

    fn fails(&self, state: &DesktopState, point: FailPoint) -> bool {
        state.failures.contains(&point)
    }

    fn with_window<T>(
        &self,
        handle: WindowHandle,
        call: Option<DesktopCall>,
        f: impl FnOnce(&mut FakeWindow) -> T,
    ) -> Result<T, NativeError> {
        let mut state = self.state.lock().expect("lock poisoned");
        if let Some(call) = call {
            state.calls.push(call);
        }
        let window = state
            .windows
            .get_mut(&handle)
            .ok_or(NativeError::InvalidWindow(handle))?;
        Ok(f(window))
    }
}

fn call_target(call: &DesktopCall) -> WindowHandle {
    match call {
        DesktopCall::SetStyle(h, _)
        | DesktopCall::SetExStyle(h, _)
        | DesktopCall::SetParent(h, _)
        | DesktopCall::SetOwner(h, _)
        | DesktopCall::SetPosition(h, _)
        | DesktopCall::PlaceBehind(h, _)
        | DesktopCall::SetClipRegion(h, _)
        | DesktopCall::Show(h, _)
        | DesktopCall::SetForeground(h)
        | DesktopCall::PostClose(h)
        | DesktopCall::AddTab(h)
        | DesktopCall::DeleteTab(h) => *h,
    }
}

fn injected(call: &'static str, handle: WindowHandle) -> NativeError {
    NativeError::CallFailed {
        call,
        handle,
        message: "injected failure".to_string(),
    }
}

impl WindowSystem for FakeDesktop {
    fn is_window(&self, handle: WindowHandle) -> bool {
        self.state
            .lock()
            .expect("lock poisoned")
            .windows
            .contains_key(&handle)
    }

    fn window_info(&self, handle: WindowHandle) -> Result<WindowInfo, NativeError> {
        self.with_window(handle, None, |w| w.info.clone())
    }

    fn window_rect(&self, handle: WindowHandle) -> Result<Rect, NativeError> {
        self.with_window(handle, None, |w| w.info.rect)
    }

    fn client_rect(&self, handle: WindowHandle) -> Result<Rect, NativeError> {
        self.with_window(handle, None, |w| w.client())
    }

    fn set_style(&self, handle: WindowHandle, style: WindowStyle) -> Result<(), NativeError> {
        self.with_window(handle, Some(DesktopCall::SetStyle(handle, style)), |w| {
            w.info.style = style;
        })
    }

    fn set_ex_style(
        &self,
        handle: WindowHandle,
        ex_style: ExtendedStyle,
    ) -> Result<(), NativeError> {
        self.with_window(handle, Some(DesktopCall::SetExStyle(handle, ex_style)), |w| {
            w.info.ex_style = ex_style;
        })
    }

    fn set_parent(
        &self,
        handle: WindowHandle,
        parent: Option<WindowHandle>,
    ) -> Result<(), NativeError> {
        {
            let state = self.state.lock().expect("lock poisoned");
            if self.fails(&state, FailPoint::SetParent(handle)) {
                return Err(injected("SetParent", handle));
            }
        }
        self.with_window(handle, Some(DesktopCall::SetParent(handle, parent)), |w| {
            w.parent = parent;
        })
    }

    fn set_owner(
        &self,
        handle: WindowHandle,
        owner: Option<WindowHandle>,
    ) -> Result<(), NativeError> {
        {
            let state = self.state.lock().expect("lock poisoned");
            if self.fails(&state, FailPoint::SetOwner(handle)) {
                return Err(injected("SetWindowLongPtrW(GWLP_HWNDPARENT)", handle));
            }
        }
        self.with_window(handle, Some(DesktopCall::SetOwner(handle, owner)), |w| {
            w.info.owner = owner;
        })
    }

    fn set_position(
        &self,
        handle: WindowHandle,
        rect: Rect,
        _flags: PositionFlags,
    ) -> Result<(), NativeError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.calls.push(DesktopCall::SetPosition(handle, rect));
        if self.fails(&state, FailPoint::SetPosition(handle)) {
            return Err(injected("SetWindowPos", handle));
        }
        // Child windows are positioned relative to their parent's client area.
        let origin = state
            .windows
            .get(&handle)
            .and_then(|w| w.parent)
            .and_then(|p| state.windows.get(&p))
            .map(|p| {
                let client = p.client();
                (client.x, client.y)
            })
            .unwrap_or((0, 0));
        let window = state
            .windows
            .get_mut(&handle)
            .ok_or(NativeError::InvalidWindow(handle))?;
        window.info.rect = rect.offset(origin.0, origin.1);
        Ok(())
    }

    fn place_behind(&self, handle: WindowHandle, above: WindowHandle) -> Result<(), NativeError> {
        self.with_window(handle, Some(DesktopCall::PlaceBehind(handle, above)), |w| {
            w.behind = Some(above);
        })
    }

    fn set_clip_region(
        &self,
        handle: WindowHandle,
        region: Option<Rect>,
    ) -> Result<(), NativeError> {
        self.with_window(handle, Some(DesktopCall::SetClipRegion(handle, region)), |w| {
            w.clip = region;
        })
    }

    fn show(&self, handle: WindowHandle, command: ShowCommand) -> Result<(), NativeError> {
        self.with_window(handle, Some(DesktopCall::Show(handle, command)), |w| {
            match command {
                ShowCommand::ShowNoActivate => w.info.visible = true,
                ShowCommand::Hide => w.info.visible = false,
                ShowCommand::Restore => {
                    w.info.visible = true;
                    w.minimized = false;
                    w.maximized = false;
                }
                ShowCommand::Minimize => w.minimized = true,
                ShowCommand::Maximize => {
                    w.info.visible = true;
                    w.maximized = true;
                }
            }
        })
    }

    fn is_minimized(&self, handle: WindowHandle) -> bool {
        self.window(handle).map(|w| w.minimized).unwrap_or(false)
    }

    fn is_maximized(&self, handle: WindowHandle) -> bool {
        self.window(handle).map(|w| w.maximized).unwrap_or(false)
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        self.state.lock().expect("lock poisoned").foreground
    }

    fn set_foreground(&self, handle: WindowHandle) -> Result<(), NativeError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.calls.push(DesktopCall::SetForeground(handle));
        if !state.windows.contains_key(&handle) {
            return Err(NativeError::InvalidWindow(handle));
        }
        state.foreground = Some(handle);
        Ok(())
    }

    fn post_close(&self, handle: WindowHandle) -> Result<(), NativeError> {
        self.with_window(handle, Some(DesktopCall::PostClose(handle)), |w| {
            w.close_requested = true;
        })
    }

    fn top_level_windows(&self) -> Vec<WindowHandle> {
        let state = self.state.lock().expect("lock poisoned");
        let mut handles: Vec<WindowHandle> = state
            .windows
            .values()
            .filter(|w| w.parent.is_none())
            .map(|w| w.info.handle)
            .collect();
        handles.sort();
        handles
    }
}

impl TaskbarIntegration for FakeDesktop {
    fn add_tab(&self, handle: WindowHandle) -> Result<(), NativeError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.calls.push(DesktopCall::AddTab(handle));
        if self.fails(&state, FailPoint::Taskbar) {
            return Err(injected("ITaskbarList::AddTab", handle));
        }
        state.taskbar.insert(handle);
        Ok(())
    }

    fn delete_tab(&self, handle: WindowHandle) -> Result<(), NativeError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.calls.push(DesktopCall::DeleteTab(handle));
        if self.fails(&state, FailPoint::Taskbar) {
            return Err(injected("ITaskbarList::DeleteTab", handle));
        }
        state.taskbar.remove(&handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: WindowHandle = WindowHandle(0x100);
    const PARENT: WindowHandle = WindowHandle(0x200);

    #[test]
    fn test_client_rect_is_window_rect_minus_frame() {
        // Arrange
        let desktop = FakeDesktop::new();
        desktop.add_window_with_frame(
            overlapped_window(H, 1, "Notepad", "Untitled", Rect::new(0, 0, 816, 639)),
            Insets {
                left: 8,
                top: 31,
                right: 8,
                bottom: 8,
            },
        );

        // Act
        let client = desktop.client_rect(H).unwrap();

        // Assert
        assert_eq!(client, Rect::new(8, 31, 800, 600));
    }

    #[test]
    fn test_child_position_is_relative_to_parent_client() {
        // Arrange
        let desktop = FakeDesktop::new();
        desktop.add_window(overlapped_window(
            PARENT,
            1,
            "Host",
            "Host",
            Rect::new(100, 50, 1000, 800),
        ));
        desktop.add_window(overlapped_window(H, 2, "ConsoleWindowClass", "cmd", Rect::default()));
        desktop.set_parent(H, Some(PARENT)).unwrap();

        // Act
        desktop
            .set_position(H, Rect::new(0, 0, 300, 200), PositionFlags::LAYOUT)
            .unwrap();

        // Assert
        assert_eq!(desktop.window_rect(H).unwrap(), Rect::new(100, 50, 300, 200));
        assert!(!desktop.top_level_windows().contains(&H));
    }

    #[test]
    fn test_injected_failure_and_missing_window() {
        let desktop = FakeDesktop::new();
        desktop.add_window(overlapped_window(H, 1, "Notepad", "x", Rect::default()));
        desktop.fail(FailPoint::SetParent(H));

        assert!(desktop.set_parent(H, Some(PARENT)).is_err());
        assert_eq!(
            desktop.set_style(WindowHandle(0x999), WindowStyle(0)),
            Err(NativeError::InvalidWindow(WindowHandle(0x999)))
        );
    }

    #[test]
    fn test_taskbar_tabs_follow_add_and_delete() {
        let desktop = FakeDesktop::new();
        desktop.add_window(overlapped_window(H, 1, "Notepad", "x", Rect::default()));
        assert!(desktop.has_tab(H));

        desktop.delete_tab(H).unwrap();
        assert!(!desktop.has_tab(H));
        desktop.add_tab(H).unwrap();
        assert!(desktop.has_tab(H));
        assert_eq!(
            desktop.calls(),
            vec![DesktopCall::DeleteTab(H), DesktopCall::AddTab(H)]
        );
    }

    #[test]
    fn test_show_restore_clears_min_and_max() {
        let desktop = FakeDesktop::new();
        desktop.add_window(overlapped_window(H, 1, "Notepad", "x", Rect::default()));
        desktop.user_maximize(H, Rect::new(0, 0, 1920, 1080));
        assert!(desktop.is_maximized(H));

        desktop.show(H, ShowCommand::Restore).unwrap();

        assert!(!desktop.is_maximized(H));
        assert!(!desktop.is_minimized(H));
    }
}

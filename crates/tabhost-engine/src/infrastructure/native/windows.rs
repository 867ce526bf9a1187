//! Win32 implementation of [`WindowSystem`] and [`TaskbarIntegration`].
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for Windows API FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(target_os = "windows")]

use std::ffi::c_void;

use tabhost_core::{ExtendedStyle, Rect, WindowHandle, WindowInfo, WindowStyle};
use windows::Win32::Foundation::{BOOL, HWND, LPARAM, POINT, RECT, TRUE, WPARAM};
use windows::Win32::Graphics::Gdi::{ClientToScreen, CreateRectRgn, DeleteObject, SetWindowRgn, HRGN};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CLSCTX_INPROC_SERVER, COINIT_APARTMENTTHREADED,
};
use windows::Win32::UI::Shell::{ITaskbarList, TaskbarList};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClassNameW, GetClientRect, GetForegroundWindow, GetWindow,
    GetWindowLongPtrW, GetWindowRect, GetWindowTextW, GetWindowThreadProcessId, IsIconic,
    IsWindow, IsWindowVisible, IsZoomed, PostMessageW, SetForegroundWindow, SetParent,
    SetWindowLongPtrW, SetWindowPos, ShowWindow, GWLP_HWNDPARENT, GWL_EXSTYLE, GWL_STYLE,
    GW_OWNER, SET_WINDOW_POS_FLAGS, SHOW_WINDOW_CMD, SWP_FRAMECHANGED, SWP_NOACTIVATE,
    SWP_NOCOPYBITS, SWP_NOMOVE, SWP_NOSIZE, SWP_NOZORDER, SW_HIDE, SW_MAXIMIZE, SW_MINIMIZE,
    SW_RESTORE, SW_SHOWNOACTIVATE, WM_CLOSE,
};

use super::{NativeError, PositionFlags, ShowCommand, TaskbarIntegration, WindowSystem};

// ── Handle conversion ─────────────────────────────────────────────────────────

fn hwnd(handle: WindowHandle) -> HWND {
    HWND(handle.0 as usize as *mut c_void)
}

fn handle_of(hwnd: HWND) -> WindowHandle {
    WindowHandle(hwnd.0 as usize as u64)
}

fn failed(call: &'static str, handle: WindowHandle, error: windows::core::Error) -> NativeError {
    NativeError::CallFailed {
        call,
        handle,
        message: error.message(),
    }
}

fn rect_from(r: RECT) -> Rect {
    Rect::from_edges(r.left, r.top, r.right, r.bottom)
}

fn read_text(buf: &[u16], len: i32) -> String {
    let len = usize::try_from(len).unwrap_or(0).min(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

// ── WindowSystem ──────────────────────────────────────────────────────────────

/// [`WindowSystem`] backed by `user32`.
#[derive(Debug, Default)]
pub struct Win32WindowSystem;

impl Win32WindowSystem {
    pub fn new() -> Self {
        Self
    }

    fn ensure_window(&self, handle: WindowHandle) -> Result<HWND, NativeError> {
        if self.is_window(handle) {
            Ok(hwnd(handle))
        } else {
            Err(NativeError::InvalidWindow(handle))
        }
    }
}

impl WindowSystem for Win32WindowSystem {
    fn is_window(&self, handle: WindowHandle) -> bool {
        if handle.is_null() {
            return false;
        }
        // SAFETY: IsWindow accepts any value and only reports validity.
        unsafe { IsWindow(hwnd(handle)).as_bool() }
    }

    fn window_info(&self, handle: WindowHandle) -> Result<WindowInfo, NativeError> {
        let h = self.ensure_window(handle)?;
        let mut class_buf = [0u16; 256];
        let mut title_buf = [0u16; 512];
        let mut pid = 0u32;

        // SAFETY: `h` was validated above; the buffers outlive the calls.
        let (class_len, title_len, style, ex_style, visible, owner) = unsafe {
            GetWindowThreadProcessId(h, Some(&mut pid));
            (
                GetClassNameW(h, &mut class_buf),
                GetWindowTextW(h, &mut title_buf),
                GetWindowLongPtrW(h, GWL_STYLE),
                GetWindowLongPtrW(h, GWL_EXSTYLE),
                IsWindowVisible(h).as_bool(),
                GetWindow(h, GW_OWNER).ok(),
            )
        };

        Ok(WindowInfo {
            handle,
            process_id: pid,
            class_name: read_text(&class_buf, class_len),
            title: read_text(&title_buf, title_len),
            style: WindowStyle(style as u32),
            ex_style: ExtendedStyle(ex_style as u32),
            rect: self.window_rect(handle)?,
            visible,
            owner: owner
                .filter(|o| !o.0.is_null())
                .map(handle_of),
        })
    }

    fn window_rect(&self, handle: WindowHandle) -> Result<Rect, NativeError> {
        let h = self.ensure_window(handle)?;
        let mut r = RECT::default();
        // SAFETY: `r` is a valid out-pointer for the duration of the call.
        unsafe { GetWindowRect(h, &mut r) }.map_err(|e| failed("GetWindowRect", handle, e))?;
        Ok(rect_from(r))
    }

    fn client_rect(&self, handle: WindowHandle) -> Result<Rect, NativeError> {
        let h = self.ensure_window(handle)?;
        let mut r = RECT::default();
        let mut origin = POINT::default();
        // SAFETY: both out-pointers are valid locals.
        unsafe {
            GetClientRect(h, &mut r).map_err(|e| failed("GetClientRect", handle, e))?;
            if !ClientToScreen(h, &mut origin).as_bool() {
                return Err(NativeError::CallFailed {
                    call: "ClientToScreen",
                    handle,
                    message: "returned FALSE".to_string(),
                });
            }
        }
        Ok(Rect::new(origin.x, origin.y, r.right - r.left, r.bottom - r.top))
    }

    fn set_style(&self, handle: WindowHandle, style: WindowStyle) -> Result<(), NativeError> {
        let h = self.ensure_window(handle)?;
        // SAFETY: writing GWL_STYLE on a validated window.
        unsafe { SetWindowLongPtrW(h, GWL_STYLE, style.0 as i32 as isize) };
        Ok(())
    }

    fn set_ex_style(
        &self,
        handle: WindowHandle,
        ex_style: ExtendedStyle,
    ) -> Result<(), NativeError> {
        let h = self.ensure_window(handle)?;
        // SAFETY: writing GWL_EXSTYLE on a validated window.
        unsafe { SetWindowLongPtrW(h, GWL_EXSTYLE, ex_style.0 as i32 as isize) };
        Ok(())
    }

    fn set_parent(
        &self,
        handle: WindowHandle,
        parent: Option<WindowHandle>,
    ) -> Result<(), NativeError> {
        let h = self.ensure_window(handle)?;
        let new_parent = parent.map(hwnd).unwrap_or_default();
        // SAFETY: a null parent makes the window a child of the desktop.
        unsafe { SetParent(h, new_parent) }.map_err(|e| failed("SetParent", handle, e))?;
        Ok(())
    }

    fn set_owner(
        &self,
        handle: WindowHandle,
        owner: Option<WindowHandle>,
    ) -> Result<(), NativeError> {
        let h = self.ensure_window(handle)?;
        let value = owner.map(|o| o.0 as isize).unwrap_or(0);
        // SAFETY: GWLP_HWNDPARENT on a top-level window sets its owner.
        unsafe { SetWindowLongPtrW(h, GWLP_HWNDPARENT, value) };
        Ok(())
    }

    fn set_position(
        &self,
        handle: WindowHandle,
        rect: Rect,
        flags: PositionFlags,
    ) -> Result<(), NativeError> {
        let h = self.ensure_window(handle)?;
        let mut swp = SET_WINDOW_POS_FLAGS(0);
        if flags.no_copy_bits {
            swp |= SWP_NOCOPYBITS;
        }
        if flags.no_activate {
            swp |= SWP_NOACTIVATE;
        }
        if flags.no_z_order {
            swp |= SWP_NOZORDER;
        }
        if flags.frame_changed {
            swp |= SWP_FRAMECHANGED;
        }
        // SAFETY: plain SetWindowPos on a validated window.
        unsafe {
            SetWindowPos(
                h,
                HWND::default(),
                rect.x,
                rect.y,
                rect.width,
                rect.height,
                swp,
            )
        }
        .map_err(|e| failed("SetWindowPos", handle, e))
    }

    fn place_behind(&self, handle: WindowHandle, above: WindowHandle) -> Result<(), NativeError> {
        let h = self.ensure_window(handle)?;
        // SAFETY: z-order only; position, size and activation are untouched.
        unsafe {
            SetWindowPos(
                h,
                hwnd(above),
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE,
            )
        }
        .map_err(|e| failed("SetWindowPos(z-order)", handle, e))
    }

    fn set_clip_region(
        &self,
        handle: WindowHandle,
        region: Option<Rect>,
    ) -> Result<(), NativeError> {
        let h = self.ensure_window(handle)?;
        // SAFETY: on success the system owns the region; on failure we delete it.
        unsafe {
            let rgn = match region {
                Some(r) => CreateRectRgn(r.x, r.y, r.right(), r.bottom()),
                None => HRGN::default(),
            };
            if SetWindowRgn(h, rgn, TRUE) == 0 {
                if !rgn.is_invalid() {
                    let _ = DeleteObject(rgn);
                }
                return Err(NativeError::CallFailed {
                    call: "SetWindowRgn",
                    handle,
                    message: "returned 0".to_string(),
                });
            }
        }
        Ok(())
    }

    fn show(&self, handle: WindowHandle, command: ShowCommand) -> Result<(), NativeError> {
        let h = self.ensure_window(handle)?;
        let cmd: SHOW_WINDOW_CMD = match command {
            ShowCommand::ShowNoActivate => SW_SHOWNOACTIVATE,
            ShowCommand::Hide => SW_HIDE,
            ShowCommand::Restore => SW_RESTORE,
            ShowCommand::Minimize => SW_MINIMIZE,
            ShowCommand::Maximize => SW_MAXIMIZE,
        };
        // SAFETY: the return value is the previous visibility, not an error.
        unsafe {
            let _ = ShowWindow(h, cmd);
        }
        Ok(())
    }

    fn is_minimized(&self, handle: WindowHandle) -> bool {
        // SAFETY: read-only query.
        unsafe { IsIconic(hwnd(handle)).as_bool() }
    }

    fn is_maximized(&self, handle: WindowHandle) -> bool {
        // SAFETY: read-only query.
        unsafe { IsZoomed(hwnd(handle)).as_bool() }
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        // SAFETY: read-only query.
        let h = unsafe { GetForegroundWindow() };
        (!h.0.is_null()).then(|| handle_of(h))
    }

    fn set_foreground(&self, handle: WindowHandle) -> Result<(), NativeError> {
        let h = self.ensure_window(handle)?;
        // SAFETY: the shell may refuse activation; that is reported, not UB.
        if unsafe { SetForegroundWindow(h) }.as_bool() {
            Ok(())
        } else {
            Err(NativeError::CallFailed {
                call: "SetForegroundWindow",
                handle,
                message: "foreground change refused".to_string(),
            })
        }
    }

    fn post_close(&self, handle: WindowHandle) -> Result<(), NativeError> {
        let h = self.ensure_window(handle)?;
        // SAFETY: posting never blocks on the target thread.
        unsafe { PostMessageW(h, WM_CLOSE, WPARAM(0), LPARAM(0)) }
            .map_err(|e| failed("PostMessageW(WM_CLOSE)", handle, e))
    }

    fn top_level_windows(&self) -> Vec<WindowHandle> {
        let mut handles: Vec<WindowHandle> = Vec::new();
        // SAFETY: `collect_window` only runs during this call and receives a
        // pointer to `handles`, which outlives it.
        unsafe {
            let _ = EnumWindows(
                Some(collect_window),
                LPARAM(&mut handles as *mut Vec<WindowHandle> as isize),
            );
        }
        handles
    }
}

unsafe extern "system" fn collect_window(h: HWND, lparam: LPARAM) -> BOOL {
    // SAFETY: lparam is the `&mut Vec` passed by `top_level_windows`.
    let handles = &mut *(lparam.0 as *mut Vec<WindowHandle>);
    handles.push(handle_of(h));
    TRUE
}

// ── Taskbar ───────────────────────────────────────────────────────────────────

/// [`TaskbarIntegration`] backed by the shell's `ITaskbarList`.
///
/// COM interface pointers are apartment-bound, so a fresh `ITaskbarList` is
/// created on the calling thread for every request.
#[derive(Debug, Default)]
pub struct ShellTaskbar;

impl ShellTaskbar {
    pub fn new() -> Self {
        Self
    }

    fn with_list(
        &self,
        call: &'static str,
        handle: WindowHandle,
        f: impl FnOnce(&ITaskbarList) -> windows::core::Result<()>,
    ) -> Result<(), NativeError> {
        // SAFETY: COM initialisation is reference counted per thread; a
        // repeated call returns S_FALSE, which is fine to ignore.
        unsafe {
            let _ = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
            let list: ITaskbarList = CoCreateInstance(&TaskbarList, None, CLSCTX_INPROC_SERVER)
                .map_err(|e| failed(call, handle, e))?;
            list.HrInit().map_err(|e| failed(call, handle, e))?;
            f(&list).map_err(|e| failed(call, handle, e))
        }
    }
}

impl TaskbarIntegration for ShellTaskbar {
    fn add_tab(&self, handle: WindowHandle) -> Result<(), NativeError> {
        // SAFETY: AddTab only reads the handle value.
        self.with_list("ITaskbarList::AddTab", handle, |list| unsafe {
            list.AddTab(hwnd(handle))
        })
    }

    fn delete_tab(&self, handle: WindowHandle) -> Result<(), NativeError> {
        // SAFETY: DeleteTab only reads the handle value.
        self.with_list("ITaskbarList::DeleteTab", handle, |list| unsafe {
            list.DeleteTab(hwnd(handle))
        })
    }
}

//! `SetWinEventHook` implementation of [`HookRegistrar`].
//!
//! Out-of-context WinEvent hooks deliver their callbacks through the message
//! queue of the thread that registered them, so every registration and
//! unregistration happens on one dedicated hook thread running a Win32
//! message loop.  Callers hand requests to that thread through a channel and
//! wake it with `PostThreadMessageW`.
//!
//! The callback trampoline consults a process-wide [`DashMap`] keyed by hook
//! handle.  Events from a hook that was unregistered a moment ago are still
//! queued by the OS; the lookup drops them.
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for Windows API FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(target_os = "windows")]

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::OnceLock;
use std::thread;

use dashmap::DashMap;
use tabhost_core::{HookCategory, HookHandle, WindowHandle};
use tracing::{debug, warn};
use windows::Win32::Foundation::{HMODULE, HWND, LPARAM, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Accessibility::{SetWinEventHook, UnhookWinEvent, HWINEVENTHOOK};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW, TranslateMessage, MSG,
    PM_NOREMOVE, WINEVENT_OUTOFCONTEXT, WM_APP, WM_USER,
};

use super::{event_range, HookError, HookEventKind, HookRegistrar, HookScope, HookSink, RawHookEvent};

/// Thread message that tells the hook thread to drain its request channel.
const WM_HOOK_REQUEST: u32 = WM_APP + 0x40;

/// Sink shared with the trampoline.  Initialized once by [`WinEventHookRegistrar::start`].
static SINK: OnceLock<HookSink> = OnceLock::new();

/// Live hooks, keyed by raw hook handle.
static ROUTES: OnceLock<DashMap<u64, HookCategory>> = OnceLock::new();

fn routes() -> &'static DashMap<u64, HookCategory> {
    ROUTES.get_or_init(DashMap::new)
}

enum Request {
    Register {
        category: HookCategory,
        scope: HookScope,
        reply: Sender<Result<HookHandle, HookError>>,
    },
    Unregister {
        hook: HookHandle,
        reply: Sender<Result<(), HookError>>,
    },
    Stop,
}

/// Owns the hook thread.  Dropping it unhooks everything and ends the thread.
pub struct WinEventHookRegistrar {
    requests: Sender<Request>,
    thread_id: u32,
}

impl WinEventHookRegistrar {
    /// Spawns the hook thread and connects `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::Unavailable`] if a registrar is already running in
    /// this process or the thread cannot be started.
    pub fn start(sink: HookSink) -> Result<Self, HookError> {
        SINK.set(sink).map_err(|_| {
            HookError::Unavailable("only one hook registrar may run per process".to_string())
        })?;

        let (requests, inbox) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        thread::Builder::new()
            .name("tabhost-hook-loop".to_string())
            .spawn(move || run_hook_thread(inbox, ready_tx))
            .map_err(|e| HookError::Unavailable(e.to_string()))?;

        let thread_id = ready_rx
            .recv()
            .map_err(|e| HookError::Unavailable(e.to_string()))?;

        debug!("hook thread {thread_id} ready");
        Ok(Self {
            requests,
            thread_id,
        })
    }

    fn send(&self, request: Request) -> Result<(), HookError> {
        self.requests
            .send(request)
            .map_err(|e| HookError::Unavailable(e.to_string()))?;
        // SAFETY: the hook thread created its message queue before reporting ready.
        unsafe { PostThreadMessageW(self.thread_id, WM_HOOK_REQUEST, WPARAM(0), LPARAM(0)) }
            .map_err(|e| HookError::Unavailable(e.message()))
    }
}

impl HookRegistrar for WinEventHookRegistrar {
    fn register(&self, category: HookCategory, scope: HookScope) -> Result<HookHandle, HookError> {
        let (reply, answer) = mpsc::channel();
        self.send(Request::Register {
            category,
            scope,
            reply,
        })?;
        answer
            .recv()
            .map_err(|e| HookError::Unavailable(e.to_string()))?
    }

    fn unregister(&self, hook: HookHandle) -> Result<(), HookError> {
        let (reply, answer) = mpsc::channel();
        self.send(Request::Unregister { hook, reply })?;
        answer
            .recv()
            .map_err(|e| HookError::Unavailable(e.to_string()))?
    }
}

impl Drop for WinEventHookRegistrar {
    fn drop(&mut self) {
        if self.send(Request::Stop).is_err() {
            warn!("hook thread already gone during shutdown");
        }
    }
}

/// Entry point of the dedicated hook thread.
fn run_hook_thread(inbox: Receiver<Request>, ready: Sender<u32>) {
    let mut msg = MSG::default();
    let mut hooks: HashMap<u64, HWINEVENTHOOK> = HashMap::new();

    // SAFETY: PeekMessageW forces creation of this thread's message queue so
    // PostThreadMessageW cannot fail with "no queue" once we report ready.
    unsafe {
        let _ = PeekMessageW(&mut msg, HWND::default(), WM_USER, WM_USER, PM_NOREMOVE);
        let _ = ready.send(GetCurrentThreadId());
    }

    // SAFETY: standard GetMessage/DispatchMessage loop; WinEvent callbacks
    // are dispatched from inside GetMessageW.
    unsafe {
        while GetMessageW(&mut msg, HWND::default(), 0, 0).as_bool() {
            if msg.message == WM_HOOK_REQUEST {
                if !drain_requests(&inbox, &mut hooks) {
                    break;
                }
                continue;
            }
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }

        for (key, hook) in hooks.drain() {
            routes().remove(&key);
            let _ = UnhookWinEvent(hook);
        }
    }
    debug!("hook thread stopped");
}

/// Handles queued requests.  Returns `false` when the thread should stop.
fn drain_requests(inbox: &Receiver<Request>, hooks: &mut HashMap<u64, HWINEVENTHOOK>) -> bool {
    while let Ok(request) = inbox.try_recv() {
        match request {
            Request::Register {
                category,
                scope,
                reply,
            } => {
                let (min, max) = event_range(category);
                // SAFETY: `win_event_proc` matches WINEVENTPROC and lives for
                // the whole program; out-of-context hooks need no module.
                let hook = unsafe {
                    SetWinEventHook(
                        min,
                        max,
                        HMODULE::default(),
                        Some(win_event_proc),
                        scope.process_id(),
                        0,
                        WINEVENT_OUTOFCONTEXT,
                    )
                };
                let result = if hook.is_invalid() {
                    Err(HookError::RegistrationFailed {
                        category,
                        reason: windows::core::Error::from_win32().message(),
                    })
                } else {
                    let key = hook.0 as usize as u64;
                    routes().insert(key, category);
                    hooks.insert(key, hook);
                    Ok(HookHandle(key))
                };
                let _ = reply.send(result);
            }
            Request::Unregister { hook, reply } => {
                let result = match hooks.remove(&hook.0) {
                    Some(native) => {
                        routes().remove(&hook.0);
                        // SAFETY: `native` was returned by SetWinEventHook on this thread.
                        unsafe {
                            let _ = UnhookWinEvent(native);
                        }
                        Ok(())
                    }
                    None => Err(HookError::UnknownHook(hook)),
                };
                let _ = reply.send(result);
            }
            Request::Stop => return false,
        }
    }
    true
}

/// WinEvent trampoline.
///
/// # Safety
///
/// Called by Windows on the hook thread.  It must not block: it only builds
/// a [`RawHookEvent`] and hands it to the sink.
unsafe extern "system" fn win_event_proc(
    hook: HWINEVENTHOOK,
    event: u32,
    hwnd: HWND,
    id_object: i32,
    id_child: i32,
    thread_id: u32,
    time_ms: u32,
) {
    let key = hook.0 as usize as u64;
    if !routes().contains_key(&key) {
        return;
    }
    let Some(kind) = HookEventKind::from_event(event) else {
        return;
    };
    let raw = RawHookEvent {
        hook: HookHandle(key),
        kind,
        window: WindowHandle(hwnd.0 as usize as u64),
        object_id: id_object,
        child_id: id_child,
        thread_id,
        timestamp_ms: time_ms,
    };
    if !raw.targets_window() {
        return;
    }
    if let Some(sink) = SINK.get() {
        sink(raw);
    }
}

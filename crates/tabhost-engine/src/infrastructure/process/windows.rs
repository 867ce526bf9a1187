//! Win32 implementation of [`ProcessInspector`].
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for Windows API FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(target_os = "windows")]

use std::ffi::c_void;
use std::path::Path;

use tabhost_core::ProcessId;
use windows::core::PWSTR;
use windows::Win32::Foundation::{CloseHandle, ERROR_ACCESS_DENIED, FILETIME, HANDLE};
use windows::Win32::Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY};
use windows::Win32::System::Threading::{
    GetCurrentProcess, GetCurrentProcessId, GetExitCodeProcess, GetProcessTimes, OpenProcess,
    OpenProcessToken, QueryFullProcessImageNameW, TerminateProcess, PROCESS_ACCESS_RIGHTS,
    PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_TERMINATE,
};

use super::{filetime_to_unix_ms, spawn_detached, ProcessError, ProcessIdentity, ProcessInspector};

/// Exit code reported for a process that has not exited yet.
const STILL_ACTIVE: u32 = 259;

/// An open process handle, closed on drop.
struct OwnedProcess(HANDLE);

impl OwnedProcess {
    fn open(pid: ProcessId, access: PROCESS_ACCESS_RIGHTS) -> Result<Self, ProcessError> {
        // SAFETY: OpenProcess only reads its arguments.
        unsafe { OpenProcess(access, false, pid) }
            .map(OwnedProcess)
            .map_err(|e| {
                if e.code() == ERROR_ACCESS_DENIED.to_hresult() {
                    ProcessError::AccessDenied(pid)
                } else {
                    ProcessError::NotFound(pid)
                }
            })
    }
}

impl Drop for OwnedProcess {
    fn drop(&mut self) {
        // SAFETY: the handle came from OpenProcess and is closed exactly once.
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

fn query_failed(pid: ProcessId, error: windows::core::Error) -> ProcessError {
    ProcessError::QueryFailed {
        pid,
        message: error.message(),
    }
}

fn token_is_elevated(pid: ProcessId, process: HANDLE) -> Result<bool, ProcessError> {
    let mut token = HANDLE::default();
    let mut elevation = TOKEN_ELEVATION::default();
    let mut returned = 0u32;
    // SAFETY: all out-pointers are valid locals; the token is closed below.
    unsafe {
        OpenProcessToken(process, TOKEN_QUERY, &mut token).map_err(|e| {
            if e.code() == ERROR_ACCESS_DENIED.to_hresult() {
                ProcessError::AccessDenied(pid)
            } else {
                query_failed(pid, e)
            }
        })?;
        let result = GetTokenInformation(
            token,
            TokenElevation,
            Some(&mut elevation as *mut TOKEN_ELEVATION as *mut c_void),
            std::mem::size_of::<TOKEN_ELEVATION>() as u32,
            &mut returned,
        );
        let _ = CloseHandle(token);
        result.map_err(|e| query_failed(pid, e))?;
    }
    Ok(elevation.TokenIsElevated != 0)
}

/// [`ProcessInspector`] backed by `kernel32` and `advapi32`.
#[derive(Debug, Default)]
pub struct Win32ProcessInspector;

impl Win32ProcessInspector {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessInspector for Win32ProcessInspector {
    fn current_process_id(&self) -> ProcessId {
        // SAFETY: no arguments, no failure mode.
        unsafe { GetCurrentProcessId() }
    }

    fn identity(&self, pid: ProcessId) -> Result<ProcessIdentity, ProcessError> {
        let process = OwnedProcess::open(pid, PROCESS_QUERY_LIMITED_INFORMATION)?;

        let mut buf = [0u16; 1024];
        let mut len = buf.len() as u32;
        let mut creation = FILETIME::default();
        let mut exit = FILETIME::default();
        let mut kernel = FILETIME::default();
        let mut user = FILETIME::default();

        // SAFETY: `buf`/`len` describe a valid buffer; FILETIMEs are valid out-pointers.
        unsafe {
            QueryFullProcessImageNameW(
                process.0,
                PROCESS_NAME_WIN32,
                PWSTR(buf.as_mut_ptr()),
                &mut len,
            )
            .map_err(|e| query_failed(pid, e))?;
            GetProcessTimes(process.0, &mut creation, &mut exit, &mut kernel, &mut user)
                .map_err(|e| query_failed(pid, e))?;
        }

        let path = String::from_utf16_lossy(&buf[..len as usize]);
        let name = Path::new(&path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(path);
        let ticks = (u64::from(creation.dwHighDateTime) << 32) | u64::from(creation.dwLowDateTime);

        Ok(ProcessIdentity {
            process_id: pid,
            name,
            start_time_ms: filetime_to_unix_ms(ticks),
        })
    }

    fn is_running(&self, pid: ProcessId) -> bool {
        let Ok(process) = OwnedProcess::open(pid, PROCESS_QUERY_LIMITED_INFORMATION) else {
            return false;
        };
        let mut code = 0u32;
        // SAFETY: `code` is a valid out-pointer.
        unsafe { GetExitCodeProcess(process.0, &mut code) }.is_ok() && code == STILL_ACTIVE
    }

    fn is_elevated(&self, pid: ProcessId) -> Result<bool, ProcessError> {
        let process = OwnedProcess::open(pid, PROCESS_QUERY_LIMITED_INFORMATION)?;
        token_is_elevated(pid, process.0)
    }

    fn current_is_elevated(&self) -> bool {
        // SAFETY: the pseudo-handle needs no closing.
        let process = unsafe { GetCurrentProcess() };
        token_is_elevated(self.current_process_id(), process).unwrap_or(false)
    }

    fn terminate(&self, pid: ProcessId) -> Result<(), ProcessError> {
        let process = OwnedProcess::open(pid, PROCESS_TERMINATE)?;
        // SAFETY: the handle was opened with PROCESS_TERMINATE.
        unsafe { TerminateProcess(process.0, 1) }.map_err(|e| ProcessError::TerminateFailed {
            pid,
            message: e.message(),
        })
    }

    fn spawn(&self, program: &Path, args: &[String]) -> Result<ProcessId, ProcessError> {
        spawn_detached(program, args)
    }
}

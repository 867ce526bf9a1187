//! Infrastructure layer for the embedding engine.
//!
//! Contains OS-facing adapters: native window manipulation and taskbar
//! integration, WinEvent hooks, process inspection and termination, the
//! host-window adapter, and file-system storage for configuration and the
//! tracked-process ledger.
//!
//! Every adapter sits behind a trait with a `mock` sibling so the application
//! layer can be tested on any platform without a running desktop.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `tabhost_core`, but MUST NOT be imported by the domain layer.

pub mod hooks;
pub mod host_window;
pub mod native;
pub mod process;
pub mod storage;

//! # tabhost-core
//!
//! Domain library for tabhost: the pure data model behind embedding windows
//! owned by other processes into a host application's UI.
//!
//! This crate has zero dependencies on OS APIs, UI frameworks, or threads.
//! Everything here can be compiled and tested on any platform.
//!
//! # Architecture overview (for beginners)
//!
//! tabhost captures a top-level window that belongs to another program (the
//! *guest*), strips its frame, and keeps it glued to a rectangle inside the
//! host application (the *slot*).  When several guests are visible at once the
//! slot is split into tiles.  When the guest is released, every attribute the
//! engine touched is put back exactly as it was.
//!
//! This crate (`tabhost-core`) is the shared foundation.  It defines:
//!
//! - **`geometry`** – rectangles, non-client insets, and fractional tile rects.
//! - **`window`** – opaque window handles, style bitmasks, and the window class
//!   rules that decide *how* (or whether) a window may be embedded.
//! - **`session`** – the `EmbeddedSession` record whose original attributes are
//!   captured exactly once and restored on release.
//! - **`tiling`** – the deterministic `TileDistributor` and `TileGroup`.
//! - **`suppression`** – the debounce ledger that stops a just-released window
//!   from being immediately offered for capture again.
//! - **`sync_gate`** – the ignore gate and re-entrancy flags that break
//!   host↔guest feedback loops.
//! - **`policy`** – taskbar and close-behavior policy values.
//! - **`process`** – the persisted record used for post-crash reconciliation.

pub mod domain;

// Re-export the most-used types at the crate root so callers can write
// `tabhost_core::Rect` instead of `tabhost_core::domain::geometry::Rect`.
pub use domain::geometry::{FractionalRect, Insets, Rect};
pub use domain::policy::{CloseBehavior, TaskbarPolicy};
pub use domain::process::TrackedProcessRecord;
pub use domain::session::{
    EmbeddedSession, HookCategory, HookHandle, InteractionState, OriginalAttributes,
};
pub use domain::suppression::SuppressionLedger;
pub use domain::sync_gate::{IgnoreGate, SyncDirection, SyncGuards};
pub use domain::tiling::{TileDistributor, TileError, TileGroup, TileGroupId};
pub use domain::window::{
    ExtendedStyle, HostingMode, ProcessId, WindowClassRules, WindowHandle, WindowInfo,
    WindowStyle,
};

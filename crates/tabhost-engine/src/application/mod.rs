//! Application layer use cases for the embedding engine.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure data and rules in `tabhost-core`) and the infrastructure (Win32
//! calls, hooks, processes, files).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil one goal (e.g., "capture this
//!   window and keep it glued to the slot").
//! - **Depend on abstractions** (`WindowSystem`, `HookRegistrar`,
//!   `ProcessInspector`, `TrackerStore`, `HostContainer`) rather than concrete
//!   implementations, so everything here runs against in-memory fakes.
//!
//! # Sub-modules
//!
//! - **`host`** – The `HostContainer` and `PolicyProvider` seams and the
//!   `HostAction`s the engine sends to the host.
//! - **`session_registry`** – The engine-owned map of live sessions.
//! - **`embed_window`** – Captures a foreign window (`Embedder`).
//! - **`release_window`** – Gives a guest back to the desktop
//!   (`ReleaseProtocol`).
//! - **`layout_guest`** – Places a guest onto its slot (`LayoutEngine`).
//! - **`hook_dispatcher`** – Registers hooks and filters raw callbacks.
//! - **`event_bridge`** – The guest event state machine.
//! - **`tile_groups`** – Several guests sharing one slot.
//! - **`track_processes`** – The crash-recovery ledger
//!   (`ProcessLifecycleTracker`).
//! - **`await_window`** – Bounded, cancellable polling.
//! - **`shutdown`** – Graceful-exit waits with kill escalation.
//! - **`engine`** – The single control task that ties all of the above
//!   together (`HostEngine`).

pub mod await_window;
pub mod embed_window;
pub mod engine;
pub mod event_bridge;
pub mod hook_dispatcher;
pub mod host;
pub mod layout_guest;
pub mod release_window;
pub mod session_registry;
pub mod shutdown;
pub mod tile_groups;
pub mod track_processes;

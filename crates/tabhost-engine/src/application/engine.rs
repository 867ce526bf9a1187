//! HostEngine: the single control task.
//!
//! # How the pieces fit together (for beginners)
//!
//! ```text
//!  hook thread ──RawHookEvent──┐
//!  host UI ─────SlotChanged────┤
//!  host UI ─────Embed/Close────┼──► ControlMessage queue ──► HostEngine::run
//!  background waits ──results──┘                               │
//!                                                              ├─ Embedder / ReleaseProtocol
//!                                                              ├─ LayoutEngine / TileGroups
//!                                                              ├─ EventBridge → HostAction → HostContainer
//!                                                              └─ ProcessLifecycleTracker
//! ```
//!
//! Everything that mutates engine state arrives as a [`ControlMessage`] and is
//! handled serially by [`HostEngine::handle_message`].  Nothing else holds a
//! reference to the session registry, so there are no locks around it.
//!
//! Slow work (waiting for a launched program's window, waiting for a closing
//! guest to exit) runs in background Tokio tasks that post their result back
//! as another message.  Those tasks hold child tokens of the engine's root
//! [`CancellationToken`] and stop when the engine stops.
//!
//! # Active view
//!
//! Exactly one view is visible at a time: either a single session or one tile
//! group.  Embedding a window makes it the active view; `Select` switches
//! views.  Sessions outside the active view are hidden.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tabhost_core::domain::suppression::DEFAULT_SWEEP_THRESHOLD;
use tabhost_core::domain::sync_gate::DEFAULT_IGNORE_WINDOW;
use tabhost_core::{
    CloseBehavior, EmbeddedSession, ProcessId, SuppressionLedger, SyncDirection, SyncGuards,
    TileGroupId, WindowClassRules, WindowHandle,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::await_window::{first_window_of, wait_until, WaitError, WaitPolicy};
use crate::application::embed_window::{EmbedError, EmbedRequest, Embedder};
use crate::application::event_bridge::{BridgeContext, DetectionFilter, EventBridge};
use crate::application::hook_dispatcher::{translate, GuestEvent, HookDispatcher};
use crate::application::host::{HostAction, HostContainer, PolicyProvider};
use crate::application::layout_guest::{LayoutEngine, ViewportCompensation};
use crate::application::release_window::{ReleaseOutcome, ReleaseProtocol};
use crate::application::session_registry::SessionRegistry;
use crate::application::shutdown::{await_exit_or_kill, ExitReport, ShutdownCoordinator};
use crate::application::tile_groups::{TileGroupError, TileGroups};
use crate::application::track_processes::{ProcessLifecycleTracker, ReconcileReport};
use crate::infrastructure::hooks::{HookRegistrar, HookSink, RawHookEvent};
use crate::infrastructure::native::{ShowCommand, TaskbarIntegration, WindowSystem};
use crate::infrastructure::process::{ProcessError, ProcessInspector};
use crate::infrastructure::storage::config::EngineConfig;
use crate::infrastructure::storage::tracker_file::{StoreError, TrackerStore};

// ── Messages ──────────────────────────────────────────────────────────────────

/// Everything the control task reacts to.
#[derive(Debug)]
pub enum ControlMessage {
    /// A callback forwarded by the hook thread.
    Hook(RawHookEvent),
    /// The host's slot moved or changed size.
    SlotChanged,
    Embed(WindowHandle),
    Release(WindowHandle),
    /// Close one session according to the close policy.
    CloseSession(WindowHandle),
    /// Make the session (or its tile group) the active view.
    Select(WindowHandle),
    CreateTileGroup(Vec<WindowHandle>),
    DissolveTileGroup(TileGroupId),
    Launch {
        program: PathBuf,
        args: Vec<String>,
    },
    /// Result of waiting for a launched program's first window.
    WindowReady {
        pid: ProcessId,
        result: Result<WindowHandle, WaitError>,
    },
    /// Result of waiting for one closing guest to exit.
    CloseFinished {
        handle: WindowHandle,
        report: ExitReport,
    },
    /// Close every session according to the close policy, then stop.
    Shutdown,
    ShutdownFinished {
        generation: u64,
        report: ExitReport,
    },
}

/// Cloneable sender side of the control queue.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: UnboundedSender<ControlMessage>,
}

impl EngineHandle {
    /// Queues `message`.  Returns `false` once the engine has stopped.
    pub fn post(&self, message: ControlMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    /// A [`HookSink`] that forwards every raw event to this queue.
    pub fn hook_sink(&self) -> HookSink {
        let tx = self.tx.clone();
        Arc::new(move |event| {
            let _ = tx.send(ControlMessage::Hook(event));
        })
    }
}

/// Creates the control queue.
pub fn control_channel() -> (EngineHandle, UnboundedReceiver<ControlMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EngineHandle { tx }, rx)
}

// ── Construction ──────────────────────────────────────────────────────────────

/// The adapters the engine talks to.
#[derive(Clone)]
pub struct EngineDeps {
    pub windows: Arc<dyn WindowSystem>,
    pub taskbar: Arc<dyn TaskbarIntegration>,
    pub hooks: Arc<dyn HookRegistrar>,
    pub processes: Arc<dyn ProcessInspector>,
    pub store: Arc<dyn TrackerStore>,
    pub host: Arc<dyn HostContainer>,
    pub policy: Arc<dyn PolicyProvider>,
}

/// Tunables, usually taken from [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub class_rules: WindowClassRules,
    pub ignore_window: Duration,
    pub compensation: ViewportCompensation,
    /// How long a released window is kept from being offered again.
    pub release_suppression: Duration,
    pub suppression_sweep_threshold: usize,
    pub detection: DetectionFilter,
    /// How long a closing guest gets before it is terminated.
    pub shutdown_timeout: Duration,
    pub exit_poll_interval: Duration,
    pub window_wait: WaitPolicy,
    pub start_time_tolerance: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            class_rules: WindowClassRules::default(),
            ignore_window: DEFAULT_IGNORE_WINDOW,
            compensation: ViewportCompensation::default(),
            release_suppression: Duration::from_millis(2_000),
            suppression_sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
            detection: DetectionFilter::default(),
            shutdown_timeout: Duration::from_millis(5_000),
            exit_poll_interval: Duration::from_millis(100),
            window_wait: WaitPolicy::new(50, Duration::from_millis(100)),
            start_time_tolerance: Duration::from_millis(1_000),
        }
    }
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        let lifecycle = &config.lifecycle;
        Self {
            class_rules: WindowClassRules {
                true_child_classes: config.layout.true_child_classes.clone(),
                ..WindowClassRules::default()
            },
            ignore_window: Duration::from_millis(config.engine.ignore_window_ms),
            compensation: ViewportCompensation {
                offset_y: config.layout.compensation_y,
                extra_top: config.layout.compensation_top,
                extra_bottom: config.layout.compensation_bottom,
            },
            release_suppression: Duration::from_millis(config.suppression.release_suppression_ms),
            suppression_sweep_threshold: config.suppression.sweep_threshold,
            detection: DetectionFilter {
                excluded_processes: config.detection.excluded_processes.clone(),
                excluded_classes: config.detection.excluded_classes.clone(),
            },
            shutdown_timeout: Duration::from_millis(lifecycle.shutdown_timeout_ms),
            exit_poll_interval: Duration::from_millis(lifecycle.exit_poll_interval_ms),
            window_wait: WaitPolicy::new(
                lifecycle.window_wait_attempts,
                Duration::from_millis(lifecycle.window_wait_interval_ms),
            ),
            start_time_tolerance: Duration::from_millis(lifecycle.start_time_tolerance_ms),
        }
    }
}

/// What is currently visible in the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveView {
    Single(WindowHandle),
    Group(TileGroupId),
}

/// Returned by [`HostEngine::run`] when the engine stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineSummary {
    pub embedded: usize,
    pub released: usize,
    pub closed: usize,
    pub shutdown: Option<ExitReport>,
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Owns every session and executes every control message.
pub struct HostEngine {
    windows: Arc<dyn WindowSystem>,
    processes: Arc<dyn ProcessInspector>,
    host: Arc<dyn HostContainer>,
    policy: Arc<dyn PolicyProvider>,
    settings: EngineSettings,

    embedder: Embedder,
    layout: LayoutEngine,
    releaser: ReleaseProtocol,
    hooks: HookDispatcher,
    bridge: EventBridge,
    tracker: Arc<ProcessLifecycleTracker>,

    sessions: SessionRegistry,
    groups: TileGroups,
    suppression: SuppressionLedger,
    guards: SyncGuards,
    view: Option<ActiveView>,
    relayout_pending: bool,
    /// The guest whose drag currently holds the guest-to-host guard.
    dragging: Option<WindowHandle>,

    launching: HashSet<ProcessId>,
    closing: HashSet<WindowHandle>,
    shutdown: ShutdownCoordinator,
    cancel: CancellationToken,
    handle: EngineHandle,
    inbox: UnboundedReceiver<ControlMessage>,
    stopping: bool,
    summary: EngineSummary,
}

impl HostEngine {
    pub fn new(
        deps: EngineDeps,
        settings: EngineSettings,
        handle: EngineHandle,
        inbox: UnboundedReceiver<ControlMessage>,
    ) -> Self {
        let embedder = Embedder::new(
            deps.windows.clone(),
            deps.taskbar.clone(),
            deps.processes.clone(),
            settings.class_rules.clone(),
            settings.ignore_window,
        );
        let bridge = EventBridge::new(
            deps.windows.clone(),
            deps.processes.clone(),
            settings.class_rules.clone(),
            settings.detection.clone(),
        );
        let tracker = Arc::new(ProcessLifecycleTracker::new(
            deps.store.clone(),
            deps.processes.clone(),
            deps.windows.clone(),
            settings.start_time_tolerance,
        ));
        let cancel = CancellationToken::new();
        Self {
            layout: LayoutEngine::new(deps.windows.clone(), settings.compensation),
            releaser: ReleaseProtocol::new(deps.windows.clone(), deps.taskbar.clone()),
            hooks: HookDispatcher::new(deps.hooks.clone()),
            suppression: SuppressionLedger::new(settings.suppression_sweep_threshold),
            shutdown: ShutdownCoordinator::new(cancel.clone()),
            windows: deps.windows,
            processes: deps.processes,
            host: deps.host,
            policy: deps.policy,
            settings,
            embedder,
            bridge,
            tracker,
            sessions: SessionRegistry::new(),
            groups: TileGroups::new(),
            guards: SyncGuards::new(),
            view: None,
            relayout_pending: false,
            dragging: None,
            launching: HashSet::new(),
            closing: HashSet::new(),
            cancel,
            handle,
            inbox,
            stopping: false,
            summary: EngineSummary::default(),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Cleans up guests left behind by a previous crash.
    pub fn reconcile_zombies(&self) -> Result<ReconcileReport, StoreError> {
        let report = self.tracker.reconcile_zombies()?;
        if report.total() > 0 {
            info!(
                "reconciled {} tracked processes: {} killed, {} pid reuse, {} exited, {} left running",
                report.total(),
                report.killed.len(),
                report.skipped_pid_reuse.len(),
                report.exited.len(),
                report.left_running.len()
            );
        }
        Ok(report)
    }

    /// Installs the desktop-wide hooks.
    pub fn start(&mut self) {
        let failed = self.hooks.install_global();
        if failed.is_empty() {
            info!("global hooks installed");
        } else {
            warn!("running without global hooks for {failed:?}");
        }
    }

    /// Runs the control loop until a shutdown completes.
    pub async fn run(mut self) -> EngineSummary {
        self.start();
        info!("engine running");
        while !self.stopping && self.process_next().await {}
        self.cancel.cancel();
        info!("engine stopped");
        self.summary
    }

    /// Waits for one message and handles it.  Returns `false` if the queue
    /// is closed.
    pub async fn process_next(&mut self) -> bool {
        match self.inbox.recv().await {
            Some(message) => {
                self.handle_message(message);
                true
            }
            None => false,
        }
    }

    /// Handles one message.
    ///
    /// Must be called inside a Tokio runtime: some messages start background
    /// waits.
    pub fn handle_message(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Hook(raw) => self.on_hook(raw),
            ControlMessage::SlotChanged => self.relayout(),
            ControlMessage::Embed(handle) => {
                if let Err(e) = self.embed(handle) {
                    warn!("cannot embed {handle}: {e}");
                }
            }
            ControlMessage::Release(handle) => {
                self.release(handle);
            }
            ControlMessage::CloseSession(handle) => self.close_session(handle),
            ControlMessage::Select(handle) => {
                self.select(handle);
            }
            ControlMessage::CreateTileGroup(members) => {
                if let Err(e) = self.create_tile_group(members) {
                    warn!("cannot create tile group: {e}");
                }
            }
            ControlMessage::DissolveTileGroup(id) => {
                if let Err(e) = self.dissolve_tile_group(id) {
                    warn!("cannot dissolve tile group: {e}");
                }
            }
            ControlMessage::Launch { program, args } => {
                if let Err(e) = self.launch(&program, &args) {
                    warn!("cannot launch {}: {e}", program.display());
                }
            }
            ControlMessage::WindowReady { pid, result } => self.on_window_ready(pid, result),
            ControlMessage::CloseFinished { handle, report } => {
                self.on_close_finished(handle, report)
            }
            ControlMessage::Shutdown => self.begin_shutdown(),
            ControlMessage::ShutdownFinished { generation, report } => {
                self.finish_shutdown(generation, report)
            }
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn groups(&self) -> &TileGroups {
        &self.groups
    }

    pub fn active_view(&self) -> Option<ActiveView> {
        self.view
    }

    pub fn guards(&self) -> SyncGuards {
        self.guards
    }

    pub fn tracker(&self) -> &ProcessLifecycleTracker {
        &self.tracker
    }

    pub fn is_suppressed(&mut self, handle: WindowHandle) -> bool {
        self.suppression.is_suppressed(handle)
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping
    }

    pub fn summary(&self) -> &EngineSummary {
        &self.summary
    }

    /// Sessions currently shown in the slot.
    pub fn visible_sessions(&self) -> Vec<WindowHandle> {
        match self.view {
            Some(ActiveView::Single(handle)) => vec![handle],
            Some(ActiveView::Group(id)) => self
                .groups
                .get(id)
                .map(|g| g.members().to_vec())
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }

    // ── Embed / release ──────────────────────────────────────────────────────

    /// Captures `handle` and makes it the active view.
    pub fn embed(&mut self, handle: WindowHandle) -> Result<(), EmbedError> {
        let request = EmbedRequest {
            handle,
            host_window: self.host.host_window(),
            content_window: self.host.content_window(),
            slot: self.host.slot_rect().unwrap_or_default(),
            taskbar: self.policy.taskbar_policy(),
        };
        let mut session = self
            .embedder
            .embed(&request, &self.sessions, Instant::now())?;

        let failed = self.hooks.attach(&mut session);
        if !failed.is_empty() {
            warn!("{handle} embedded without {failed:?} hooks");
        }
        let pid = session.process_id();
        if let Err(e) = self.tracker.add(pid) {
            warn!("failed to track pid {pid}: {e}");
        }
        self.suppression.lift(handle);
        if let Err(mut rejected) = self.sessions.insert(session) {
            self.hooks.detach(&mut rejected);
            return Err(EmbedError::AlreadyEmbedded(handle));
        }
        self.summary.embedded += 1;
        self.set_view(Some(ActiveView::Single(handle)));
        Ok(())
    }

    /// Gives `handle` back to the desktop.
    pub fn release(&mut self, handle: WindowHandle) -> Option<ReleaseOutcome> {
        let mut session = self.detach_session(handle)?;
        let outcome = self.releaser.release(&mut session, &self.hooks, true);
        self.summary.released += 1;
        self.repair_view();
        Some(outcome)
    }

    /// Applies the close policy to one session.
    pub fn close_session(&mut self, handle: WindowHandle) {
        if !self.sessions.contains(handle) {
            return;
        }
        match self.policy.close_behavior() {
            CloseBehavior::CloseGuestApp => self.request_guest_close(handle),
            CloseBehavior::ReleaseToDesktop => {
                self.release(handle);
            }
            CloseBehavior::CloseHostApp => {
                self.release(handle);
                if self.sessions.is_empty() && self.closing.is_empty() {
                    info!("last guest released, asking the host to exit");
                    self.notify_host(&HostAction::ExitHost);
                }
            }
        }
    }

    fn request_guest_close(&mut self, handle: WindowHandle) {
        let Some(pid) = self.sessions.get(handle).map(EmbeddedSession::process_id) else {
            return;
        };
        if !self.closing.insert(handle) {
            debug!("close of {handle} already in progress");
            return;
        }
        if let Err(e) = self.windows.post_close(handle) {
            warn!("close request to {handle} failed, forgetting it: {e}");
            self.closing.remove(&handle);
            self.forget_closed(handle);
            return;
        }
        info!("asked {handle} (pid {pid}) to close");

        let processes = self.processes.clone();
        let poster = self.handle.clone();
        let token = self.cancel.child_token();
        let (poll, timeout) = (self.settings.exit_poll_interval, self.settings.shutdown_timeout);
        tokio::spawn(async move {
            let report = await_exit_or_kill(processes, vec![pid], poll, timeout, token).await;
            poster.post(ControlMessage::CloseFinished { handle, report });
        });
    }

    fn on_close_finished(&mut self, handle: WindowHandle, report: ExitReport) {
        self.closing.remove(&handle);
        if !report.kill_failed.is_empty() {
            warn!("guest process of {handle} survived the close request");
        }
        if self.sessions.contains(handle) {
            self.forget_closed(handle);
        }
        if self.policy.close_behavior() == CloseBehavior::CloseHostApp
            && self.sessions.is_empty()
            && self.closing.is_empty()
            && !self.shutdown.in_progress()
        {
            self.notify_host(&HostAction::ExitHost);
        }
    }

    /// Forgets a session whose window is gone and tells the host.
    fn forget_closed(&mut self, handle: WindowHandle) {
        if let Some(mut session) = self.detach_session(handle) {
            session.mark_closed();
            self.hooks.detach(&mut session);
            self.summary.closed += 1;
        }
        self.notify_host(&HostAction::GuestClosed(handle));
        self.repair_view();
    }

    /// Removes `handle` from every engine structure and returns its session.
    ///
    /// The caller still owns unhooking (directly or through release).
    fn detach_session(&mut self, handle: WindowHandle) -> Option<EmbeddedSession> {
        if !self.sessions.contains(handle) {
            return None;
        }
        let removal = self.groups.remove_member(handle, &mut self.sessions);
        debug!("{handle} left its tile group: {removal:?}");
        let session = self.sessions.remove(handle)?;
        self.bridge.forget(handle);
        if self.dragging == Some(handle) {
            // The caller repairs the view, which lays out the remaining guests.
            debug!("{handle} went away mid-drag");
            self.end_drag();
            self.relayout_pending = false;
        }
        self.suppression
            .suppress(handle, self.settings.release_suppression);

        let pid = session.process_id();
        if !self.sessions.owns_process(pid) && !self.launching.contains(&pid) {
            if let Err(e) = self.tracker.remove(pid) {
                warn!("failed to untrack pid {pid}: {e}");
            }
        }
        Some(session)
    }

    // ── Views and layout ─────────────────────────────────────────────────────

    /// Makes `handle`'s view active.  Returns `false` for unknown handles.
    pub fn select(&mut self, handle: WindowHandle) -> bool {
        if !self.sessions.contains(handle) {
            return false;
        }
        let view = self.view_of(handle);
        self.set_view(Some(view));
        true
    }

    fn view_of(&self, handle: WindowHandle) -> ActiveView {
        match self.groups.group_of(handle) {
            Some(group) => ActiveView::Group(group.id()),
            None => ActiveView::Single(handle),
        }
    }

    /// Shows the sessions of `view`, hides every other one, and lays out.
    fn set_view(&mut self, view: Option<ActiveView>) {
        self.view = view;
        let visible = self.visible_sessions();
        let now = Instant::now();
        for handle in self.sessions.handles() {
            let Some(session) = self.sessions.get_mut(handle) else {
                continue;
            };
            let shown = visible.contains(&handle);
            let command = if shown {
                ShowCommand::ShowNoActivate
            } else {
                ShowCommand::Hide
            };
            session.arm_gate_at(now);
            if let Err(e) = self.windows.show(handle, command) {
                warn!("failed to {} {handle}: {e}", if shown { "show" } else { "hide" });
            }
        }
        self.relayout();
    }

    /// Picks a new view if the current one no longer exists.
    fn repair_view(&mut self) {
        if self.shutdown.in_progress() {
            return;
        }
        let valid = match self.view {
            Some(ActiveView::Single(handle)) => {
                self.sessions.contains(handle) && self.groups.group_of(handle).is_none()
            }
            Some(ActiveView::Group(id)) => self.groups.get(id).is_some(),
            None => false,
        };
        if valid {
            self.relayout();
            return;
        }
        let next = self
            .sessions
            .handles()
            .last()
            .map(|handle| self.view_of(*handle));
        self.set_view(next);
    }

    /// Lays the active view out in the current slot.
    ///
    /// While a guest drives the host the relayout is deferred until the drag
    /// ends, so a burst of slot notifications becomes a single pass.
    fn relayout(&mut self) {
        if self.guards.guest_driving_host() {
            self.relayout_pending = true;
            return;
        }
        let Some(slot) = self.host.slot_rect() else {
            debug!("host has no slot, skipping layout");
            return;
        };
        if !self.guards.enter(SyncDirection::HostToGuest) {
            return;
        }
        let content = self.host.content_window();
        let now = Instant::now();
        match self.view {
            Some(ActiveView::Single(handle)) => {
                if let Some(session) = self.sessions.get_mut(handle) {
                    if let Err(e) = self.layout.resize(session, slot, content, now) {
                        warn!("failed to lay out {handle}: {e}");
                    }
                }
            }
            Some(ActiveView::Group(id)) => {
                if let Err(e) =
                    self.groups
                        .arrange(id, slot, &mut self.sessions, &self.layout, content, now)
                {
                    warn!("failed to arrange tile group: {e}");
                }
            }
            None => {}
        }
        self.guards.exit(SyncDirection::HostToGuest);
    }

    // ── Tile groups ──────────────────────────────────────────────────────────

    /// Tiles `members` in the slot and makes the group the active view.
    pub fn create_tile_group(
        &mut self,
        members: Vec<WindowHandle>,
    ) -> Result<TileGroupId, TileGroupError> {
        let id = self.groups.create(members, &mut self.sessions)?;
        self.set_view(Some(ActiveView::Group(id)));
        Ok(id)
    }

    /// Dissolves a group; its first member stays visible.
    pub fn dissolve_tile_group(&mut self, id: TileGroupId) -> Result<(), TileGroupError> {
        let members = self.groups.dissolve(id, &mut self.sessions)?;
        if self.view == Some(ActiveView::Group(id)) {
            let next = members.first().copied().map(ActiveView::Single);
            self.set_view(next);
        }
        Ok(())
    }

    // ── Launch ───────────────────────────────────────────────────────────────

    /// Starts `program` and embeds its first window once it appears.
    pub fn launch(&mut self, program: &Path, args: &[String]) -> Result<ProcessId, ProcessError> {
        let pid = self.processes.spawn(program, args)?;
        info!("launched {} as pid {pid}", program.display());
        if let Err(e) = self.tracker.add(pid) {
            warn!("failed to track pid {pid}: {e}");
        }
        self.launching.insert(pid);

        let windows = self.windows.clone();
        let rules = self.settings.class_rules.clone();
        let policy = self.settings.window_wait;
        let poster = self.handle.clone();
        let token = self.cancel.child_token();
        tokio::spawn(async move {
            let result = wait_until(policy, &token, || {
                first_window_of(windows.as_ref(), pid, &rules)
            })
            .await;
            poster.post(ControlMessage::WindowReady { pid, result });
        });
        Ok(pid)
    }

    fn on_window_ready(&mut self, pid: ProcessId, result: Result<WindowHandle, WaitError>) {
        self.launching.remove(&pid);
        match result {
            Ok(handle) => {
                if let Err(e) = self.embed(handle) {
                    warn!("window {handle} of launched pid {pid} cannot be embedded: {e}");
                    self.untrack_if_unused(pid);
                }
            }
            Err(WaitError::Cancelled) => debug!("stopped waiting for pid {pid}"),
            Err(e) => {
                warn!("launched pid {pid} never showed a window: {e}");
                self.untrack_if_unused(pid);
            }
        }
    }

    fn untrack_if_unused(&self, pid: ProcessId) {
        if self.sessions.owns_process(pid) {
            return;
        }
        if let Err(e) = self.tracker.remove(pid) {
            warn!("failed to untrack pid {pid}: {e}");
        }
    }

    // ── Hook events ──────────────────────────────────────────────────────────

    fn on_hook(&mut self, raw: RawHookEvent) {
        let Some(event) = translate(&raw) else {
            return;
        };
        let drag_ended = matches!(event, GuestEvent::MoveSizeEnd(h) if self.sessions.contains(h));
        if let GuestEvent::MoveSizeStart(h) = event {
            if self.sessions.contains(h) && self.guards.enter(SyncDirection::GuestToHost) {
                self.dragging = Some(h);
            }
        }

        let actions = {
            let mut ctx = BridgeContext {
                sessions: &mut self.sessions,
                suppression: &mut self.suppression,
                guards: &self.guards,
                host: self.host.as_ref(),
                now: Instant::now(),
            };
            self.bridge.handle_event(event, &mut ctx)
        };

        if drag_ended {
            self.end_drag();
        }
        self.execute(actions);
        if drag_ended {
            self.flush_relayout();
        }
    }

    /// Drops the guest-to-host guard held by a drag.
    fn end_drag(&mut self) {
        if self.dragging.take().is_some() {
            self.guards.exit(SyncDirection::GuestToHost);
        }
    }

    /// Runs the relayout deferred while a guest was driving the host.
    fn flush_relayout(&mut self) {
        if self.relayout_pending && !self.guards.guest_driving_host() {
            self.relayout_pending = false;
            self.relayout();
        }
    }

    /// Executes bridge actions in order.
    fn execute(&mut self, actions: Vec<HostAction>) {
        for action in actions {
            match action {
                HostAction::RestoreGuest(handle) => self.restore_guest(handle),
                HostAction::SnapGuestToSlot(handle) => {
                    if self.visible_sessions().contains(&handle) {
                        self.relayout();
                    }
                }
                HostAction::GuestClosed(handle) => {
                    self.closing.remove(&handle);
                    self.forget_closed(handle);
                }
                other => self.notify_host(&other),
            }
        }
    }

    fn restore_guest(&mut self, handle: WindowHandle) {
        let Some(session) = self.sessions.get_mut(handle) else {
            return;
        };
        session.arm_gate_at(Instant::now());
        match self.windows.show(handle, ShowCommand::Restore) {
            Ok(()) => session.was_maximized = false,
            Err(e) => warn!("failed to restore {handle}: {e}"),
        }
    }

    fn notify_host(&mut self, action: &HostAction) {
        let entered = self.guards.enter(SyncDirection::GuestToHost);
        self.host.apply(action);
        if entered {
            self.guards.exit(SyncDirection::GuestToHost);
        }
    }

    // ── Shutdown ─────────────────────────────────────────────────────────────

    fn begin_shutdown(&mut self) {
        let (generation, token) = self.shutdown.begin();
        let behavior = self.policy.close_behavior();
        info!(
            "shutdown {generation}: {} sessions, behavior {behavior:?}",
            self.sessions.len()
        );

        let mut pids = Vec::new();
        for handle in self.sessions.handles() {
            match behavior {
                CloseBehavior::CloseGuestApp => {
                    let Some(pid) = self.sessions.get(handle).map(EmbeddedSession::process_id)
                    else {
                        continue;
                    };
                    match self.windows.post_close(handle) {
                        Ok(()) => {
                            self.closing.insert(handle);
                            if !pids.contains(&pid) {
                                pids.push(pid);
                            }
                        }
                        Err(e) => {
                            debug!("close request to {handle} failed: {e}");
                            self.forget_closed(handle);
                        }
                    }
                }
                CloseBehavior::ReleaseToDesktop | CloseBehavior::CloseHostApp => {
                    self.release(handle);
                }
            }
        }

        if pids.is_empty() {
            self.finish_shutdown(generation, ExitReport::default());
            return;
        }
        let processes = self.processes.clone();
        let poster = self.handle.clone();
        let (poll, timeout) = (self.settings.exit_poll_interval, self.settings.shutdown_timeout);
        tokio::spawn(async move {
            let report = await_exit_or_kill(processes, pids, poll, timeout, token).await;
            poster.post(ControlMessage::ShutdownFinished { generation, report });
        });
    }

    fn finish_shutdown(&mut self, generation: u64, report: ExitReport) {
        if !self.shutdown.finish(generation) {
            debug!("ignoring result of superseded shutdown {generation}");
            return;
        }
        for handle in self.sessions.handles() {
            if let Some(mut session) = self.detach_session(handle) {
                session.mark_closed();
                self.hooks.detach(&mut session);
                self.summary.closed += 1;
            }
        }
        self.closing.clear();

        if report.is_clean() {
            if let Err(e) = self.tracker.clear() {
                warn!("failed to clear the tracker file: {e}");
            }
        } else {
            warn!("shutdown left guest processes behind, keeping them tracked");
        }
        self.hooks.uninstall_global();
        self.summary.shutdown = Some(report);
        self.stopping = true;
        info!("shutdown {generation} complete");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use tabhost_core::{HookCategory, HookHandle, Rect};
    use uuid::Uuid;

    use super::*;
    use crate::application::host::StaticPolicy;
    use crate::infrastructure::hooks::mock::MockHookRegistrar;
    use crate::infrastructure::hooks::HookEventKind;
    use crate::infrastructure::host_window::mock::RecordingHost;
    use crate::infrastructure::native::mock::{overlapped_window, DesktopCall, FakeDesktop};
    use crate::infrastructure::process::mock::FakeProcessTable;
    use crate::infrastructure::storage::tracker_file::JsonTrackerStore;

    const HOST: WindowHandle = WindowHandle(0x10);
    const GUEST_A: WindowHandle = WindowHandle(0x200);
    const GUEST_B: WindowHandle = WindowHandle(0x300);
    const SLOT: Rect = Rect::new(100, 100, 800, 600);
    const PID_A: ProcessId = 42;
    const PID_B: ProcessId = 43;

    struct Harness {
        desktop: Arc<FakeDesktop>,
        processes: Arc<FakeProcessTable>,
        registrar: Arc<MockHookRegistrar>,
        host: Arc<RecordingHost>,
        policy: Arc<StaticPolicy>,
        engine: HostEngine,
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            ignore_window: Duration::ZERO,
            shutdown_timeout: Duration::from_millis(20),
            exit_poll_interval: Duration::from_millis(1),
            window_wait: WaitPolicy::new(20, Duration::from_millis(1)),
            ..EngineSettings::default()
        }
    }

    fn harness_with(settings: EngineSettings) -> Harness {
        let desktop = Arc::new(FakeDesktop::new());
        desktop.add_window(overlapped_window(HOST, 1, "HostFrame", "Host", SLOT));
        desktop.add_window(overlapped_window(
            GUEST_A,
            PID_A,
            "Notepad",
            "a.txt - Notepad",
            Rect::new(300, 200, 640, 480),
        ));
        desktop.add_window(overlapped_window(
            GUEST_B,
            PID_B,
            "Notepad",
            "b.txt - Notepad",
            Rect::new(320, 220, 640, 480),
        ));
        let processes = Arc::new(FakeProcessTable::new(1));
        processes.add(PID_A, "notepad.exe", 1_000);
        processes.add(PID_B, "notepad.exe", 2_000);
        let registrar = Arc::new(MockHookRegistrar::new());
        let host = Arc::new(RecordingHost::new(HOST, HOST, SLOT));
        let policy = Arc::new(StaticPolicy::default());
        let store = Arc::new(JsonTrackerStore::new(
            std::env::temp_dir()
                .join(format!("tabhost_engine_{}", Uuid::new_v4()))
                .join("tracked.json"),
        ));
        let deps = EngineDeps {
            windows: desktop.clone(),
            taskbar: desktop.clone(),
            hooks: registrar.clone(),
            processes: processes.clone(),
            store,
            host: host.clone(),
            policy: policy.clone(),
        };
        let (handle, inbox) = control_channel();
        let mut engine = HostEngine::new(deps, settings, handle, inbox);
        engine.start();
        Harness {
            desktop,
            processes,
            registrar,
            host,
            policy,
            engine,
        }
    }

    fn harness() -> Harness {
        harness_with(settings())
    }

    fn hook(kind: HookEventKind, window: WindowHandle) -> ControlMessage {
        ControlMessage::Hook(RawHookEvent::for_window(HookHandle(1), kind, window))
    }

    fn tracked_pids(h: &Harness) -> Vec<ProcessId> {
        h.engine
            .tracker()
            .records()
            .unwrap()
            .iter()
            .map(|r| r.process_id)
            .collect()
    }

    #[test]
    fn test_embed_registers_hooks_tracks_and_activates() {
        // Arrange
        let mut h = harness();

        // Act
        h.engine.embed(GUEST_A).unwrap();

        // Assert
        let session = h.engine.sessions().get(GUEST_A).unwrap();
        assert_eq!(session.hooks().len(), HookCategory::PER_SESSION.len());
        assert_eq!(tracked_pids(&h), vec![PID_A]);
        assert_eq!(h.engine.active_view(), Some(ActiveView::Single(GUEST_A)));
        assert_eq!(h.desktop.window(GUEST_A).unwrap().info.rect, SLOT);
    }

    #[test]
    fn test_second_embed_hides_previous_view() {
        let mut h = harness();
        h.engine.embed(GUEST_A).unwrap();

        h.engine.embed(GUEST_B).unwrap();

        assert_eq!(h.engine.visible_sessions(), vec![GUEST_B]);
        assert!(!h.desktop.window(GUEST_A).unwrap().info.visible);
        assert!(h.desktop.window(GUEST_B).unwrap().info.visible);

        h.engine.handle_message(ControlMessage::Select(GUEST_A));
        assert!(h.desktop.window(GUEST_A).unwrap().info.visible);
        assert!(!h.desktop.window(GUEST_B).unwrap().info.visible);
    }

    #[test]
    fn test_double_embed_is_rejected() {
        let mut h = harness();
        h.engine.embed(GUEST_A).unwrap();

        assert_eq!(
            h.engine.embed(GUEST_A),
            Err(EmbedError::AlreadyEmbedded(GUEST_A))
        );
        assert_eq!(h.engine.sessions().len(), 1);
    }

    #[test]
    fn test_slot_change_relays_out_active_guest() {
        // Arrange
        let mut h = harness();
        h.engine.embed(GUEST_A).unwrap();
        let moved = Rect::new(150, 120, 1000, 700);
        h.host.set_slot(Some(moved));

        // Act
        h.engine.handle_message(ControlMessage::SlotChanged);

        // Assert
        assert_eq!(h.desktop.window(GUEST_A).unwrap().info.rect, moved);
    }

    #[test]
    fn test_slot_changes_during_drag_are_coalesced_until_drag_end() {
        // Arrange
        let mut h = harness();
        h.engine.embed(GUEST_A).unwrap();
        h.engine.handle_message(hook(HookEventKind::MoveSizeStart, GUEST_A));
        h.desktop.clear_calls();

        // Act
        h.host.set_slot(Some(Rect::new(110, 100, 800, 600)));
        h.engine.handle_message(ControlMessage::SlotChanged);
        h.host.set_slot(Some(Rect::new(120, 100, 800, 600)));
        h.engine.handle_message(ControlMessage::SlotChanged);
        let during_drag = h.desktop.calls_for(GUEST_A);
        h.engine.handle_message(hook(HookEventKind::MoveSizeEnd, GUEST_A));

        // Assert
        assert!(during_drag.is_empty());
        assert!(!h.engine.guards().guest_driving_host());
        assert_eq!(
            h.desktop.window(GUEST_A).unwrap().info.rect,
            Rect::new(120, 100, 800, 600)
        );
    }

    #[test]
    fn test_guest_destroyed_mid_drag_does_not_block_layout() {
        // Arrange
        let mut h = harness();
        h.engine.embed(GUEST_B).unwrap();
        h.engine.embed(GUEST_A).unwrap();
        h.engine.handle_message(hook(HookEventKind::MoveSizeStart, GUEST_A));
        assert!(h.engine.guards().guest_driving_host());

        // Act
        h.desktop.user_destroy(GUEST_A);
        h.engine.handle_message(hook(HookEventKind::Destroy, GUEST_A));
        let moved = Rect::new(150, 120, 1000, 700);
        h.host.set_slot(Some(moved));
        h.engine.handle_message(ControlMessage::SlotChanged);

        // Assert
        assert!(!h.engine.guards().guest_driving_host());
        assert_eq!(h.engine.active_view(), Some(ActiveView::Single(GUEST_B)));
        assert_eq!(h.desktop.window(GUEST_B).unwrap().info.rect, moved);
    }

    #[test]
    fn test_guest_released_mid_drag_does_not_block_layout() {
        // Arrange
        let mut h = harness();
        h.engine.embed(GUEST_B).unwrap();
        h.engine.embed(GUEST_A).unwrap();
        h.engine.handle_message(hook(HookEventKind::MoveSizeStart, GUEST_A));
        h.host.set_slot(Some(Rect::new(110, 100, 800, 600)));
        h.engine.handle_message(ControlMessage::SlotChanged);

        // Act
        h.engine.handle_message(ControlMessage::Release(GUEST_A));
        let moved = Rect::new(150, 120, 1000, 700);
        h.host.set_slot(Some(moved));
        h.engine.handle_message(ControlMessage::SlotChanged);
        h.engine.handle_message(hook(HookEventKind::MoveSizeEnd, GUEST_A));

        // Assert
        assert!(!h.engine.guards().guest_driving_host());
        assert_eq!(h.desktop.window(GUEST_B).unwrap().info.rect, moved);
    }

    #[test]
    fn test_dragging_guest_moves_host() {
        // Arrange
        let mut h = harness();
        h.engine.embed(GUEST_A).unwrap();
        h.host.take_actions();
        h.engine.handle_message(hook(HookEventKind::MoveSizeStart, GUEST_A));

        // Act
        h.desktop.user_move(GUEST_A, SLOT.offset(15, -5));
        h.engine.handle_message(hook(HookEventKind::LocationChange, GUEST_A));

        // Assert
        assert_eq!(
            h.host.take_actions(),
            vec![HostAction::MoveHostBy { dx: 15, dy: -5 }]
        );
        assert!(h.engine.guards().guest_driving_host());
    }

    #[test]
    fn test_location_change_right_after_layout_is_ignored() {
        // Arrange
        let mut h = harness_with(EngineSettings {
            ignore_window: Duration::from_secs(60),
            ..settings()
        });
        h.engine.embed(GUEST_A).unwrap();
        h.host.take_actions();
        h.desktop.clear_calls();

        // Act
        h.desktop.user_move(GUEST_A, SLOT.offset(3, 3));
        h.engine.handle_message(hook(HookEventKind::LocationChange, GUEST_A));

        // Assert
        assert!(h.host.actions().is_empty());
        assert!(h.desktop.calls().is_empty());
    }

    #[test]
    fn test_maximized_guest_is_restored_and_host_maximizes() {
        // Arrange
        let mut h = harness();
        h.engine.embed(GUEST_A).unwrap();
        h.host.take_actions();

        // Act
        h.desktop.user_maximize(GUEST_A, Rect::new(0, 0, 1920, 1080));
        h.engine.handle_message(hook(HookEventKind::LocationChange, GUEST_A));

        // Assert
        assert_eq!(h.host.take_actions(), vec![HostAction::ToggleHostMaximize]);
        assert!(!h.desktop.window(GUEST_A).unwrap().maximized);
        assert!(!h.engine.sessions().get(GUEST_A).unwrap().was_maximized);
    }

    #[test]
    fn test_destroyed_guest_is_forgotten() {
        // Arrange
        let mut h = harness();
        h.engine.embed(GUEST_A).unwrap();
        h.host.take_actions();

        // Act
        h.desktop.user_destroy(GUEST_A);
        h.engine.handle_message(hook(HookEventKind::Destroy, GUEST_A));
        h.engine.handle_message(hook(HookEventKind::Destroy, GUEST_A));

        // Assert
        assert!(h.engine.sessions().is_empty());
        assert_eq!(h.host.take_actions(), vec![HostAction::GuestClosed(GUEST_A)]);
        assert_eq!(
            h.registrar.active_count(),
            HookCategory::GLOBAL.len(),
            "only global hooks remain"
        );
        assert!(tracked_pids(&h).is_empty());
        assert_eq!(h.engine.active_view(), None);
    }

    #[test]
    fn test_release_to_desktop_restores_and_suppresses() {
        // Arrange
        let mut h = harness();
        h.engine.embed(GUEST_A).unwrap();
        h.engine.embed(GUEST_B).unwrap();

        // Act
        h.engine.handle_message(ControlMessage::CloseSession(GUEST_B));

        // Assert
        let window = h.desktop.window(GUEST_B).unwrap();
        assert_eq!(window.info.rect, Rect::new(320, 220, 640, 480));
        assert_eq!(window.info.owner, None);
        assert!(h.engine.is_suppressed(GUEST_B));
        assert_eq!(h.engine.active_view(), Some(ActiveView::Single(GUEST_A)));
        assert!(h.desktop.window(GUEST_A).unwrap().info.visible);
        assert_eq!(tracked_pids(&h), vec![PID_A]);
    }

    #[test]
    fn test_close_host_app_exits_after_last_guest() {
        let mut h = harness();
        h.policy.set_close_behavior(CloseBehavior::CloseHostApp);
        h.engine.embed(GUEST_A).unwrap();
        h.engine.embed(GUEST_B).unwrap();
        h.host.take_actions();

        h.engine.handle_message(ControlMessage::CloseSession(GUEST_A));
        assert!(h.host.actions().is_empty());

        h.engine.handle_message(ControlMessage::CloseSession(GUEST_B));
        assert_eq!(h.host.take_actions(), vec![HostAction::ExitHost]);
    }

    #[tokio::test]
    async fn test_close_guest_app_escalates_to_kill() {
        // Arrange
        let mut h = harness();
        h.policy.set_close_behavior(CloseBehavior::CloseGuestApp);
        h.engine.embed(GUEST_A).unwrap();

        // Act
        h.engine.handle_message(ControlMessage::CloseSession(GUEST_A));
        assert!(h.desktop.window(GUEST_A).unwrap().close_requested);
        assert!(h.engine.process_next().await);

        // Assert
        assert_eq!(h.processes.terminated(), vec![PID_A]);
        assert!(h.engine.sessions().is_empty());
        assert!(h.host.actions().contains(&HostAction::GuestClosed(GUEST_A)));
    }

    #[test]
    fn test_tile_group_shows_members_side_by_side() {
        // Arrange
        let mut h = harness();
        h.engine.embed(GUEST_A).unwrap();
        h.engine.embed(GUEST_B).unwrap();

        // Act
        h.engine
            .handle_message(ControlMessage::CreateTileGroup(vec![GUEST_A, GUEST_B]));

        // Assert
        assert_eq!(h.engine.visible_sessions(), vec![GUEST_A, GUEST_B]);
        assert_eq!(
            h.desktop.window(GUEST_A).unwrap().info.rect,
            Rect::new(100, 100, 400, 600)
        );
        assert_eq!(
            h.desktop.window(GUEST_B).unwrap().info.rect,
            Rect::new(500, 100, 400, 600)
        );
        assert!(h.desktop.window(GUEST_A).unwrap().info.visible);
        assert_eq!(
            h.desktop.calls().last(),
            Some(&DesktopCall::PlaceBehind(HOST, GUEST_B))
        );
    }

    #[test]
    fn test_releasing_a_member_dissolves_two_member_group() {
        let mut h = harness();
        h.engine.embed(GUEST_A).unwrap();
        h.engine.embed(GUEST_B).unwrap();
        h.engine.create_tile_group(vec![GUEST_A, GUEST_B]).unwrap();

        h.engine.release(GUEST_A);

        assert!(h.engine.groups().is_empty());
        assert_eq!(h.engine.active_view(), Some(ActiveView::Single(GUEST_B)));
        assert_eq!(h.desktop.window(GUEST_B).unwrap().info.rect, SLOT);
    }

    #[test]
    fn test_new_window_of_guest_process_is_offered() {
        // Arrange
        let mut h = harness();
        h.engine.embed(GUEST_A).unwrap();
        h.host.take_actions();
        let second = WindowHandle(0x201);
        h.desktop.add_window(overlapped_window(
            second,
            PID_A,
            "Notepad",
            "c.txt - Notepad",
            Rect::new(0, 0, 300, 200),
        ));

        // Act
        h.engine.handle_message(hook(HookEventKind::Show, second));

        // Assert
        let actions = h.host.take_actions();
        assert!(matches!(
            actions.as_slice(),
            [HostAction::OfferCandidate(info)] if info.handle == second
        ));
    }

    #[tokio::test]
    async fn test_launch_embeds_first_window() {
        // Arrange
        let mut h = harness();
        let pid = h.processes.next_spawn_pid();
        h.desktop.add_window(overlapped_window(
            WindowHandle(0x500),
            pid,
            "Notepad",
            "Untitled - Notepad",
            Rect::new(10, 10, 300, 200),
        ));

        // Act
        h.engine.handle_message(ControlMessage::Launch {
            program: PathBuf::from("notepad.exe"),
            args: Vec::new(),
        });
        assert!(h.engine.process_next().await);

        // Assert
        assert!(h.engine.sessions().contains(WindowHandle(0x500)));
        assert_eq!(tracked_pids(&h), vec![pid]);
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything_and_stops() {
        // Arrange
        let mut h = harness();
        h.engine.embed(GUEST_A).unwrap();
        h.engine.embed(GUEST_B).unwrap();

        // Act
        h.engine.handle_message(ControlMessage::Shutdown);

        // Assert
        assert!(h.engine.is_stopping());
        assert!(h.engine.sessions().is_empty());
        assert_eq!(h.registrar.active_count(), 0);
        assert!(tracked_pids(&h).is_empty());
        assert_eq!(
            h.desktop.window(GUEST_A).unwrap().info.rect,
            Rect::new(300, 200, 640, 480)
        );
    }

    #[tokio::test]
    async fn test_second_shutdown_supersedes_pending_wait() {
        // Arrange
        let mut h = harness_with(EngineSettings {
            shutdown_timeout: Duration::from_secs(60),
            ..settings()
        });
        h.policy.set_close_behavior(CloseBehavior::CloseGuestApp);
        h.engine.embed(GUEST_A).unwrap();
        h.engine.handle_message(ControlMessage::Shutdown);
        assert!(!h.engine.is_stopping());

        // Act
        h.policy.set_close_behavior(CloseBehavior::ReleaseToDesktop);
        h.engine.handle_message(ControlMessage::Shutdown);

        // Assert
        assert!(h.engine.is_stopping());
        assert!(h.processes.terminated().is_empty());
        assert_eq!(h.desktop.window(GUEST_A).unwrap().info.owner, None);
        assert!(h.engine.process_next().await, "stale result still arrives");
        assert!(h.engine.summary().shutdown.as_ref().is_some_and(|r| !r.cancelled));
    }
}

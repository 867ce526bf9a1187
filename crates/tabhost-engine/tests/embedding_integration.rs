//! Integration tests for the embedding engine.
//!
//! These tests drive [`HostEngine`] only through its public message API,
//! against the in-memory desktop, hook registrar, and process table, and check
//! the window state a user would observe.

use std::sync::Arc;
use std::time::Duration;

use tabhost_core::{ExtendedStyle, HookHandle, HostingMode, Insets, Rect, WindowHandle};
use tabhost_engine::application::engine::{
    control_channel, ControlMessage, EngineDeps, EngineHandle, EngineSettings, HostEngine,
};
use tabhost_engine::application::host::{HostAction, StaticPolicy};
use tabhost_engine::infrastructure::hooks::mock::MockHookRegistrar;
use tabhost_engine::infrastructure::hooks::{HookEventKind, RawHookEvent};
use tabhost_engine::infrastructure::host_window::mock::RecordingHost;
use tabhost_engine::infrastructure::native::mock::{overlapped_window, FakeDesktop};
use tabhost_engine::infrastructure::native::WindowSystem;
use tabhost_engine::infrastructure::process::mock::FakeProcessTable;
use tabhost_engine::infrastructure::storage::tracker_file::JsonTrackerStore;
use uuid::Uuid;

const HOST: WindowHandle = WindowHandle(0x10);
const GUEST: WindowHandle = WindowHandle(0x200);
const THIRD_PARTY: WindowHandle = WindowHandle(0x900);
const GUEST_RECT: Rect = Rect::new(300, 200, 640, 480);
const SLOT: Rect = Rect::new(108, 131, 800, 600);
const FRAME: Insets = Insets {
    left: 8,
    top: 31,
    right: 8,
    bottom: 8,
};

struct World {
    desktop: Arc<FakeDesktop>,
    host: Arc<RecordingHost>,
    engine: HostEngine,
    handle: EngineHandle,
}

fn world(settings: EngineSettings) -> World {
    let desktop = Arc::new(FakeDesktop::new());
    desktop.add_window_with_frame(
        overlapped_window(HOST, 1, "HostFrame", "Host", Rect::new(100, 100, 816, 639)),
        FRAME,
    );
    desktop.add_window_with_frame(
        overlapped_window(GUEST, 42, "Notepad", "notes.txt - Notepad", GUEST_RECT),
        FRAME,
    );
    desktop.add_window(overlapped_window(
        THIRD_PARTY,
        99,
        "Chrome_WidgetWin_1",
        "Browser",
        Rect::new(0, 0, 1200, 900),
    ));

    let processes = Arc::new(FakeProcessTable::new(1));
    processes.add(42, "notepad.exe", 1_000);
    processes.add(99, "browser.exe", 2_000);

    let host = Arc::new(RecordingHost::new(HOST, HOST, SLOT));
    let store = Arc::new(JsonTrackerStore::new(
        std::env::temp_dir()
            .join(format!("tabhost_it_{}", Uuid::new_v4()))
            .join("tracked.json"),
    ));
    let deps = EngineDeps {
        windows: desktop.clone(),
        taskbar: desktop.clone(),
        hooks: Arc::new(MockHookRegistrar::new()),
        processes,
        store,
        host: host.clone(),
        policy: Arc::new(StaticPolicy::default()),
    };
    let (handle, inbox) = control_channel();
    let mut engine = HostEngine::new(deps, settings, handle.clone(), inbox);
    engine.start();
    World {
        desktop,
        host,
        engine,
        handle,
    }
}

fn hook(kind: HookEventKind, window: WindowHandle) -> ControlMessage {
    ControlMessage::Hook(RawHookEvent::for_window(HookHandle(7), kind, window))
}

#[test]
fn test_end_to_end_embed_sync_and_release() {
    let mut w = world(EngineSettings::default());
    assert!(w.desktop.has_tab(GUEST), "guest starts with a taskbar button");

    // ── Embed ────────────────────────────────────────────────────────────────
    w.engine.handle_message(ControlMessage::Embed(GUEST));

    let session = w.engine.sessions().get(GUEST).expect("guest is embedded");
    assert_eq!(session.hosting_mode(), HostingMode::RepositionedPopup);
    assert_eq!(session.original().rect, GUEST_RECT);
    assert_eq!(
        session.original().ex_style,
        ExtendedStyle(ExtendedStyle::APPWINDOW)
    );
    assert!(!w.desktop.has_tab(GUEST), "hidden from the taskbar by policy");
    assert_eq!(w.desktop.window(GUEST).unwrap().info.owner, Some(HOST));

    // ── Layout: the client area exactly fills the slot ───────────────────────
    assert_eq!(w.desktop.client_rect(GUEST).unwrap(), SLOT);
    assert_eq!(
        w.desktop.window(GUEST).unwrap().clip,
        Some(Rect::new(8, 31, 800, 600))
    );

    // ── Foreground of a third-party window leaves the host alone ─────────────
    w.host.set_active(false);
    w.host.take_actions();
    w.engine.handle_message(hook(HookEventKind::Foreground, THIRD_PARTY));
    assert!(w.host.actions().is_empty());

    // ── Activating the guest from that window brings the host forward ────────
    w.engine.handle_message(hook(HookEventKind::Foreground, GUEST));
    assert_eq!(w.host.take_actions(), vec![HostAction::BringHostToFront]);

    // ── Release ──────────────────────────────────────────────────────────────
    w.engine.handle_message(ControlMessage::Release(GUEST));

    let window = w.desktop.window(GUEST).unwrap();
    assert_eq!(window.parent, None);
    assert_eq!(window.info.owner, None);
    assert_eq!(window.info.rect, GUEST_RECT);
    assert_eq!(window.clip, None);
    assert!(w.desktop.has_tab(GUEST), "taskbar button is back");
    assert!(w.engine.sessions().is_empty());
}

#[test]
fn test_echo_of_engine_layout_produces_no_action() {
    // Arrange
    let mut w = world(EngineSettings {
        ignore_window: Duration::from_secs(30),
        ..EngineSettings::default()
    });
    w.engine.handle_message(ControlMessage::Embed(GUEST));
    w.host.set_slot(Some(Rect::new(108, 131, 1000, 700)));
    w.engine.handle_message(ControlMessage::SlotChanged);
    w.host.take_actions();
    w.desktop.clear_calls();

    // Act: the OS reports the move the engine just made
    w.engine
        .handle_message(hook(HookEventKind::LocationChange, GUEST));

    // Assert
    assert!(w.host.actions().is_empty());
    assert!(w.desktop.calls().is_empty());
}

#[test]
fn test_reembedding_a_released_window_is_allowed_but_not_offered() {
    // Arrange
    let mut w = world(EngineSettings::default());
    w.engine.handle_message(ControlMessage::Embed(GUEST));
    w.engine.handle_message(ControlMessage::Release(GUEST));

    // Act
    let suppressed = w.engine.is_suppressed(GUEST);
    w.engine.handle_message(ControlMessage::Embed(GUEST));

    // Assert
    assert!(suppressed);
    assert!(w.engine.sessions().contains(GUEST));
    assert!(!w.engine.is_suppressed(GUEST));
}

#[tokio::test]
async fn test_run_loop_processes_queue_until_shutdown() {
    // Arrange
    let w = world(EngineSettings::default());
    w.handle.post(ControlMessage::Embed(GUEST));
    w.handle.post(ControlMessage::SlotChanged);
    w.handle.post(ControlMessage::Shutdown);

    // Act
    let summary = w.engine.run().await;

    // Assert
    assert_eq!(summary.embedded, 1);
    assert_eq!(summary.released, 1);
    assert!(summary.shutdown.is_some_and(|report| report.is_clean()));
    assert_eq!(w.desktop.window(GUEST).unwrap().info.rect, GUEST_RECT);
}

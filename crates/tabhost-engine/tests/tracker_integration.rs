//! Integration tests for crash recovery.
//!
//! A first "run" tracks guests through [`ProcessLifecycleTracker`] into a real
//! JSON ledger on disk; a second tracker over the same file reconciles them
//! the way the next start would after a crash.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tabhost_core::{ExtendedStyle, Rect, TrackedProcessRecord, WindowHandle};
use tabhost_engine::application::track_processes::ProcessLifecycleTracker;
use tabhost_engine::infrastructure::native::mock::{overlapped_window, FakeDesktop};
use tabhost_engine::infrastructure::process::mock::FakeProcessTable;
use tabhost_engine::infrastructure::storage::tracker_file::{JsonTrackerStore, TrackerStore};
use uuid::Uuid;

const TOLERANCE: Duration = Duration::from_millis(1_000);

fn ledger_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("tabhost_tracker_it_{}", Uuid::new_v4()))
        .join("tracked_processes.json")
}

fn tracker(
    path: &PathBuf,
    processes: &Arc<FakeProcessTable>,
    desktop: &Arc<FakeDesktop>,
) -> ProcessLifecycleTracker {
    ProcessLifecycleTracker::new(
        Arc::new(JsonTrackerStore::new(path.clone())),
        processes.clone(),
        desktop.clone(),
        TOLERANCE,
    )
}

#[test]
fn test_orphans_from_previous_run_are_reconciled() {
    // Arrange: the previous run tracked four guests, then crashed
    let path = ledger_path();
    let processes = Arc::new(FakeProcessTable::new(1));
    let desktop = Arc::new(FakeDesktop::new());
    processes.add(10, "notepad.exe", 1_000);
    processes.add(11, "calc.exe", 2_000);
    processes.add(12, "mspaint.exe", 3_000);
    processes.add(13, "wordpad.exe", 4_000);
    {
        let first_run = tracker(&path, &processes, &desktop);
        for pid in [10, 11, 12, 13] {
            first_run.add(pid).unwrap();
        }
    }

    // Between runs: 10 lost its window (orphaned), 11's pid was reused,
    // 12 was released and still shows a window, 13 exited.
    processes.add(11, "calc.exe", 9_999_000);
    desktop.add_window(overlapped_window(
        WindowHandle(0x120),
        12,
        "MSPaintApp",
        "Untitled - Paint",
        Rect::new(0, 0, 800, 600),
    ));
    processes.exit(13);

    // Act
    let second_run = tracker(&path, &processes, &desktop);
    let report = second_run.reconcile_zombies().unwrap();

    // Assert
    assert_eq!(report.killed, vec![10]);
    assert_eq!(report.skipped_pid_reuse, vec![11]);
    assert_eq!(report.left_running, vec![12]);
    assert_eq!(report.exited, vec![13]);
    assert_eq!(processes.terminated(), vec![10]);
    assert!(!path.exists(), "ledger is cleared after reconciliation");
}

#[test]
fn test_tool_window_does_not_keep_orphan_alive() {
    // Arrange
    let path = ledger_path();
    let processes = Arc::new(FakeProcessTable::new(1));
    let desktop = Arc::new(FakeDesktop::new());
    processes.add(20, "agent.exe", 5_000);
    let mut palette = overlapped_window(
        WindowHandle(0x220),
        20,
        "Palette",
        "Tools",
        Rect::new(0, 0, 100, 300),
    );
    palette.ex_style = ExtendedStyle(ExtendedStyle::TOOLWINDOW);
    desktop.add_window(palette);
    JsonTrackerStore::new(path.clone())
        .save(&[TrackedProcessRecord {
            process_id: 20,
            process_name: "agent.exe".to_string(),
            start_time_ms: 5_400,
        }])
        .unwrap();

    // Act
    let report = tracker(&path, &processes, &desktop)
        .reconcile_zombies()
        .unwrap();

    // Assert
    assert_eq!(report.killed, vec![20]);
}

#[test]
fn test_removed_guest_is_not_reconciled() {
    let path = ledger_path();
    let processes = Arc::new(FakeProcessTable::new(1));
    let desktop = Arc::new(FakeDesktop::new());
    processes.add(30, "notepad.exe", 1_000);
    let run = tracker(&path, &processes, &desktop);
    run.add(30).unwrap();

    assert!(run.remove(30).unwrap());
    let report = run.reconcile_zombies().unwrap();

    assert_eq!(report.total(), 0);
    assert!(processes.terminated().is_empty());
}

#[test]
fn test_truncated_ledger_is_discarded_and_tracking_resumes() {
    // Arrange: a crash mid-write left half a record behind
    let path = ledger_path();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "[{\"process_id\": 12").unwrap();
    let processes = Arc::new(FakeProcessTable::new(1));
    let desktop = Arc::new(FakeDesktop::new());
    processes.add(40, "notepad.exe", 1_000);
    let run = tracker(&path, &processes, &desktop);

    // Act
    let report = run.reconcile_zombies().unwrap();
    let added = run.add(40);

    // Assert
    assert_eq!(report.total(), 0);
    assert!(added.is_ok());
    assert_eq!(run.records().unwrap().len(), 1);
}

//! Recording host container for unit and integration testing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tabhost_core::{Rect, WindowHandle};

use crate::application::host::{HostAction, HostContainer};

/// A [`HostContainer`] with a settable slot that records every action.
pub struct RecordingHost {
    host: WindowHandle,
    content: WindowHandle,
    slot: Mutex<Option<Rect>>,
    active: AtomicBool,
    actions: Mutex<Vec<HostAction>>,
}

impl RecordingHost {
    pub fn new(host: WindowHandle, content: WindowHandle, slot: Rect) -> Self {
        Self {
            host,
            content,
            slot: Mutex::new(Some(slot)),
            active: AtomicBool::new(true),
            actions: Mutex::new(Vec::new()),
        }
    }

    /// Simulates the host resizing its content area.
    pub fn set_slot(&self, slot: Option<Rect>) {
        *self.slot.lock().expect("lock poisoned") = slot;
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Every action applied so far, in order.
    pub fn actions(&self) -> Vec<HostAction> {
        self.actions.lock().expect("lock poisoned").clone()
    }

    /// Returns and forgets the recorded actions.
    pub fn take_actions(&self) -> Vec<HostAction> {
        std::mem::take(&mut *self.actions.lock().expect("lock poisoned"))
    }
}

impl HostContainer for RecordingHost {
    fn host_window(&self) -> WindowHandle {
        self.host
    }

    fn content_window(&self) -> WindowHandle {
        self.content
    }

    fn slot_rect(&self) -> Option<Rect> {
        *self.slot.lock().expect("lock poisoned")
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn apply(&self, action: &HostAction) {
        self.actions
            .lock()
            .expect("lock poisoned")
            .push(action.clone());
    }
}

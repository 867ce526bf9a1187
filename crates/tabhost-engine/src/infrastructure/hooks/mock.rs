//! Mock hook registrar for unit testing.
//!
//! Allows tests to register and unregister hooks without a Win32 message
//! loop, to make chosen categories fail, and to emit synthetic events through
//! the connected [`HookSink`].

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tabhost_core::{HookCategory, HookHandle, WindowHandle};

use super::{HookError, HookEventKind, HookRegistrar, HookScope, HookSink, RawHookEvent};

#[derive(Default)]
struct RegistrarState {
    next_id: u64,
    active: HashMap<HookHandle, (HookCategory, HookScope)>,
    failing: HashSet<HookCategory>,
    unregistered: Vec<HookHandle>,
    sink: Option<HookSink>,
}

/// A mock implementation of [`HookRegistrar`].
#[derive(Default)]
pub struct MockHookRegistrar {
    state: Mutex<RegistrarState>,
}

impl MockHookRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects the sink that [`emit`](Self::emit) delivers to.
    pub fn connect(&self, sink: HookSink) {
        self.state.lock().expect("lock poisoned").sink = Some(sink);
    }

    /// Makes every future registration of `category` fail.
    pub fn fail_category(&self, category: HookCategory) {
        self.state
            .lock()
            .expect("lock poisoned")
            .failing
            .insert(category);
    }

    /// Number of hooks currently registered.
    pub fn active_count(&self) -> usize {
        self.state.lock().expect("lock poisoned").active.len()
    }

    /// Registered hooks of `category`, with their scope.
    pub fn active_of(&self, category: HookCategory) -> Vec<(HookHandle, HookScope)> {
        self.state
            .lock()
            .expect("lock poisoned")
            .active
            .iter()
            .filter(|(_, (c, _))| *c == category)
            .map(|(h, (_, s))| (*h, *s))
            .collect()
    }

    /// Every handle passed to `unregister`, in order.
    pub fn unregistered(&self) -> Vec<HookHandle> {
        self.state.lock().expect("lock poisoned").unregistered.clone()
    }

    /// Delivers a synthetic event about `window` to the connected sink.
    ///
    /// Panics if no sink is connected.
    pub fn emit(&self, kind: HookEventKind, window: WindowHandle) {
        let sink = self
            .state
            .lock()
            .expect("lock poisoned")
            .sink
            .clone()
            .expect("MockHookRegistrar::emit called before connect()");
        sink(RawHookEvent::for_window(HookHandle(0), kind, window));
    }
}

impl HookRegistrar for MockHookRegistrar {
    fn register(&self, category: HookCategory, scope: HookScope) -> Result<HookHandle, HookError> {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.failing.contains(&category) {
            return Err(HookError::RegistrationFailed {
                category,
                reason: "injected failure".to_string(),
            });
        }
        state.next_id += 1;
        let hook = HookHandle(state.next_id);
        state.active.insert(hook, (category, scope));
        Ok(hook)
    }

    fn unregister(&self, hook: HookHandle) -> Result<(), HookError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.unregistered.push(hook);
        state
            .active
            .remove(&hook)
            .map(|_| ())
            .ok_or(HookError::UnknownHook(hook))
    }
}

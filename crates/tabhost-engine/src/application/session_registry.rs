//! In-memory registry of embedded sessions.
//!
//! The registry is owned by the control loop and only ever touched from that
//! one task, so it needs no locking.  It keeps insertion order alongside the
//! map because the host shows guests as tabs and expects a stable order.

use std::collections::HashMap;

use tabhost_core::{EmbeddedSession, ProcessId, WindowHandle};

/// All live sessions, keyed by guest window handle.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<WindowHandle, EmbeddedSession>,
    order: Vec<WindowHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session.
    ///
    /// Returns the session back as `Err` if its handle is already registered.
    pub fn insert(&mut self, session: EmbeddedSession) -> Result<(), EmbeddedSession> {
        let handle = session.handle();
        if self.sessions.contains_key(&handle) {
            return Err(session);
        }
        self.order.push(handle);
        self.sessions.insert(handle, session);
        Ok(())
    }

    pub fn get(&self, handle: WindowHandle) -> Option<&EmbeddedSession> {
        self.sessions.get(&handle)
    }

    pub fn get_mut(&mut self, handle: WindowHandle) -> Option<&mut EmbeddedSession> {
        self.sessions.get_mut(&handle)
    }

    pub fn remove(&mut self, handle: WindowHandle) -> Option<EmbeddedSession> {
        let session = self.sessions.remove(&handle)?;
        self.order.retain(|h| *h != handle);
        Some(session)
    }

    pub fn contains(&self, handle: WindowHandle) -> bool {
        self.sessions.contains_key(&handle)
    }

    /// Handles in insertion order.
    pub fn handles(&self) -> Vec<WindowHandle> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// `true` if any session belongs to process `pid`.
    pub fn owns_process(&self, pid: ProcessId) -> bool {
        self.sessions.values().any(|s| s.process_id() == pid)
    }

    /// The first session (in insertion order) belonging to `pid`.
    pub fn session_for_process(&self, pid: ProcessId) -> Option<WindowHandle> {
        self.order
            .iter()
            .copied()
            .find(|h| self.sessions.get(h).is_some_and(|s| s.process_id() == pid))
    }
}

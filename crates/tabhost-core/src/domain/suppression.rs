//! Debounce ledger for recently released windows.
//!
//! When a guest is released (or force-closed) it becomes an ordinary
//! top-level window again, and the very next `Show` event the desktop sends
//! for it would make the new-window detector offer it for capture once more.
//! The ledger remembers each released handle until an expiry time so the
//! detector can skip it.
//!
//! # Bounded growth
//!
//! Entries are only purged lazily when queried, so a handle that is never
//! queried again would otherwise stay forever.  Once the map grows past the
//! sweep threshold, a full sweep drops every expired entry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use super::window::WindowHandle;

/// Default number of entries above which a full sweep runs.
pub const DEFAULT_SWEEP_THRESHOLD: usize = 64;

/// Map of `handle → expiry`.
#[derive(Debug, Clone)]
pub struct SuppressionLedger {
    entries: HashMap<WindowHandle, Instant>,
    sweep_threshold: usize,
}

impl Default for SuppressionLedger {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_THRESHOLD)
    }
}

impl SuppressionLedger {
    pub fn new(sweep_threshold: usize) -> Self {
        Self {
            entries: HashMap::new(),
            sweep_threshold: sweep_threshold.max(1),
        }
    }

    /// Suppresses `handle` for `duration`, overwriting any earlier expiry.
    pub fn suppress(&mut self, handle: WindowHandle, duration: Duration) {
        self.suppress_at(handle, duration, Instant::now());
    }

    pub fn suppress_at(&mut self, handle: WindowHandle, duration: Duration, now: Instant) {
        self.entries.insert(handle, now + duration);
        if self.entries.len() > self.sweep_threshold {
            self.sweep_at(now);
        }
    }

    /// Returns `true` while `handle` is suppressed.  An expired entry for
    /// `handle` is removed before answering.
    pub fn is_suppressed(&mut self, handle: WindowHandle) -> bool {
        self.is_suppressed_at(handle, Instant::now())
    }

    pub fn is_suppressed_at(&mut self, handle: WindowHandle, now: Instant) -> bool {
        match self.entries.get(&handle) {
            Some(expiry) if now < *expiry => true,
            Some(_) => {
                self.entries.remove(&handle);
                false
            }
            None => false,
        }
    }

    /// Drops every expired entry.  Returns how many were removed.
    pub fn sweep_at(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expiry| now < *expiry);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("suppression sweep removed {removed} expired entries");
        }
        removed
    }

    /// Lifts suppression for `handle` immediately.
    pub fn lift(&mut self, handle: WindowHandle) {
        self.entries.remove(&handle);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

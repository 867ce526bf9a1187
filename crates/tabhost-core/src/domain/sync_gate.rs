//! Feedback-loop breakers between host-driven and guest-driven updates.
//!
//! # The echo problem (for beginners)
//!
//! When the engine moves a guest window, the operating system reports the move
//! back as a `LocationChange` event, exactly as if the guest had moved itself.
//! If the engine reacted to that echo ("the guest moved, so move the host")
//! the host would move, which re-lays out the guest, which echoes again, and
//! the two windows would chase each other forever.
//!
//! Two independent mechanisms stop that:
//!
//! - [`IgnoreGate`]: a short time window armed every time the engine changes a
//!   guest's rect or show-state.  Guest events arriving while it is armed are
//!   treated as echoes and ignored.
//! - [`SyncGuards`]: two re-entrancy flags that mark which direction is
//!   currently being synchronised, so the opposite-direction handler does not
//!   re-trigger itself within the same logical update.

use std::time::{Duration, Instant};

/// Default echo window.
pub const DEFAULT_IGNORE_WINDOW: Duration = Duration::from_millis(120);

/// Time-windowed gate that marks guest events as echoes of engine actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IgnoreGate {
    window: Duration,
    armed_until: Option<Instant>,
}

impl Default for IgnoreGate {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORE_WINDOW)
    }
}

impl IgnoreGate {
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            armed_until: None,
        }
    }

    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Arms the gate starting at `now`.  Re-arming extends the deadline.
    pub fn arm_at(&mut self, now: Instant) {
        self.armed_until = Some(now + self.window);
    }

    pub fn arm(&mut self) {
        self.arm_at(Instant::now());
    }

    /// Returns `true` while `now` is inside the armed window.
    ///
    /// An expired deadline is cleared on read.
    pub fn is_armed_at(&mut self, now: Instant) -> bool {
        match self.armed_until {
            Some(deadline) if now < deadline => true,
            Some(_) => {
                self.armed_until = None;
                false
            }
            None => false,
        }
    }

    pub fn is_armed(&mut self) -> bool {
        self.is_armed_at(Instant::now())
    }

    pub fn disarm(&mut self) {
        self.armed_until = None;
    }
}

/// Which side is currently pushing state to the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    HostToGuest,
    GuestToHost,
}

/// Re-entrancy flags for the two synchronisation directions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncGuards {
    host_driving_guest: bool,
    guest_driving_host: bool,
}

impl SyncGuards {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `direction` as active.
    ///
    /// Returns `false` (and changes nothing) when that direction is already
    /// active, so a nested attempt can bail out instead of recursing.
    pub fn enter(&mut self, direction: SyncDirection) -> bool {
        let flag = self.flag_mut(direction);
        if *flag {
            return false;
        }
        *flag = true;
        true
    }

    pub fn exit(&mut self, direction: SyncDirection) {
        *self.flag_mut(direction) = false;
    }

    pub fn host_driving_guest(&self) -> bool {
        self.host_driving_guest
    }

    pub fn guest_driving_host(&self) -> bool {
        self.guest_driving_host
    }

    fn flag_mut(&mut self, direction: SyncDirection) -> &mut bool {
        match direction {
            SyncDirection::HostToGuest => &mut self.host_driving_guest,
            SyncDirection::GuestToHost => &mut self.guest_driving_host,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

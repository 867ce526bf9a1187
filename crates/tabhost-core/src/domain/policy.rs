//! Host-provided policy values.
//!
//! These values are owned by the host application's settings; the engine only
//! reads them at the moment it needs them, so a changed setting applies to the
//! next embed or close without restarting anything.

use serde::{Deserialize, Serialize};

/// What happens to a guest when the host closes its session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseBehavior {
    /// Ask the guest application to close; force-kill it if it does not exit
    /// within the shutdown timeout.
    CloseGuestApp,
    /// Give the window back to the desktop with its original attributes.
    #[default]
    ReleaseToDesktop,
    /// Release the guest, and exit the host once no guests remain.
    CloseHostApp,
}

/// Whether captured guests keep their own taskbar button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskbarPolicy {
    Hide,
    Show,
}

impl TaskbarPolicy {
    pub fn from_hide_flag(hide: bool) -> Self {
        if hide {
            TaskbarPolicy::Hide
        } else {
            TaskbarPolicy::Show
        }
    }

    pub fn is_hidden(&self) -> bool {
        matches!(self, TaskbarPolicy::Hide)
    }
}

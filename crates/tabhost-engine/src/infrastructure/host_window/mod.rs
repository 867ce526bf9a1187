//! Host container backed by real window handles.
//!
//! [`NativeHostContainer`] turns [`HostAction`]s into calls on the host's own
//! frame window through the same [`WindowSystem`] adapter the engine uses for
//! guests.  Actions that are notifications for the host UI (a guest closed, a
//! candidate window appeared) are logged; a headless host has nothing else to
//! do with them.

use std::sync::Arc;

use tabhost_core::{Rect, WindowHandle};
use tracing::{debug, info, warn};

use crate::application::host::{HostAction, HostContainer};
use crate::infrastructure::native::{PositionFlags, ShowCommand, WindowSystem};

pub mod mock;

/// A [`HostContainer`] for an existing host window.
pub struct NativeHostContainer {
    windows: Arc<dyn WindowSystem>,
    host: WindowHandle,
    content: WindowHandle,
}

impl NativeHostContainer {
    /// `content` may equal `host` when the whole client area is the slot.
    pub fn new(windows: Arc<dyn WindowSystem>, host: WindowHandle, content: WindowHandle) -> Self {
        Self {
            windows,
            host,
            content,
        }
    }

    fn move_by(&self, dx: i32, dy: i32) {
        let result = self
            .windows
            .window_rect(self.host)
            .and_then(|rect| {
                self.windows.set_position(
                    self.host,
                    rect.offset(dx, dy),
                    PositionFlags {
                        no_activate: true,
                        no_z_order: true,
                        ..PositionFlags::default()
                    },
                )
            });
        if let Err(e) = result {
            warn!("failed to move host window by ({dx}, {dy}): {e}");
        }
    }

    fn toggle_maximize(&self) {
        let command = if self.windows.is_maximized(self.host) {
            ShowCommand::Restore
        } else {
            ShowCommand::Maximize
        };
        if let Err(e) = self.windows.show(self.host, command) {
            warn!("failed to toggle host maximize: {e}");
        }
    }
}

impl HostContainer for NativeHostContainer {
    fn host_window(&self) -> WindowHandle {
        self.host
    }

    fn content_window(&self) -> WindowHandle {
        self.content
    }

    fn slot_rect(&self) -> Option<Rect> {
        self.windows
            .client_rect(self.content)
            .ok()
            .filter(|rect| !rect.is_empty())
    }

    fn is_active(&self) -> bool {
        self.windows.foreground_window() == Some(self.host)
    }

    fn apply(&self, action: &HostAction) {
        match action {
            HostAction::MoveHostBy { dx, dy } => self.move_by(*dx, *dy),
            HostAction::ToggleHostMaximize => self.toggle_maximize(),
            HostAction::MinimizeHost => {
                if let Err(e) = self.windows.show(self.host, ShowCommand::Minimize) {
                    warn!("failed to minimize host: {e}");
                }
            }
            HostAction::BringHostToFront => {
                if let Err(e) = self.windows.set_foreground(self.host) {
                    debug!("host foreground request refused: {e}");
                }
            }
            HostAction::PinDialog { dialog, guest } => {
                debug!("pinning dialog {dialog} of guest {guest}");
                if let Err(e) = self.windows.set_foreground(*dialog) {
                    debug!("dialog foreground request refused: {e}");
                }
            }
            HostAction::GuestClosed(handle) => info!("guest {handle} closed"),
            HostAction::OfferCandidate(window) => {
                info!(
                    "candidate window {} ({:?}, class {})",
                    window.handle, window.title, window.class_name
                );
            }
            HostAction::ExitHost => info!("close policy requested host exit"),
            HostAction::RestoreGuest(_) | HostAction::SnapGuestToSlot(_) => {}
        }
    }
}

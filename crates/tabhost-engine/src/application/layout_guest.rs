//! LayoutGuestUseCase: keep a guest glued to its slot.
//!
//! Given the slot rectangle (screen coordinates), the layout engine computes
//! where the guest window itself must go so that what the user *sees* is
//! exactly the slot:
//!
//! - **True children** are placed relative to the content window's client
//!   area.  Console windows draw one pixel row outside their reported client
//!   area, so the placement is nudged by a small configurable compensation.
//! - **Repositioned popups** keep a residual non-client area even after their
//!   frame bits are stripped (the invisible resize border, for instance).  The
//!   window is grown by those insets so the *client* area covers the slot, and
//!   a clip region hides the insets.
//!
//! ```text
//!   window rect ┌──────────────────────┐
//!               │ ┌──────────────────┐ │  ← insets, clipped away
//!               │ │   client == slot │ │
//!               │ └──────────────────┘ │
//!               └──────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Instant;

use tabhost_core::{EmbeddedSession, HostingMode, Insets, InteractionState, Rect, WindowHandle};
use tracing::debug;

use crate::infrastructure::native::{NativeError, PositionFlags, WindowSystem};

/// Pixel adjustments applied to true-child guests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportCompensation {
    pub offset_y: i32,
    pub extra_top: i32,
    pub extra_bottom: i32,
}

impl Default for ViewportCompensation {
    fn default() -> Self {
        Self {
            offset_y: -1,
            extra_top: 1,
            extra_bottom: 1,
        }
    }
}

/// Where a guest goes and how it is clipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// In the coordinate space `WindowSystem::set_position` expects.
    pub rect: Rect,
    /// Window-relative visible region, if any.
    pub clip: Option<Rect>,
}

/// Computes the placement of a guest for `slot`.
///
/// `parent_origin` is the screen position of the content window's client
/// area and is only used for true children.  `insets` are the guest's current
/// non-client insets and are only used for popups.
pub fn compute_placement(
    mode: HostingMode,
    slot: &Rect,
    parent_origin: (i32, i32),
    insets: Insets,
    compensation: &ViewportCompensation,
) -> Placement {
    match mode {
        HostingMode::TrueChild => Placement {
            rect: Rect::new(
                slot.x - parent_origin.0,
                slot.y - parent_origin.1 + compensation.offset_y,
                slot.width,
                slot.height + compensation.extra_top + compensation.extra_bottom,
            ),
            clip: None,
        },
        HostingMode::RepositionedPopup => Placement {
            rect: slot.expand(insets),
            clip: (!insets.is_zero())
                .then(|| Rect::new(insets.left, insets.top, slot.width, slot.height)),
        },
    }
}

/// Applies placements to guests.
pub struct LayoutEngine {
    windows: Arc<dyn WindowSystem>,
    compensation: ViewportCompensation,
}

impl LayoutEngine {
    pub fn new(windows: Arc<dyn WindowSystem>, compensation: ViewportCompensation) -> Self {
        Self {
            windows,
            compensation,
        }
    }

    /// Moves `session`'s guest onto `slot`.
    ///
    /// Returns `Ok(None)` without touching the window while the user is
    /// dragging it or once it is closed or released.
    ///
    /// # Errors
    ///
    /// Returns the first native failure; the session's recorded placement is
    /// left unchanged in that case.
    pub fn resize(
        &self,
        session: &mut EmbeddedSession,
        slot: Rect,
        content_window: WindowHandle,
        now: Instant,
    ) -> Result<Option<Placement>, NativeError> {
        if session.state == InteractionState::Moving
            || session.is_closed()
            || session.is_released()
        {
            return Ok(None);
        }
        let handle = session.handle();

        let placement = match session.hosting_mode() {
            HostingMode::TrueChild => {
                let client = self.windows.client_rect(content_window)?;
                compute_placement(
                    HostingMode::TrueChild,
                    &slot,
                    (client.x, client.y),
                    Insets::default(),
                    &self.compensation,
                )
            }
            HostingMode::RepositionedPopup => {
                let window = self.windows.window_rect(handle)?;
                let client = self.windows.client_rect(handle)?;
                compute_placement(
                    HostingMode::RepositionedPopup,
                    &slot,
                    (0, 0),
                    Insets::between(&window, &client),
                    &self.compensation,
                )
            }
        };

        session.arm_gate_at(now);
        self.windows
            .set_position(handle, placement.rect, PositionFlags::LAYOUT)?;
        self.windows.set_clip_region(handle, placement.clip)?;
        session.placement = Some(placement.rect);
        session.slot = Some(slot);
        debug!("placed {handle} at {:?} for slot {slot:?}", placement.rect);
        Ok(Some(placement))
    }

    /// Puts the host content window directly behind `guest` in z-order.
    pub fn stack_content_behind(
        &self,
        content_window: WindowHandle,
        guest: WindowHandle,
    ) -> Result<(), NativeError> {
        self.windows.place_behind(content_window, guest)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tabhost_core::{ExtendedStyle, OriginalAttributes, WindowStyle};

    use super::*;
    use crate::infrastructure::native::mock::{overlapped_window, DesktopCall, FakeDesktop};

    const CONTENT: WindowHandle = WindowHandle(0x10);
    const GUEST: WindowHandle = WindowHandle(0x200);
    const FRAME: Insets = Insets {
        left: 8,
        top: 31,
        right: 8,
        bottom: 8,
    };

    fn make_session(mode: HostingMode) -> EmbeddedSession {
        EmbeddedSession::new(
            GUEST,
            42,
            mode,
            OriginalAttributes {
                style: WindowStyle(0),
                ex_style: ExtendedStyle(0),
                rect: Rect::new(0, 0, 10, 10),
            },
            Duration::from_millis(120),
        )
    }

    fn make_desktop() -> Arc<FakeDesktop> {
        let desktop = Arc::new(FakeDesktop::new());
        desktop.add_window_with_frame(
            overlapped_window(CONTENT, 1, "HostFrame", "Host", Rect::new(100, 100, 816, 639)),
            FRAME,
        );
        desktop.add_window_with_frame(
            overlapped_window(GUEST, 42, "Notepad", "Guest", Rect::new(0, 0, 300, 300)),
            FRAME,
        );
        desktop
    }

    // ── compute_placement ─────────────────────────────────────────────────────

    #[test]
    fn test_true_child_placement_applies_compensation() {
        // Arrange
        let slot = Rect::new(108, 131, 800, 600);
        let comp = ViewportCompensation {
            offset_y: -2,
            extra_top: 2,
            extra_bottom: 3,
        };

        // Act
        let p = compute_placement(
            HostingMode::TrueChild,
            &slot,
            (108, 131),
            Insets::default(),
            &comp,
        );

        // Assert
        assert_eq!(p.rect, Rect::new(0, -2, 800, 605));
        assert_eq!(p.clip, None);
    }

    #[test]
    fn test_popup_placement_grows_by_insets_and_clips_them() {
        let slot = Rect::new(108, 131, 800, 600);

        let p = compute_placement(
            HostingMode::RepositionedPopup,
            &slot,
            (0, 0),
            FRAME,
            &ViewportCompensation::default(),
        );

        assert_eq!(p.rect, Rect::new(100, 100, 816, 639));
        assert_eq!(p.clip, Some(Rect::new(8, 31, 800, 600)));
    }

    #[test]
    fn test_popup_without_insets_is_not_clipped() {
        let slot = Rect::new(0, 0, 50, 50);
        let p = compute_placement(
            HostingMode::RepositionedPopup,
            &slot,
            (0, 0),
            Insets::default(),
            &ViewportCompensation::default(),
        );
        assert_eq!(p.rect, slot);
        assert_eq!(p.clip, None);
    }

    // ── LayoutEngine::resize ──────────────────────────────────────────────────

    #[test]
    fn test_resize_makes_popup_client_exactly_fill_slot() {
        // Arrange
        let desktop = make_desktop();
        let engine = LayoutEngine::new(desktop.clone(), ViewportCompensation::default());
        let mut session = make_session(HostingMode::RepositionedPopup);
        let slot = Rect::new(108, 131, 800, 600);

        // Act
        engine
            .resize(&mut session, slot, CONTENT, Instant::now())
            .unwrap();

        // Assert
        assert_eq!(desktop.client_rect(GUEST).unwrap(), slot);
        assert_eq!(session.placement, Some(Rect::new(100, 100, 816, 639)));
        assert_eq!(session.slot, Some(slot));
        assert_eq!(
            desktop.window(GUEST).unwrap().clip,
            Some(Rect::new(8, 31, 800, 600))
        );
    }

    #[test]
    fn test_resize_skips_moving_session() {
        let desktop = make_desktop();
        let engine = LayoutEngine::new(desktop.clone(), ViewportCompensation::default());
        let mut session = make_session(HostingMode::RepositionedPopup);
        session.state = InteractionState::Moving;

        let result = engine
            .resize(&mut session, Rect::new(0, 0, 10, 10), CONTENT, Instant::now())
            .unwrap();

        assert_eq!(result, None);
        assert!(desktop.calls().is_empty());
    }

    #[test]
    fn test_resize_arms_gate() {
        let desktop = make_desktop();
        let engine = LayoutEngine::new(desktop, ViewportCompensation::default());
        let mut session = make_session(HostingMode::RepositionedPopup);
        let now = Instant::now();

        engine
            .resize(&mut session, Rect::new(0, 0, 10, 10), CONTENT, now)
            .unwrap();

        assert!(session.is_gated_at(now + Duration::from_millis(10)));
    }

    #[test]
    fn test_stack_content_behind_guest() {
        let desktop = make_desktop();
        let engine = LayoutEngine::new(desktop.clone(), ViewportCompensation::default());

        engine.stack_content_behind(CONTENT, GUEST).unwrap();

        assert_eq!(desktop.calls(), vec![DesktopCall::PlaceBehind(CONTENT, GUEST)]);
    }
}

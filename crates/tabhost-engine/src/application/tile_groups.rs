//! TileGroupsUseCase: several guests sharing one slot.
//!
//! A tile group owns its ordered member list; each member session only keeps
//! the group's id.  Whenever the slot changes the group is re-laid out with
//! [`TileDistributor`](tabhost_core::TileDistributor) fractions mapped onto
//! the new slot, and the host content window is stacked directly behind the
//! bottom-most member so no guest is ever covered by the host.

use std::collections::HashMap;
use std::time::Instant;

use tabhost_core::{Rect, TileError, TileGroup, TileGroupId, WindowHandle};
use thiserror::Error;
use tracing::{info, warn};

use crate::application::layout_guest::LayoutEngine;
use crate::application::session_registry::SessionRegistry;

/// Error type for tile group operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TileGroupError {
    #[error(transparent)]
    Tile(#[from] TileError),

    #[error("window {0} is not embedded")]
    NotEmbedded(WindowHandle),

    #[error("window {0} already belongs to a tile group")]
    AlreadyGrouped(WindowHandle),

    #[error("tile group {0:?} does not exist")]
    UnknownGroup(TileGroupId),
}

/// Result of removing a session from its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRemoval {
    NotGrouped,
    /// The group lives on with its remaining members.
    Removed(TileGroupId),
    /// The group fell below two members and was dissolved.
    Dissolved(TileGroupId),
}

/// Every live tile group.
#[derive(Debug, Default)]
pub struct TileGroups {
    groups: HashMap<TileGroupId, TileGroup>,
}

impl TileGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups `members`, in order.
    ///
    /// # Errors
    ///
    /// Every member must be embedded and not already grouped; the member list
    /// must satisfy [`TileGroup::new`].
    pub fn create(
        &mut self,
        members: Vec<WindowHandle>,
        sessions: &mut SessionRegistry,
    ) -> Result<TileGroupId, TileGroupError> {
        for handle in &members {
            let session = sessions
                .get(*handle)
                .ok_or(TileGroupError::NotEmbedded(*handle))?;
            if session.group.is_some() {
                return Err(TileGroupError::AlreadyGrouped(*handle));
            }
        }
        let group = TileGroup::new(members)?;
        let id = group.id();
        for handle in group.members() {
            if let Some(session) = sessions.get_mut(*handle) {
                session.group = Some(id);
            }
        }
        info!("created tile group {id:?} with {} members", group.members().len());
        self.groups.insert(id, group);
        Ok(id)
    }

    /// Removes `handle` from whatever group it belongs to.
    pub fn remove_member(
        &mut self,
        handle: WindowHandle,
        sessions: &mut SessionRegistry,
    ) -> MemberRemoval {
        let Some(id) = self.group_of(handle).map(TileGroup::id) else {
            return MemberRemoval::NotGrouped;
        };
        if let Some(session) = sessions.get_mut(handle) {
            session.group = None;
        }
        let degenerate = match self.groups.get_mut(&id) {
            Some(group) => {
                let _ = group.remove(handle);
                group.is_degenerate()
            }
            None => return MemberRemoval::NotGrouped,
        };
        if degenerate {
            let _ = self.dissolve(id, sessions);
            MemberRemoval::Dissolved(id)
        } else {
            MemberRemoval::Removed(id)
        }
    }

    /// Dissolves a group and returns its former members.
    pub fn dissolve(
        &mut self,
        id: TileGroupId,
        sessions: &mut SessionRegistry,
    ) -> Result<Vec<WindowHandle>, TileGroupError> {
        let group = self
            .groups
            .remove(&id)
            .ok_or(TileGroupError::UnknownGroup(id))?;
        for handle in group.members() {
            if let Some(session) = sessions.get_mut(*handle) {
                session.group = None;
            }
        }
        info!("dissolved tile group {id:?}");
        Ok(group.members().to_vec())
    }

    pub fn get(&self, id: TileGroupId) -> Option<&TileGroup> {
        self.groups.get(&id)
    }

    pub fn group_of(&self, handle: WindowHandle) -> Option<&TileGroup> {
        self.groups.values().find(|g| g.contains(handle))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Lays out every member of group `id` inside `slot`.
    ///
    /// Returns how many members were actually moved.
    pub fn arrange(
        &self,
        id: TileGroupId,
        slot: Rect,
        sessions: &mut SessionRegistry,
        layout: &LayoutEngine,
        content_window: WindowHandle,
        now: Instant,
    ) -> Result<usize, TileGroupError> {
        let group = self.groups.get(&id).ok_or(TileGroupError::UnknownGroup(id))?;
        let mut placed = 0;
        for (handle, tile) in group.member_rects(&slot) {
            let Some(session) = sessions.get_mut(handle) else {
                continue;
            };
            match layout.resize(session, tile, content_window, now) {
                Ok(Some(_)) => placed += 1,
                Ok(None) => {}
                Err(e) => warn!("failed to place tile member {handle}: {e}"),
            }
        }
        if let Some(bottom) = group.bottom_most() {
            if let Err(e) = layout.stack_content_behind(content_window, bottom) {
                warn!("failed to stack content behind {bottom}: {e}");
            }
        }
        Ok(placed)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tabhost_core::{
        EmbeddedSession, ExtendedStyle, HostingMode, OriginalAttributes, WindowStyle,
    };

    use super::*;
    use crate::application::layout_guest::ViewportCompensation;
    use crate::infrastructure::native::mock::{overlapped_window, DesktopCall, FakeDesktop};

    const CONTENT: WindowHandle = WindowHandle(0x10);
    const SLOT: Rect = Rect::new(0, 0, 1000, 600);

    fn handles(n: u64) -> Vec<WindowHandle> {
        (1..=n).map(|i| WindowHandle(0x100 + i)).collect()
    }

    fn registry_with(desktop: &FakeDesktop, members: &[WindowHandle]) -> SessionRegistry {
        let mut sessions = SessionRegistry::new();
        for h in members {
            desktop.add_window(overlapped_window(*h, 42, "Notepad", "Doc", Rect::new(0, 0, 10, 10)));
            sessions
                .insert(EmbeddedSession::new(
                    *h,
                    42,
                    HostingMode::RepositionedPopup,
                    OriginalAttributes {
                        style: WindowStyle(0),
                        ex_style: ExtendedStyle(0),
                        rect: Rect::new(0, 0, 10, 10),
                    },
                    Duration::from_millis(120),
                ))
                .unwrap();
        }
        sessions
    }

    #[test]
    fn test_create_sets_back_references() {
        // Arrange
        let desktop = FakeDesktop::new();
        let members = handles(2);
        let mut sessions = registry_with(&desktop, &members);
        let mut groups = TileGroups::new();

        // Act
        let id = groups.create(members.clone(), &mut sessions).unwrap();

        // Assert
        for h in &members {
            assert_eq!(sessions.get(*h).unwrap().group, Some(id));
        }
        assert_eq!(groups.group_of(members[1]).map(TileGroup::id), Some(id));
    }

    #[test]
    fn test_create_rejects_unembedded_and_grouped_members() {
        let desktop = FakeDesktop::new();
        let members = handles(3);
        let mut sessions = registry_with(&desktop, &members);
        let mut groups = TileGroups::new();

        assert_eq!(
            groups.create(vec![members[0], WindowHandle(0x999)], &mut sessions),
            Err(TileGroupError::NotEmbedded(WindowHandle(0x999)))
        );
        groups.create(vec![members[0], members[1]], &mut sessions).unwrap();
        assert_eq!(
            groups.create(vec![members[2], members[1]], &mut sessions),
            Err(TileGroupError::AlreadyGrouped(members[1]))
        );
        assert_eq!(
            groups.create(vec![members[2]], &mut sessions),
            Err(TileGroupError::Tile(TileError::TooFewMembers(1)))
        );
    }

    #[test]
    fn test_removing_below_two_members_dissolves() {
        // Arrange
        let desktop = FakeDesktop::new();
        let members = handles(3);
        let mut sessions = registry_with(&desktop, &members);
        let mut groups = TileGroups::new();
        let id = groups.create(members.clone(), &mut sessions).unwrap();

        // Act
        let first = groups.remove_member(members[0], &mut sessions);
        let second = groups.remove_member(members[1], &mut sessions);

        // Assert
        assert_eq!(first, MemberRemoval::Removed(id));
        assert_eq!(second, MemberRemoval::Dissolved(id));
        assert!(groups.is_empty());
        assert!(members.iter().all(|h| sessions.get(*h).unwrap().group.is_none()));
    }

    #[test]
    fn test_arrange_places_members_and_stacks_content_behind_last() {
        // Arrange
        let desktop = Arc::new(FakeDesktop::new());
        let members = handles(3);
        let mut sessions = registry_with(&desktop, &members);
        let mut groups = TileGroups::new();
        let id = groups.create(members.clone(), &mut sessions).unwrap();
        let layout = LayoutEngine::new(desktop.clone(), ViewportCompensation::default());

        // Act
        let placed = groups
            .arrange(id, SLOT, &mut sessions, &layout, CONTENT, Instant::now())
            .unwrap();

        // Assert
        assert_eq!(placed, 3);
        assert_eq!(desktop.window(members[0]).unwrap().info.rect, Rect::new(0, 0, 500, 600));
        assert_eq!(desktop.window(members[1]).unwrap().info.rect, Rect::new(500, 0, 500, 300));
        assert_eq!(desktop.window(members[2]).unwrap().info.rect, Rect::new(500, 300, 500, 300));
        assert_eq!(
            desktop.calls().last(),
            Some(&DesktopCall::PlaceBehind(CONTENT, members[2]))
        );
    }
}

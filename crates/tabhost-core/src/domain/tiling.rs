//! Tile layout for several guests sharing one host slot.
//!
//! # Layout rules
//!
//! ```text
//!  n = 2          n = 3          n = 4          n = 5 (cols 3, rows 2)
//! ┌────┬────┐   ┌────┬────┐   ┌────┬────┐   ┌───┬───┬───┐
//! │    │    │   │    │ 2  │   │ 1  │ 2  │   │ 1 │ 2 │ 3 │
//! │ 1  │ 2  │   │ 1  ├────┤   ├────┼────┤   ├───┼───┴───┤
//! │    │    │   │    │ 3  │   │ 3  │ 4  │   │ 4 │   5   │
//! └────┴────┘   └────┴────┘   └────┴────┘   └───┴───────┘
//! ```
//!
//! For more than four members the grid has `cols = ceil(sqrt(n))` columns and
//! `rows = ceil(n / cols)` rows.  When the last row is short, its final cell
//! is widened to the right edge so the unit square is always fully covered.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::geometry::{FractionalRect, Rect};
use super::window::WindowHandle;

/// Stable identifier for a tile group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileGroupId(pub Uuid);

impl TileGroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TileGroupId {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors raised when building or editing a tile group.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TileError {
    #[error("a tile group needs at least 2 members, got {0}")]
    TooFewMembers(usize),
    #[error("window {0} appears more than once in the group")]
    DuplicateMember(WindowHandle),
    #[error("window {0} is not a member of the group")]
    NotAMember(WindowHandle),
}

/// Deterministic fractional layout function.
pub struct TileDistributor;

impl TileDistributor {
    /// Returns `n` fractional rectangles covering the unit square.
    ///
    /// `n == 0` yields nothing and `n == 1` yields the full square.
    pub fn layout(n: usize) -> Vec<FractionalRect> {
        match n {
            0 => Vec::new(),
            1 => vec![FractionalRect::new(0.0, 0.0, 1.0, 1.0)],
            2 => vec![
                FractionalRect::new(0.0, 0.0, 0.5, 1.0),
                FractionalRect::new(0.5, 0.0, 0.5, 1.0),
            ],
            3 => vec![
                FractionalRect::new(0.0, 0.0, 0.5, 1.0),
                FractionalRect::new(0.5, 0.0, 0.5, 0.5),
                FractionalRect::new(0.5, 0.5, 0.5, 0.5),
            ],
            4 => vec![
                FractionalRect::new(0.0, 0.0, 0.5, 0.5),
                FractionalRect::new(0.5, 0.0, 0.5, 0.5),
                FractionalRect::new(0.0, 0.5, 0.5, 0.5),
                FractionalRect::new(0.5, 0.5, 0.5, 0.5),
            ],
            _ => Self::grid(n),
        }
    }

    fn grid(n: usize) -> Vec<FractionalRect> {
        let cols = (n as f64).sqrt().ceil() as usize;
        let rows = n.div_ceil(cols);
        let cell_w = 1.0 / cols as f64;
        let cell_h = 1.0 / rows as f64;

        (0..n)
            .map(|i| {
                let row = i / cols;
                let col = i % cols;
                let x = col as f64 * cell_w;
                let y = row as f64 * cell_h;
                let is_last = i == n - 1;
                // The final cell absorbs any shortfall of the last row.
                let width = if is_last { 1.0 - x } else { cell_w };
                FractionalRect::new(x, y, width, cell_h)
            })
            .collect()
    }

    /// Maps the layout for `n` members onto an absolute `slot`.
    pub fn absolute(n: usize, slot: &Rect) -> Vec<Rect> {
        Self::layout(n)
            .iter()
            .map(|fraction| fraction.to_absolute(slot))
            .collect()
    }
}

/// An ordered group of two or more guests tiled into one slot.
///
/// The group owns the member list.  Members refer back to the group only by
/// [`TileGroupId`], never by a second owning pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGroup {
    id: TileGroupId,
    members: Vec<WindowHandle>,
}

impl TileGroup {
    /// Creates a group.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::TooFewMembers`] for fewer than two members and
    /// [`TileError::DuplicateMember`] if a handle appears twice.
    pub fn new(members: Vec<WindowHandle>) -> Result<Self, TileError> {
        if members.len() < 2 {
            return Err(TileError::TooFewMembers(members.len()));
        }
        for (i, handle) in members.iter().enumerate() {
            if members[..i].contains(handle) {
                return Err(TileError::DuplicateMember(*handle));
            }
        }
        Ok(Self {
            id: TileGroupId::new(),
            members,
        })
    }

    pub fn id(&self) -> TileGroupId {
        self.id
    }

    pub fn members(&self) -> &[WindowHandle] {
        &self.members
    }

    pub fn contains(&self, handle: WindowHandle) -> bool {
        self.members.contains(&handle)
    }

    /// Removes `handle` from the group, preserving the order of the others.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::NotAMember`] if `handle` is not in the group.
    pub fn remove(&mut self, handle: WindowHandle) -> Result<(), TileError> {
        let index = self
            .members
            .iter()
            .position(|m| *m == handle)
            .ok_or(TileError::NotAMember(handle))?;
        self.members.remove(index);
        Ok(())
    }

    /// `true` once the group has dropped below two members.
    pub fn is_degenerate(&self) -> bool {
        self.members.len() < 2
    }

    /// Pairs each member with its absolute tile inside `slot`.
    pub fn member_rects(&self, slot: &Rect) -> Vec<(WindowHandle, Rect)> {
        self.members
            .iter()
            .copied()
            .zip(TileDistributor::absolute(self.members.len(), slot))
            .collect()
    }

    /// The member drawn at the bottom of the group's z-order.
    pub fn bottom_most(&self) -> Option<WindowHandle> {
        self.members.last().copied()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    /// Verifies the fractions partition the unit square: every rect lies in
    /// `[0, 1]`, no two overlap, and the areas sum to exactly 1.
    fn assert_partition(rects: &[FractionalRect]) {
        let mut area = 0.0;
        for (i, r) in rects.iter().enumerate() {
            assert!(r.x >= -EPS && r.y >= -EPS, "rect {i} starts outside: {r:?}");
            assert!(r.x + r.width <= 1.0 + EPS, "rect {i} exceeds right edge");
            assert!(r.y + r.height <= 1.0 + EPS, "rect {i} exceeds bottom edge");
            area += r.area();
            for (j, other) in rects.iter().enumerate().skip(i + 1) {
                let overlap_w = (r.x + r.width).min(other.x + other.width) - r.x.max(other.x);
                let overlap_h = (r.y + r.height).min(other.y + other.height) - r.y.max(other.y);
                assert!(
                    overlap_w <= EPS || overlap_h <= EPS,
                    "rects {i} and {j} overlap"
                );
            }
        }
        assert!((area - 1.0).abs() < EPS, "areas sum to {area}, expected 1");
    }

    #[test]
    fn test_layout_two_is_left_right_halves() {
        let rects = TileDistributor::layout(2);
        assert_eq!(rects[0], FractionalRect::new(0.0, 0.0, 0.5, 1.0));
        assert_eq!(rects[1], FractionalRect::new(0.5, 0.0, 0.5, 1.0));
        assert_partition(&rects);
    }

    #[test]
    fn test_layout_three_is_left_half_plus_stacked_right() {
        let rects = TileDistributor::layout(3);
        assert_eq!(rects[0], FractionalRect::new(0.0, 0.0, 0.5, 1.0));
        assert_eq!(rects[1], FractionalRect::new(0.5, 0.0, 0.5, 0.5));
        assert_eq!(rects[2], FractionalRect::new(0.5, 0.5, 0.5, 0.5));
        assert_partition(&rects);
    }

    #[test]
    fn test_layout_four_is_two_by_two() {
        let rects = TileDistributor::layout(4);
        assert_eq!(rects.len(), 4);
        assert_partition(&rects);
    }

    #[test]
    fn test_layout_five_widens_final_cell() {
        // Arrange / Act: 3 columns, 2 rows, last row holds 2 cells
        let rects = TileDistributor::layout(5);

        // Assert
        assert_eq!(rects.len(), 5);
        let last = rects[4];
        assert!((last.x - 1.0 / 3.0).abs() < EPS);
        assert!((last.x + last.width - 1.0).abs() < EPS);
        assert_partition(&rects);
    }

    #[test]
    fn test_layout_larger_counts_cover_unit_square() {
        for n in 5..=17 {
            assert_partition(&TileDistributor::layout(n));
        }
    }

    #[test]
    fn test_layout_degenerate_counts() {
        assert!(TileDistributor::layout(0).is_empty());
        assert_eq!(
            TileDistributor::layout(1),
            vec![FractionalRect::new(0.0, 0.0, 1.0, 1.0)]
        );
    }

    #[test]
    fn test_absolute_tiles_partition_odd_slot() {
        // Arrange
        let slot = Rect::new(10, 20, 801, 601);

        // Act
        let tiles = TileDistributor::absolute(3, &slot);

        // Assert: pixel areas add up to the slot and nothing overlaps
        let total: i32 = tiles.iter().map(|t| t.width * t.height).sum();
        assert_eq!(total, 801 * 601);
        for (i, a) in tiles.iter().enumerate() {
            for b in tiles.iter().skip(i + 1) {
                assert!(!a.intersects(b));
            }
        }
    }

    #[test]
    fn test_group_rejects_single_member_and_duplicates() {
        assert_eq!(
            TileGroup::new(vec![WindowHandle(1)]),
            Err(TileError::TooFewMembers(1))
        );
        assert_eq!(
            TileGroup::new(vec![WindowHandle(1), WindowHandle(1)]),
            Err(TileError::DuplicateMember(WindowHandle(1)))
        );
    }

    #[test]
    fn test_group_remove_member_degenerates_below_two() {
        // Arrange
        let mut group =
            TileGroup::new(vec![WindowHandle(1), WindowHandle(2), WindowHandle(3)]).unwrap();

        // Act
        group.remove(WindowHandle(2)).unwrap();

        // Assert
        assert_eq!(group.members(), &[WindowHandle(1), WindowHandle(3)]);
        assert!(!group.is_degenerate());
        group.remove(WindowHandle(1)).unwrap();
        assert!(group.is_degenerate());
        assert_eq!(
            group.remove(WindowHandle(9)),
            Err(TileError::NotAMember(WindowHandle(9)))
        );
    }

    #[test]
    fn test_member_rects_follow_member_order() {
        let group = TileGroup::new(vec![WindowHandle(7), WindowHandle(8)]).unwrap();
        let rects = group.member_rects(&Rect::new(0, 0, 1000, 500));
        assert_eq!(rects[0], (WindowHandle(7), Rect::new(0, 0, 500, 500)));
        assert_eq!(rects[1], (WindowHandle(8), Rect::new(500, 0, 500, 500)));
        assert_eq!(group.bottom_most(), Some(WindowHandle(8)));
    }
}

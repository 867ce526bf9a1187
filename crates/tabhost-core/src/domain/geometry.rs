//! Rectangle math used by the layout engine and the tile distributor.
//!
//! All absolute rectangles are expressed in native screen pixels with the
//! origin at the top-left of the primary monitor.  Width and height are signed
//! so that intermediate results (e.g. a window enlarged by negative insets)
//! never wrap around.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in native pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// X coordinate of the top-left corner.
    pub x: i32,
    /// Y coordinate of the top-left corner.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a rectangle from its four edges (`right`/`bottom` exclusive),
    /// the layout Win32 `RECT` uses.
    pub const fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }

    /// Returns the rightmost X coordinate (exclusive).
    pub const fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Returns the bottommost Y coordinate (exclusive).
    pub const fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Returns a copy moved by `(dx, dy)`.
    pub const fn offset(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            width: self.width,
            height: self.height,
        }
    }

    /// Returns `true` when the rectangle covers no pixels.
    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Returns `true` if this rectangle overlaps `other` by at least one pixel.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Grows the rectangle outward by `insets` on every side.
    pub const fn expand(&self, insets: Insets) -> Self {
        Self::from_edges(
            self.x - insets.left,
            self.y - insets.top,
            self.right() + insets.right,
            self.bottom() + insets.bottom,
        )
    }
}

/// The thickness of the non-client area (title bar, resize borders, the
/// invisible DWM shadow frame) on each side of a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Insets {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Insets {
    /// Computes the insets between a window rectangle and its client
    /// rectangle, both in screen coordinates.
    ///
    /// Negative values are clamped to zero: a client area can never be larger
    /// than the window that contains it, and a transiently inconsistent pair
    /// of reads must not produce a shrinking placement.
    pub fn between(window: &Rect, client: &Rect) -> Self {
        Self {
            left: (client.x - window.x).max(0),
            top: (client.y - window.y).max(0),
            right: (window.right() - client.right()).max(0),
            bottom: (window.bottom() - client.bottom()).max(0),
        }
    }

    pub const fn is_zero(&self) -> bool {
        self.left == 0 && self.top == 0 && self.right == 0 && self.bottom == 0
    }
}

/// A rectangle expressed as fractions of a unit square.
///
/// Tile layouts are computed once in this form and mapped onto whatever
/// absolute slot the host currently exposes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FractionalRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl FractionalRect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Maps the fraction onto `slot`.
    ///
    /// Each edge is rounded independently, so two tiles that share a
    /// fractional edge also share the same pixel edge and the absolute tiles
    /// still partition the slot without gaps.
    pub fn to_absolute(&self, slot: &Rect) -> Rect {
        let w = f64::from(slot.width);
        let h = f64::from(slot.height);
        let left = slot.x + (self.x * w).round() as i32;
        let top = slot.y + (self.y * h).round() as i32;
        let right = slot.x + ((self.x + self.width) * w).round() as i32;
        let bottom = slot.y + ((self.y + self.height) * h).round() as i32;
        Rect::from_edges(left, top, right, bottom)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

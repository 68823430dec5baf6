//! Pixel-space points, sizes and rectangles.

use serde::{Deserialize, Serialize};

/// A point or offset in pixel space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    /// Horizontal, growing right.
    pub x: f32,
    /// Vertical, growing down.
    pub y: f32,
}

/// Shorthand for a `Vec2` literal.
#[inline]
pub const fn vec2(x: f32, y: f32) -> Vec2 {
    Vec2 { x, y }
}

impl Vec2 {
    /// The origin.
    pub const ZERO: Vec2 = vec2(0.0, 0.0);
}

/// Integer width/height pair, used for tile and texture sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    /// Horizontal extent.
    pub width: i32,
    /// Vertical extent.
    pub height: i32,
}

impl Size {
    /// A size from its two dimensions.
    pub const fn new(width: i32, height: i32) -> Self {
        Size { width, height }
    }

    /// Both dimensions are at least 1.
    pub fn is_positive(self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// The size as a pixel vector.
    pub fn as_vec2(self) -> Vec2 {
        vec2(self.width as f32, self.height as f32)
    }
}

/// Axis-aligned rectangle, origin at the top-left corner.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub w: f32,
    /// Height.
    pub h: f32,
}

impl Rect {
    /// A rectangle from its origin and size.
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Rect { x, y, w, h }
    }

    /// Edges are inclusive, so a zero-sized rectangle still contains its own origin.
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.x && p.y >= self.y && p.x <= self.x + self.w && p.y <= self.y + self.h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_contains_edges() {
        let r = Rect::new(0.0, 0.0, 10.0, 5.0);
        assert!(r.contains(vec2(0.0, 0.0)));
        assert!(r.contains(vec2(10.0, 5.0)));
        assert!(!r.contains(vec2(10.1, 5.0)));
        assert!(!r.contains(vec2(-0.1, 1.0)));
    }
}

use serde::{Deserialize, Serialize};

/// Width and height of a document or image in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Scale both dimensions by `factor`, rounding to the nearest pixel.
    pub fn scaled(&self, factor: f32) -> Extent {
        Extent {
            width: (self.width as f32 * factor).round() as u32,
            height: (self.height as f32 * factor).round() as u32,
        }
    }
}

impl std::fmt::Display for Extent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A rectangular region in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// The whole area covered by `extent`, anchored at the origin.
    pub fn from_extent(extent: Extent) -> Self {
        Self { x: 0, y: 0, width: extent.width, height: extent.height }
    }

    pub fn extent(&self) -> Extent {
        Extent { width: self.width, height: self.height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    /// Translate into the coordinate space that has `origin` at (0, 0).
    pub fn relative_to(&self, origin: Bounds) -> Bounds {
        Bounds { x: self.x - origin.x, y: self.y - origin.y, ..*self }
    }

    /// Grow the rectangle by `padding` pixels on every side.
    pub fn padded(&self, padding: u32) -> Bounds {
        Bounds {
            x: self.x - padding as i32,
            y: self.y - padding as i32,
            width: self.width + 2 * padding,
            height: self.height + 2 * padding,
        }
    }

    /// Intersect with `other`. An empty intersection collapses to a
    /// zero-size rectangle at the clamped position.
    pub fn clamped(&self, other: Bounds) -> Bounds {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Bounds {
            x,
            y,
            width: right.saturating_sub(x).max(0) as u32,
            height: bottom.saturating_sub(y).max(0) as u32,
        }
    }

    /// Grow to at least `min` pixels per side, centered on the current
    /// rectangle, then shift back inside `within`.
    pub fn minimum_size(&self, min: u32, within: Bounds) -> Bounds {
        let width = self.width.max(min).min(within.width);
        let height = self.height.max(min).min(within.height);
        let mut x = self.x - (width.saturating_sub(self.width) / 2) as i32;
        let mut y = self.y - (height.saturating_sub(self.height) / 2) as i32;
        x = x.clamp(within.x, within.right() - width as i32);
        y = y.clamp(within.y, within.bottom() - height as i32);
        Bounds { x, y, width, height }
    }
}

use serde::{Deserialize, Serialize};

/// Identity of a tracked window. On Windows this carries the HWND value as an
/// integer so it can be hashed, stored, and moved across threads freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowId(pub usize);

impl WindowId {
    pub fn raw(self) -> usize {
        self.0
    }
}

/// An (x, y) pixel position in a window's client area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SamplePoint {
    pub x: i32,
    pub y: i32,
}

impl SamplePoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean pixel distance to another point.
    pub fn distance(self, other: SamplePoint) -> f32 {
        ((self.x as f32 - other.x as f32).powi(2) + (self.y as f32 - other.y as f32).powi(2))
            .sqrt()
    }

    /// Check if another point is within `threshold` pixels (Euclidean distance).
    /// A threshold of 0 only accepts the exact same point.
    pub fn is_near(self, other: SamplePoint, threshold: f32) -> bool {
        self.distance(other) <= threshold
    }
}

/// A rectangle in a window's client area, used for region-average sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Center point, used as the cache representative for region averages.
    pub fn center(self) -> SamplePoint {
        SamplePoint::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn is_empty(self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

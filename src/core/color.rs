use serde::{Deserialize, Serialize};

/// An RGB color read from a window's client area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Substituted for coordinates whose read failed this tick.
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Euclidean distance in RGB space.
    pub fn distance(self, other: Rgb) -> f32 {
        (self.distance_sq(other) as f32).sqrt()
    }

    /// Squared Euclidean distance. Same ordering as `distance`, skips the sqrt.
    pub fn distance_sq(self, other: Rgb) -> i32 {
        let dr = self.r as i32 - other.r as i32;
        let dg = self.g as i32 - other.g as i32;
        let db = self.b as i32 - other.b as i32;
        dr * dr + dg * dg + db * db
    }

    /// Check if `other` is within `tolerance` of this color (Euclidean distance).
    pub fn matches(self, other: Rgb, tolerance: f32) -> bool {
        if tolerance < 0.0 {
            return false;
        }
        self.distance(other) <= tolerance
    }

    /// Classify against two references: true when strictly closer to `a` than to `b`.
    /// Ties go to `b`, so a pixel equidistant from full/empty counts as empty.
    pub fn is_closer_to(self, a: Rgb, b: Rgb) -> bool {
        self.distance_sq(a) < self.distance_sq(b)
    }
}

impl From<image::Rgb<u8>> for Rgb {
    fn from(px: image::Rgb<u8>) -> Self {
        Rgb::new(px.0[0], px.0[1], px.0[2])
    }
}

impl From<Rgb> for image::Rgb<u8> {
    fn from(c: Rgb) -> Self {
        image::Rgb([c.r, c.g, c.b])
    }
}

use serde::{Deserialize, Serialize};

/// Represents a vector in 2D space.
///
/// Screen convention: positive x is to the right, positive y is down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Returns the normalized vector, or zero for a zero vector.
    pub fn normalize(&self) -> Vec2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vec2::ZERO
        } else {
            Vec2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    /// Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vec2 {
        Vec2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    /// Returns the sum of two vectors.
    pub fn add(&self, other: &Vec2) -> Vec2 {
        Vec2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    /// Returns `self - other`.
    pub fn sub(&self, other: &Vec2) -> Vec2 {
        Vec2 {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }

    pub fn dot(&self, other: &Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Euclidean distance between two points.
    pub fn distance(&self, other: &Vec2) -> f32 {
        self.sub(other).magnitude()
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Linear interpolation towards `target` by `alpha` (0 = self, 1 = target).
    pub fn lerp(&self, target: &Vec2, alpha: f32) -> Vec2 {
        self.add(&target.sub(self).scale(alpha))
    }

    /// Rounds both components to two decimal places.
    ///
    /// Only ever applied to outbound snapshots, never to simulation state.
    pub fn rounded(&self) -> Vec2 {
        Vec2 {
            x: round2(self.x),
            y: round2(self.y),
        }
    }
}

/// Rounds a value to two decimal places.
pub fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// Axis-aligned extents of the playable area, `[0, width] x [0, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapBounds {
    pub width: f32,
    pub height: f32,
}

impl MapBounds {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Clamps a point into the map, keeping `inset` away from every edge.
    ///
    /// An inset larger than half the map collapses onto the centre line
    /// instead of producing an inverted range.
    pub fn clamp(&self, point: Vec2, inset: f32) -> Vec2 {
        let inset_x = inset.min(self.width / 2.0);
        let inset_y = inset.min(self.height / 2.0);
        Vec2 {
            x: point.x.clamp(inset_x, self.width - inset_x),
            y: point.y.clamp(inset_y, self.height - inset_y),
        }
    }

    pub fn contains(&self, point: Vec2) -> bool {
        (0.0..=self.width).contains(&point.x) && (0.0..=self.height).contains(&point.y)
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }
}

//! Axis-aligned bounding boxes

use super::vec::Vec3;

/// Axis-aligned bounding box. An empty box has `min > max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grow to include a point (non-finite points are ignored)
    pub fn include(&mut self, p: Vec3) {
        if !p.is_finite() {
            return;
        }
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn center(&self) -> Vec3 {
        if self.is_empty() {
            return Vec3::ZERO;
        }
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        if self.is_empty() {
            return Vec3::ZERO;
        }
        self.max - self.min
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_box_has_zero_extent() {
        let b = Aabb::EMPTY;
        assert!(b.is_empty());
        assert_eq!(b.extent(), Vec3::ZERO);
        assert_eq!(b.center(), Vec3::ZERO);
    }

    #[test]
    fn test_include_points() {
        let mut b = Aabb::EMPTY;
        b.include(Vec3::new(-1.0, 0.0, 2.0));
        b.include(Vec3::new(1.0, 8.0, 6.0));
        b.include(Vec3::new(f32::NAN, 0.0, 0.0));
        assert_eq!(b.extent(), Vec3::new(2.0, 8.0, 4.0));
        assert_eq!(b.center(), Vec3::new(0.0, 4.0, 4.0));
    }
}

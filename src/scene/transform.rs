//! Node transforms
//!
//! A node's world matrix is its parent's world matrix times its own local
//! TRS matrix. Rotation is XYZ euler radians, matching the rest of the math
//! module.

use crate::math::{Mat4, Vec3, mat4_identity, mat4_mul, mat4_transform_point, mat4_transform_vector, mat4_trs};

/// Local TRS relative to the parent node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    /// Euler angles, radians
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        position: Vec3::ZERO,
        rotation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    pub fn from_uniform_scale(scale: f32) -> Self {
        Self {
            scale: Vec3::splat(scale),
            ..Self::IDENTITY
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        mat4_trs(self.position, self.rotation, self.scale)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Accumulated world matrix while walking a node tree
#[derive(Debug, Clone, Copy)]
pub struct GlobalTransform {
    matrix: Mat4,
}

impl GlobalTransform {
    pub fn identity() -> Self {
        Self { matrix: mat4_identity() }
    }

    pub fn from_matrix(matrix: Mat4) -> Self {
        Self { matrix }
    }

    /// World matrix of a child with local transform `local`
    pub fn child(&self, local: &Transform) -> Self {
        Self {
            matrix: mat4_mul(&self.matrix, &local.to_matrix()),
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        mat4_transform_point(&self.matrix, point)
    }

    /// Renormalized; exact for rotation plus uniform scale
    pub fn transform_normal(&self, normal: Vec3) -> Vec3 {
        mat4_transform_vector(&self.matrix, normal).normalize()
    }
}

impl Default for GlobalTransform {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn near(a: Vec3, b: Vec3) -> bool {
        (a - b).len() < 1e-4
    }

    #[test]
    fn test_child_inherits_translation() {
        let root = GlobalTransform::identity().child(&Transform {
            position: Vec3::new(3.0, 1.0, 0.0),
            ..Transform::IDENTITY
        });
        let leaf = root.child(&Transform {
            position: Vec3::new(0.0, 2.0, -1.0),
            ..Transform::IDENTITY
        });
        assert!(near(leaf.transform_point(Vec3::ZERO), Vec3::new(3.0, 3.0, -1.0)));
    }

    #[test]
    fn test_scaled_parent_shrinks_child_offset() {
        let parent = GlobalTransform::identity().child(&Transform::from_uniform_scale(0.25));
        let child = parent.child(&Transform {
            position: Vec3::new(8.0, 0.0, 0.0),
            ..Transform::IDENTITY
        });
        assert!(near(child.transform_point(Vec3::ZERO), Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn test_normals_stay_unit_length() {
        let g = GlobalTransform::identity().child(&Transform {
            rotation: Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0),
            scale: Vec3::splat(3.0),
            ..Transform::IDENTITY
        });
        let n = g.transform_normal(Vec3::new(1.0, 0.0, 0.0));
        assert!((n.len() - 1.0).abs() < 1e-4);
        assert!(n.x.abs() < 1e-4);
    }
}

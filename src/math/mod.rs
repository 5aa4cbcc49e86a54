//! Math primitives for the viewer
//!
//! - `vec` - Vec3, Vec2 and small helpers
//! - `mat` - 4x4 row-major transform matrices
//! - `aabb` - axis-aligned bounding boxes
//! - `color` - sRGB / linear color values

pub mod aabb;
pub mod color;
pub mod mat;
pub mod vec;

pub use aabb::Aabb;
pub use color::Rgb;
pub use mat::{
    Mat4, mat4_axis_angle, mat4_decompose, mat4_identity, mat4_mul, mat4_scale, mat4_transform_point,
    mat4_transform_vector, mat4_translation, mat4_trs, quat_to_euler,
};
pub use vec::{Vec2, Vec3};

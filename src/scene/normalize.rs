//! Scene normalization
//!
//! Centers a decoded graph at the origin and scales it uniformly so its
//! largest axis spans `target_size`. The translation goes on the inner graph
//! and the scale goes on a wrapper node, so the offset is scaled together
//! with the geometry and the result stays centered at any scale.

use crate::math::{Aabb, Vec3};
use super::{SceneNode, Transform};

/// Largest axis of a normalized scene, in world units
pub const DEFAULT_TARGET_SIZE: f32 = 4.0;

/// What normalization measured and applied
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    /// Bounds of the input graph
    pub bounds: Aabb,
    pub center: Vec3,
    pub scale: f32,
}

/// `target_size / max(extent)`, or 1.0 for degenerate extents
pub fn extent_scale(bounds: &Aabb, target_size: f32) -> f32 {
    let max_extent = bounds.extent().max_elem();
    if max_extent > f32::EPSILON && max_extent.is_finite() {
        target_size / max_extent
    } else {
        1.0
    }
}

/// Wrap `raw` so that its bounds are centered at the origin with the
/// largest axis equal to `target_size`.
pub fn normalize(mut raw: SceneNode, target_size: f32) -> (SceneNode, Normalization) {
    let bounds = raw.bounding_box();
    let center = bounds.center();
    let scale = extent_scale(&bounds, target_size);

    // Prepending a translation to the root's own TRS
    raw.transform.position = raw.transform.position - center;

    let wrapper = SceneNode {
        name: "normalized".to_string(),
        transform: Transform::from_uniform_scale(scale),
        mesh: None,
        children: vec![raw],
    };

    (wrapper, Normalization { bounds, center, scale })
}

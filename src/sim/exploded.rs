//! Exploded view: spread the model's top-level parts along X

use crate::math::Vec3;
use crate::scene::{SceneNode, Transform};

/// Fraction of the remaining distance covered per frame
pub const EXPLODE_RATE: f32 = 0.1;
/// Scale multiplier of an exploded part
pub const EXPLODE_SCALE: f32 = 1.5;
/// Distance between neighbouring parts, in normalized (world) units
pub const EXPLODE_SPREAD: f32 = 1.5;

/// Layout of the parts as loaded, so the explosion can be reversed
#[derive(Debug, Clone, Default)]
pub struct ExplodedView {
    rest: Vec<Transform>,
}

impl ExplodedView {
    pub fn capture(parts: &[SceneNode]) -> Self {
        Self {
            rest: parts.iter().map(|p| p.transform).collect(),
        }
    }

    /// Where part `index` heads when exploded. `spread` is in the parts' own units.
    pub fn exploded_target(&self, index: usize, spread: f32) -> Option<Transform> {
        let rest = self.rest.get(index)?;
        let n = self.rest.len() as f32;
        let offset = (index as f32 - (n - 1.0) / 2.0) * spread;
        Some(Transform {
            position: rest.position + Vec3::new(offset, 0.0, 0.0),
            rotation: rest.rotation,
            scale: rest.scale.scale(EXPLODE_SCALE),
        })
    }

    /// One frame of easing toward the exploded (or rest) layout.
    /// Returns false when `parts` no longer matches the captured layout.
    pub fn step(&self, parts: &mut [SceneNode], enabled: bool, spread: f32) -> bool {
        if parts.len() != self.rest.len() {
            return false;
        }
        for (i, part) in parts.iter_mut().enumerate() {
            let target = if enabled {
                self.exploded_target(i, spread).unwrap_or(self.rest[i])
            } else {
                self.rest[i]
            };
            let t = &mut part.transform;
            t.scale = t.scale.lerp(target.scale, EXPLODE_RATE);
            t.position.x += (target.position.x - t.position.x) * EXPLODE_RATE;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(n: usize) -> Vec<SceneNode> {
        (0..n).map(|i| SceneNode::new(format!("part{}", i))).collect()
    }

    #[test]
    fn test_explode_converges_and_reverses() {
        let mut nodes = parts(3);
        let view = ExplodedView::capture(&nodes);
        for _ in 0..200 {
            assert!(view.step(&mut nodes, true, 2.0));
        }
        assert!((nodes[0].transform.position.x + 2.0).abs() < 1e-3);
        assert!(nodes[1].transform.position.x.abs() < 1e-3);
        assert!((nodes[2].transform.position.x - 2.0).abs() < 1e-3);
        assert!((nodes[2].transform.scale.x - 1.5).abs() < 1e-3);

        for _ in 0..200 {
            view.step(&mut nodes, false, 2.0);
        }
        for n in &nodes {
            assert!(n.transform.position.len() < 1e-3);
            assert!((n.transform.scale - Vec3::ONE).len() < 1e-3);
        }
    }

    #[test]
    fn test_first_step_moves_a_tenth() {
        let mut nodes = parts(2);
        let view = ExplodedView::capture(&nodes);
        view.step(&mut nodes, true, 2.0);
        assert!((nodes[1].transform.position.x - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_mismatched_parts_are_left_alone() {
        let view = ExplodedView::capture(&parts(2));
        let mut other = parts(3);
        assert!(!view.step(&mut other, true, 1.0));
        assert_eq!(other[0].transform, Transform::IDENTITY);
    }
}

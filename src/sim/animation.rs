//! Procedural animation and canned poses
//!
//! The animation is a pure function of progress (0..100): scrubbing the
//! progress gives the same transform every time.

use std::f32::consts::TAU;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Vertical bob amplitude
pub const BOB_HEIGHT: f32 = 0.3;
/// Tilt amplitude (radians)
pub const TILT: f32 = 0.1;

/// Move `progress` forward by `step`, wrapping at 100
pub fn advance_progress(progress: f32, step: f32) -> f32 {
    let p = (progress + step).rem_euclid(100.0);
    // rem_euclid can round up to exactly 100 for tiny negatives
    if p >= 100.0 || !p.is_finite() {
        0.0
    } else {
        p
    }
}

/// Position and rotation of the model at one instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: f32,
    pub position: Vec3,
    pub rotation: Vec3,
}

/// Bob and tilt at `progress` percent of the loop
pub fn sample(progress: f32) -> (Vec3, Vec3) {
    let t = progress.clamp(0.0, 100.0) / 100.0 * TAU;
    let position = Vec3::new(0.0, (t * 2.0).sin() * BOB_HEIGHT, 0.0);
    let rotation = Vec3::new(0.0, 0.0, t.sin() * TILT);
    (position, rotation)
}

/// `count` evenly spaced keyframes over a loop lasting `duration` seconds
pub fn bake(duration: f32, count: usize) -> Vec<Keyframe> {
    let count = count.max(2);
    (0..count)
        .map(|i| {
            let f = i as f32 / (count - 1) as f32;
            let (position, rotation) = sample(f * 100.0);
            Keyframe { time: f * duration, position, rotation }
        })
        .collect()
}

/// Named target transforms, applied without interpolation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pose {
    TPose,
    APose,
    Crouch,
    Jump,
    Sit,
    Wave,
}

impl Pose {
    pub const ALL: [Pose; 6] = [Pose::TPose, Pose::APose, Pose::Crouch, Pose::Jump, Pose::Sit, Pose::Wave];

    pub fn name(self) -> &'static str {
        match self {
            Pose::TPose => "T-Pose",
            Pose::APose => "A-Pose",
            Pose::Crouch => "Crouch",
            Pose::Jump => "Jump",
            Pose::Sit => "Sit",
            Pose::Wave => "Wave",
        }
    }

    pub fn from_name(name: &str) -> Option<Pose> {
        Self::ALL.iter().copied().find(|p| p.name().eq_ignore_ascii_case(name))
    }

    /// (position, rotation) of the model in this pose
    pub fn target(self) -> (Vec3, Vec3) {
        match self {
            Pose::TPose => (Vec3::ZERO, Vec3::ZERO),
            Pose::APose => (Vec3::ZERO, Vec3::new(0.0, 0.0, 0.05)),
            Pose::Crouch => (Vec3::new(0.0, -0.5, 0.0), Vec3::new(0.2, 0.0, 0.0)),
            Pose::Jump => (Vec3::new(0.0, 1.0, 0.0), Vec3::new(-0.1, 0.0, 0.0)),
            Pose::Sit => (Vec3::new(0.0, -0.8, 0.0), Vec3::new(0.3, 0.0, 0.0)),
            Pose::Wave => (Vec3::ZERO, Vec3::new(0.0, 0.0, 0.15)),
        }
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_wraps_and_stays_below_100() {
        let mut p = 0.0;
        let mut wrapped = 0;
        for _ in 0..990 {
            let next = advance_progress(p, 0.7);
            assert!((0.0..100.0).contains(&next));
            if next < p {
                wrapped += 1;
            }
            p = next;
        }
        assert_eq!(wrapped, 6);
        assert_eq!(advance_progress(99.5, 0.5), 0.0);
        assert_eq!(advance_progress(0.0, -1.0), 99.0);
    }

    #[test]
    fn test_sample_is_deterministic() {
        assert_eq!(sample(37.5), sample(37.5));
        let (p, r) = sample(0.0);
        assert!(p.len() < 1e-6 && r.len() < 1e-6);
        // quarter loop: bob back at zero (sin(pi)), tilt at its peak
        let (p, r) = sample(25.0);
        assert!(p.y.abs() < 1e-5);
        assert!((r.z - TILT).abs() < 1e-5);
    }

    #[test]
    fn test_bake_spans_duration() {
        let keys = bake(2.0, 5);
        assert_eq!(keys.len(), 5);
        assert_eq!(keys[0].time, 0.0);
        assert_eq!(keys[4].time, 2.0);
        assert!((keys[4].position - keys[0].position).len() < 1e-5);
    }

    #[test]
    fn test_pose_names() {
        assert_eq!(Pose::from_name("crouch"), Some(Pose::Crouch));
        assert_eq!(Pose::from_name("T-Pose"), Some(Pose::TPose));
        assert_eq!(Pose::from_name("dab"), None);
        assert!(Pose::Crouch.target().0.y < 0.0);
    }
}

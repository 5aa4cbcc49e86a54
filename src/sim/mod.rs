//! Per-frame simulation of the viewed model
//!
//! `update(state, input, dt)` is a pure step: the render loop owns a
//! `SimState`, feeds it the current inputs once per frame and keeps the
//! returned state. Exactly one mode drives the transform each frame, in
//! precedence order physics > animation > pose > idle. Auto-rotate is
//! layered on top of whichever mode runs.

pub mod animation;
pub mod exploded;
pub mod physics;

pub use animation::{Pose, advance_progress};
pub use exploded::ExplodedView;
pub use physics::PhysicsState;

use crate::config::PhysicsSettings;
use crate::math::{Mat4, Vec3, mat4_trs};

/// Yaw added per frame while auto-rotating (radians)
pub const AUTO_ROTATE_STEP: f32 = 0.01;
/// Idle easing speed: fraction 1 - exp(-RATE * dt) of the gap closes per frame
pub const REST_RATE: f32 = 6.0;
/// Longest step integrated at once (a stalled frame must not tunnel)
pub const MAX_DT: f32 = 0.1;

/// Which logic drove the model this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    Physics,
    Animation,
    Pose,
    #[default]
    Idle,
}

/// What the host currently asks for
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimInput {
    pub auto_rotate: bool,
    pub physics_active: bool,
    pub physics: PhysicsSettings,
    pub is_playing: bool,
    /// 0..100
    pub progress: f32,
    pub pose: Option<Pose>,
}

impl Default for SimInput {
    fn default() -> Self {
        Self {
            auto_rotate: false,
            physics_active: false,
            physics: PhysicsSettings::default(),
            is_playing: false,
            progress: 0.0,
            pose: None,
        }
    }
}

impl SimInput {
    pub fn mode(&self) -> Mode {
        if self.physics_active {
            Mode::Physics
        } else if self.is_playing {
            Mode::Animation
        } else if self.pose.is_some() {
            Mode::Pose
        } else {
            Mode::Idle
        }
    }
}

/// Transform state of the model across frames
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimState {
    pub position: Vec3,
    /// Mode-driven rotation (radians)
    pub rotation: Vec3,
    /// Accumulated auto-rotate yaw, kept apart so modes don't fight it
    pub spin: f32,
    /// Present only while physics is active
    pub physics: Option<PhysicsState>,
    pub mode: Mode,
}

impl SimState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rotation including auto-rotate yaw
    pub fn total_rotation(&self) -> Vec3 {
        self.rotation + Vec3::new(0.0, self.spin, 0.0)
    }

    /// Model matrix for the wrapper node's parent
    pub fn model_matrix(&self) -> Mat4 {
        mat4_trs(self.position, self.total_rotation(), Vec3::ONE)
    }

    /// Height above the rest position (for the contact shadow)
    pub fn height(&self) -> f32 {
        self.position.y - physics::FLOOR_Y
    }
}

/// Advance the simulation by one frame
pub fn update(state: SimState, input: &SimInput, dt: f32) -> SimState {
    let dt = if dt.is_finite() { dt.clamp(0.0, MAX_DT) } else { 0.0 };
    let mut next = state;
    next.mode = input.mode();

    if input.auto_rotate {
        next.spin = (next.spin + AUTO_ROTATE_STEP) % std::f32::consts::TAU;
    }

    // Leaving physics discards the body; the idle path eases back to rest
    if next.mode != Mode::Physics {
        next.physics = None;
    }

    match next.mode {
        Mode::Physics => {
            let body = next.physics.unwrap_or_else(|| PhysicsState::dropped(&input.physics));
            let body = physics::step(body, &input.physics, dt);
            next.position = body.position;
            next.rotation = body.tilt();
            next.physics = Some(body);
        }
        Mode::Animation => {
            let (position, rotation) = animation::sample(input.progress);
            next.position = position;
            next.rotation = rotation;
        }
        Mode::Pose => {
            if let Some(pose) = input.pose {
                let (position, rotation) = pose.target();
                next.position = position;
                next.rotation = rotation;
            }
        }
        Mode::Idle => {
            let k = 1.0 - (-REST_RATE * dt).exp();
            next.position = next.position.lerp(Vec3::ZERO, k);
            next.rotation = next.rotation.lerp(Vec3::ZERO, k);
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn test_precedence() {
        let mut input = SimInput {
            physics_active: true,
            is_playing: true,
            pose: Some(Pose::Crouch),
            ..Default::default()
        };
        assert_eq!(input.mode(), Mode::Physics);
        input.physics_active = false;
        assert_eq!(input.mode(), Mode::Animation);
        input.is_playing = false;
        assert_eq!(input.mode(), Mode::Pose);
        input.pose = None;
        assert_eq!(input.mode(), Mode::Idle);
    }

    #[test]
    fn test_physics_suppresses_pose() {
        let input = SimInput {
            physics_active: true,
            pose: Some(Pose::Crouch),
            ..Default::default()
        };
        let s = update(SimState::new(), &input, DT);
        assert_eq!(s.mode, Mode::Physics);
        let (crouch, _) = Pose::Crouch.target();
        assert!(s.position.y > 4.0, "dropped from above, not crouched: {:?}", s.position);
        assert_ne!(s.position, crouch);
    }

    #[test]
    fn test_pose_applied_directly() {
        let input = SimInput { pose: Some(Pose::Jump), ..Default::default() };
        let s = update(SimState::new(), &input, DT);
        assert_eq!((s.position, s.rotation), Pose::Jump.target());
    }

    #[test]
    fn test_auto_rotate_is_orthogonal() {
        let input = SimInput {
            auto_rotate: true,
            pose: Some(Pose::Wave),
            ..Default::default()
        };
        let mut s = SimState::new();
        for _ in 0..10 {
            s = update(s, &input, DT);
        }
        assert!((s.spin - 0.1).abs() < 1e-5);
        assert_eq!(s.rotation, Pose::Wave.target().1);
        assert!((s.total_rotation().y - 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_idle_eases_back_without_snapping() {
        let mut s = SimState {
            position: Vec3::new(0.0, 3.0, 0.0),
            rotation: Vec3::new(0.2, 0.0, -0.1),
            ..Default::default()
        };
        s = update(s, &SimInput::default(), DT);
        assert!(s.position.y < 3.0 && s.position.y > 2.0);
        for _ in 0..300 {
            s = update(s, &SimInput::default(), DT);
        }
        assert!(s.position.len() < 1e-3);
        assert!(s.rotation.len() < 1e-3);
    }

    #[test]
    fn test_leaving_physics_discards_body() {
        let physics = SimInput { physics_active: true, ..Default::default() };
        let mut s = update(SimState::new(), &physics, DT);
        assert!(s.physics.is_some());
        s = update(s, &SimInput::default(), DT);
        assert!(s.physics.is_none());
        // re-entering drops from the top again
        s = update(s, &physics, DT);
        assert!(s.position.y > 4.9);
    }

    #[test]
    fn test_animation_follows_progress() {
        let a = SimInput { is_playing: true, progress: 12.5, ..Default::default() };
        let s1 = update(SimState::new(), &a, DT);
        let s2 = update(s1, &a, DT);
        assert_eq!(s1.position, s2.position);
        assert_eq!((s1.position, s1.rotation), animation::sample(12.5));
    }

    #[test]
    fn test_bad_dt_is_ignored() {
        let s = update(SimState::new(), &SimInput { physics_active: true, ..Default::default() }, f32::NAN);
        assert_eq!(s.position.y, 5.0);
    }
}

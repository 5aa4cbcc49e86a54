//! Single-body physics for the viewed model
//!
//! Semi-implicit Euler: velocity is updated first, then position moves by
//! the new velocity. The body lives in a fixed box: a bouncy floor and
//! four damped outer walls plus a ceiling.

use crate::config::PhysicsSettings;
use crate::math::Vec3;

/// Rest height of the body (model center)
pub const FLOOR_Y: f32 = 0.0;
pub const MAX_Y: f32 = 10.0;
pub const MAX_X: f32 = 5.0;
pub const MAX_Z: f32 = 5.0;
/// Velocity kept when hitting a wall or the ceiling
pub const WALL_DAMPING: f32 = 0.5;
/// Tilt (radians) per unit of lateral speed
pub const TILT_PER_SPEED: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsState {
    pub position: Vec3,
    pub velocity: Vec3,
}

impl PhysicsState {
    /// Body at rest `drop_height` above the floor
    pub fn dropped(settings: &PhysicsSettings) -> Self {
        Self {
            position: Vec3::new(0.0, (FLOOR_Y + settings.drop_height).clamp(FLOOR_Y, MAX_Y), 0.0),
            velocity: Vec3::ZERO,
        }
    }

    /// Rotation implied by the current velocity (roll against x motion, pitch with z)
    pub fn tilt(&self) -> Vec3 {
        Vec3::new(self.velocity.z * TILT_PER_SPEED, 0.0, -self.velocity.x * TILT_PER_SPEED)
    }
}

/// Clamp `value` into [min, max]; on contact, reflect `velocity` scaled by `keep`
fn collide(value: &mut f32, velocity: &mut f32, min: f32, max: f32, keep_low: f32, keep_high: f32) {
    if *value < min {
        *value = min;
        *velocity = -*velocity * keep_low;
    } else if *value > max {
        *value = max;
        *velocity = -*velocity * keep_high;
    }
}

/// Advance the body by `dt` seconds
pub fn step(state: PhysicsState, settings: &PhysicsSettings, dt: f32) -> PhysicsState {
    let PhysicsState { mut position, mut velocity } = state;

    velocity.y -= settings.gravity * dt;
    velocity.x += settings.wind * dt;
    position += velocity * dt;

    collide(&mut position.y, &mut velocity.y, FLOOR_Y, MAX_Y, settings.bounce, WALL_DAMPING);
    collide(&mut position.x, &mut velocity.x, -MAX_X, MAX_X, WALL_DAMPING, WALL_DAMPING);
    collide(&mut position.z, &mut velocity.z, -MAX_Z, MAX_Z, WALL_DAMPING, WALL_DAMPING);

    velocity = velocity * (1.0 - settings.friction * dt).max(0.0);

    // A NaN setting must not leave the body outside the box
    if !position.is_finite() || !velocity.is_finite() {
        return PhysicsState {
            position: Vec3::new(0.0, FLOOR_Y, 0.0),
            velocity: Vec3::ZERO,
        };
    }
    PhysicsState { position, velocity }
}

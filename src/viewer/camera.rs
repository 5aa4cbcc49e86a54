//! Orbit camera
//!
//! The camera circles `target` at `distance`, with yaw around +Y and pitch
//! above the horizon. Host-supplied `CameraSettings` re-seed it only when
//! they change; user orbit/pan/zoom then continues from the seeded pose.

use crate::config::CameraSettings;
use crate::math::Vec3;

const PITCH_LIMIT: f32 = 1.4;
const ORBIT_SPEED: f32 = 0.01;
const ZOOM_STEP: f32 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    pub yaw: f32,
    pub pitch: f32,
    pub distance: f32,
    pub target: Vec3,
    /// Vertical field of view in degrees
    pub fov: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    /// Last settings applied, for change detection
    applied: Option<CameraSettings>,
    /// Times the camera was re-seeded
    reseeds: u32,
}

impl OrbitCamera {
    pub fn new(settings: &CameraSettings) -> Self {
        let mut camera = Self {
            yaw: 0.0,
            pitch: 0.0,
            distance: 1.0,
            target: Vec3::ZERO,
            fov: 50.0,
            min_distance: 0.1,
            max_distance: 100.0,
            applied: None,
            reseeds: 0,
        };
        camera.apply_settings(settings);
        camera
    }

    /// Re-seed from `settings` if they differ from the last applied ones.
    /// Returns true when the camera moved.
    pub fn apply_settings(&mut self, settings: &CameraSettings) -> bool {
        if self.applied.as_ref() == Some(settings) {
            return false;
        }
        self.min_distance = settings.min_distance.max(0.01);
        self.max_distance = settings.max_distance.max(self.min_distance);
        self.fov = settings.fov.clamp(1.0, 179.0);
        self.target = settings.target;

        let offset = settings.position - settings.target;
        let len = offset.len();
        if len > f32::EPSILON {
            self.yaw = offset.x.atan2(offset.z);
            self.pitch = (offset.y / len).clamp(-1.0, 1.0).asin().clamp(-PITCH_LIMIT, PITCH_LIMIT);
        }
        self.distance = len.clamp(self.min_distance, self.max_distance);
        self.applied = Some(*settings);
        self.reseeds += 1;
        true
    }

    /// Forget the applied settings so the next `apply_settings` re-seeds
    pub fn reset(&mut self) {
        if let Some(settings) = self.applied.take() {
            self.apply_settings(&settings);
        }
    }

    pub fn reseed_count(&self) -> u32 {
        self.reseeds
    }

    /// Mouse drag in pixels
    pub fn orbit(&mut self, dx: f32, dy: f32) {
        self.yaw -= dx * ORBIT_SPEED;
        self.pitch = (self.pitch + dy * ORBIT_SPEED).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Move the target in the view plane; `dx`/`dy` in pixels
    pub fn pan(&mut self, dx: f32, dy: f32) {
        let scale = self.distance * 0.002;
        let (right, up) = self.view_axes();
        self.target = self.target + right.scale(-dx * scale) + up.scale(dy * scale);
    }

    /// Scroll wheel steps (positive zooms in)
    pub fn zoom(&mut self, scroll: f32) {
        self.distance = (self.distance * (1.0 - scroll * ZOOM_STEP)).clamp(self.min_distance, self.max_distance);
    }

    pub fn position(&self) -> Vec3 {
        let (sp, cp) = self.pitch.sin_cos();
        let (sy, cy) = self.yaw.sin_cos();
        self.target + Vec3::new(cp * sy, sp, cp * cy).scale(self.distance)
    }

    fn view_axes(&self) -> (Vec3, Vec3) {
        let forward = (self.target - self.position()).normalize();
        let right = forward.cross(Vec3::new(0.0, 1.0, 0.0)).normalize();
        let up = right.cross(forward);
        (right, up)
    }
}

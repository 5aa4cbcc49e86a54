//! Viewer configuration
//!
//! Every value the host passes to the viewer lives here: display settings,
//! the light rig, camera seed, physics constants, material overrides. The
//! whole set is serde-serializable so `ViewerConfig` can be read from and
//! written to a RON file. Missing fields fall back to their defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::math::{Rgb, Vec3};
use crate::scene::DEFAULT_TARGET_SIZE;

/// File looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "vitrine.ron";

/// Error type for config loading/saving
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<ron::error::SpannedError> for ConfigError {
    fn from(e: ron::error::SpannedError) -> Self {
        ConfigError::Parse(format!("{} at {}", e.code, e.position))
    }
}

impl From<ron::Error> for ConfigError {
    fn from(e: ron::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Display-only remapping of material appearance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TopologyMode {
    #[default]
    None,
    Clay,
    Heatmap,
    Uv,
    Normal,
}

impl TopologyMode {
    pub const ALL: [TopologyMode; 5] = [
        TopologyMode::None,
        TopologyMode::Clay,
        TopologyMode::Heatmap,
        TopologyMode::Uv,
        TopologyMode::Normal,
    ];

    pub fn next(self) -> Self {
        let i = Self::ALL.iter().position(|m| *m == self).unwrap_or(0);
        Self::ALL[(i + 1) % Self::ALL.len()]
    }

    pub fn label(self) -> &'static str {
        match self {
            TopologyMode::None => "none",
            TopologyMode::Clay => "clay",
            TopologyMode::Heatmap => "heatmap",
            TopologyMode::Uv => "uv",
            TopologyMode::Normal => "normal",
        }
    }
}

/// Environment preset (background + reflection tint)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Environment {
    #[default]
    Studio,
    Sunset,
    Dawn,
    Night,
    Warehouse,
    Forest,
    City,
}

impl Environment {
    pub const ALL: [Environment; 7] = [
        Environment::Studio,
        Environment::Sunset,
        Environment::Dawn,
        Environment::Night,
        Environment::Warehouse,
        Environment::Forest,
        Environment::City,
    ];

    pub fn next(self) -> Self {
        let i = Self::ALL.iter().position(|e| *e == self).unwrap_or(0);
        Self::ALL[(i + 1) % Self::ALL.len()]
    }

    pub fn label(self) -> &'static str {
        match self {
            Environment::Studio => "studio",
            Environment::Sunset => "sunset",
            Environment::Dawn => "dawn",
            Environment::Night => "night",
            Environment::Warehouse => "warehouse",
            Environment::Forest => "forest",
            Environment::City => "city",
        }
    }
}

/// Display toggles, diffed every update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub auto_rotate: bool,
    pub wireframe: bool,
    pub environment: Environment,
    pub show_skeleton: bool,
    pub topology_mode: TopologyMode,
    pub show_grid: bool,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            auto_rotate: false,
            wireframe: false,
            environment: Environment::Studio,
            show_skeleton: false,
            topology_mode: TopologyMode::None,
            show_grid: true,
        }
    }
}

/// Optional replacements for authored material values
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialOverride {
    pub color: Option<Rgb>,
    pub roughness: Option<f32>,
    pub metalness: Option<f32>,
}

/// One light of the rig
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightSpec {
    pub color: Rgb,
    pub intensity: f32,
}

impl LightSpec {
    pub const fn new(color: Rgb, intensity: f32) -> Self {
        Self { color, intensity }
    }

    /// Linear color premultiplied by intensity
    pub fn radiance(&self) -> Rgb {
        self.color.to_linear().scale(self.intensity.max(0.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingSettings {
    pub ambient: LightSpec,
    /// Sky color; the ground color is a darkened copy
    pub hemisphere: LightSpec,
    pub key: LightSpec,
    pub fill: LightSpec,
    pub rim: LightSpec,
    pub accent: LightSpec,
    pub shadows: bool,
}

impl Default for LightingSettings {
    fn default() -> Self {
        Self {
            ambient: LightSpec::new(Rgb::WHITE, 0.25),
            hemisphere: LightSpec::new(Rgb::from_hex(0xDDE8FF), 0.35),
            key: LightSpec::new(Rgb::from_hex(0xFFF4E0), 0.9),
            fill: LightSpec::new(Rgb::from_hex(0xC8D8FF), 0.4),
            rim: LightSpec::new(Rgb::WHITE, 0.5),
            accent: LightSpec::new(Rgb::from_hex(0x66AAFF), 0.3),
            shadows: true,
        }
    }
}

/// Programmatic camera seed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Vertical field of view in degrees
    pub fov: f32,
    pub position: Vec3,
    pub target: Vec3,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fov: 50.0,
            position: Vec3::new(5.0, 3.0, 5.0),
            target: Vec3::ZERO,
            min_distance: 2.0,
            max_distance: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSettings {
    /// Downward acceleration (units/s^2)
    pub gravity: f32,
    /// Horizontal acceleration along +X
    pub wind: f32,
    /// Fraction of vertical speed kept after hitting the floor
    pub bounce: f32,
    /// Velocity decay per second
    pub friction: f32,
    /// Height the body is dropped from when physics starts
    pub drop_height: f32,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            gravity: 9.8,
            wind: 0.0,
            bounce: 0.6,
            friction: 0.1,
            drop_height: 5.0,
        }
    }
}

/// Defaults for `StartRecording` requests issued by the host
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    pub duration_secs: f32,
    pub fps: u32,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self { duration_secs: 3.0, fps: 15 }
    }
}

/// Everything read from `vitrine.ron`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub viewer: ViewerSettings,
    pub lighting: LightingSettings,
    pub camera: CameraSettings,
    pub physics: PhysicsSettings,
    pub recording: RecordingSettings,
    /// Largest axis of a normalized model
    pub target_size: f32,
    /// Where screenshots, recordings and exports are written
    pub output_dir: PathBuf,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            viewer: ViewerSettings::default(),
            lighting: LightingSettings::default(),
            camera: CameraSettings::default(),
            physics: PhysicsSettings::default(),
            recording: RecordingSettings::default(),
            target_size: DEFAULT_TARGET_SIZE,
            output_dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    #[cfg(not(target_arch = "wasm32"))]
    if let Some(dir) = dirs::download_dir() {
        return dir;
    }
    PathBuf::from("captures")
}

impl ViewerConfig {
    /// Parse RON text
    pub fn from_ron(s: &str) -> Result<Self, ConfigError> {
        let mut config: ViewerConfig = ron::from_str(s)?;
        config.sanitize();
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_ron(&contents)
    }

    /// Load `path`, falling back to defaults when it is missing or malformed
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => {
                log::info!("loaded config from {}", path.display());
                config
            }
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                log::warn!("ignoring config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        let config = ron::ser::PrettyConfig::new()
            .depth_limit(4)
            .indentor("  ".to_string());
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    /// Clamp values that would break the viewer
    fn sanitize(&mut self) {
        if !(self.target_size.is_finite() && self.target_size > 0.0) {
            log::warn!("target_size {} is invalid, using {}", self.target_size, DEFAULT_TARGET_SIZE);
            self.target_size = DEFAULT_TARGET_SIZE;
        }
        let cam = &mut self.camera;
        cam.fov = cam.fov.clamp(10.0, 120.0);
        cam.min_distance = cam.min_distance.max(0.1);
        cam.max_distance = cam.max_distance.max(cam.min_distance);
        self.physics.bounce = self.physics.bounce.clamp(0.0, 1.0);
        self.physics.friction = self.physics.friction.max(0.0);
        self.recording.fps = self.recording.fps.clamp(1, 60);
        self.recording.duration_secs = self.recording.duration_secs.clamp(0.1, 60.0);
    }
}

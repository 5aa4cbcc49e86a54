//! Animation export
//!
//! The payload is a stub: keyframes are sampled from the procedural
//! bob/tilt loop, not baked from the model's own animation. Each format
//! has its own serializer.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::sim::animation::{bake, Keyframe};
use super::CaptureError;

/// Keyframes in an exported loop
pub const EXPORT_KEYFRAMES: usize = 30;
/// Length of the exported loop in seconds
pub const EXPORT_DURATION: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportFormat {
    Json,
    Ron,
    Bvh,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Ron => "ron",
            ExportFormat::Bvh => "bvh",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Ron | ExportFormat::Bvh => "text/plain",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationExport {
    pub name: String,
    pub duration: f32,
    pub fps: f32,
    pub keyframes: Vec<Keyframe>,
}

impl AnimationExport {
    /// Sample the procedural loop for `name`
    pub fn sampled(name: &str) -> Self {
        let keyframes = bake(EXPORT_DURATION, EXPORT_KEYFRAMES);
        Self {
            name: name.to_string(),
            duration: EXPORT_DURATION,
            fps: (EXPORT_KEYFRAMES - 1) as f32 / EXPORT_DURATION,
            keyframes,
        }
    }

    pub fn serialize(&self, format: ExportFormat) -> Result<Vec<u8>, CaptureError> {
        match format {
            ExportFormat::Json => serde_json::to_vec_pretty(self).map_err(|e| CaptureError::Encode(e.to_string())),
            ExportFormat::Ron => {
                let config = ron::ser::PrettyConfig::new().depth_limit(4).indentor("  ".to_string());
                ron::ser::to_string_pretty(self, config)
                    .map(String::into_bytes)
                    .map_err(|e| CaptureError::Encode(e.to_string()))
            }
            ExportFormat::Bvh => Ok(self.to_bvh().into_bytes()),
        }
    }

    /// Single-joint BVH: root translation plus ZXY rotation in degrees
    fn to_bvh(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "HIERARCHY");
        let _ = writeln!(out, "ROOT {}", bvh_name(&self.name));
        let _ = writeln!(out, "{{");
        let _ = writeln!(out, "  OFFSET 0.0 0.0 0.0");
        let _ = writeln!(out, "  CHANNELS 6 Xposition Yposition Zposition Zrotation Xrotation Yrotation");
        let _ = writeln!(out, "  End Site");
        let _ = writeln!(out, "  {{");
        let _ = writeln!(out, "    OFFSET 0.0 1.0 0.0");
        let _ = writeln!(out, "  }}");
        let _ = writeln!(out, "}}");
        let _ = writeln!(out, "MOTION");
        let _ = writeln!(out, "Frames: {}", self.keyframes.len());
        let frame_time = if self.fps > 0.0 { 1.0 / self.fps } else { 0.0 };
        let _ = writeln!(out, "Frame Time: {:.6}", frame_time);
        for k in &self.keyframes {
            let r = k.rotation.scale(180.0 / std::f32::consts::PI);
            let _ = writeln!(
                out,
                "{:.6} {:.6} {:.6} {:.6} {:.6} {:.6}",
                k.position.x, k.position.y, k.position.z, r.z, r.x, r.y
            );
        }
        out
    }
}

/// BVH joint names cannot contain whitespace
fn bvh_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "model".to_string()
    } else {
        cleaned
    }
}

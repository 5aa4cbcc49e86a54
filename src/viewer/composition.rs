//! Scene composition: light rig, environment, ground, contact shadow,
//! skeleton overlay and reference proxies
//!
//! Everything here is plain data computed from the current inputs. The
//! renderer reads it; nothing in this module draws.

use serde::{Deserialize, Serialize};

use crate::config::{Environment, LightingSettings};
use crate::math::{Mat4, Rgb, Vec3};
use crate::scene::primitives::{box_mesh, cone_mesh, cylinder_mesh};
use crate::scene::{LoadedScene, Material, Mesh, SceneNode};

/// Opacity of reference proxies
pub const PROXY_OPACITY: f32 = 0.35;
/// Gap between neighbouring proxies
const PROXY_GAP: f32 = 0.5;
/// Height above the floor at which the contact shadow has faded out
pub const SHADOW_FADE_HEIGHT: f32 = 4.0;
const SHADOW_MAX_OPACITY: f32 = 0.5;

/// A directional light; `direction` points from the scene toward the light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub radiance: Rgb,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub radiance: Rgb,
    /// Distance at which the light reaches zero
    pub radius: f32,
}

/// Linear-space light rig: ambient + hemisphere + key/fill/rim + accent
#[derive(Debug, Clone, PartialEq)]
pub struct LightRig {
    pub ambient: Rgb,
    pub sky: Rgb,
    pub ground: Rgb,
    pub directional: [DirectionalLight; 3],
    pub accent: PointLight,
    pub shadows: bool,
}

impl LightRig {
    pub fn from_settings(settings: &LightingSettings) -> Self {
        let sky = settings.hemisphere.radiance();
        Self {
            ambient: settings.ambient.radiance(),
            sky,
            ground: sky.scale(0.35),
            directional: [
                DirectionalLight { direction: Vec3::new(5.0, 8.0, 5.0).normalize(), radiance: settings.key.radiance() },
                DirectionalLight { direction: Vec3::new(-6.0, 3.0, 2.0).normalize(), radiance: settings.fill.radiance() },
                DirectionalLight { direction: Vec3::new(0.0, 4.0, -8.0).normalize(), radiance: settings.rim.radiance() },
            ],
            accent: PointLight {
                position: Vec3::new(-3.0, 2.0, 3.0),
                radiance: settings.accent.radiance(),
                radius: 8.0,
            },
            shadows: settings.shadows,
        }
    }

    /// Key light direction, used for the contact shadow offset
    pub fn key_direction(&self) -> Vec3 {
        self.directional[0].direction
    }
}

/// Background gradient and reflection tint of an environment preset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentPreset {
    pub sky_top: Rgb,
    pub sky_bottom: Rgb,
    /// Color reflected by smooth and metallic surfaces (linear)
    pub reflection: Rgb,
}

impl EnvironmentPreset {
    pub fn of(environment: Environment) -> Self {
        let (top, bottom, reflection) = match environment {
            Environment::Studio => (0x3A3F4A, 0x16181D, 0xB8BCC8),
            Environment::Sunset => (0x6A4C8C, 0xF08A4B, 0xF2A65A),
            Environment::Dawn => (0x7FA7D9, 0xF6C9A8, 0xE8D5C4),
            Environment::Night => (0x0B1026, 0x1C2340, 0x3A4670),
            Environment::Warehouse => (0x4A4136, 0x1F1B16, 0x9C8B74),
            Environment::Forest => (0x4F7A4A, 0x1E2E1A, 0x7FA36B),
            Environment::City => (0x8FA3B8, 0x3C4654, 0xA8B4C2),
        };
        Self {
            sky_top: Rgb::from_hex(top),
            sky_bottom: Rgb::from_hex(bottom),
            reflection: Rgb::from_hex(reflection).to_linear(),
        }
    }
}

/// Grid on the floor plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ground {
    pub y: f32,
    pub slices: u32,
    pub spacing: f32,
}

/// Translucent disc under the model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactShadow {
    pub center: Vec3,
    pub radius: f32,
    pub opacity: f32,
}

/// Height of the floor under a loaded (normalized) model
pub fn ground_height(scene: Option<&LoadedScene>) -> f32 {
    match scene {
        Some(s) if !s.bounding_box.is_empty() => -s.bounding_box.extent().y * s.extent_scale * 0.5,
        _ => -1.0,
    }
}

/// Shadow for a model whose center is `height` above its rest position
pub fn contact_shadow(footprint: f32, ground_y: f32, model_position: Vec3, height: f32) -> Option<ContactShadow> {
    let fade = (1.0 - height.max(0.0) / SHADOW_FADE_HEIGHT).clamp(0.0, 1.0);
    if fade <= 0.0 {
        return None;
    }
    Some(ContactShadow {
        center: Vec3::new(model_position.x, ground_y + 0.01, model_position.z),
        radius: footprint * (1.0 + height.max(0.0) * 0.15),
        opacity: SHADOW_MAX_OPACITY * fade,
    })
}

/// Joint markers and bone segments in world space
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkeletonOverlay {
    pub joints: Vec<Vec3>,
    pub bones: Vec<(Vec3, Vec3)>,
}

impl SkeletonOverlay {
    pub fn build(scene: &LoadedScene, model: &Mat4) -> Self {
        let joints = scene.bone_world_positions(model);
        let bones = scene
            .skeleton
            .iter()
            .enumerate()
            .filter_map(|(i, b)| Some((*joints.get(b.parent?)?, joints[i])))
            .collect();
        Self { joints, bones }
    }
}

/// Reference prop kinds, each with its own proxy shape and tint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SceneObjectKind {
    Human,
    Car,
    Crate,
    Door,
    Tree,
    Building,
    Custom,
}

impl SceneObjectKind {
    pub fn label(self) -> &'static str {
        match self {
            SceneObjectKind::Human => "human",
            SceneObjectKind::Car => "car",
            SceneObjectKind::Crate => "crate",
            SceneObjectKind::Door => "door",
            SceneObjectKind::Tree => "tree",
            SceneObjectKind::Building => "building",
            SceneObjectKind::Custom => "custom",
        }
    }

    pub fn tint(self) -> Rgb {
        Rgb::from_hex(match self {
            SceneObjectKind::Human => 0x4A90E2,
            SceneObjectKind::Car => 0xE24A4A,
            SceneObjectKind::Crate => 0xC8964B,
            SceneObjectKind::Door => 0x8B5A2B,
            SceneObjectKind::Tree => 0x3FA34D,
            SceneObjectKind::Building => 0x9AA0A6,
            SceneObjectKind::Custom => 0xB04AE2,
        })
    }

    /// Proxy meshes at scale 1, standing on y = 0
    fn meshes(self) -> Vec<Mesh> {
        let raised = |mut mesh: Mesh, y: f32| {
            for p in &mut mesh.positions {
                p.y += y;
            }
            mesh
        };
        match self {
            SceneObjectKind::Human => vec![
                cylinder_mesh(0.22, 1.5, 12),
                raised(box_mesh(Vec3::splat(0.26)), 1.65),
            ],
            SceneObjectKind::Car => vec![
                raised(box_mesh(Vec3::new(4.2, 0.8, 1.8)), 0.6),
                raised(box_mesh(Vec3::new(2.2, 0.6, 1.6)), 1.3),
            ],
            SceneObjectKind::Crate => vec![raised(box_mesh(Vec3::splat(1.0)), 0.5)],
            SceneObjectKind::Door => vec![raised(box_mesh(Vec3::new(0.9, 2.1, 0.08)), 1.05)],
            SceneObjectKind::Tree => vec![
                cylinder_mesh(0.15, 1.5, 10),
                raised(cone_mesh(0.9, 2.5, 12), 1.5),
            ],
            SceneObjectKind::Building => vec![raised(box_mesh(Vec3::new(6.0, 10.0, 6.0)), 5.0)],
            SceneObjectKind::Custom => vec![raised(box_mesh(Vec3::splat(1.0)), 0.5)],
        }
    }

    /// Footprint width along X at scale 1
    fn width(self) -> f32 {
        match self {
            SceneObjectKind::Human => 0.5,
            SceneObjectKind::Car => 4.2,
            SceneObjectKind::Crate | SceneObjectKind::Custom => 1.0,
            SceneObjectKind::Door => 0.9,
            SceneObjectKind::Tree => 1.8,
            SceneObjectKind::Building => 6.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub id: u32,
    pub kind: SceneObjectKind,
    pub name: String,
    pub scale: f32,
}

/// Host-managed list of reference props
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneObjects {
    objects: Vec<SceneObject>,
    next_id: u32,
}

impl SceneObjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: SceneObjectKind, name: impl Into<String>, scale: f32) -> u32 {
        self.next_id += 1;
        let id = self.next_id;
        self.objects.push(SceneObject {
            id,
            kind,
            name: name.into(),
            scale: if scale.is_finite() && scale > 0.0 { scale } else { 1.0 },
        });
        id
    }

    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.objects.len();
        self.objects.retain(|o| o.id != id);
        self.objects.len() != before
    }

    pub fn remove_last(&mut self) -> Option<SceneObject> {
        self.objects.pop()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    pub fn as_slice(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Place the props in a row to the right of and slightly behind the model.
/// `model_half_width` is the model's half extent along X, `ground_y` its floor.
pub fn layout_proxies(objects: &[SceneObject], model_half_width: f32, ground_y: f32) -> Vec<SceneNode> {
    let mut cursor = model_half_width + 1.0;
    let mut nodes = Vec::with_capacity(objects.len());

    for object in objects {
        let width = object.kind.width() * object.scale;
        let mut node = SceneNode::new(format!("{} ({})", object.name, object.kind.label()));
        node.transform.position = Vec3::new(cursor + width * 0.5, ground_y, -1.0);
        node.transform.scale = Vec3::splat(object.scale);
        cursor += width + PROXY_GAP;

        for mut mesh in object.kind.meshes() {
            let mut material = Material::new(object.kind.label(), object.kind.tint());
            material.opacity = PROXY_OPACITY;
            material.roughness = 0.9;
            material.double_sided = true;
            mesh.materials = vec![material];
            mesh.cast_shadow = false;
            node.children.push(SceneNode::with_mesh(mesh.name.clone(), mesh));
        }
        nodes.push(node);
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_list_ids() {
        let mut list = SceneObjects::new();
        let a = list.add(SceneObjectKind::Human, "Alice", 1.0);
        let b = list.add(SceneObjectKind::Car, "Car", 0.0);
        assert_ne!(a, b);
        assert_eq!(list.as_slice()[1].scale, 1.0);
        assert!(list.remove(a));
        assert!(!list.remove(a));
        assert_eq!(list.len(), 1);
        // ids are not reused after removal
        let c = list.add(SceneObjectKind::Tree, "Tree", 1.0);
        assert!(c > b);
        list.clear();
        assert!(list.is_empty());
    }

    #[test]
    fn test_proxies_form_a_row_on_the_ground() {
        let mut list = SceneObjects::new();
        list.add(SceneObjectKind::Human, "h", 1.0);
        list.add(SceneObjectKind::Crate, "c", 2.0);
        let nodes = layout_proxies(list.as_slice(), 2.0, -1.5);
        assert_eq!(nodes.len(), 2);
        assert!(nodes[0].transform.position.x > 2.0);
        assert!(nodes[1].transform.position.x > nodes[0].transform.position.x);
        let b = nodes[1].bounding_box();
        assert!((b.min.y + 1.5).abs() < 1e-4);
        // crate of size 1 at scale 2
        assert!((b.extent().y - 2.0).abs() < 1e-4);
        assert!(b.min.x > nodes[0].bounding_box().max.x);
        nodes[0].for_each_mesh(&mut |m| assert!(m.materials[0].is_translucent()));
    }

    #[test]
    fn test_contact_shadow_fades_with_height() {
        let low = contact_shadow(2.0, -1.0, Vec3::ZERO, 0.0).unwrap();
        let high = contact_shadow(2.0, -1.0, Vec3::ZERO, 2.0).unwrap();
        assert!(high.opacity < low.opacity);
        assert!(high.radius > low.radius);
        assert!(contact_shadow(2.0, -1.0, Vec3::ZERO, SHADOW_FADE_HEIGHT).is_none());
    }

    #[test]
    fn test_rig_is_linear_and_scaled() {
        let mut settings = LightingSettings::default();
        settings.key.intensity = 0.0;
        let rig = LightRig::from_settings(&settings);
        assert_eq!(rig.directional[0].radiance, Rgb::BLACK);
        assert!((rig.key_direction().len() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_every_environment_has_a_preset() {
        for env in Environment::ALL {
            let p = EnvironmentPreset::of(env);
            assert_ne!(p.sky_top, p.sky_bottom);
        }
    }
}

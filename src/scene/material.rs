//! Renderable materials and the material corrector
//!
//! Decoders produce materials as authored in the file. Before a scene is
//! installed, `correct_materials` guarantees every mesh is renderable:
//! missing materials are replaced by a neutral default, every material is
//! double-sided, texture slots get the color encoding their map type needs,
//! and meshes cast/receive shadows. `apply_material_state` then re-applies the
//! live overrides (topology mode, override color, wireframe, selected texture)
//! on top of the authored values whenever those settings change.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{MaterialOverride, TopologyMode};
use crate::math::Rgb;
use super::SceneNode;

/// Counter for texture image ids (render-side cache keys)
static IMAGE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Decoded RGBA8 image shared between materials
#[derive(Debug)]
pub struct ImageData {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl ImageData {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self {
            id: IMAGE_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            rgba,
        }
    }

    /// Decode PNG/JPEG/BMP bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        let img = image::load_from_memory(bytes).map_err(|e| format!("image decode failed: {}", e))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self::new(width, height, rgba.into_raw()))
    }
}

/// What a texture slot feeds in the shading model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapKind {
    Color,
    Emissive,
    Normal,
    Roughness,
    Metalness,
    /// Packed glTF metallic (B) / roughness (G)
    MetallicRoughness,
    AmbientOcclusion,
}

impl MapKind {
    /// Color data is display-referred; everything else is data
    pub fn required_encoding(self) -> ColorEncoding {
        match self {
            MapKind::Color | MapKind::Emissive => ColorEncoding::Srgb,
            MapKind::Normal
            | MapKind::Roughness
            | MapKind::Metalness
            | MapKind::MetallicRoughness
            | MapKind::AmbientOcclusion => ColorEncoding::Linear,
        }
    }
}

/// How texel values are interpreted when sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorEncoding {
    /// Perceptual (display-referred), decoded to linear before lighting
    Srgb,
    /// Raw data
    Linear,
}

/// A texture bound to a material slot
#[derive(Debug, Clone)]
pub struct TextureSlot {
    pub kind: MapKind,
    pub image: Arc<ImageData>,
    pub encoding: ColorEncoding,
}

impl TextureSlot {
    /// Slot as decoded from a file; the corrector fixes the encoding
    pub fn new(kind: MapKind, image: Arc<ImageData>) -> Self {
        Self {
            kind,
            image,
            encoding: ColorEncoding::Linear,
        }
    }
}

/// Values as authored in the file, kept so overrides can be undone
#[derive(Debug, Clone)]
struct Authored {
    color: Rgb,
    roughness: f32,
    metalness: f32,
    maps: Vec<TextureSlot>,
}

/// Per-mesh material state
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub color: Rgb,
    pub roughness: f32,
    pub metalness: f32,
    pub emissive: Rgb,
    pub opacity: f32,
    pub double_sided: bool,
    pub wireframe: bool,
    pub maps: Vec<TextureSlot>,
    authored: Option<Authored>,
}

impl Material {
    pub fn new(name: impl Into<String>, color: Rgb) -> Self {
        Self {
            name: name.into(),
            color,
            roughness: 0.5,
            metalness: 0.0,
            emissive: Rgb::BLACK,
            opacity: 1.0,
            double_sided: false,
            wireframe: false,
            maps: Vec::new(),
            authored: None,
        }
    }

    /// Mid-gray, medium roughness, low metalness
    pub fn default_pbr() -> Self {
        Self {
            roughness: 0.5,
            metalness: 0.1,
            ..Self::new("default", Rgb::new(0.5, 0.5, 0.5))
        }
    }

    pub fn map(&self, kind: MapKind) -> Option<&TextureSlot> {
        self.maps.iter().find(|m| m.kind == kind)
    }

    pub fn is_translucent(&self) -> bool {
        self.opacity < 0.999
    }

    fn authored(&mut self) -> &Authored {
        self.authored.get_or_insert_with(|| Authored {
            color: self.color,
            roughness: self.roughness,
            metalness: self.metalness,
            maps: self.maps.clone(),
        })
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::default_pbr()
    }
}

/// Counts gathered while correcting a scene
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrectionReport {
    pub meshes: usize,
    pub defaulted: usize,
    pub materials: usize,
    pub texture_slots: usize,
}

/// Make every mesh in the graph renderable.
pub fn correct_materials(root: &mut SceneNode) -> CorrectionReport {
    let mut report = CorrectionReport::default();

    root.for_each_mesh_mut(&mut |mesh| {
        report.meshes += 1;
        if mesh.materials.is_empty() {
            mesh.materials.push(Material::default_pbr());
            report.defaulted += 1;
        }

        for material in &mut mesh.materials {
            report.materials += 1;
            material.double_sided = true;
            for slot in &mut material.maps {
                slot.encoding = slot.kind.required_encoding();
                report.texture_slots += 1;
            }
            // Snapshot after encodings are fixed so restores stay correct
            material.authored = None;
            let _ = material.authored();
        }

        mesh.cast_shadow = true;
        mesh.receive_shadow = true;
    });

    report
}

/// The live settings that drive material appearance
#[derive(Debug, Clone, Default)]
pub struct MaterialState {
    pub topology: TopologyMode,
    pub material_override: MaterialOverride,
    pub wireframe: bool,
    pub selected_texture: Option<Arc<ImageData>>,
}

impl MaterialState {
    /// Cheap comparison used for change detection (textures compare by id)
    pub fn same_as(&self, other: &MaterialState) -> bool {
        self.topology == other.topology
            && self.material_override == other.material_override
            && self.wireframe == other.wireframe
            && self.selected_texture.as_ref().map(|t| t.id) == other.selected_texture.as_ref().map(|t| t.id)
    }
}

/// Indicator color for a topology mode (None when the mode shows authored colors)
pub fn topology_color(mode: TopologyMode) -> Option<Rgb> {
    match mode {
        TopologyMode::None => None,
        TopologyMode::Clay => Some(Rgb::new(0.8, 0.8, 0.8)),
        TopologyMode::Heatmap => Some(Rgb::from_hex(0x22CC44)),
        TopologyMode::Uv => Some(Rgb::from_hex(0x8844CC)),
        TopologyMode::Normal => Some(Rgb::from_hex(0x8080FF)),
    }
}

/// Re-apply live overrides to every material, starting from authored values.
/// Returns the number of materials touched.
pub fn apply_material_state(root: &mut SceneNode, state: &MaterialState) -> usize {
    let mut touched = 0;

    root.for_each_mesh_mut(&mut |mesh| {
        for material in &mut mesh.materials {
            apply_to_material(material, state);
            touched += 1;
        }
    });

    touched
}

fn apply_to_material(material: &mut Material, state: &MaterialState) {
    let authored = material.authored().clone();

    let mut color = authored.color;
    let mut roughness = authored.roughness;
    let mut metalness = authored.metalness;

    let mut maps: Vec<TextureSlot> = authored
        .maps
        .iter()
        .filter(|m| m.kind != MapKind::Color)
        .cloned()
        .collect();
    let color_map = match &state.selected_texture {
        Some(image) => Some(TextureSlot {
            kind: MapKind::Color,
            image: Arc::clone(image),
            encoding: ColorEncoding::Srgb,
        }),
        None => authored.maps.iter().find(|m| m.kind == MapKind::Color).cloned(),
    };

    if let Some(indicator) = topology_color(state.topology) {
        color = indicator;
        if state.topology == TopologyMode::Clay {
            metalness = 0.0;
            roughness = 1.0;
        }
    } else if let Some(slot) = color_map {
        maps.insert(0, slot);
    }

    if let Some(c) = state.material_override.color {
        color = c;
    }
    if let Some(r) = state.material_override.roughness {
        roughness = r.clamp(0.0, 1.0);
    }
    if let Some(m) = state.material_override.metalness {
        metalness = m.clamp(0.0, 1.0);
    }

    material.color = color;
    material.roughness = roughness;
    material.metalness = metalness;
    material.maps = maps;
    material.wireframe = state.wireframe;
}

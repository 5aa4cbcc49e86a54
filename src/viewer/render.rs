//! Drawing with macroquad
//!
//! Geometry is transformed and lit on the CPU every frame (Gouraud, one color
//! per vertex) and handed to macroquad as unindexed triangle batches. Base
//! color textures are uploaded once per image and reused.

use std::collections::{HashMap, HashSet};

use macroquad::camera::{set_camera, set_default_camera, Camera3D};
use macroquad::color::Color;
use macroquad::math::{vec3, Vec3 as MqVec3};
use macroquad::models::{draw_line_3d, draw_mesh, draw_sphere, Mesh as MqMesh, Vertex};
use macroquad::shapes::draw_rectangle;
use macroquad::texture::{get_screen_data, FilterMode, Texture2D};
use macroquad::window::{screen_height, screen_width};

use crate::capture::{Frame, FrameSource};
use crate::config::ViewerSettings;
use crate::math::{Rgb, Vec3};
use crate::scene::{GlobalTransform, ImageData, MapKind, Material, Mesh, SceneNode};
use super::composition::{ContactShadow, EnvironmentPreset, Ground, SkeletonOverlay};
use super::shading::{shade_vertex, ShadeContext};
use super::Viewer;

/// Keep batches under the u16 index range
const MAX_BATCH_VERTICES: usize = 65_532;
const BACKGROUND_BANDS: usize = 32;
const SHADOW_SEGMENTS: usize = 32;
const JOINT_RADIUS: f32 = 0.04;

fn mq(v: Vec3) -> MqVec3 {
    vec3(v.x, v.y, v.z)
}

fn color(rgb: Rgb, alpha: f32) -> Color {
    let [r, g, b, a] = rgb.to_rgba8(alpha);
    Color::from_rgba(r, g, b, a)
}

/// Accumulates triangles sharing one texture
struct Batch {
    vertices: Vec<Vertex>,
    indices: Vec<u16>,
    texture: Option<Texture2D>,
}

impl Batch {
    fn new(texture: Option<Texture2D>) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            texture,
        }
    }

    fn push(&mut self, position: Vec3, uv: (f32, f32), color: Color) {
        if self.vertices.len() >= MAX_BATCH_VERTICES {
            self.flush();
        }
        self.indices.push(self.vertices.len() as u16);
        self.vertices.push(Vertex::new(position.x, position.y, position.z, uv.0, uv.1, color));
    }

    /// Room for a whole triangle, so one never straddles two draws
    fn reserve_triangle(&mut self) {
        if self.vertices.len() + 3 > MAX_BATCH_VERTICES {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.vertices.is_empty() {
            return;
        }
        let mesh = MqMesh {
            vertices: std::mem::take(&mut self.vertices),
            indices: std::mem::take(&mut self.indices),
            texture: self.texture.clone(),
        };
        draw_mesh(&mesh);
    }
}

/// Per-window drawing state
pub struct Renderer {
    textures: HashMap<u64, Texture2D>,
    revision: u64,
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            textures: HashMap::new(),
            revision: u64::MAX,
        }
    }

    /// Draw the whole 3D view. Leaves the default (2D) camera active.
    pub fn draw(&mut self, viewer: &Viewer, settings: &ViewerSettings) {
        let environment = EnvironmentPreset::of(settings.environment);
        draw_background(&environment);

        let orbit = viewer.camera();
        set_camera(&Camera3D {
            position: mq(orbit.position()),
            target: mq(orbit.target),
            up: vec3(0.0, 1.0, 0.0),
            fovy: orbit.fov.to_radians(),
            ..Default::default()
        });

        if settings.show_grid {
            draw_ground(&viewer.ground());
        }
        if let Some(shadow) = viewer.contact_shadow() {
            draw_contact_shadow(&shadow);
        }

        let ctx = ShadeContext {
            rig: viewer.rig(),
            environment: &environment,
            eye: viewer.eye(),
        };
        let prune = viewer.revision() != self.revision;
        let mut used = HashSet::new();

        let model = GlobalTransform::from_matrix(viewer.model_matrix());
        self.draw_node(viewer.model_root(), &model, &ctx, &mut used);
        for proxy in viewer.proxies() {
            self.draw_node(proxy, &GlobalTransform::identity(), &ctx, &mut used);
        }

        if settings.show_skeleton {
            if let Some(skeleton) = viewer.skeleton() {
                draw_skeleton(&skeleton);
            }
        }
        set_default_camera();

        if prune {
            self.textures.retain(|id, _| used.contains(id));
            self.revision = viewer.revision();
        }
    }

    fn draw_node(&mut self, root: &SceneNode, parent: &GlobalTransform, ctx: &ShadeContext, used: &mut HashSet<u64>) {
        root.visit(parent, &mut |node, global| {
            if let Some(mesh) = &node.mesh {
                self.draw_mesh(mesh, global, ctx, used);
            }
        });
    }

    fn texture(&mut self, image: &ImageData) -> Option<Texture2D> {
        if let Some(texture) = self.textures.get(&image.id) {
            return Some(texture.clone());
        }
        let (Ok(w), Ok(h)) = (u16::try_from(image.width), u16::try_from(image.height)) else {
            log::warn!("texture {}x{} too large to upload", image.width, image.height);
            return None;
        };
        if image.rgba.len() != image.width as usize * image.height as usize * 4 {
            return None;
        }
        let texture = Texture2D::from_rgba8(w, h, &image.rgba);
        texture.set_filter(FilterMode::Linear);
        self.textures.insert(image.id, texture.clone());
        Some(texture)
    }

    fn draw_mesh(&mut self, mesh: &Mesh, global: &GlobalTransform, ctx: &ShadeContext, used: &mut HashSet<u64>) {
        let world: Vec<Vec3> = mesh.positions.iter().map(|&p| global.transform_point(p)).collect();
        let has_normals = mesh.normals.len() == mesh.positions.len();
        let has_uvs = mesh.uvs.len() == mesh.positions.len();

        let whole = [crate::scene::MeshGroup {
            start: 0,
            count: mesh.indices.len(),
            material: 0,
        }];
        let groups = if mesh.groups.is_empty() { &whole[..] } else { &mesh.groups[..] };

        for group in groups {
            let fallback = Material::default_pbr();
            let material = mesh.material_for(Some(group)).unwrap_or(&fallback);
            let texture = match material.map(MapKind::Color) {
                Some(slot) if has_uvs => {
                    used.insert(slot.image.id);
                    self.texture(&slot.image)
                }
                _ => None,
            };
            let alpha = material.opacity.clamp(0.0, 1.0);
            let end = (group.start + group.count).min(mesh.indices.len());
            let Some(indices) = mesh.indices.get(group.start..end) else { continue };

            let mut batch = Batch::new(texture);
            let mut edges = Vec::new();
            for tri in indices.chunks_exact(3) {
                let ids = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
                if ids.iter().any(|&i| i >= world.len()) {
                    continue;
                }
                let [a, b, c] = ids.map(|i| world[i]);
                if material.wireframe {
                    edges.extend([(a, b), (b, c), (c, a)]);
                    continue;
                }
                let face_normal = (b - a).cross(c - a).normalize();
                batch.reserve_triangle();
                for i in ids {
                    let normal = if has_normals { global.transform_normal(mesh.normals[i]) } else { face_normal };
                    let lit = shade_vertex(ctx, world[i], normal, material.color, material);
                    let uv = if has_uvs { (mesh.uvs[i].x, mesh.uvs[i].y) } else { (0.0, 0.0) };
                    batch.push(world[i], uv, color(lit, alpha));
                }
            }
            batch.flush();

            if !edges.is_empty() {
                let line = color(material.color, 1.0);
                for (a, b) in edges {
                    draw_line_3d(mq(a), mq(b), line);
                }
            }
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Vertical gradient, drawn in screen space before the 3D pass
fn draw_background(environment: &EnvironmentPreset) {
    set_default_camera();
    let (w, h) = (screen_width(), screen_height());
    let band = h / BACKGROUND_BANDS as f32;
    for i in 0..BACKGROUND_BANDS {
        let t = i as f32 / (BACKGROUND_BANDS - 1) as f32;
        let c = environment.sky_top.lerp(environment.sky_bottom, t);
        draw_rectangle(0.0, i as f32 * band, w, band + 1.0, color(c, 1.0));
    }
}

fn draw_ground(ground: &Ground) {
    let half = ground.slices as f32 * ground.spacing * 0.5;
    let line = Color::new(0.5, 0.5, 0.5, 0.35);
    let axis = Color::new(0.6, 0.6, 0.6, 0.6);
    for i in 0..=ground.slices {
        let d = -half + i as f32 * ground.spacing;
        let c = if i * 2 == ground.slices { axis } else { line };
        draw_line_3d(vec3(d, ground.y, -half), vec3(d, ground.y, half), c);
        draw_line_3d(vec3(-half, ground.y, d), vec3(half, ground.y, d), c);
    }
}

/// Soft disc: opaque-ish center fading to nothing at the rim
fn draw_contact_shadow(shadow: &ContactShadow) {
    let center = Color::new(0.0, 0.0, 0.0, shadow.opacity);
    let rim = Color::new(0.0, 0.0, 0.0, 0.0);
    let mut vertices = Vec::with_capacity(SHADOW_SEGMENTS + 1);
    let mut indices = Vec::with_capacity(SHADOW_SEGMENTS * 3);
    let c = shadow.center;
    vertices.push(Vertex::new(c.x, c.y, c.z, 0.0, 0.0, center));
    for i in 0..SHADOW_SEGMENTS {
        let angle = i as f32 / SHADOW_SEGMENTS as f32 * std::f32::consts::TAU;
        let (s, co) = angle.sin_cos();
        vertices.push(Vertex::new(c.x + co * shadow.radius, c.y, c.z + s * shadow.radius, 0.0, 0.0, rim));
        let next = (i + 1) % SHADOW_SEGMENTS;
        indices.extend([0, (i + 1) as u16, (next + 1) as u16]);
    }
    draw_mesh(&MqMesh {
        vertices,
        indices,
        texture: None,
    });
}

fn draw_skeleton(skeleton: &SkeletonOverlay) {
    let bone = Color::new(1.0, 0.8, 0.2, 1.0);
    for &(a, b) in &skeleton.bones {
        draw_line_3d(mq(a), mq(b), bone);
    }
    for &joint in &skeleton.joints {
        draw_sphere(mq(joint), JOINT_RADIUS, None, bone);
    }
}

/// Reads back the window's framebuffer
pub struct ScreenFrameSource;

impl FrameSource for ScreenFrameSource {
    fn supports_readback(&self) -> bool {
        true
    }

    fn grab(&mut self) -> Option<Frame> {
        let image = get_screen_data();
        match Frame::from_bottom_up(image.width as u32, image.height as u32, image.bytes) {
            Ok(frame) => Some(frame),
            Err(e) => {
                log::warn!("framebuffer readback failed: {}", e);
                None
            }
        }
    }
}

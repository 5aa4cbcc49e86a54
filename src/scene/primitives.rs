//! Procedural meshes: placeholders, reference proxies, and test geometry

use std::f32::consts::TAU;

use crate::math::{Rgb, Vec2, Vec3};
use super::{Material, Mesh, SceneNode};

/// Axis-aligned box centered at the origin (24 vertices, flat normals)
pub fn box_mesh(size: Vec3) -> Mesh {
    let h = size.scale(0.5);
    let mut mesh = Mesh::new("box");

    // (normal, tangent u, tangent v) per face
    let faces = [
        (Vec3::new(0.0, 0.0, 1.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)),
        (Vec3::new(0.0, 0.0, -1.0), Vec3::new(-1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)),
        (Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, -1.0)),
        (Vec3::new(0.0, -1.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0)),
        (Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, -1.0), Vec3::new(0.0, 1.0, 0.0)),
        (Vec3::new(-1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 1.0, 0.0)),
    ];
    let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
    let uvs = [Vec2::new(0.0, 1.0), Vec2::new(1.0, 1.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 0.0)];

    for (normal, u, v) in faces {
        let base = mesh.positions.len() as u32;
        for (i, (cu, cv)) in corners.iter().enumerate() {
            let p = normal + u.scale(*cu) + v.scale(*cv);
            mesh.positions.push(p.mul_elem(h));
            mesh.normals.push(normal);
            mesh.uvs.push(uvs[i]);
        }
        mesh.indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh
}

/// Closed cylinder standing on y = 0
pub fn cylinder_mesh(radius: f32, height: f32, segments: usize) -> Mesh {
    frustum_mesh("cylinder", radius, radius, height, segments)
}

/// Cone standing on y = 0 with its apex at `height`
pub fn cone_mesh(radius: f32, height: f32, segments: usize) -> Mesh {
    frustum_mesh("cone", radius, 0.0, height, segments)
}

fn frustum_mesh(name: &str, bottom: f32, top: f32, height: f32, segments: usize) -> Mesh {
    let segments = segments.max(3);
    let mut mesh = Mesh::new(name);
    let slope = (bottom - top) / height.max(f32::EPSILON);

    for i in 0..=segments {
        let a = i as f32 / segments as f32 * TAU;
        let (s, c) = a.sin_cos();
        let normal = Vec3::new(c, slope, s).normalize();
        mesh.positions.push(Vec3::new(c * bottom, 0.0, s * bottom));
        mesh.positions.push(Vec3::new(c * top, height, s * top));
        mesh.normals.push(normal);
        mesh.normals.push(normal);
        let u = i as f32 / segments as f32;
        mesh.uvs.push(Vec2::new(u, 1.0));
        mesh.uvs.push(Vec2::new(u, 0.0));
    }
    for i in 0..segments as u32 {
        let b = i * 2;
        mesh.indices.extend_from_slice(&[b, b + 1, b + 3, b, b + 3, b + 2]);
    }

    for (y, radius, normal) in [(0.0, bottom, -Vec3::UP), (height, top, Vec3::UP)] {
        if radius <= 0.0 {
            continue;
        }
        let center = mesh.positions.len() as u32;
        mesh.positions.push(Vec3::new(0.0, y, 0.0));
        mesh.normals.push(normal);
        mesh.uvs.push(Vec2::new(0.5, 0.5));
        for i in 0..segments {
            let (s, c) = (i as f32 / segments as f32 * TAU).sin_cos();
            mesh.positions.push(Vec3::new(c * radius, y, s * radius));
            mesh.normals.push(normal);
            mesh.uvs.push(Vec2::new(0.5 + c * 0.5, 0.5 + s * 0.5));
        }
        for i in 0..segments as u32 {
            let a = center + 1 + i;
            let b = center + 1 + (i + 1) % segments as u32;
            mesh.indices.extend_from_slice(&[center, a, b]);
        }
    }
    mesh
}

/// Which placeholder the viewer shows instead of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    /// Load in flight
    Loading,
    /// Decode or fetch failed
    Error,
    /// No supported format (or no URL)
    Unsupported,
}

impl PlaceholderKind {
    pub fn color(self) -> Rgb {
        match self {
            PlaceholderKind::Loading => Rgb::from_hex(0x6688AA),
            PlaceholderKind::Error => Rgb::from_hex(0xDD3333),
            PlaceholderKind::Unsupported => Rgb::from_hex(0x888888),
        }
    }
}

/// Unit-ish cube standing in for the model
pub fn placeholder(kind: PlaceholderKind) -> SceneNode {
    let mut mesh = box_mesh(Vec3::splat(2.0));
    let mut material = Material::new("placeholder", kind.color());
    material.roughness = 0.8;
    material.double_sided = true;
    material.wireframe = kind == PlaceholderKind::Loading;
    mesh.materials.push(material);
    mesh.cast_shadow = true;
    mesh.receive_shadow = true;
    SceneNode::with_mesh("placeholder", mesh)
}

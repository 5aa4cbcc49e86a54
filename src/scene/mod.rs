//! Scene graph
//!
//! Decoders produce a `SceneNode` tree. The normalizer wraps it so it is
//! centered and uniformly scaled, the material corrector makes every mesh
//! renderable, and the result is installed in the viewer as a `LoadedScene`.

pub mod material;
pub mod normalize;
pub mod primitives;
pub mod transform;

pub use material::{
    ImageData, MapKind, Material, MaterialState, TextureSlot,
    apply_material_state, correct_materials,
};
pub use normalize::{DEFAULT_TARGET_SIZE, normalize};
pub use transform::{GlobalTransform, Transform};

use crate::loader::ModelFormat;
use crate::math::{Aabb, Mat4, Vec2, Vec3, mat4_mul, mat4_transform_point, mat4_translation};

/// Range of triangles drawn with one material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshGroup {
    /// First index (into `indices`)
    pub start: usize,
    /// Number of indices
    pub count: usize,
    pub material: usize,
}

/// Triangle mesh with its materials
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    /// Same length as positions (may be empty before normals are computed)
    pub normals: Vec<Vec3>,
    /// Same length as positions, or empty
    pub uvs: Vec<Vec2>,
    /// Triangle list
    pub indices: Vec<u32>,
    pub materials: Vec<Material>,
    /// Empty means every triangle uses material 0
    pub groups: Vec<MeshGroup>,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

impl Mesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Drop triangles that reference missing vertices, keeping each
    /// group's material on the triangles that survive
    pub fn sanitize(&mut self) {
        let n = self.positions.len() as u32;
        if self.indices.iter().all(|&i| i < n) && self.indices.len() % 3 == 0 {
            return;
        }
        let whole = [MeshGroup { start: 0, count: self.indices.len(), material: 0 }];
        let ranges = if self.groups.is_empty() { &whole[..] } else { &self.groups[..] };

        let mut kept = Vec::with_capacity(self.indices.len());
        let mut groups = Vec::with_capacity(ranges.len());
        for group in ranges {
            let start = kept.len();
            let end = (group.start + group.count).min(self.indices.len());
            let Some(slice) = self.indices.get(group.start..end) else { continue };
            for tri in slice.chunks_exact(3) {
                if tri.iter().all(|&i| i < n) {
                    kept.extend_from_slice(tri);
                }
            }
            if kept.len() > start {
                groups.push(MeshGroup { start, count: kept.len() - start, material: group.material });
            }
        }
        if !self.groups.is_empty() {
            self.groups = groups;
        }
        self.indices = kept;
    }

    /// Fill in smooth normals from face normals when the file has none
    pub fn compute_normals_if_missing(&mut self) {
        if self.normals.len() == self.positions.len() && self.normals.iter().any(|n| n.len() > 0.0) {
            return;
        }
        let mut normals = vec![Vec3::ZERO; self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            if a >= normals.len() || b >= normals.len() || c >= normals.len() {
                continue;
            }
            let p0 = self.positions[a];
            let face = (self.positions[b] - p0).cross(self.positions[c] - p0);
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }
        self.normals = normals.into_iter().map(|n| n.normalize()).collect();
    }

    /// Material for a group (material 0 when the mesh is ungrouped)
    pub fn material_for(&self, group: Option<&MeshGroup>) -> Option<&Material> {
        let idx = group.map(|g| g.material).unwrap_or(0);
        self.materials.get(idx).or_else(|| self.materials.first())
    }
}

/// A node in the scene graph
#[derive(Debug, Clone, Default)]
pub struct SceneNode {
    pub name: String,
    pub transform: Transform,
    pub mesh: Option<Mesh>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_mesh(name: impl Into<String>, mesh: Mesh) -> Self {
        Self {
            name: name.into(),
            mesh: Some(mesh),
            ..Default::default()
        }
    }

    /// Visit every node with its world matrix (this node's parent is `parent`)
    pub fn visit(&self, parent: &GlobalTransform, f: &mut dyn FnMut(&SceneNode, &GlobalTransform)) {
        let global = parent.child(&self.transform);
        f(self, &global);
        for child in &self.children {
            child.visit(&global, f);
        }
    }

    pub fn for_each_mesh(&self, f: &mut dyn FnMut(&Mesh)) {
        if let Some(mesh) = &self.mesh {
            f(mesh);
        }
        for child in &self.children {
            child.for_each_mesh(f);
        }
    }

    pub fn for_each_mesh_mut(&mut self, f: &mut dyn FnMut(&mut Mesh)) {
        if let Some(mesh) = &mut self.mesh {
            f(mesh);
        }
        for child in &mut self.children {
            child.for_each_mesh_mut(f);
        }
    }

    /// Bounding box of all geometry, in the space of this node's parent
    pub fn bounding_box(&self) -> Aabb {
        let mut bounds = Aabb::EMPTY;
        self.visit(&GlobalTransform::identity(), &mut |node, global| {
            if let Some(mesh) = &node.mesh {
                for &p in &mesh.positions {
                    bounds.include(global.transform_point(p));
                }
            }
        });
        bounds
    }

    pub fn stats(&self) -> SceneStats {
        let mut stats = SceneStats::default();
        self.visit(&GlobalTransform::identity(), &mut |node, _| {
            stats.nodes += 1;
            if let Some(mesh) = &node.mesh {
                stats.meshes += 1;
                stats.vertices += mesh.positions.len();
                stats.triangles += mesh.triangle_count();
            }
        });
        stats
    }
}

/// Size summary of a decoded scene
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneStats {
    pub nodes: usize,
    pub meshes: usize,
    pub vertices: usize,
    pub triangles: usize,
}

/// Skeleton joint, positioned in the decoded scene's root space
#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    pub position: Vec3,
}

/// Decoder output before normalization
#[derive(Debug, Clone, Default)]
pub struct RawScene {
    pub root: SceneNode,
    pub skeleton: Vec<Bone>,
}

/// A normalized, material-corrected scene owned by one viewer
#[derive(Debug, Clone)]
pub struct LoadedScene {
    pub url: String,
    pub format: ModelFormat,
    /// Wrapper node: uniform scale, containing the centered graph
    pub root: SceneNode,
    /// Bounds of the decoded graph before normalization
    pub bounding_box: Aabb,
    pub center: Vec3,
    pub extent_scale: f32,
    pub skeleton: Vec<Bone>,
    pub stats: SceneStats,
}

impl LoadedScene {
    /// Top-level parts (children of the centered graph), used by exploded view
    pub fn parts_mut(&mut self) -> Option<&mut Vec<SceneNode>> {
        self.root.children.first_mut().map(|inner| &mut inner.children)
    }

    pub fn part_count(&self) -> usize {
        self.root.children.first().map(|inner| inner.children.len()).unwrap_or(0)
    }

    /// World positions of the skeleton joints under `model` (the wrapper's parent transform)
    pub fn bone_world_positions(&self, model: &Mat4) -> Vec<Vec3> {
        let wrapper = mat4_mul(model, &self.root.transform.to_matrix());
        let m = mat4_mul(&wrapper, &mat4_translation(-self.center));
        self.skeleton.iter().map(|b| mat4_transform_point(&m, b.position)).collect()
    }
}

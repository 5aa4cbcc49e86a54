//! Wavefront OBJ import
//!
//! Supports positions (v), texture coords (vt), normals (vn), faces (f) with
//! fan triangulation and negative indices, `o`/`g` groups (one child node
//! each), and `mtllib`/`usemtl` materials read from MTL side files.

use std::collections::HashMap;
use std::sync::Arc;

use crate::math::{Rgb, Vec2, Vec3};
use crate::scene::{ImageData, MapKind, Material, Mesh, MeshGroup, RawScene, SceneNode, TextureSlot};
use super::{DecodeContext, Decoder, LoadError};

/// Error type for OBJ/MTL parsing
#[derive(Debug, Clone, PartialEq)]
pub enum ObjError {
    Parse(String),
}

impl std::fmt::Display for ObjError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ObjError::Parse(e) => write!(f, "OBJ parse error: {}", e),
        }
    }
}

impl std::error::Error for ObjError {}

impl From<ObjError> for LoadError {
    fn from(e: ObjError) -> Self {
        LoadError::Decode(e.to_string())
    }
}

/// Faces of one `o`/`g` group, with the material ranges inside it
#[derive(Debug, Clone, Default)]
pub struct ObjGroup {
    pub name: String,
    pub mesh: Mesh,
    /// (material name, first index, index count)
    pub material_ranges: Vec<(String, usize, usize)>,
    vertex_cache: HashMap<(usize, usize, usize), u32>,
}

impl ObjGroup {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            mesh: Mesh::new(name),
            ..Default::default()
        }
    }

    fn set_material(&mut self, material: &str) {
        let start = self.mesh.indices.len();
        if let Some(last) = self.material_ranges.last_mut() {
            if last.2 == 0 {
                last.0 = material.to_string();
                return;
            }
        }
        self.material_ranges.push((material.to_string(), start, 0));
    }
}

/// Parsed OBJ file (materials not yet resolved)
#[derive(Debug, Clone, Default)]
pub struct ObjDocument {
    pub groups: Vec<ObjGroup>,
    pub mtllibs: Vec<String>,
}

/// OBJ file importer
pub struct ObjImporter;

impl ObjImporter {
    /// Parse OBJ file contents
    pub fn parse(contents: &str) -> Result<ObjDocument, ObjError> {
        let mut positions: Vec<Vec3> = Vec::new();
        let mut tex_coords: Vec<Vec2> = Vec::new();
        let mut normals: Vec<Vec3> = Vec::new();

        let mut doc = ObjDocument::default();
        let mut current = ObjGroup::new("default");
        let mut current_material: Option<String> = None;

        for (line_num, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = line.split_whitespace().collect();
            match parts[0] {
                "v" => {
                    if parts.len() < 4 {
                        return Err(ObjError::Parse(format!(
                            "Line {}: Invalid vertex position (expected 3 values)",
                            line_num + 1
                        )));
                    }
                    positions.push(Self::parse_vec3(&parts[1..4], line_num)?);
                }

                "vt" => {
                    if parts.len() < 2 {
                        return Err(ObjError::Parse(format!(
                            "Line {}: Invalid texture coordinate",
                            line_num + 1
                        )));
                    }
                    let u = Self::parse_float(parts[1], line_num)?;
                    let v = match parts.get(2) {
                        Some(s) => Self::parse_float(s, line_num)?,
                        None => 0.0,
                    };
                    // OBJ puts v = 0 at the bottom of the image
                    tex_coords.push(Vec2::new(u, 1.0 - v));
                }

                "vn" => {
                    if parts.len() < 4 {
                        return Err(ObjError::Parse(format!(
                            "Line {}: Invalid normal (expected 3 values)",
                            line_num + 1
                        )));
                    }
                    normals.push(Self::parse_vec3(&parts[1..4], line_num)?.normalize());
                }

                "f" => {
                    if parts.len() < 4 {
                        return Err(ObjError::Parse(format!(
                            "Line {}: Face must have at least 3 vertices",
                            line_num + 1
                        )));
                    }
                    if current.material_ranges.is_empty() {
                        if let Some(name) = &current_material {
                            current.set_material(name);
                        }
                    }

                    let mut face_verts = Vec::with_capacity(parts.len() - 1);
                    for spec in &parts[1..] {
                        face_verts.push(Self::face_vertex(spec, line_num, &positions, &tex_coords, &normals, &mut current)?);
                    }
                    for i in 1..(face_verts.len() - 1) {
                        current.mesh.indices.extend_from_slice(&[face_verts[0], face_verts[i], face_verts[i + 1]]);
                    }
                    if let Some(range) = current.material_ranges.last_mut() {
                        range.2 = current.mesh.indices.len() - range.1;
                    }
                }

                "o" | "g" => {
                    let name = if parts.len() > 1 { parts[1..].join(" ") } else { format!("group{}", doc.groups.len()) };
                    let finished = std::mem::replace(&mut current, ObjGroup::new(&name));
                    if !finished.mesh.indices.is_empty() {
                        doc.groups.push(finished);
                    }
                }

                "usemtl" => {
                    let name = parts[1..].join(" ");
                    current.set_material(&name);
                    current_material = Some(name);
                }

                "mtllib" => {
                    doc.mtllibs.extend(parts[1..].iter().map(|s| s.to_string()));
                }

                _ => {
                    // s, l, p, curv etc. are ignored
                }
            }
        }

        if !current.mesh.indices.is_empty() {
            doc.groups.push(current);
        }

        if positions.is_empty() {
            return Err(ObjError::Parse("No vertices found in OBJ file".to_string()));
        }
        if doc.groups.is_empty() {
            return Err(ObjError::Parse("No faces found in OBJ file".to_string()));
        }

        Ok(doc)
    }

    /// Parse a face vertex like "1/2/3", "1//3" or "1" into a group-local index
    fn face_vertex(
        spec: &str,
        line_num: usize,
        positions: &[Vec3],
        tex_coords: &[Vec2],
        normals: &[Vec3],
        group: &mut ObjGroup,
    ) -> Result<u32, ObjError> {
        let mut fields = spec.split('/');

        let pos_idx = match fields.next() {
            Some(s) if !s.is_empty() => Self::parse_index(s, positions.len(), line_num)?,
            _ => {
                return Err(ObjError::Parse(format!(
                    "Line {}: Missing position index in face",
                    line_num + 1
                )))
            }
        };
        let tc_idx = match fields.next() {
            Some(s) if !s.is_empty() => Self::parse_index(s, tex_coords.len(), line_num)?,
            _ => usize::MAX,
        };
        let norm_idx = match fields.next() {
            Some(s) if !s.is_empty() => Self::parse_index(s, normals.len(), line_num)?,
            _ => usize::MAX,
        };

        let key = (pos_idx, tc_idx, norm_idx);
        if let Some(&idx) = group.vertex_cache.get(&key) {
            return Ok(idx);
        }

        let mesh = &mut group.mesh;
        let idx = mesh.positions.len() as u32;
        mesh.positions.push(positions[pos_idx]);
        mesh.uvs.push(tex_coords.get(tc_idx).copied().unwrap_or(Vec2::ZERO));
        mesh.normals.push(normals.get(norm_idx).copied().unwrap_or(Vec3::ZERO));
        group.vertex_cache.insert(key, idx);
        Ok(idx)
    }

    fn parse_vec3(parts: &[&str], line_num: usize) -> Result<Vec3, ObjError> {
        Ok(Vec3::new(
            Self::parse_float(parts[0], line_num)?,
            Self::parse_float(parts[1], line_num)?,
            Self::parse_float(parts[2], line_num)?,
        ))
    }

    fn parse_float(s: &str, line_num: usize) -> Result<f32, ObjError> {
        s.parse().map_err(|_| {
            ObjError::Parse(format!(
                "Line {}: Invalid float value '{}'",
                line_num + 1,
                s
            ))
        })
    }

    /// Parse an index (handles negative indices for relative indexing)
    fn parse_index(s: &str, count: usize, line_num: usize) -> Result<usize, ObjError> {
        let idx: i64 = s.parse().map_err(|_| {
            ObjError::Parse(format!("Line {}: Invalid index '{}'", line_num + 1, s))
        })?;

        let result = if idx > 0 {
            idx - 1
        } else if idx < 0 {
            count as i64 + idx
        } else {
            return Err(ObjError::Parse(format!("Line {}: Index cannot be 0", line_num + 1)));
        };

        if result < 0 || result as usize >= count {
            return Err(ObjError::Parse(format!(
                "Line {}: Index {} out of range (have {} elements)",
                line_num + 1,
                idx,
                count
            )));
        }

        Ok(result as usize)
    }
}

/// One `newmtl` block
#[derive(Debug, Clone, PartialEq)]
pub struct MtlMaterial {
    pub name: String,
    pub diffuse: Rgb,
    pub specular: Rgb,
    pub shininess: Option<f32>,
    pub opacity: f32,
    pub emissive: Rgb,
    /// PBR extension (Pr)
    pub roughness: Option<f32>,
    /// PBR extension (Pm)
    pub metalness: Option<f32>,
    pub maps: Vec<(MapKind, String)>,
}

impl MtlMaterial {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            diffuse: Rgb::new(0.8, 0.8, 0.8),
            specular: Rgb::BLACK,
            shininess: None,
            opacity: 1.0,
            emissive: Rgb::BLACK,
            roughness: None,
            metalness: None,
            maps: Vec::new(),
        }
    }

    /// Phong exponent to roughness
    fn derived_roughness(&self) -> f32 {
        match (self.roughness, self.shininess) {
            (Some(r), _) => r.clamp(0.0, 1.0),
            (None, Some(ns)) => (2.0 / (ns.max(0.0) + 2.0)).sqrt().clamp(0.0, 1.0),
            (None, None) => 0.5,
        }
    }
}

/// Parse MTL text. Unknown statements are skipped.
pub fn parse_mtl(contents: &str) -> Vec<MtlMaterial> {
    let mut materials: Vec<MtlMaterial> = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        let keyword = parts[0];

        if keyword == "newmtl" {
            materials.push(MtlMaterial::new(&parts[1..].join(" ")));
            continue;
        }
        let Some(mat) = materials.last_mut() else { continue };
        let floats: Vec<f32> = parts[1..].iter().filter_map(|s| s.parse().ok()).collect();
        let color = || match floats.as_slice() {
            [r, g, b, ..] => Some(Rgb::new(*r, *g, *b)),
            [v] => Some(Rgb::new(*v, *v, *v)),
            _ => None,
        };

        match keyword {
            "Kd" => mat.diffuse = color().unwrap_or(mat.diffuse),
            "Ks" => mat.specular = color().unwrap_or(mat.specular),
            "Ke" => mat.emissive = color().unwrap_or(mat.emissive),
            "Ns" => mat.shininess = floats.first().copied(),
            "d" => mat.opacity = floats.first().copied().unwrap_or(1.0).clamp(0.0, 1.0),
            "Tr" => mat.opacity = (1.0 - floats.first().copied().unwrap_or(0.0)).clamp(0.0, 1.0),
            "Pr" => mat.roughness = floats.first().copied(),
            "Pm" => mat.metalness = floats.first().copied(),
            _ => {
                let kind = match keyword.to_ascii_lowercase().as_str() {
                    "map_kd" => MapKind::Color,
                    "map_ke" => MapKind::Emissive,
                    "map_bump" | "bump" | "norm" | "map_kn" => MapKind::Normal,
                    "map_pr" => MapKind::Roughness,
                    "map_pm" => MapKind::Metalness,
                    _ => continue,
                };
                // Options (-bm 1.0 etc.) come before the file name
                if let Some(file) = parts.last().filter(|_| parts.len() > 1) {
                    mat.maps.push((kind, file.to_string()));
                }
            }
        }
    }

    materials
}

/// Fetches each texture once per load
/// Decoded images keyed by file reference; failures are cached as None
pub(super) struct TextureCache<'a> {
    ctx: &'a DecodeContext,
    images: HashMap<String, Option<Arc<ImageData>>>,
}

impl<'a> TextureCache<'a> {
    pub(super) fn new(ctx: &'a DecodeContext) -> Self {
        Self { ctx, images: HashMap::new() }
    }

    pub(super) fn get(&mut self, file: &str) -> Option<Arc<ImageData>> {
        if let Some(cached) = self.images.get(file) {
            return cached.clone();
        }
        let image = self
            .ctx
            .fetch_relative(file)
            .map_err(|e| e.to_string())
            .and_then(|bytes| ImageData::decode(&bytes))
            .map(Arc::new);
        let image = match image {
            Ok(image) => Some(image),
            Err(e) => {
                log::warn!("skipping texture {}: {}", file, e);
                None
            }
        };
        self.images.insert(file.to_string(), image.clone());
        image
    }
}

fn to_material(mtl: &MtlMaterial, textures: &mut TextureCache) -> Material {
    let mut material = Material::new(&mtl.name, mtl.diffuse);
    material.roughness = mtl.derived_roughness();
    material.metalness = mtl.metalness.unwrap_or(0.0).clamp(0.0, 1.0);
    material.opacity = mtl.opacity;
    material.emissive = mtl.emissive;
    for (kind, file) in &mtl.maps {
        if let Some(image) = textures.get(file) {
            material.maps.push(TextureSlot::new(*kind, image));
        }
    }
    material
}

/// Turn a parsed document into a scene, using `library` for `usemtl` names
pub fn build_scene(doc: ObjDocument, library: &HashMap<String, Material>) -> RawScene {
    let mut root = SceneNode::new("obj");

    for group in doc.groups {
        let mut mesh = group.mesh;
        mesh.name = group.name.clone();

        let mut names: Vec<&str> = Vec::new();
        for (name, start, count) in &group.material_ranges {
            if *count == 0 {
                continue;
            }
            let index = match names.iter().position(|n| n == name) {
                Some(i) => i,
                None => {
                    names.push(name);
                    names.len() - 1
                }
            };
            mesh.groups.push(MeshGroup { start: *start, count: *count, material: index });
        }
        mesh.materials = names
            .iter()
            .map(|name| library.get(*name).cloned().unwrap_or_else(|| Material::new(*name, Rgb::new(0.8, 0.8, 0.8))))
            .collect();

        // Faces before the first usemtl use material 0 too
        if let Some(first) = mesh.groups.first() {
            if first.start > 0 {
                mesh.groups.insert(0, MeshGroup { start: 0, count: first.start, material: 0 });
            }
        }

        root.children.push(SceneNode::with_mesh(group.name, mesh));
    }

    RawScene { root, skeleton: Vec::new() }
}

pub struct ObjDecoder;

impl Decoder for ObjDecoder {
    fn decode(&self, bytes: &[u8], ctx: &DecodeContext) -> Result<RawScene, LoadError> {
        let text = String::from_utf8_lossy(bytes);
        let doc = ObjImporter::parse(&text)?;
        ctx.check_cancelled()?;

        let mut textures = TextureCache::new(ctx);
        let mut library = HashMap::new();
        for lib in &doc.mtllibs {
            match ctx.fetch_relative(lib) {
                Ok(bytes) => {
                    for mtl in parse_mtl(&String::from_utf8_lossy(&bytes)) {
                        let material = to_material(&mtl, &mut textures);
                        library.insert(mtl.name.clone(), material);
                    }
                }
                Err(LoadError::Cancelled) => return Err(LoadError::Cancelled),
                Err(e) => log::warn!("material library {} not loaded: {}", lib, e),
            }
        }

        Ok(build_scene(doc, &library))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_triangle() {
        let obj = r#"
# Simple triangle
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 1.0 0.0
vn 0.0 0.0 1.0
f 1//1 2//1 3//1
"#;

        let doc = ObjImporter::parse(obj).unwrap();
        assert_eq!(doc.groups.len(), 1);
        assert_eq!(doc.groups[0].mesh.positions.len(), 3);
        assert_eq!(doc.groups[0].mesh.triangle_count(), 1);
    }

    #[test]
    fn test_parse_quad_triangulation() {
        let obj = r#"
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
f 1 2 3 4
"#;

        let doc = ObjImporter::parse(obj).unwrap();
        assert_eq!(doc.groups[0].mesh.positions.len(), 4);
        assert_eq!(doc.groups[0].mesh.triangle_count(), 2);
    }

    #[test]
    fn test_negative_indices() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let doc = ObjImporter::parse(obj).unwrap();
        assert_eq!(doc.groups[0].mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_errors() {
        assert!(ObjImporter::parse("v 0 0\n").is_err());
        assert!(ObjImporter::parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n").is_err());
        assert!(ObjImporter::parse("v 0 0 0\n").is_err());
        assert!(ObjImporter::parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 0 1 2\n").is_err());
    }

    #[test]
    fn test_groups_become_nodes_with_material_ranges() {
        let obj = r#"
mtllib parts.mtl
v 0 0 0
v 1 0 0
v 0 1 0
v 0 0 1
o seat
usemtl wood
f 1 2 3
o legs
usemtl metal
f 1 2 4
usemtl wood
f 2 3 4
"#;
        let doc = ObjImporter::parse(obj).unwrap();
        assert_eq!(doc.mtllibs, vec!["parts.mtl".to_string()]);
        assert_eq!(doc.groups.len(), 2);

        let mut library = HashMap::new();
        library.insert("wood".to_string(), Material::new("wood", Rgb::new(0.6, 0.4, 0.2)));
        let scene = build_scene(doc, &library);
        assert_eq!(scene.root.children.len(), 2);

        let legs = scene.root.children[1].mesh.as_ref().unwrap();
        assert_eq!(legs.materials.len(), 2);
        assert_eq!(legs.materials[0].name, "metal");
        assert_eq!(legs.materials[1].color, Rgb::new(0.6, 0.4, 0.2));
        assert_eq!(legs.groups, vec![
            MeshGroup { start: 0, count: 3, material: 0 },
            MeshGroup { start: 3, count: 3, material: 1 },
        ]);
    }

    #[test]
    fn test_parse_mtl() {
        let mtl = r#"
newmtl red
Kd 1.0 0.0 0.0
Ns 98
d 0.5
map_Kd -bm 1.0 textures/red.png
map_Bump red_n.png

newmtl emissive
Ke 0.2 0.2 0.2
Pr 0.3
Pm 1.0
"#;
        let mats = parse_mtl(mtl);
        assert_eq!(mats.len(), 2);
        assert_eq!(mats[0].diffuse, Rgb::new(1.0, 0.0, 0.0));
        assert_eq!(mats[0].opacity, 0.5);
        assert_eq!(mats[0].maps, vec![
            (MapKind::Color, "textures/red.png".to_string()),
            (MapKind::Normal, "red_n.png".to_string()),
        ]);
        assert!(mats[0].derived_roughness() < 0.2);
        assert_eq!(mats[1].derived_roughness(), 0.3);
        assert_eq!(mats[1].metalness, Some(1.0));
    }

    #[test]
    fn test_decode_with_side_files() {
        let dir = tempfile::tempdir().unwrap();
        let obj = "mtllib box.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvt 1 0\nvt 0 1\nusemtl blue\nf 1/1 2/2 3/3\n";
        std::fs::write(dir.path().join("box.mtl"), "newmtl blue\nKd 0 0 1\nmap_Kd tex.png\n").unwrap();
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 255, 255]));
        img.save(dir.path().join("tex.png")).unwrap();

        let url = dir.path().join("box.obj").to_string_lossy().to_string();
        let scene = ObjDecoder.decode(obj.as_bytes(), &DecodeContext::detached(url)).unwrap();
        let mesh = scene.root.children[0].mesh.as_ref().unwrap();
        assert_eq!(mesh.materials[0].color, Rgb::new(0.0, 0.0, 1.0));
        assert!(mesh.materials[0].map(MapKind::Color).is_some());
        assert_eq!(mesh.uvs[2], Vec2::new(0.0, 0.0));
    }

    #[test]
    fn test_missing_mtl_still_decodes() {
        let obj = "mtllib gone.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nusemtl x\nf 1 2 3\n";
        let scene = ObjDecoder.decode(obj.as_bytes(), &DecodeContext::detached("/nonexistent/m.obj")).unwrap();
        let mesh = scene.root.children[0].mesh.as_ref().unwrap();
        assert_eq!(mesh.materials.len(), 1);
    }
}

//! glTF 2.0 import (.gltf and .glb)
//!
//! Reads the node hierarchy with TRS transforms, every triangle primitive,
//! the PBR metallic-roughness material slots, and skins (as a bone list).
//! Buffers and images may be embedded (GLB chunk, `data:` URI) or external
//! files next to the model. Draco-compressed primitives go through a codec
//! lease from the decode context.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use gltf::mesh::Mode;

use crate::math::{Mat4, Rgb, Vec2, Vec3, mat4_identity, mat4_mul, mat4_transform_point, quat_to_euler};
use crate::scene::{Bone, ImageData, MapKind, Material, Mesh, MeshGroup, RawScene, SceneNode, TextureSlot, Transform};
use super::codec::DracoRequest;
use super::{DecodeContext, Decoder, LoadError};

const DRACO_EXTENSION: &str = "KHR_draco_mesh_compression";

pub struct GltfDecoder;

impl Decoder for GltfDecoder {
    fn decode(&self, bytes: &[u8], ctx: &DecodeContext) -> Result<RawScene, LoadError> {
        let gltf::Gltf { document, blob } = parse(bytes)?;

        let buffers = load_buffers(&document, blob, ctx)?;
        ctx.check_cancelled()?;
        let images = load_images(&document, &buffers, ctx)?;
        ctx.check_cancelled()?;

        let materials: Vec<Material> = document.materials().map(|m| convert_material(&m, &images)).collect();
        let mut meshes = Vec::new();
        for mesh in document.meshes() {
            meshes.push(convert_mesh(&document, &mesh, &buffers, &materials, ctx)?);
        }

        let mut builder = GraphBuilder {
            meshes: &meshes,
            world: HashMap::new(),
            parent: HashMap::new(),
        };
        let mut root = SceneNode::new("gltf");
        match document.default_scene().or_else(|| document.scenes().next()) {
            Some(scene) => {
                for node in scene.nodes() {
                    root.children.push(builder.node(&node, None, &mat4_identity()));
                }
            }
            None => {
                for (i, mesh) in meshes.iter().enumerate() {
                    root.children.push(SceneNode::with_mesh(format!("mesh{}", i), mesh.clone()));
                }
            }
        }

        let skeleton = builder.skeleton(&document);
        Ok(RawScene { root, skeleton })
    }
}

/// Parse JSON or GLB. Draco files fail strict validation twice over: the
/// extension is unknown to the parser and the compressed accessors have no
/// `bufferView`. Those two errors are tolerated for Draco primitives only;
/// anything else still rejects the file.
fn parse(bytes: &[u8]) -> Result<gltf::Gltf, LoadError> {
    let errors = match gltf::Gltf::from_slice(bytes) {
        Ok(gltf) => return Ok(gltf),
        Err(gltf::Error::Validation(errors)) => errors,
        Err(e) => return Err(LoadError::Decode(format!("glTF: {}", e))),
    };
    let gltf = gltf::Gltf::from_slice_without_validation(bytes)
        .map_err(|e| LoadError::Decode(format!("glTF: {}", e)))?;

    let compressed = draco_accessors(&gltf.document);
    let root = gltf.document.as_json();
    let tolerated = |path: &gltf::json::Path, error: &gltf::json::validation::Error| {
        use gltf::json::validation::Error;
        let path = path.to_string();
        match error {
            Error::Unsupported => {
                let name = path_index(&path, "extensionsRequired")
                    .and_then(|i| root.extensions_required.get(i))
                    .or_else(|| path_index(&path, "extensionsUsed").and_then(|i| root.extensions_used.get(i)));
                name.map_or(false, |n| n == DRACO_EXTENSION)
            }
            Error::Missing => {
                path.ends_with("].bufferView")
                    && path_index(&path, "accessors").map_or(false, |i| compressed.contains(&i))
            }
            _ => false,
        }
    };

    if errors.iter().all(|(path, error)| tolerated(path, error)) {
        log::debug!("accepting glTF with {} Draco validation gaps", errors.len());
        Ok(gltf)
    } else {
        Err(LoadError::Decode(format!("glTF: {}", gltf::Error::Validation(errors))))
    }
}

/// `N` from a validation path such as `accessors[N].bufferView`
fn path_index(path: &str, field: &str) -> Option<usize> {
    let rest = path.strip_prefix(field)?.strip_prefix('[')?;
    rest[..rest.find(']')?].parse().ok()
}

/// Accessors that are placeholders for Draco-compressed data
fn draco_accessors(document: &gltf::Document) -> HashSet<usize> {
    let mut out = HashSet::new();
    for mesh in document.meshes() {
        for prim in mesh.primitives() {
            if prim.extension_value(DRACO_EXTENSION).is_none() {
                continue;
            }
            out.extend(prim.attributes().map(|(_, accessor)| accessor.index()));
            out.extend(prim.indices().map(|accessor| accessor.index()));
        }
    }
    out
}

fn load_buffers(document: &gltf::Document, mut blob: Option<Vec<u8>>, ctx: &DecodeContext) -> Result<Vec<Vec<u8>>, LoadError> {
    let mut buffers = Vec::new();
    for buffer in document.buffers() {
        let data = match buffer.source() {
            gltf::buffer::Source::Bin => blob
                .take()
                .ok_or_else(|| LoadError::Decode("GLB binary chunk missing".to_string()))?,
            gltf::buffer::Source::Uri(uri) => ctx.fetch_relative(uri)?,
        };
        if data.len() < buffer.length() {
            return Err(LoadError::Decode(format!(
                "buffer {} holds {} bytes, expected {}",
                buffer.index(),
                data.len(),
                buffer.length()
            )));
        }
        buffers.push(data);
    }
    Ok(buffers)
}

fn view_bytes<'a>(view: &gltf::buffer::View, buffers: &'a [Vec<u8>]) -> Option<&'a [u8]> {
    let data = buffers.get(view.buffer().index())?;
    data.get(view.offset()..view.offset() + view.length())
}

/// Images that fail to load are skipped (the slot stays empty)
fn load_images(document: &gltf::Document, buffers: &[Vec<u8>], ctx: &DecodeContext) -> Result<Vec<Option<Arc<ImageData>>>, LoadError> {
    let mut images = Vec::new();
    for image in document.images() {
        let bytes = match image.source() {
            gltf::image::Source::View { view, .. } => view_bytes(&view, buffers)
                .map(|b| b.to_vec())
                .ok_or_else(|| "image view out of range".to_string()),
            gltf::image::Source::Uri { uri, .. } => match ctx.fetch_relative(uri) {
                Err(LoadError::Cancelled) => return Err(LoadError::Cancelled),
                other => other.map_err(|e| e.to_string()),
            },
        };
        match bytes.and_then(|b| ImageData::decode(&b)) {
            Ok(data) => images.push(Some(Arc::new(data))),
            Err(e) => {
                log::warn!("skipping glTF image {}: {}", image.index(), e);
                images.push(None);
            }
        }
    }
    Ok(images)
}

fn convert_material(material: &gltf::Material, images: &[Option<Arc<ImageData>>]) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();
    let mut out = Material::new(
        material.name().unwrap_or("material"),
        Rgb::new(r, g, b).to_srgb(),
    );
    out.opacity = match material.alpha_mode() {
        gltf::material::AlphaMode::Blend => a,
        _ => 1.0,
    };
    out.metalness = pbr.metallic_factor();
    out.roughness = pbr.roughness_factor();
    let [er, eg, eb] = material.emissive_factor();
    out.emissive = Rgb::new(er, eg, eb).to_srgb();
    out.double_sided = material.double_sided();

    let slots = [
        (MapKind::Color, pbr.base_color_texture().map(|i| i.texture().source().index())),
        (MapKind::MetallicRoughness, pbr.metallic_roughness_texture().map(|i| i.texture().source().index())),
        (MapKind::Normal, material.normal_texture().map(|t| t.texture().source().index())),
        (MapKind::AmbientOcclusion, material.occlusion_texture().map(|t| t.texture().source().index())),
        (MapKind::Emissive, material.emissive_texture().map(|i| i.texture().source().index())),
    ];
    for (kind, image) in slots {
        if let Some(image) = image.and_then(|i| images.get(i).cloned().flatten()) {
            out.maps.push(TextureSlot::new(kind, image));
        }
    }
    out
}

/// All triangle primitives of a glTF mesh, merged into one `Mesh` with a
/// group per primitive
fn convert_mesh(
    document: &gltf::Document,
    mesh: &gltf::Mesh,
    buffers: &[Vec<u8>],
    materials: &[Material],
    ctx: &DecodeContext,
) -> Result<Mesh, LoadError> {
    let mut out = Mesh::new(mesh.name().unwrap_or("mesh"));
    let mut material_slots: HashMap<Option<usize>, usize> = HashMap::new();

    for prim in mesh.primitives() {
        let geometry = if prim.extension_value(DRACO_EXTENSION).is_some() {
            decode_draco(document, &prim, buffers, ctx)?
        } else {
            match read_primitive(&prim, buffers) {
                Some(g) => g,
                None => continue,
            }
        };

        let Some(tri_indices) = triangulate(prim.mode(), &geometry.indices, geometry.positions.len()) else {
            log::debug!("skipping {:?} primitive in {}", prim.mode(), out.name);
            continue;
        };

        let base = out.positions.len() as u32;
        let n = geometry.positions.len();
        out.positions.extend_from_slice(&geometry.positions);
        if geometry.normals.len() == n {
            out.normals.extend_from_slice(&geometry.normals);
        } else {
            out.normals.extend(smooth_normals(&geometry.positions, &tri_indices));
        }
        if geometry.uvs.len() == n {
            out.uvs.extend_from_slice(&geometry.uvs);
        } else {
            out.uvs.extend(std::iter::repeat(Vec2::ZERO).take(n));
        }

        let material_index = prim.material().index();
        let next = out.materials.len();
        let slot = *material_slots.entry(material_index).or_insert_with(|| {
            let material = material_index
                .and_then(|i| materials.get(i).cloned())
                .unwrap_or_default();
            out.materials.push(material);
            next
        });

        let start = out.indices.len();
        out.indices.extend(tri_indices.into_iter().map(|i| base + i));
        out.groups.push(MeshGroup { start, count: out.indices.len() - start, material: slot });
    }

    Ok(out)
}

/// Normals for a primitive that has none, from its own triangles
fn smooth_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut mesh = Mesh::new("primitive");
    mesh.positions = positions.to_vec();
    mesh.indices = indices.to_vec();
    mesh.compute_normals_if_missing();
    mesh.normals
}

struct Geometry {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec2>,
    /// Empty for non-indexed primitives
    indices: Vec<u32>,
}

fn read_primitive(prim: &gltf::Primitive, buffers: &[Vec<u8>]) -> Option<Geometry> {
    let reader = prim.reader(|b| buffers.get(b.index()).map(|d| d.as_slice()));
    let positions: Vec<Vec3> = reader.read_positions()?.map(Vec3::from).collect();
    let normals = reader
        .read_normals()
        .map(|it| it.map(|n| Vec3::from(n).normalize()).collect())
        .unwrap_or_default();
    let uvs = reader
        .read_tex_coords(0)
        .map(|it| it.into_f32().map(|[u, v]| Vec2::new(u, v)).collect())
        .unwrap_or_default();
    let indices = reader.read_indices().map(|it| it.into_u32().collect()).unwrap_or_default();
    Some(Geometry { positions, normals, uvs, indices })
}

fn decode_draco(
    document: &gltf::Document,
    prim: &gltf::Primitive,
    buffers: &[Vec<u8>],
    ctx: &DecodeContext,
) -> Result<Geometry, LoadError> {
    let ext = prim
        .extension_value(DRACO_EXTENSION)
        .and_then(|v| v.as_object())
        .ok_or_else(|| LoadError::Decode("malformed Draco extension".to_string()))?;
    let view_index = ext
        .get("bufferView")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| LoadError::Decode("Draco bufferView missing".to_string()))? as usize;
    let attribute = |name: &str| {
        ext.get("attributes")
            .and_then(|a| a.get(name))
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
    };

    let view = document
        .views()
        .nth(view_index)
        .ok_or_else(|| LoadError::Decode("Draco bufferView out of range".to_string()))?;
    let compressed = view_bytes(&view, buffers)
        .ok_or_else(|| LoadError::Decode("Draco buffer out of range".to_string()))?;

    let request = DracoRequest {
        position: attribute("POSITION"),
        normal: attribute("NORMAL"),
        texcoord: attribute("TEXCOORD_0"),
        vertex_count: prim.get(&gltf::mesh::Semantic::Positions).map(|a| a.count()).unwrap_or(0),
        index_count: prim.indices().map(|a| a.count()).unwrap_or(0),
    };

    // Dropped at the end of this scope on every path
    let mut lease = ctx
        .codecs
        .lease()
        .ok_or_else(|| LoadError::Decode(format!("{} is required but no codec is available", DRACO_EXTENSION)))?;
    let decoded = lease
        .decode(compressed, &request)
        .map_err(|e| LoadError::Decode(format!("Draco: {}", e)))?;

    Ok(Geometry {
        positions: decoded.positions,
        normals: decoded.normals,
        uvs: decoded.uvs,
        indices: decoded.indices,
    })
}

/// Triangle list for a primitive mode; None for points and lines
fn triangulate(mode: Mode, indices: &[u32], vertex_count: usize) -> Option<Vec<u32>> {
    let source: Vec<u32> = if indices.is_empty() {
        (0..vertex_count as u32).collect()
    } else {
        indices.to_vec()
    };
    match mode {
        Mode::Triangles => Some(source),
        Mode::TriangleStrip => Some(
            (2..source.len())
                .flat_map(|i| {
                    if i % 2 == 0 {
                        [source[i - 2], source[i - 1], source[i]]
                    } else {
                        [source[i - 1], source[i - 2], source[i]]
                    }
                })
                .collect(),
        ),
        Mode::TriangleFan => Some(
            (2..source.len())
                .flat_map(|i| [source[0], source[i - 1], source[i]])
                .collect(),
        ),
        _ => None,
    }
}

/// Walks the node tree, recording world matrices for the skeleton
struct GraphBuilder<'a> {
    meshes: &'a [Mesh],
    world: HashMap<usize, Mat4>,
    parent: HashMap<usize, usize>,
}

impl GraphBuilder<'_> {
    fn node(&mut self, node: &gltf::Node, parent: Option<usize>, parent_world: &Mat4) -> SceneNode {
        let (translation, rotation, scale) = node.transform().decomposed();
        let transform = Transform {
            position: Vec3::from(translation),
            rotation: quat_to_euler(rotation),
            scale: Vec3::from(scale),
        };
        let world = mat4_mul(parent_world, &transform.to_matrix());
        self.world.insert(node.index(), world);
        if let Some(p) = parent {
            self.parent.insert(node.index(), p);
        }

        let mut out = SceneNode::new(node.name().map(str::to_string).unwrap_or_else(|| format!("node{}", node.index())));
        out.transform = transform;
        out.mesh = node.mesh().and_then(|m| self.meshes.get(m.index()).cloned());
        for child in node.children() {
            out.children.push(self.node(&child, Some(node.index()), &world));
        }
        out
    }

    /// Joints of every skin, parented to their nearest joint ancestor
    fn skeleton(&self, document: &gltf::Document) -> Vec<Bone> {
        let mut bones: Vec<Bone> = Vec::new();
        let mut bone_of_node: HashMap<usize, usize> = HashMap::new();

        for skin in document.skins() {
            for joint in skin.joints() {
                if bone_of_node.contains_key(&joint.index()) {
                    continue;
                }
                let Some(world) = self.world.get(&joint.index()) else { continue };
                bone_of_node.insert(joint.index(), bones.len());
                bones.push(Bone {
                    name: joint.name().map(str::to_string).unwrap_or_else(|| format!("joint{}", joint.index())),
                    parent: None,
                    position: mat4_transform_point(world, Vec3::ZERO),
                });
            }
        }

        for (&node, &bone) in &bone_of_node {
            let mut ancestor = self.parent.get(&node).copied();
            while let Some(a) = ancestor {
                if let Some(&parent_bone) = bone_of_node.get(&a) {
                    bones[bone].parent = Some(parent_bone);
                    break;
                }
                ancestor = self.parent.get(&a).copied();
            }
        }
        bones
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::loader::codec::tests::fake_provider;
    use crate::loader::codec::CodecProvider;
    use crate::loader::tests::wait_for;
    use crate::loader::{LoadOutcome, LoaderRegistry, ModelFormat, ModelLoader};
    use crate::scene::primitives::box_mesh;
    use base64::Engine as _;
    use std::sync::atomic::AtomicBool;

    /// Positions and u32 indices packed as one little-endian buffer
    fn pack(mesh: &Mesh, offset: Vec3) -> (Vec<u8>, usize, Vec3, Vec3) {
        let mut bin = Vec::new();
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for p in &mesh.positions {
            let p = *p + offset;
            min = min.min(p);
            max = max.max(p);
            for c in p.to_array() {
                bin.extend_from_slice(&c.to_le_bytes());
            }
        }
        let pos_len = bin.len();
        for i in &mesh.indices {
            bin.extend_from_slice(&i.to_le_bytes());
        }
        (bin, pos_len, min, max)
    }

    fn document_json(mesh: &Mesh, bin_len: usize, pos_len: usize, min: Vec3, max: Vec3, uri: Option<String>) -> String {
        let uri = uri.map(|u| format!(r#","uri":"{}""#, u)).unwrap_or_default();
        format!(
            r#"{{
  "asset": {{"version": "2.0"}},
  "scene": 0,
  "scenes": [{{"nodes": [0]}}],
  "nodes": [{{"name": "root", "children": [1], "translation": [10, 0, 0]}}, {{"name": "part", "mesh": 0}}],
  "meshes": [{{"primitives": [{{"attributes": {{"POSITION": 0}}, "indices": 1, "material": 0}}]}}],
  "materials": [{{"name": "paint", "pbrMetallicRoughness": {{"baseColorFactor": [1, 0, 0, 1], "metallicFactor": 0.25, "roughnessFactor": 0.75}}}}],
  "buffers": [{{"byteLength": {bin_len}{uri}}}],
  "bufferViews": [
    {{"buffer": 0, "byteOffset": 0, "byteLength": {pos_len}}},
    {{"buffer": 0, "byteOffset": {pos_len}, "byteLength": {idx_len}}}
  ],
  "accessors": [
    {{"bufferView": 0, "componentType": 5126, "count": {vcount}, "type": "VEC3", "min": [{minx}, {miny}, {minz}], "max": [{maxx}, {maxy}, {maxz}]}},
    {{"bufferView": 1, "componentType": 5125, "count": {icount}, "type": "SCALAR"}}
  ]
}}"#,
            bin_len = bin_len,
            uri = uri,
            pos_len = pos_len,
            idx_len = bin_len - pos_len,
            vcount = mesh.positions.len(),
            icount = mesh.indices.len(),
            minx = min.x,
            miny = min.y,
            minz = min.z,
            maxx = max.x,
            maxy = max.y,
            maxz = max.z,
        )
    }

    /// A GLB holding one box of the given size, offset from the origin
    pub(crate) fn glb_box(size: Vec3, offset: Vec3) -> Vec<u8> {
        let mesh = box_mesh(size);
        let (bin, pos_len, min, max) = pack(&mesh, offset);
        let mut json = document_json(&mesh, bin.len(), pos_len, min, max, None).into_bytes();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        let mut bin = bin;
        while bin.len() % 4 != 0 {
            bin.push(0);
        }

        let total = 12 + 8 + json.len() + 8 + bin.len();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"glTF");
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json.len() as u32).to_le_bytes());
        out.extend_from_slice(&0x4E4F_534Au32.to_le_bytes());
        out.extend_from_slice(&json);
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(&0x004E_4942u32.to_le_bytes());
        out.extend_from_slice(&bin);
        out
    }

    fn gltf_box_embedded(size: Vec3) -> Vec<u8> {
        let mesh = box_mesh(size);
        let (bin, pos_len, min, max) = pack(&mesh, Vec3::ZERO);
        let uri = format!(
            "data:application/octet-stream;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bin)
        );
        document_json(&mesh, bin.len(), pos_len, min, max, Some(uri)).into_bytes()
    }

    #[test]
    fn test_decode_embedded_gltf() {
        let bytes = gltf_box_embedded(Vec3::new(1.0, 2.0, 3.0));
        let scene = GltfDecoder.decode(&bytes, &DecodeContext::detached("box.gltf")).unwrap();
        let root = &scene.root.children[0];
        assert_eq!(root.name, "root");
        assert_eq!(root.transform.position, Vec3::new(10.0, 0.0, 0.0));
        let mesh = root.children[0].mesh.as_ref().unwrap();
        assert_eq!(mesh.triangle_count(), 12);
        assert_eq!(mesh.materials[0].name, "paint");
        assert_eq!(mesh.materials[0].metalness, 0.25);
        assert!((mesh.materials[0].color.r - 1.0).abs() < 1e-4);
        assert!(mesh.materials[0].color.g.abs() < 1e-4);

        let b = scene.root.bounding_box();
        assert!((b.center().x - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_external_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let mesh = box_mesh(Vec3::ONE);
        let (bin, pos_len, min, max) = pack(&mesh, Vec3::ZERO);
        std::fs::write(dir.path().join("box.bin"), &bin).unwrap();
        let json = document_json(&mesh, bin.len(), pos_len, min, max, Some("box.bin".to_string()));
        let url = dir.path().join("box.gltf").to_string_lossy().to_string();
        let scene = GltfDecoder.decode(json.as_bytes(), &DecodeContext::detached(url)).unwrap();
        assert_eq!(scene.root.stats().triangles, 12);
    }

    #[test]
    fn test_missing_buffer_is_decode_or_fetch_error() {
        let mesh = box_mesh(Vec3::ONE);
        let (bin, pos_len, min, max) = pack(&mesh, Vec3::ZERO);
        let json = document_json(&mesh, bin.len(), pos_len, min, max, Some("gone.bin".to_string()));
        let result = GltfDecoder.decode(json.as_bytes(), &DecodeContext::detached("/nowhere/box.gltf"));
        assert!(matches!(result, Err(LoadError::Fetch(_))));
        assert!(matches!(
            GltfDecoder.decode(b"{not json", &DecodeContext::detached("x.gltf")),
            Err(LoadError::Decode(_))
        ));
    }

    #[test]
    fn test_glb_scenario_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.glb");
        std::fs::write(&path, glb_box(Vec3::new(2.0, 8.0, 4.0), Vec3::new(3.0, -1.0, 7.0))).unwrap();
        let url = path.to_string_lossy().to_string();

        assert_eq!(crate::loader::resolve_format(&url, None), Some(ModelFormat::Glb));
        let mut loader = ModelLoader::new(Arc::new(LoaderRegistry::with_builtin()), Arc::new(CodecProvider::new()), 4.0);
        loader.request(&url, None);
        let scene = match wait_for(&mut loader) {
            Some(LoadOutcome::Loaded(scene)) => scene,
            other => panic!("expected a scene, got {:?}", other.map(|_| ())),
        };

        assert_eq!(scene.format, ModelFormat::Glb);
        assert!((scene.extent_scale - 0.5).abs() < 1e-4);
        let b = scene.root.bounding_box();
        assert!(b.center().len() < 1e-4, "center {:?}", b.center());
        assert!((b.extent().max_elem() - 4.0).abs() < 1e-4);
        scene.root.for_each_mesh(&mut |mesh| {
            assert!(!mesh.materials.is_empty());
            assert!(mesh.materials.iter().all(|m| m.double_sided));
        });
    }

    fn draco_json() -> String {
        let payload = base64::engine::general_purpose::STANDARD.encode([0u8, 1, 2, 3]);
        format!(
            r#"{{
  "asset": {{"version": "2.0"}},
  "extensionsUsed": ["{ext}"],
  "extensionsRequired": ["{ext}"],
  "meshes": [{{"primitives": [{{
    "attributes": {{"POSITION": 0}},
    "extensions": {{"{ext}": {{"bufferView": 0, "attributes": {{"POSITION": 0}}}}}}
  }}]}}],
  "buffers": [{{"byteLength": 4, "uri": "data:application/octet-stream;base64,{payload}"}}],
  "bufferViews": [{{"buffer": 0, "byteOffset": 0, "byteLength": 4}}],
  "accessors": [{{"componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [1, 1, 0]}}]
}}"#,
            ext = DRACO_EXTENSION,
            payload = payload
        )
    }

    #[test]
    fn test_draco_uses_and_releases_codec() {
        let codecs = Arc::new(fake_provider());
        let ctx = DecodeContext::new("d.gltf", Arc::clone(&codecs), Arc::new(AtomicBool::new(false)));
        let scene = GltfDecoder.decode(draco_json().as_bytes(), &ctx).unwrap();
        assert_eq!(scene.root.stats().triangles, 1);
        assert_eq!(codecs.live_leases(), 0);
    }

    #[test]
    fn test_draco_without_codec_is_decode_error() {
        let result = GltfDecoder.decode(draco_json().as_bytes(), &DecodeContext::detached("d.gltf"));
        match result {
            Err(LoadError::Decode(msg)) => {
                assert!(msg.contains("no codec is available"), "{}", msg);
                assert!(msg.contains(DRACO_EXTENSION));
            }
            other => panic!("expected a decode error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_draco_file_passes_parse() {
        let gltf = parse(draco_json().as_bytes()).unwrap();
        assert_eq!(draco_accessors(&gltf.document).into_iter().collect::<Vec<_>>(), vec![0]);
        assert_eq!(path_index("accessors[12].bufferView", "accessors"), Some(12));
        assert_eq!(path_index("meshes[0]", "accessors"), None);
    }

    #[test]
    fn test_missing_buffer_view_outside_draco_is_rejected() {
        let json = r#"{
  "asset": {"version": "2.0"},
  "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
  "accessors": [{"componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [1, 1, 0]}]
}"#;
        assert!(matches!(parse(json.as_bytes()), Err(LoadError::Decode(_))));
    }

    #[test]
    fn test_primitive_without_normals_gets_its_own() {
        let mut bin = Vec::new();
        let floats = [
            [0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0], [0.0, 0.0, 1.0], [0.0, 0.0, 1.0],
            [0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0],
        ];
        for v in floats.iter().flatten() {
            bin.extend_from_slice(&v.to_le_bytes());
        }
        let json = format!(
            r#"{{
  "asset": {{"version": "2.0"}},
  "meshes": [{{"primitives": [
    {{"attributes": {{"POSITION": 0, "NORMAL": 1}}}},
    {{"attributes": {{"POSITION": 2}}}}
  ]}}],
  "buffers": [{{"byteLength": 108, "uri": "data:application/octet-stream;base64,{}"}}],
  "bufferViews": [
    {{"buffer": 0, "byteOffset": 0, "byteLength": 36}},
    {{"buffer": 0, "byteOffset": 36, "byteLength": 36}},
    {{"buffer": 0, "byteOffset": 72, "byteLength": 36}}
  ],
  "accessors": [
    {{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [1, 1, 0]}},
    {{"bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC3"}},
    {{"bufferView": 2, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [1, 0, 1]}}
  ]
}}"#,
            base64::engine::general_purpose::STANDARD.encode(&bin)
        );

        let scene = GltfDecoder.decode(json.as_bytes(), &DecodeContext::detached("two.gltf")).unwrap();
        let mesh = scene.root.children[0].mesh.as_ref().unwrap();
        assert_eq!(mesh.groups.len(), 2);
        assert_eq!(mesh.normals.len(), 6);
        for n in &mesh.normals[..3] {
            assert!((*n - Vec3::new(0.0, 0.0, 1.0)).len() < 1e-4);
        }
        for n in &mesh.normals[3..] {
            assert!((*n - Vec3::UP).len() < 1e-4, "normal {:?}", n);
        }
    }

    #[test]
    fn test_strip_and_fan_triangulation() {
        assert_eq!(triangulate(Mode::TriangleStrip, &[], 4), Some(vec![0, 1, 2, 2, 1, 3]));
        assert_eq!(triangulate(Mode::TriangleFan, &[0, 1, 2, 3], 4), Some(vec![0, 1, 2, 0, 2, 3]));
        assert_eq!(triangulate(Mode::Lines, &[], 4), None);
    }
}

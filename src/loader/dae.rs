//! COLLADA (.dae) import
//!
//! Reads library_geometries (triangles, polylist, polygons), materials
//! through library_effects, and the node tree of the first visual scene.
//! Files without a visual scene get every geometry placed at the root.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::math::{Mat4, Rgb, Vec2, Vec3, mat4_axis_angle, mat4_decompose, mat4_identity, mat4_mul, mat4_scale, mat4_transform_point, mat4_translation};
use crate::scene::{Bone, Material, MapKind, Mesh, MeshGroup, RawScene, SceneNode, TextureSlot, Transform};
use super::obj::TextureCache;
use super::{DecodeContext, Decoder, LoadError};

const MAX_NODE_DEPTH: usize = 128;

type Element<'a> = roxmltree::Node<'a, 'a>;

#[derive(Debug)]
pub enum DaeError {
    Xml(roxmltree::Error),
    NotCollada(String),
    Invalid(String),
}

impl fmt::Display for DaeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaeError::Xml(e) => write!(f, "{}", e),
            DaeError::NotCollada(root) => write!(f, "root element is <{}>, not <COLLADA>", root),
            DaeError::Invalid(msg) => write!(f, "invalid COLLADA: {}", msg),
        }
    }
}

impl std::error::Error for DaeError {}

impl From<roxmltree::Error> for DaeError {
    fn from(e: roxmltree::Error) -> Self {
        DaeError::Xml(e)
    }
}

impl From<DaeError> for LoadError {
    fn from(e: DaeError) -> Self {
        LoadError::Decode(e.to_string())
    }
}

fn parse_floats(text: &str) -> Vec<f32> {
    text.split_whitespace().filter_map(|t| t.parse().ok()).collect()
}

fn parse_ints(text: &str) -> Vec<i64> {
    text.split_whitespace().filter_map(|t| t.parse().ok()).collect()
}

/// "#id" -> "id"
fn fragment(uri: &str) -> &str {
    uri.strip_prefix('#').unwrap_or(uri)
}

fn tag<'a>(el: Element<'a>) -> &'a str {
    el.tag_name().name()
}

fn text<'a>(el: Element<'a>) -> &'a str {
    el.text().unwrap_or("")
}

fn child<'a>(el: Element<'a>, name: &str) -> Option<Element<'a>> {
    el.children().find(|c| c.has_tag_name(name))
}

fn children_named<'a>(el: Element<'a>, name: &'a str) -> impl Iterator<Item = Element<'a>> + 'a {
    el.children().filter(move |c| c.has_tag_name(name))
}

fn elements<'a>(el: Element<'a>) -> impl Iterator<Item = Element<'a>> {
    el.children().filter(|c| c.is_element())
}

/// Follow a path of child names
fn path<'a>(el: Element<'a>, names: &[&str]) -> Option<Element<'a>> {
    names.iter().try_fold(el, |el, name| child(el, name))
}

/// Every element with an id, for `#id` lookups
fn index_ids<'a>(root: Element<'a>) -> HashMap<&'a str, Element<'a>> {
    root.descendants()
        .filter_map(|el| el.attribute("id").map(|id| (id, el)))
        .collect()
}

/// A float_array with its accessor stride
struct Source {
    data: Vec<f32>,
    stride: usize,
}

impl Source {
    fn read(el: Element<'_>) -> Option<Self> {
        let data = parse_floats(text(child(el, "float_array")?));
        let stride = path(el, &["technique_common", "accessor"])
            .and_then(|a| a.attribute("stride"))
            .and_then(|s| s.parse().ok())
            .unwrap_or(3usize)
            .max(1);
        Some(Self { data, stride })
    }

    fn get(&self, index: usize, width: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.stride)?;
        self.data.get(start..start + width.min(self.stride))
    }

    fn vec3(&self, index: usize) -> Option<Vec3> {
        self.get(index, 3).filter(|v| v.len() == 3).map(|v| Vec3::new(v[0], v[1], v[2]))
    }

    fn vec2(&self, index: usize) -> Option<Vec2> {
        self.get(index, 2).filter(|v| v.len() == 2).map(|v| Vec2::new(v[0], v[1]))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Semantic {
    Position,
    Normal,
    TexCoord,
}

/// One `<input>` of a primitive, resolved to its source id
struct Input<'a> {
    semantic: Semantic,
    source: &'a str,
    offset: usize,
}

/// Geometry with material symbols; group `material` indexes `symbols`
#[derive(Clone)]
struct Geometry {
    mesh: Mesh,
    symbols: Vec<String>,
}

fn convert_geometry(el: Element<'_>, name: &str) -> Result<Option<Geometry>, DaeError> {
    let Some(mesh_el) = child(el, "mesh") else {
        // splines and convex meshes are not drawn
        return Ok(None);
    };

    let sources: HashMap<&str, Source> = children_named(mesh_el, "source")
        .filter_map(|s| Some((s.attribute("id")?, Source::read(s)?)))
        .collect();

    // <vertices> re-exports inputs under its own id
    let mut vertex_inputs: HashMap<&str, Vec<(Semantic, &str)>> = HashMap::new();
    for v in children_named(mesh_el, "vertices") {
        let Some(id) = v.attribute("id") else { continue };
        let inputs = children_named(v, "input")
            .filter_map(|i| Some((semantic(i.attribute("semantic")?)?, fragment(i.attribute("source")?))))
            .collect();
        vertex_inputs.insert(id, inputs);
    }

    let mut mesh = Mesh::new(name);
    let mut symbols: Vec<String> = Vec::new();
    let mut dedup: HashMap<(usize, Option<usize>, Option<usize>), u32> = HashMap::new();

    for prim in elements(mesh_el) {
        let polygons: Vec<Vec<i64>> = match tag(prim) {
            "triangles" | "polylist" => vec![child(prim, "p").map(|p| parse_ints(text(p))).unwrap_or_default()],
            "polygons" => children_named(prim, "p").map(|p| parse_ints(text(p))).collect(),
            _ => continue,
        };

        let mut inputs: Vec<Input> = Vec::new();
        for i in children_named(prim, "input") {
            let (Some(sem), Some(src)) = (i.attribute("semantic"), i.attribute("source")) else { continue };
            let offset = i.attribute("offset").and_then(|o| o.parse().ok()).unwrap_or(0usize);
            let src = fragment(src);
            if sem == "VERTEX" {
                for (semantic, source) in vertex_inputs.get(src).map(Vec::as_slice).unwrap_or(&[]) {
                    inputs.push(Input { semantic: *semantic, source: *source, offset });
                }
            } else if let Some(semantic) = semantic(sem) {
                // first TEXCOORD set wins
                if !inputs.iter().any(|x| x.semantic == semantic) {
                    inputs.push(Input { semantic, source: src, offset });
                }
            }
        }
        let stride = children_named(prim, "input")
            .filter_map(|i| i.attribute("offset").and_then(|o| o.parse::<usize>().ok()))
            .max()
            .unwrap_or(0)
            + 1;

        let find = |semantic: Semantic| {
            inputs
                .iter()
                .find(|i| i.semantic == semantic)
                .and_then(|i| sources.get(i.source).map(|s| (s, i.offset)))
        };
        let Some((positions, position_offset)) = find(Semantic::Position) else {
            return Err(DaeError::Invalid(format!("geometry {} has no POSITION input", name)));
        };
        let normals = find(Semantic::Normal);
        let uvs = find(Semantic::TexCoord);

        // Vertex counts per polygon
        let counts: Vec<usize> = match tag(prim) {
            "polylist" => child(prim, "vcount")
                .map(|v| parse_ints(text(v)).into_iter().map(|c| c.max(0) as usize).collect())
                .unwrap_or_default(),
            "triangles" => vec![3; polygons[0].len() / (stride * 3)],
            _ => polygons.iter().map(|p| p.len() / stride).collect(),
        };
        let flat: Vec<i64> = polygons.concat();

        let start = mesh.indices.len();
        let mut cursor = 0usize;
        for count in counts {
            let corners = flat.get(cursor * stride..(cursor + count) * stride);
            cursor += count;
            let Some(corners) = corners else {
                return Err(DaeError::Invalid(format!("geometry {} index list is too short", name)));
            };

            let mut polygon: Vec<u32> = Vec::with_capacity(count);
            for corner in corners.chunks_exact(stride) {
                let at = |offset: usize| corner.get(offset).map(|&i| i.max(0) as usize);
                let Some(p) = at(position_offset) else { continue };
                let n = normals.and_then(|(_, o)| at(o));
                let t = uvs.and_then(|(_, o)| at(o));
                let index = match dedup.get(&(p, n, t)) {
                    Some(&i) => i,
                    None => {
                        let position = positions.vec3(p).ok_or_else(|| {
                            DaeError::Invalid(format!("geometry {} position index {} out of range", name, p))
                        })?;
                        let i = mesh.positions.len() as u32;
                        mesh.positions.push(position);
                        mesh.normals.push(
                            normals.zip(n).and_then(|((s, _), n)| s.vec3(n)).unwrap_or(Vec3::ZERO),
                        );
                        if uvs.is_some() {
                            let uv = t.and_then(|t| uvs.and_then(|(s, _)| s.vec2(t))).unwrap_or(Vec2::ZERO);
                            mesh.uvs.push(Vec2::new(uv.x, 1.0 - uv.y));
                        }
                        dedup.insert((p, n, t), i);
                        i
                    }
                };
                polygon.push(index);
            }
            for k in 1..polygon.len().saturating_sub(1) {
                mesh.indices.extend_from_slice(&[polygon[0], polygon[k], polygon[k + 1]]);
            }
        }

        let symbol = prim.attribute("material").unwrap_or("").to_string();
        let material = match symbols.iter().position(|s| *s == symbol) {
            Some(i) => i,
            None => {
                symbols.push(symbol);
                symbols.len() - 1
            }
        };
        if mesh.indices.len() > start {
            mesh.groups.push(MeshGroup { start, count: mesh.indices.len() - start, material });
        }
    }

    if normals_missing(&mesh) {
        mesh.normals.clear();
    }
    if mesh.uvs.len() != mesh.positions.len() {
        mesh.uvs.clear();
    }
    Ok(Some(Geometry { mesh, symbols }))
}

fn normals_missing(mesh: &Mesh) -> bool {
    mesh.normals.iter().any(|n| *n == Vec3::ZERO)
}

fn semantic(name: &str) -> Option<Semantic> {
    match name {
        "POSITION" => Some(Semantic::Position),
        "NORMAL" => Some(Semantic::Normal),
        "TEXCOORD" => Some(Semantic::TexCoord),
        _ => None,
    }
}

/// Material ids -> converted materials, following instance_effect
struct MaterialLibrary<'a, 'c> {
    ids: &'a HashMap<&'a str, Element<'a>>,
    textures: TextureCache<'c>,
    converted: HashMap<String, Material>,
}

impl<'a, 'c> MaterialLibrary<'a, 'c> {
    fn material(&mut self, id: &str) -> Material {
        if let Some(m) = self.converted.get(id) {
            return m.clone();
        }
        let el = self.ids.get(id).copied();
        let name = el.and_then(|e| e.attribute("name")).unwrap_or(id);
        let effect = el
            .and_then(|e| child(e, "instance_effect"))
            .and_then(|i| i.attribute("url"))
            .and_then(|url| self.ids.get(fragment(url)).copied());
        let material = match effect {
            Some(effect) => self.convert_effect(name, effect),
            None => Material::new(name, Rgb::new(0.8, 0.8, 0.8)),
        };
        self.converted.insert(id.to_string(), material.clone());
        material
    }

    fn convert_effect(&mut self, name: &str, effect: Element<'a>) -> Material {
        let technique = path(effect, &["profile_COMMON", "technique"])
            .and_then(|t| ["phong", "blinn", "lambert", "constant"].iter().find_map(|s| child(t, s)));
        let mut material = Material::new(name, Rgb::new(0.8, 0.8, 0.8));
        let Some(shading) = technique else { return material };

        if let Some(diffuse) = child(shading, "diffuse") {
            if let Some(c) = color_of(diffuse) {
                material.color = c;
            }
            let sampler = child(diffuse, "texture").and_then(|t| t.attribute("texture"));
            if let Some(image) = sampler.and_then(|s| self.image_file(effect, s)) {
                if let Some(data) = self.textures.get(&image) {
                    material.maps.push(TextureSlot::new(MapKind::Color, data));
                }
            }
        }
        if let Some(c) = child(shading, "emission").and_then(color_of) {
            material.emissive = c;
        }
        if let Some(s) = path(shading, &["shininess", "float"]).and_then(|f| text(f).trim().parse::<f32>().ok()) {
            material.roughness = (2.0 / (s.max(0.0) + 2.0)).sqrt();
        }
        if matches!(tag(shading), "constant" | "lambert") {
            material.roughness = material.roughness.max(0.9);
        }
        if let Some(t) = path(shading, &["transparency", "float"]).and_then(|f| text(f).trim().parse::<f32>().ok()) {
            // Most exporters write opacity here (A_ONE); RGB_ZERO inverts it
            let inverted = child(shading, "transparent").and_then(|e| e.attribute("opaque")) == Some("RGB_ZERO");
            material.opacity = if inverted { 1.0 - t } else { t }.clamp(0.0, 1.0);
        }
        material
    }

    /// sampler -> surface -> image -> file name
    fn image_file(&self, effect: Element<'a>, sampler: &str) -> Option<String> {
        let params: HashMap<&str, Element<'a>> = effect
            .descendants()
            .filter(|e| e.has_tag_name("newparam"))
            .filter_map(|e| Some((e.attribute("sid")?, e)))
            .collect();

        let mut image_id = sampler;
        if let Some(&param) = params.get(sampler) {
            let surface = path(param, &["sampler2D", "source"]).map(|s| text(s).trim());
            image_id = match surface.and_then(|s| params.get(s)) {
                Some(&surface) => path(surface, &["surface", "init_from"]).map(|i| text(i).trim())?,
                None => path(param, &["sampler2D", "instance_image"]).and_then(|i| i.attribute("url")).map(fragment)?,
            };
        }
        let image = *self.ids.get(image_id)?;
        let init = child(image, "init_from")?;
        // 1.5 wraps the path in <ref>
        let file = child(init, "ref").map_or(text(init), text).trim();
        (!file.is_empty()).then(|| file.to_string())
    }
}

fn color_of(el: Element<'_>) -> Option<Rgb> {
    let c = parse_floats(text(child(el, "color")?));
    (c.len() >= 3).then(|| Rgb::new(c[0], c[1], c[2]))
}

/// Compose the node's transform elements in document order
fn node_matrix(node: Element<'_>) -> Mat4 {
    let mut m = mat4_identity();
    for el in elements(node) {
        let v = parse_floats(text(el));
        let local = match (tag(el), v.len()) {
            ("matrix", 16) => [
                [v[0], v[1], v[2], v[3]],
                [v[4], v[5], v[6], v[7]],
                [v[8], v[9], v[10], v[11]],
                [v[12], v[13], v[14], v[15]],
            ],
            ("translate", 3) => mat4_translation(Vec3::new(v[0], v[1], v[2])),
            ("rotate", 4) => mat4_axis_angle(Vec3::new(v[0], v[1], v[2]), v[3].to_radians()),
            ("scale", 3) => mat4_scale(Vec3::new(v[0], v[1], v[2])),
            _ => continue,
        };
        m = mat4_mul(&m, &local);
    }
    m
}

struct SceneBuilder<'a, 'c> {
    ids: &'a HashMap<&'a str, Element<'a>>,
    geometries: &'a HashMap<String, Geometry>,
    materials: MaterialLibrary<'a, 'c>,
    /// node ids on the current path (instance_node cycles)
    path: HashSet<String>,
    bones: Vec<Bone>,
}

impl<'a, 'c> SceneBuilder<'a, 'c> {
    fn node(&mut self, el: Element<'a>, parent_world: &Mat4, parent_bone: Option<usize>, depth: usize) -> Option<SceneNode> {
        if depth > MAX_NODE_DEPTH {
            log::warn!("COLLADA node tree deeper than {}, truncating", MAX_NODE_DEPTH);
            return None;
        }
        let id = el.attribute("id").unwrap_or("");
        if !id.is_empty() && !self.path.insert(id.to_string()) {
            return None;
        }

        let name = el.attribute("name").or(el.attribute("id")).unwrap_or("node");
        let matrix = node_matrix(el);
        let world = mat4_mul(parent_world, &matrix);
        let (position, rotation, scale) = mat4_decompose(&matrix);
        let mut out = SceneNode::new(name);
        out.transform = Transform { position, rotation, scale };

        let mut bone = parent_bone;
        if el.attribute("type") == Some("JOINT") {
            self.bones.push(Bone {
                name: name.to_string(),
                parent: parent_bone,
                position: mat4_transform_point(&world, Vec3::ZERO),
            });
            bone = Some(self.bones.len() - 1);
        }

        for item in elements(el) {
            match tag(item) {
                "instance_geometry" | "instance_controller" => {
                    if let Some(mesh) = self.instance(item) {
                        if out.mesh.is_none() {
                            out.mesh = Some(mesh);
                        } else {
                            out.children.push(SceneNode::with_mesh(mesh.name.clone(), mesh));
                        }
                    }
                }
                "node" => {
                    if let Some(n) = self.node(item, &world, bone, depth + 1) {
                        out.children.push(n);
                    }
                }
                "instance_node" => {
                    let target = item.attribute("url").and_then(|u| self.ids.get(fragment(u)).copied());
                    if let Some(n) = target.and_then(|t| self.node(t, &world, bone, depth + 1)) {
                        out.children.push(n);
                    }
                }
                _ => {}
            }
        }

        if !id.is_empty() {
            self.path.remove(id);
        }
        Some(out)
    }

    /// Copy of the referenced geometry with bound materials
    fn instance(&mut self, el: Element<'a>) -> Option<Mesh> {
        let url = fragment(el.attribute("url")?);
        // controllers wrap a skin around the real geometry
        let geometry_id = match self.ids.get(url) {
            Some(c) if c.has_tag_name("controller") => fragment(child(*c, "skin")?.attribute("source")?),
            _ => url,
        };
        let bindings: HashMap<&str, &str> = path(el, &["bind_material", "technique_common"])
            .map(|t| {
                children_named(t, "instance_material")
                    .filter_map(|m| Some((m.attribute("symbol")?, fragment(m.attribute("target")?))))
                    .collect()
            })
            .unwrap_or_default();
        self.bound_mesh(geometry_id, &bindings)
    }

    /// Geometry copy with its material symbols resolved through `bindings`
    fn bound_mesh(&mut self, geometry_id: &str, bindings: &HashMap<&str, &str>) -> Option<Mesh> {
        let geometry = self.geometries.get(geometry_id)?;
        let mut mesh = geometry.mesh.clone();
        mesh.materials = geometry
            .symbols
            .iter()
            .map(|symbol| match bindings.get(symbol.as_str()) {
                Some(target) => self.materials.material(target),
                // unbound symbols often name the material directly
                None if self.ids.get(symbol.as_str()).is_some_and(|e| e.has_tag_name("material")) => {
                    self.materials.material(symbol)
                }
                None => Material::default_pbr(),
            })
            .collect();
        Some(mesh)
    }
}

/// Build a scene from a parsed COLLADA document
pub fn build_scene(doc: Element<'_>, ctx: &DecodeContext) -> Result<RawScene, DaeError> {
    if !doc.has_tag_name("COLLADA") {
        return Err(DaeError::NotCollada(tag(doc).to_string()));
    }
    let ids = index_ids(doc);

    let mut geometries: HashMap<String, Geometry> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for lib in children_named(doc, "library_geometries") {
        for g in children_named(lib, "geometry") {
            let Some(id) = g.attribute("id") else { continue };
            let name = g.attribute("name").unwrap_or(id);
            if let Some(geometry) = convert_geometry(g, name)? {
                order.push(id.to_string());
                geometries.insert(id.to_string(), geometry);
            }
        }
    }

    let mut builder = SceneBuilder {
        ids: &ids,
        geometries: &geometries,
        materials: MaterialLibrary {
            ids: &ids,
            textures: TextureCache::new(ctx),
            converted: HashMap::new(),
        },
        path: HashSet::new(),
        bones: Vec::new(),
    };

    let mut root = SceneNode::new("dae");
    let visual_scene = path(doc, &["scene", "instance_visual_scene"])
        .and_then(|i| i.attribute("url"))
        .and_then(|u| ids.get(fragment(u)).copied())
        .or_else(|| path(doc, &["library_visual_scenes", "visual_scene"]));

    match visual_scene {
        Some(scene) => {
            for node in children_named(scene, "node") {
                if let Some(n) = builder.node(node, &mat4_identity(), None, 0) {
                    root.children.push(n);
                }
            }
        }
        None => {
            for id in &order {
                if let Some(mesh) = builder.bound_mesh(id, &HashMap::new()) {
                    root.children.push(SceneNode::with_mesh(mesh.name.clone(), mesh));
                }
            }
        }
    }

    let up_axis = path(doc, &["asset", "up_axis"]).map_or("Y_UP", |u| text(u).trim());
    match up_axis {
        "Z_UP" => root.transform.rotation.x = -std::f32::consts::FRAC_PI_2,
        "X_UP" => root.transform.rotation.z = std::f32::consts::FRAC_PI_2,
        _ => {}
    }
    if let Some(meter) = path(doc, &["asset", "unit"]).and_then(|u| u.attribute("meter")).and_then(|m| m.parse::<f32>().ok()) {
        if meter > 0.0 && (meter - 1.0).abs() > f32::EPSILON {
            root.transform.scale = Vec3::splat(meter);
        }
    }

    let skeleton = std::mem::take(&mut builder.bones);
    Ok(RawScene { root, skeleton })
}

pub struct DaeDecoder;

impl Decoder for DaeDecoder {
    fn decode(&self, bytes: &[u8], ctx: &DecodeContext) -> Result<RawScene, LoadError> {
        let text = String::from_utf8_lossy(bytes);
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
        let options = roxmltree::ParsingOptions { allow_dtd: true, ..Default::default() };
        let doc = roxmltree::Document::parse_with_options(text, options).map_err(DaeError::from)?;
        ctx.check_cancelled()?;
        Ok(build_scene(doc.root_element(), ctx)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <asset><unit meter="1"/><up_axis>UP_AXIS</up_axis></asset>
  <library_effects>
    <effect id="red-fx"><profile_COMMON><technique sid="common"><phong>
      <diffuse><color>1 0 0 1</color></diffuse>
      <shininess><float>50</float></shininess>
    </phong></technique></profile_COMMON></effect>
  </library_effects>
  <library_materials>
    <material id="red" name="Red"><instance_effect url="#red-fx"/></material>
  </library_materials>
  <library_geometries>
    <geometry id="quad" name="Quad"><mesh>
      <source id="quad-pos"><float_array id="quad-pos-a" count="12">0 0 0 1 0 0 1 1 0 0 1 0</float_array>
        <technique_common><accessor source="#quad-pos-a" count="4" stride="3"/></technique_common></source>
      <source id="quad-nrm"><float_array id="quad-nrm-a" count="3">0 0 1</float_array>
        <technique_common><accessor source="#quad-nrm-a" count="1" stride="3"/></technique_common></source>
      <vertices id="quad-vtx"><input semantic="POSITION" source="#quad-pos"/></vertices>
      <polylist material="mat0" count="1">
        <input semantic="VERTEX" source="#quad-vtx" offset="0"/>
        <input semantic="NORMAL" source="#quad-nrm" offset="1"/>
        <vcount>4</vcount>
        <p>0 0 1 0 2 0 3 0</p>
      </polylist>
    </mesh></geometry>
  </library_geometries>
  <library_visual_scenes>
    <visual_scene id="scene">
      <node id="root" name="Root" type="JOINT">
        <translate>0 2 0</translate>
        <node id="child" name="Child">
          <instance_geometry url="#quad">
            <bind_material><technique_common>
              <instance_material symbol="mat0" target="#red"/>
            </technique_common></bind_material>
          </instance_geometry>
        </node>
      </node>
    </visual_scene>
  </library_visual_scenes>
  <scene><instance_visual_scene url="#scene"/></scene>
</COLLADA>"##;

    fn decode(src: &str) -> Result<RawScene, LoadError> {
        DaeDecoder.decode(src.as_bytes(), &DecodeContext::detached("memory.dae"))
    }

    #[test]
    fn test_polylist_with_bound_material() {
        let scene = decode(&QUAD.replace("UP_AXIS", "Y_UP")).unwrap();
        let root = &scene.root.children[0];
        assert_eq!(root.name, "Root");
        assert_eq!(root.transform.position, Vec3::new(0.0, 2.0, 0.0));

        let mesh = root.children[0].mesh.as_ref().unwrap();
        assert_eq!(mesh.positions.len(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.normals[0], Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(mesh.materials.len(), 1);
        assert_eq!(mesh.materials[0].name, "Red");
        assert_eq!(mesh.materials[0].color, Rgb::new(1.0, 0.0, 0.0));
        assert!(mesh.materials[0].roughness < 0.5);

        assert_eq!(scene.skeleton.len(), 1);
        assert_eq!(scene.skeleton[0].position, Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_z_up_rotates_root() {
        let scene = decode(&QUAD.replace("UP_AXIS", "Z_UP")).unwrap();
        assert!((scene.root.transform.rotation.x + std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_geometry_without_visual_scene() {
        let start = QUAD.find("<library_visual_scenes>").unwrap();
        let end = QUAD.find("</COLLADA>").unwrap();
        let src = format!("{}{}", &QUAD[..start], &QUAD[end..]).replace("UP_AXIS", "Y_UP");
        let scene = decode(&src).unwrap();
        assert_eq!(scene.root.children.len(), 1);
        let mesh = scene.root.children[0].mesh.as_ref().unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.materials[0].name, "default");
    }

    #[test]
    fn test_node_matrix_order() {
        let doc = roxmltree::Document::parse(
            "<node><translate>1 0 0</translate><!-- keep --><rotate>0 0 1 90</rotate><scale>2 2 2</scale></node>",
        )
        .unwrap();
        let m = node_matrix(doc.root_element());
        let p = mat4_transform_point(&m, Vec3::new(1.0, 0.0, 0.0));
        assert!((p - Vec3::new(1.0, 2.0, 0.0)).len() < 1e-5);
    }

    #[test]
    fn test_bom_and_doctype_are_accepted() {
        let src = format!("\u{feff}{}", QUAD.replacen("?>", "?>\n<!DOCTYPE COLLADA>", 1)).replace("UP_AXIS", "Y_UP");
        let scene = decode(&src).unwrap();
        assert_eq!(scene.root.children[0].name, "Root");
    }

    #[test]
    fn test_rejects_other_xml() {
        assert!(matches!(decode("<svg></svg>"), Err(LoadError::Decode(_))));
        assert!(matches!(decode("not xml"), Err(LoadError::Decode(_))));
    }
}

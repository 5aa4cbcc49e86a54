//! Binary FBX import
//!
//! `fbxcel-dom` parses the node tree and resolves object connections. Model
//! objects become scene nodes, their Geometry child becomes the node's mesh
//! and connected Materials fill its material slots. ASCII FBX is rejected.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;

use fbxcel_dom::any::AnyDocument;
use fbxcel_dom::v7400::data::mesh::layer::TypedLayerElementHandle;
use fbxcel_dom::v7400::object::geometry::{MeshHandle as GeometryHandle, TypedGeometryHandle};
use fbxcel_dom::v7400::object::material::MaterialHandle;
use fbxcel_dom::v7400::object::model::TypedModelHandle;
use fbxcel_dom::v7400::object::property::loaders::{F64Arr3Loader, PrimitiveLoader};
use fbxcel_dom::v7400::object::{ObjectHandle, ObjectId, TypedObjectHandle};
use fbxcel_dom::v7400::Document;

use crate::math::{Mat4, Rgb, Vec2, Vec3, mat4_identity, mat4_mul, mat4_transform_point};
use crate::scene::{Bone, Material, Mesh, MeshGroup, RawScene, SceneNode, Transform};
use super::{DecodeContext, Decoder, LoadError};

const BINARY_MAGIC: &[u8] = b"Kaydara FBX Binary";

fn invalid(e: impl std::fmt::Display) -> LoadError {
    LoadError::Decode(format!("invalid FBX: {}", e))
}

fn looks_like_ascii(bytes: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(64)]).to_string();
    head.trim_start().starts_with(';') || head.contains("FBXHeaderExtension")
}

/// Load the object graph of a binary FBX file
pub fn parse(bytes: &[u8]) -> Result<Box<Document>, LoadError> {
    if !bytes.starts_with(BINARY_MAGIC) && looks_like_ascii(bytes) {
        return Err(LoadError::Decode("ASCII FBX is not supported, re-export as binary".to_string()));
    }
    match AnyDocument::from_seekable_reader(Cursor::new(bytes)).map_err(invalid)? {
        AnyDocument::V7400(version, doc) => {
            log::debug!("FBX {:?}", version);
            Ok(doc)
        }
        _ => Err(invalid("unsupported FBX version")),
    }
}

/// Triangles grouped by material slot, one vertex per polygon corner
fn convert_geometry(geometry: &GeometryHandle<'_>) -> Result<Mesh, LoadError> {
    let name = geometry.name().unwrap_or_default();
    let polygons = geometry.polygon_vertices().map_err(invalid)?;
    let triangles = polygons
        .triangulate_each(|_, polygon, out| {
            for i in 1..polygon.len().saturating_sub(1) {
                out.push([polygon[0], polygon[i], polygon[i + 1]]);
            }
            Ok(())
        })
        .map_err(invalid)?;

    let mut normals = None;
    let mut uvs = None;
    let mut slots = None;
    for layer in geometry.layers() {
        for entry in layer.layer_element_entries() {
            let element = match entry.typed_layer_element() {
                Ok(element) => element,
                Err(e) => {
                    log::warn!("FBX geometry {}: skipping layer element: {}", name, e);
                    continue;
                }
            };
            let loaded = match element {
                TypedLayerElementHandle::Normal(h) if normals.is_none() => h.normals().map(|n| normals = Some(n)),
                TypedLayerElementHandle::Uv(h) if uvs.is_none() => h.uv().map(|uv| uvs = Some(uv)),
                TypedLayerElementHandle::Material(h) if slots.is_none() => h.materials().map(|m| slots = Some(m)),
                _ => Ok(()),
            };
            if let Err(e) = loaded {
                log::warn!("FBX geometry {}: {}", name, e);
            }
        }
    }

    let mut mesh = Mesh::new(name);
    let mut corners = HashMap::new();
    let mut by_material: BTreeMap<usize, Vec<u32>> = BTreeMap::new();
    let vertices: Vec<_> = triangles.triangle_vertex_indices().collect();

    for triangle in vertices.chunks_exact(3) {
        let slot = slots
            .as_ref()
            .and_then(|m| m.material_index(&triangles, triangle[0]).ok())
            .map_or(0, |m| m.to_u32() as usize);
        let tris = by_material.entry(slot).or_default();

        for &tri_vi in triangle {
            let corner = triangles
                .polygon_vertex_index(tri_vi)
                .ok_or_else(|| invalid(format!("geometry {} has a dangling triangle vertex", name)))?;
            if let Some(&index) = corners.get(&corner) {
                tris.push(index);
                continue;
            }
            let p = triangles
                .control_point(tri_vi)
                .ok_or_else(|| invalid(format!("geometry {} references a missing control point", name)))?;
            let index = mesh.positions.len() as u32;
            mesh.positions.push(Vec3::new(p.x as f32, p.y as f32, p.z as f32));
            let normal = normals
                .as_ref()
                .and_then(|n| n.normal(&triangles, tri_vi).ok())
                .map_or(Vec3::ZERO, |n| Vec3::new(n.x as f32, n.y as f32, n.z as f32).normalize());
            mesh.normals.push(normal);
            // FBX puts v = 0 at the bottom of the image
            let uv = uvs
                .as_ref()
                .and_then(|u| u.uv(&triangles, tri_vi).ok())
                .map_or(Vec2::ZERO, |uv| Vec2::new(uv.x as f32, 1.0 - uv.y as f32));
            mesh.uvs.push(uv);
            corners.insert(corner, index);
            tris.push(index);
        }
    }

    for (slot, tris) in by_material {
        let start = mesh.indices.len();
        mesh.indices.extend(tris);
        mesh.groups.push(MeshGroup { start, count: mesh.indices.len() - start, material: slot });
    }
    if mesh.normals.iter().all(|n| n.len() == 0.0) {
        mesh.normals.clear();
    }
    if uvs.is_none() {
        mesh.uvs.clear();
    }
    Ok(mesh)
}

fn convert_material(material: &MaterialHandle<'_>) -> Material {
    let props = material.properties();
    let diffuse = props
        .diffuse_color_or_default()
        .map_or(Rgb::new(0.8, 0.8, 0.8), |c| Rgb::new(c.r as f32, c.g as f32, c.b as f32));
    let factor = props.diffuse_factor_or_default().unwrap_or(1.0) as f32;

    let mut out = Material::new(material.name().unwrap_or_default(), diffuse.scale(factor));
    if let Ok(Some(e)) = props.emissive_color() {
        let strength = props.emissive_factor_or_default().unwrap_or(1.0) as f32;
        out.emissive = Rgb::new(e.r as f32, e.g as f32, e.b as f32).scale(strength);
    }
    let opacity = material
        .direct_properties()
        .and_then(|p| p.get_property("Opacity"))
        .and_then(|p| p.load_value(PrimitiveLoader::<f64>::new()).ok());
    out.opacity = match opacity {
        Some(o) => o as f32,
        None => 1.0 - props.transparency_factor().ok().flatten().unwrap_or(0.0) as f32,
    }
    .clamp(0.0, 1.0);
    if let Ok(Some(s)) = props.shininess() {
        out.roughness = (2.0 / (s.max(0.0) as f32 + 2.0)).sqrt();
    }
    out
}

fn local_transform(model: &ObjectHandle<'_>) -> Transform {
    let props = model.properties_by_native_typename("FbxNode");
    let vec3 = |name: &str, default: Vec3| {
        props
            .get_property(name)
            .and_then(|p| p.load_value(F64Arr3Loader::new()).ok())
            .map_or(default, |[x, y, z]| Vec3::new(x as f32, y as f32, z as f32))
    };
    Transform {
        position: vec3("Lcl Translation", Vec3::ZERO),
        rotation: vec3("Lcl Rotation", Vec3::ZERO).scale(std::f32::consts::PI / 180.0),
        scale: vec3("Lcl Scaling", Vec3::ONE),
    }
}

#[derive(Default)]
struct SceneBuilder {
    visited: HashSet<ObjectId>,
    skeleton: Vec<Bone>,
}

impl SceneBuilder {
    fn node(
        &mut self,
        model: TypedModelHandle<'_>,
        parent_world: &Mat4,
        parent_bone: Option<usize>,
    ) -> Result<Option<SceneNode>, LoadError> {
        if !self.visited.insert(model.object_id()) {
            return Ok(None);
        }
        let name = model.name().unwrap_or_default();
        let mut out = SceneNode::new(name);
        out.transform = local_transform(&model);
        let world = mat4_mul(parent_world, &out.transform.to_matrix());

        let mut bone = parent_bone;
        match &model {
            TypedModelHandle::LimbNode(_) => {
                self.skeleton.push(Bone {
                    name: name.to_string(),
                    parent: parent_bone,
                    position: mat4_transform_point(&world, Vec3::ZERO),
                });
                bone = Some(self.skeleton.len() - 1);
            }
            TypedModelHandle::Mesh(mesh_model) => match mesh_model.geometry() {
                Ok(geometry) => {
                    let mut mesh = convert_geometry(&geometry)?;
                    mesh.materials = mesh_model.materials().map(|m| convert_material(&m)).collect();
                    out.mesh = Some(mesh);
                }
                Err(e) => log::warn!("FBX model {} has no geometry: {}", name, e),
            },
            _ => {}
        }

        for child in model.child_models() {
            if let Some(child) = self.node(child, &world, bone)? {
                out.children.push(child);
            }
        }
        Ok(Some(out))
    }
}

/// Rebuild the scene graph from a loaded document
pub fn build_scene(doc: &Document) -> Result<RawScene, LoadError> {
    let mut builder = SceneBuilder::default();
    let mut root = SceneNode::new("fbx");

    let mut top: Vec<TypedModelHandle<'_>> = doc
        .objects()
        .filter_map(|object| match object.get_typed() {
            TypedObjectHandle::Model(model) if model.parent_model().is_none() => Some(model),
            _ => None,
        })
        .collect();
    top.sort_by_key(|model| model.object_id());
    for model in top {
        if let Some(node) = builder.node(model, &mat4_identity(), None)? {
            root.children.push(node);
        }
    }

    // Geometry nobody instanced
    let mut orphans: Vec<GeometryHandle<'_>> = doc
        .objects()
        .filter_map(|object| match object.get_typed() {
            TypedObjectHandle::Geometry(TypedGeometryHandle::Mesh(g)) if g.models().next().is_none() => Some(g),
            _ => None,
        })
        .collect();
    orphans.sort_by_key(|g| g.object_id());
    for geometry in orphans {
        let mesh = convert_geometry(&geometry)?;
        root.children.push(SceneNode::with_mesh(mesh.name.clone(), mesh));
    }

    // Z-up files get rotated so +Z points up the screen
    let up_axis = doc
        .global_settings()
        .and_then(|settings| settings.raw_properties().get_property("UpAxis"))
        .and_then(|p| p.load_value(PrimitiveLoader::<i32>::new()).ok())
        .unwrap_or(1);
    if up_axis == 2 {
        root.transform.rotation.x = -std::f32::consts::FRAC_PI_2;
    }

    Ok(RawScene { root, skeleton: builder.skeleton })
}

pub struct FbxDecoder;

impl Decoder for FbxDecoder {
    fn decode(&self, bytes: &[u8], ctx: &DecodeContext) -> Result<RawScene, LoadError> {
        let doc = parse(bytes)?;
        ctx.check_cancelled()?;
        build_scene(&doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fbxcel::low::v7400::AttributeValue;
    use fbxcel::low::FbxVersion;
    use fbxcel::writer::v7400::binary::{FbxFooter, Writer};

    type Sink = Writer<Cursor<Vec<u8>>>;

    fn node(w: &mut Sink, name: &str, attrs: Vec<AttributeValue>, children: impl FnOnce(&mut Sink)) {
        {
            let mut out = w.new_node(name).unwrap();
            for attr in attrs {
                match attr {
                    AttributeValue::I32(v) => out.append_i32(v),
                    AttributeValue::I64(v) => out.append_i64(v),
                    AttributeValue::F64(v) => out.append_f64(v),
                    AttributeValue::String(v) => out.append_string_direct(&v),
                    AttributeValue::ArrI32(v) => out.append_arr_i32_from_iter(None, v),
                    AttributeValue::ArrF64(v) => out.append_arr_f64_from_iter(None, v),
                    other => panic!("unsupported attribute {:?}", other),
                }
                .unwrap();
            }
        }
        children(w);
        w.close_node().unwrap();
    }

    fn s(v: &str) -> AttributeValue {
        v.into()
    }

    fn p3(w: &mut Sink, name: &str, v: [f64; 3]) {
        let attrs = vec![s(name), s(name), s(""), s("A"), v[0].into(), v[1].into(), v[2].into()];
        node(w, "P", attrs, |_| {});
    }

    fn layer_entry(w: &mut Sink, ty: &str) {
        node(w, "LayerElement", vec![], |w| {
            node(w, "Type", vec![s(ty)], |_| {});
            node(w, "TypedIndex", vec![0i32.into()], |_| {});
        });
    }

    fn sample(up_axis: i32) -> Vec<u8> {
        let mut w = Writer::new(Cursor::new(Vec::new()), FbxVersion::V7_4).unwrap();
        node(&mut w, "GlobalSettings", vec![], |w| {
            node(w, "Properties70", vec![], |w| {
                let attrs = vec![s("UpAxis"), s("int"), s("Integer"), s(""), up_axis.into()];
                node(w, "P", attrs, |_| {});
            })
        });
        node(&mut w, "Documents", vec![], |_| {});
        node(&mut w, "Objects", vec![], |w| {
            node(w, "Geometry", vec![10i64.into(), s("quad\u{0}\u{1}Geometry"), s("Mesh")], |w| {
                let vertices = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0];
                node(w, "Vertices", vec![vertices.into()], |_| {});
                node(w, "PolygonVertexIndex", vec![vec![0i32, 1, 2, -4].into()], |_| {});
                node(w, "LayerElementNormal", vec![0i32.into()], |w| {
                    node(w, "MappingInformationType", vec![s("ByVertice")], |_| {});
                    node(w, "ReferenceInformationType", vec![s("Direct")], |_| {});
                    node(w, "Normals", vec![[0.0, 0.0, 1.0].repeat(4).into()], |_| {});
                });
                node(w, "LayerElementMaterial", vec![0i32.into()], |w| {
                    node(w, "MappingInformationType", vec![s("AllSame")], |_| {});
                    node(w, "ReferenceInformationType", vec![s("IndexToDirect")], |_| {});
                    node(w, "Materials", vec![vec![0i32].into()], |_| {});
                });
                node(w, "Layer", vec![0i32.into()], |w| {
                    layer_entry(w, "LayerElementNormal");
                    layer_entry(w, "LayerElementMaterial");
                });
            });
            node(w, "Model", vec![20i64.into(), s("body\u{0}\u{1}Model"), s("Mesh")], |w| {
                node(w, "Properties70", vec![], |w| {
                    p3(w, "Lcl Translation", [5.0, 0.0, 0.0]);
                    p3(w, "Lcl Rotation", [0.0, 90.0, 0.0]);
                });
            });
            node(w, "Model", vec![21i64.into(), s("hip\u{0}\u{1}Model"), s("LimbNode")], |_| {});
            node(w, "Model", vec![22i64.into(), s("knee\u{0}\u{1}Model"), s("LimbNode")], |w| {
                node(w, "Properties70", vec![], |w| p3(w, "Lcl Translation", [0.0, -1.0, 0.0]));
            });
            node(w, "Material", vec![30i64.into(), s("green\u{0}\u{1}Material"), s("")], |w| {
                node(w, "Properties70", vec![], |w| p3(w, "DiffuseColor", [0.0, 1.0, 0.0]));
            });
            node(w, "Geometry", vec![40i64.into(), s("spare\u{0}\u{1}Geometry"), s("Mesh")], |w| {
                node(w, "Vertices", vec![vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0].into()], |_| {});
                node(w, "PolygonVertexIndex", vec![vec![0i32, 1, -3].into()], |_| {});
            });
        });
        node(&mut w, "Connections", vec![], |w| {
            for (child, parent) in [(20i64, 0i64), (10, 20), (30, 20), (21, 20), (22, 21)] {
                node(w, "C", vec![s("OO"), child.into(), parent.into()], |_| {});
            }
        });
        w.finalize(&FbxFooter::default()).unwrap().into_inner()
    }

    #[test]
    fn test_build_scene() {
        let scene = FbxDecoder.decode(&sample(1), &DecodeContext::detached("a.fbx")).unwrap();
        assert_eq!(scene.root.children.len(), 2);
        let body = &scene.root.children[0];
        assert_eq!(body.name, "body");
        assert_eq!(body.transform.position, Vec3::new(5.0, 0.0, 0.0));
        assert!((body.transform.rotation.y - std::f32::consts::FRAC_PI_2).abs() < 1e-5);

        let mesh = body.mesh.as_ref().unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.positions.len(), 4);
        assert_eq!(mesh.groups.len(), 1);
        assert_eq!(mesh.materials.len(), 1);
        assert_eq!(mesh.materials[0].name, "green");
        assert_eq!(mesh.materials[0].color, Rgb::new(0.0, 1.0, 0.0));
        assert_eq!(mesh.normals[0], Vec3::new(0.0, 0.0, 1.0));
        assert!(mesh.uvs.is_empty());

        assert_eq!(body.children.len(), 1);
        assert_eq!(scene.skeleton.len(), 2);
        assert_eq!(scene.skeleton[0].name, "hip");
        assert_eq!(scene.skeleton[1].parent, Some(0));
        assert_eq!(scene.root.transform.rotation, Vec3::ZERO);
    }

    #[test]
    fn test_unlinked_geometry_is_kept() {
        let scene = FbxDecoder.decode(&sample(1), &DecodeContext::detached("a.fbx")).unwrap();
        let spare = &scene.root.children[1];
        assert_eq!(spare.name, "spare");
        let mesh = spare.mesh.as_ref().unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        assert!(mesh.normals.is_empty());
        assert!(mesh.materials.is_empty());
    }

    #[test]
    fn test_z_up_is_rotated() {
        let scene = FbxDecoder.decode(&sample(2), &DecodeContext::detached("a.fbx")).unwrap();
        assert!((scene.root.transform.rotation.x + std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_ascii_and_garbage_are_rejected() {
        let ascii = parse(b"; FBX 7.4.0 project file\nFBXHeaderExtension:  {").unwrap_err();
        assert!(ascii.to_string().contains("ASCII FBX"));
        assert!(matches!(parse(b"not an fbx"), Err(LoadError::Decode(_))));

        let mut truncated = sample(1);
        truncated.truncate(200);
        assert!(parse(&truncated).is_err());
    }
}

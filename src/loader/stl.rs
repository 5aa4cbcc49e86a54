//! STL import (binary and ASCII), flat shaded

use crate::math::Vec3;
use crate::scene::{Mesh, RawScene, SceneNode};
use super::{DecodeContext, Decoder, LoadError};

const HEADER_LEN: usize = 80;
const TRIANGLE_LEN: usize = 50;

pub struct StlDecoder;

impl Decoder for StlDecoder {
    fn decode(&self, bytes: &[u8], _ctx: &DecodeContext) -> Result<RawScene, LoadError> {
        let triangles = if is_binary(bytes) {
            parse_binary(bytes)?
        } else {
            parse_ascii(&String::from_utf8_lossy(bytes))?
        };
        if triangles.is_empty() {
            return Err(LoadError::Decode("STL has no facets".to_string()));
        }

        let mut mesh = Mesh::new("stl");
        for (normal, verts) in triangles {
            let computed = (verts[1] - verts[0]).cross(verts[2] - verts[0]).normalize();
            let normal = if normal.len() > 0.5 { normal.normalize() } else { computed };
            let base = mesh.positions.len() as u32;
            for v in verts {
                mesh.positions.push(v);
                mesh.normals.push(normal);
            }
            mesh.indices.extend_from_slice(&[base, base + 1, base + 2]);
        }

        Ok(RawScene {
            root: SceneNode::with_mesh("stl", mesh),
            skeleton: Vec::new(),
        })
    }
}

type Facet = (Vec3, [Vec3; 3]);

/// Binary when the size matches the facet count. Some binary exporters
/// also start the header with "solid", so the prefix alone is not enough.
fn is_binary(bytes: &[u8]) -> bool {
    if bytes.len() >= HEADER_LEN + 4 {
        let count = read_u32(bytes, HEADER_LEN) as usize;
        if count.checked_mul(TRIANGLE_LEN).map(|n| n + HEADER_LEN + 4) == Some(bytes.len()) {
            return true;
        }
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]).to_ascii_lowercase();
    !head.trim_start().starts_with("solid")
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_vec3(bytes: &[u8], at: usize) -> Vec3 {
    let f = |o: usize| f32::from_le_bytes([bytes[at + o], bytes[at + o + 1], bytes[at + o + 2], bytes[at + o + 3]]);
    Vec3::new(f(0), f(4), f(8))
}

fn parse_binary(bytes: &[u8]) -> Result<Vec<Facet>, LoadError> {
    if bytes.len() < HEADER_LEN + 4 {
        return Err(LoadError::Decode("STL file too short".to_string()));
    }
    let count = read_u32(bytes, HEADER_LEN) as usize;
    let body = &bytes[HEADER_LEN + 4..];
    if body.len() / TRIANGLE_LEN < count {
        return Err(LoadError::Decode(format!(
            "binary STL declares {} facets but holds {}",
            count,
            body.len() / TRIANGLE_LEN
        )));
    }

    let mut facets = Vec::with_capacity(count);
    for chunk in body.chunks_exact(TRIANGLE_LEN).take(count) {
        let normal = read_vec3(chunk, 0);
        let verts = [read_vec3(chunk, 12), read_vec3(chunk, 24), read_vec3(chunk, 36)];
        if verts.iter().all(|v| v.is_finite()) {
            facets.push((if normal.is_finite() { normal } else { Vec3::ZERO }, verts));
        }
    }
    Ok(facets)
}

fn parse_ascii(text: &str) -> Result<Vec<Facet>, LoadError> {
    let mut facets = Vec::new();
    let mut normal = Vec3::ZERO;
    let mut verts: Vec<Vec3> = Vec::with_capacity(3);

    for (line_num, line) in text.lines().enumerate() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let floats = |from: usize| -> Result<Vec3, LoadError> {
            let get = |i: usize| {
                parts
                    .get(i)
                    .and_then(|s| s.parse::<f32>().ok())
                    .ok_or_else(|| LoadError::Decode(format!("STL line {}: bad number", line_num + 1)))
            };
            Ok(Vec3::new(get(from)?, get(from + 1)?, get(from + 2)?))
        };

        match parts.first().copied() {
            Some("facet") => {
                normal = if parts.get(1) == Some(&"normal") { floats(2)? } else { Vec3::ZERO };
                verts.clear();
            }
            Some("vertex") => verts.push(floats(1)?),
            Some("endfacet") => {
                if verts.len() >= 3 {
                    // Polygons are rare but legal in the wild; fan them
                    for i in 1..verts.len() - 1 {
                        facets.push((normal, [verts[0], verts[i], verts[i + 1]]));
                    }
                }
                verts.clear();
            }
            _ => {}
        }
    }
    Ok(facets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary_stl(facets: &[[Vec3; 3]]) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_LEN];
        out[..5].copy_from_slice(b"solid");
        out.extend_from_slice(&(facets.len() as u32).to_le_bytes());
        for tri in facets {
            out.extend_from_slice(&[0u8; 12]);
            for v in tri {
                for c in v.to_array() {
                    out.extend_from_slice(&c.to_le_bytes());
                }
            }
            out.extend_from_slice(&[0u8; 2]);
        }
        out
    }

    #[test]
    fn test_binary_with_solid_header() {
        let tri = [Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)];
        let bytes = binary_stl(&[tri, tri]);
        let scene = StlDecoder.decode(&bytes, &DecodeContext::detached("a.stl")).unwrap();
        let mesh = scene.root.mesh.unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert!((mesh.normals[0].z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_ascii() {
        let text = r#"solid cube
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 1 1 0
    endloop
  endfacet
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 1 0
      vertex 0 1 0
    endloop
  endfacet
endsolid cube
"#;
        let scene = StlDecoder.decode(text.as_bytes(), &DecodeContext::detached("a.stl")).unwrap();
        assert_eq!(scene.root.stats().triangles, 2);
    }

    #[test]
    fn test_truncated_binary_fails() {
        let tri = [Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)];
        let mut bytes = binary_stl(&[tri]);
        bytes[..5].copy_from_slice(b"xxxxx");
        bytes[HEADER_LEN] = 9;
        assert!(matches!(
            StlDecoder.decode(&bytes, &DecodeContext::detached("a.stl")),
            Err(LoadError::Decode(_))
        ));
    }

    #[test]
    fn test_empty_ascii_fails() {
        assert!(StlDecoder.decode(b"solid x\nendsolid x\n", &DecodeContext::detached("a.stl")).is_err());
    }
}

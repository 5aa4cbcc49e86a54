//! Build automation tasks for Vitrine
//!
//! Usage:
//!   cargo xtask samples     # Write sample models to assets/samples/
//!   cargo xtask package     # Build a release binary and stage it in dist/

use anyhow::{Context, Result};
use base64::Engine;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation for Vitrine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write one small model per supported format
    Samples {
        /// Output directory (default: assets/samples)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Build a native release and stage it with a default config
    Package {
        /// Target platform label used for the dist folder
        #[arg(long)]
        platform: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Samples { out } => samples(out.unwrap_or_else(|| project_root().join("assets/samples"))),
        Commands::Package { platform } => package(platform),
    }
}

/// Get the project root directory
fn project_root() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest.parent().unwrap_or(manifest).to_path_buf()
}

/// Run a command and check for success
fn run_cmd(cmd: &mut Command) -> Result<()> {
    let status = cmd.status().context("Failed to execute command")?;
    if !status.success() {
        anyhow::bail!("Command failed with status: {}", status);
    }
    Ok(())
}

/// Unit cube corners and the 12 triangles over them (outward winding)
const CUBE_CORNERS: [[f32; 3]; 8] = [
    [-0.5, -0.5, -0.5],
    [0.5, -0.5, -0.5],
    [0.5, 0.5, -0.5],
    [-0.5, 0.5, -0.5],
    [-0.5, -0.5, 0.5],
    [0.5, -0.5, 0.5],
    [0.5, 0.5, 0.5],
    [-0.5, 0.5, 0.5],
];
const CUBE_TRIANGLES: [[usize; 3]; 12] = [
    [0, 2, 1], [0, 3, 2], // back
    [4, 5, 6], [4, 6, 7], // front
    [0, 1, 5], [0, 5, 4], // bottom
    [3, 7, 6], [3, 6, 2], // top
    [0, 4, 7], [0, 7, 3], // left
    [1, 2, 6], [1, 6, 5], // right
];

fn face_normal(tri: [usize; 3]) -> [f32; 3] {
    let [a, b, c] = tri.map(|i| CUBE_CORNERS[i]);
    let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let n = [u[1] * v[2] - u[2] * v[1], u[2] * v[0] - u[0] * v[2], u[0] * v[1] - u[1] * v[0]];
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt().max(f32::EPSILON);
    n.map(|x| x / len)
}

/// Two boxes in separate groups, each with its own material
fn sample_obj() -> (String, String) {
    let mut obj = String::from("# Vitrine sample: two parts\nmtllib parts.mtl\n");
    for (part, (name, offset)) in [("base", -0.75f32), ("top", 0.75f32)].into_iter().enumerate() {
        obj.push_str(&format!("o {}\nusemtl {}\n", name, name));
        for c in CUBE_CORNERS {
            obj.push_str(&format!("v {} {} {}\n", c[0] + offset, c[1], c[2]));
        }
        for tri in CUBE_TRIANGLES {
            let base = part * 8 + 1;
            obj.push_str(&format!("f {} {} {}\n", tri[0] + base, tri[1] + base, tri[2] + base));
        }
    }
    let mtl = "\
newmtl base
Kd 0.8 0.3 0.2
Ks 0.5 0.5 0.5
Ns 64
d 1.0

newmtl top
Kd 0.2 0.5 0.8
Ks 0.2 0.2 0.2
Ns 16
d 1.0
"
    .to_string();
    (obj, mtl)
}

fn sample_stl_binary() -> Vec<u8> {
    let mut out = vec![0u8; 80];
    out[..21].copy_from_slice(b"Vitrine sample binary");
    out.extend_from_slice(&(CUBE_TRIANGLES.len() as u32).to_le_bytes());
    for tri in CUBE_TRIANGLES {
        for x in face_normal(tri) {
            out.extend_from_slice(&x.to_le_bytes());
        }
        for i in tri {
            for x in CUBE_CORNERS[i] {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
        out.extend_from_slice(&0u16.to_le_bytes());
    }
    out
}

fn sample_stl_ascii() -> String {
    let mut out = String::from("solid vitrine_sample\n");
    for tri in CUBE_TRIANGLES {
        let n = face_normal(tri);
        out.push_str(&format!("  facet normal {} {} {}\n    outer loop\n", n[0], n[1], n[2]));
        for i in tri {
            let c = CUBE_CORNERS[i];
            out.push_str(&format!("      vertex {} {} {}\n", c[0], c[1], c[2]));
        }
        out.push_str("    endloop\n  endfacet\n");
    }
    out.push_str("endsolid vitrine_sample\n");
    out
}

/// Cube with positions and u16 indices in one embedded buffer
fn sample_gltf() -> String {
    let mut bin = Vec::new();
    for c in CUBE_CORNERS {
        for x in c {
            bin.extend_from_slice(&x.to_le_bytes());
        }
    }
    let positions_len = bin.len();
    for tri in CUBE_TRIANGLES {
        for i in tri {
            bin.extend_from_slice(&(i as u16).to_le_bytes());
        }
    }
    let indices_len = bin.len() - positions_len;
    while bin.len() % 4 != 0 {
        bin.push(0);
    }
    let uri = format!(
        "data:application/octet-stream;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(&bin)
    );

    format!(
        r#"{{
  "asset": {{"version": "2.0", "generator": "vitrine xtask"}},
  "scene": 0,
  "scenes": [{{"nodes": [0]}}],
  "nodes": [{{"name": "cube", "mesh": 0, "rotation": [0.0, 0.3826834, 0.0, 0.9238795]}}],
  "meshes": [{{"primitives": [{{"attributes": {{"POSITION": 0}}, "indices": 1, "material": 0}}]}}],
  "materials": [{{"name": "brass", "pbrMetallicRoughness": {{"baseColorFactor": [0.9, 0.7, 0.3, 1.0], "metallicFactor": 0.8, "roughnessFactor": 0.3}}}}],
  "accessors": [
    {{"bufferView": 0, "componentType": 5126, "count": 8, "type": "VEC3", "min": [-0.5, -0.5, -0.5], "max": [0.5, 0.5, 0.5]}},
    {{"bufferView": 1, "componentType": 5123, "count": {index_count}, "type": "SCALAR"}}
  ],
  "bufferViews": [
    {{"buffer": 0, "byteOffset": 0, "byteLength": {positions_len}}},
    {{"buffer": 0, "byteOffset": {positions_len}, "byteLength": {indices_len}}}
  ],
  "buffers": [{{"byteLength": {buffer_len}, "uri": "{uri}"}}]
}}
"#,
        index_count = CUBE_TRIANGLES.len() * 3,
        positions_len = positions_len,
        indices_len = indices_len,
        buffer_len = bin.len(),
        uri = uri,
    )
}

/// Z-up COLLADA cube with a bound material
fn sample_dae() -> String {
    let positions: Vec<String> = CUBE_CORNERS.iter().flatten().map(|x| x.to_string()).collect();
    let indices: Vec<String> = CUBE_TRIANGLES.iter().flatten().map(|i| i.to_string()).collect();
    format!(
        r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <asset><unit name="meter" meter="1"/><up_axis>Z_UP</up_axis></asset>
  <library_effects>
    <effect id="green-fx"><profile_COMMON><technique sid="common"><phong>
      <diffuse><color>0.2 0.7 0.3 1</color></diffuse>
      <shininess><float>32</float></shininess>
    </phong></technique></profile_COMMON></effect>
  </library_effects>
  <library_materials>
    <material id="green" name="green"><instance_effect url="#green-fx"/></material>
  </library_materials>
  <library_geometries>
    <geometry id="cube" name="cube"><mesh>
      <source id="cube-pos">
        <float_array id="cube-pos-array" count="{position_count}">{positions}</float_array>
        <technique_common><accessor source="#cube-pos-array" count="8" stride="3">
          <param name="X" type="float"/><param name="Y" type="float"/><param name="Z" type="float"/>
        </accessor></technique_common>
      </source>
      <vertices id="cube-vtx"><input semantic="POSITION" source="#cube-pos"/></vertices>
      <triangles material="mat" count="{triangle_count}">
        <input semantic="VERTEX" source="#cube-vtx" offset="0"/>
        <p>{indices}</p>
      </triangles>
    </mesh></geometry>
  </library_geometries>
  <library_visual_scenes>
    <visual_scene id="scene">
      <node id="cube-node" name="cube">
        <translate>0 0 0.5</translate>
        <instance_geometry url="#cube">
          <bind_material><technique_common>
            <instance_material symbol="mat" target="#green"/>
          </technique_common></bind_material>
        </instance_geometry>
      </node>
    </visual_scene>
  </library_visual_scenes>
  <scene><instance_visual_scene url="#scene"/></scene>
</COLLADA>
"##,
        position_count = positions.len(),
        positions = positions.join(" "),
        triangle_count = CUBE_TRIANGLES.len(),
        indices = indices.join(" "),
    )
}

/// Write sample models
fn samples(out: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&out).with_context(|| format!("creating {}", out.display()))?;

    let (obj, mtl) = sample_obj();
    let files: Vec<(&str, Vec<u8>)> = vec![
        ("parts.obj", obj.into_bytes()),
        ("parts.mtl", mtl.into_bytes()),
        ("cube_binary.stl", sample_stl_binary()),
        ("cube_ascii.stl", sample_stl_ascii().into_bytes()),
        ("cube.gltf", sample_gltf().into_bytes()),
        ("cube.dae", sample_dae().into_bytes()),
    ];
    for (name, bytes) in files {
        let path = out.join(name);
        std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
        println!("  {}", path.display());
    }
    println!("Samples written to {}", out.display());
    Ok(())
}

/// Config staged next to the binary; omitted fields take their defaults
const DEFAULT_CONFIG: &str = "\
// Vitrine configuration. Any field left out keeps its default.
(
  viewer: (
    auto_rotate: false,
    show_grid: true,
  ),
  recording: (
    duration_secs: 3.0,
    fps: 15,
  ),
  target_size: 4.0,
  output_dir: \"captures\",
)
";

/// Build a native release and stage it in dist/<platform>
fn package(platform: Option<String>) -> Result<()> {
    let root = project_root();
    let platform = platform.unwrap_or_else(|| {
        if cfg!(target_os = "windows") {
            "windows".to_string()
        } else if cfg!(target_os = "macos") {
            "macos".to_string()
        } else {
            "linux".to_string()
        }
    });

    let dist = root.join(format!("dist/{}", platform));

    println!("Building native release for {}...", platform);

    // Clean and create dist folder
    if dist.exists() {
        std::fs::remove_dir_all(&dist)?;
    }
    std::fs::create_dir_all(&dist)?;

    run_cmd(
        Command::new("cargo")
            .current_dir(&root)
            .args(["build", "--release", "--bin", "vitrine"]),
    )?;

    let binary_name = if platform == "windows" { "vitrine.exe" } else { "vitrine" };
    std::fs::copy(root.join("target/release").join(binary_name), dist.join(binary_name))
        .with_context(|| format!("copying {}", binary_name))?;
    std::fs::write(dist.join("vitrine.ron"), DEFAULT_CONFIG)?;
    samples(dist.join("samples"))?;

    println!("Package ready: dist/{}/", platform);
    Ok(())
}

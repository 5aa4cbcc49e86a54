//! Vitrine: a real-time 3D asset viewer
//!
//! Loads OBJ, STL, glTF/GLB, FBX and COLLADA models, centers and scales them
//! into a fixed viewing volume, fixes up their materials, and shows them
//! under a studio light rig with orbit controls, physics and pose playback,
//! reference props, screenshots, GIF recording and animation export.

/// Version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod app;
mod capture;
mod config;
mod loader;
mod math;
mod scene;
mod sim;
mod task;
mod viewer;

use std::path::PathBuf;

use clap::Parser;
use macroquad::prelude::*;

use app::App;
use config::{ViewerConfig, DEFAULT_CONFIG_FILE};

#[derive(Parser, Debug, Default)]
#[command(name = "vitrine", version, about = "Real-time 3D asset viewer")]
struct Cli {
    /// Model URL or path (http(s)://, file:// or a plain path)
    url: Option<String>,
    /// Format hint (obj, stl, gltf, glb, fbx, dae); overrides the extension
    #[arg(long)]
    format: Option<String>,
    /// Config file (RON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Largest axis of the normalized model
    #[arg(long)]
    target_size: Option<f32>,
    /// Where screenshots, recordings and exports are written
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl Cli {
    #[cfg(not(target_arch = "wasm32"))]
    fn from_env() -> Self {
        Cli::parse()
    }

    #[cfg(target_arch = "wasm32")]
    fn from_env() -> Self {
        Cli::default()
    }

    /// Resolve the config file and apply command-line overrides
    fn config(&self) -> ViewerConfig {
        let path = self.config.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let mut config = ViewerConfig::load_or_default(path);
        if let Some(size) = self.target_size {
            if size.is_finite() && size > 0.0 {
                config.target_size = size;
            } else {
                log::warn!("ignoring --target-size {}", size);
            }
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        config
    }
}

fn window_conf() -> Conf {
    Conf {
        window_title: format!("Vitrine v{}", VERSION),
        window_width: 1280,
        window_height: 800,
        window_resizable: true,
        high_dpi: true,
        sample_count: 4,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    // Initialize crash logging FIRST (before any other code)
    #[cfg(not(target_arch = "wasm32"))]
    crashlog::setup!(crashlog::cargo_metadata!().capitalized(), false);

    #[cfg(not(target_arch = "wasm32"))]
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init();

    let cli = Cli::from_env();
    let config = cli.config();
    log::info!("vitrine v{} (target size {}, output {})", VERSION, config.target_size, config.output_dir.display());

    let mut app = App::new(config, cli.url, cli.format);

    loop {
        let dt = get_frame_time();
        app.frame(get_time(), dt);
        next_frame().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            "vitrine",
            "model.glb",
            "--format",
            "glb",
            "--config",
            dir.path().join("missing.ron").to_str().unwrap(),
            "--target-size",
            "2.5",
            "--output-dir",
            "shots",
        ]);
        assert_eq!(cli.url.as_deref(), Some("model.glb"));
        let config = cli.config();
        assert_eq!(config.target_size, 2.5);
        assert_eq!(config.output_dir, PathBuf::from("shots"));
    }

    #[test]
    fn test_bad_target_size_keeps_default() {
        let cli = Cli::parse_from(["vitrine", "--target-size", "0", "--config", "/nonexistent/vitrine.ron"]);
        assert_eq!(cli.config().target_size, ViewerConfig::default().target_size);
    }
}

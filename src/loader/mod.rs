//! Model loading
//!
//! `resolve_format` picks a `ModelFormat` from a hint or the URL extension.
//! The `LoaderRegistry` maps each format to a `Decoder`. `ModelLoader` runs
//! fetch, decode, normalize and material correction on a background thread
//! and hands the finished `LoadedScene` back to the render thread. Starting
//! a new load supersedes the previous one; superseded results are dropped.

pub mod codec;
pub mod dae;
pub mod fbx;
pub mod fetch;
pub mod gltf;
pub mod obj;
pub mod stl;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::scene::{LoadedScene, RawScene, correct_materials, normalize};
use crate::task::{AsyncOp, Poll};
use codec::CodecProvider;

/// The interchange formats the viewer can decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFormat {
    Fbx,
    Obj,
    Gltf,
    Glb,
    Stl,
    Dae,
}

impl ModelFormat {
    pub const ALL: [ModelFormat; 6] = [
        ModelFormat::Fbx,
        ModelFormat::Obj,
        ModelFormat::Gltf,
        ModelFormat::Glb,
        ModelFormat::Stl,
        ModelFormat::Dae,
    ];

    /// Case-insensitive lookup by extension or format name
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().trim_start_matches('.');
        Self::ALL.into_iter().find(|f| f.extension().eq_ignore_ascii_case(name))
    }

    pub fn extension(self) -> &'static str {
        match self {
            ModelFormat::Fbx => "fbx",
            ModelFormat::Obj => "obj",
            ModelFormat::Gltf => "gltf",
            ModelFormat::Glb => "glb",
            ModelFormat::Stl => "stl",
            ModelFormat::Dae => "dae",
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Extension of the last path segment, ignoring query and fragment
pub fn url_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() && ext.is_empty() {
        return None;
    }
    Some(ext)
}

/// Pick the format for a model. A non-empty hint wins; an unrecognized
/// hint means no format. Without a hint the URL extension decides.
pub fn resolve_format(url: &str, hint: Option<&str>) -> Option<ModelFormat> {
    match hint.map(str::trim).filter(|h| !h.is_empty()) {
        Some(hint) => ModelFormat::from_name(hint),
        None => url_extension(url).and_then(ModelFormat::from_name),
    }
}

/// A model to load. Immutable once loading starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAsset {
    pub url: String,
    pub format: ModelFormat,
}

/// Error type for model loading
#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    /// The bytes could not be read
    Fetch(String),
    /// The file is malformed or uses something we can't decode
    Decode(String),
    /// No decoder for this format
    UnsupportedFormat(String),
    /// Superseded by a newer load (never shown)
    Cancelled,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Fetch(msg) => write!(f, "fetch failed: {}", msg),
            LoadError::Decode(msg) => write!(f, "decode failed: {}", msg),
            LoadError::UnsupportedFormat(what) => write!(f, "unsupported format: {}", what),
            LoadError::Cancelled => write!(f, "load cancelled"),
        }
    }
}

impl std::error::Error for LoadError {}

/// What a decoder can use besides the file bytes
pub struct DecodeContext {
    pub url: String,
    pub codecs: Arc<CodecProvider>,
    cancel: Arc<AtomicBool>,
}

impl DecodeContext {
    pub fn new(url: impl Into<String>, codecs: Arc<CodecProvider>, cancel: Arc<AtomicBool>) -> Self {
        Self { url: url.into(), codecs, cancel }
    }

    /// Context that is never cancelled (tests, tools)
    pub fn detached(url: impl Into<String>) -> Self {
        Self::new(url, Arc::new(CodecProvider::new()), Arc::new(AtomicBool::new(false)))
    }

    pub fn check_cancelled(&self) -> Result<(), LoadError> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(LoadError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Fetch a file referenced by the model (relative to its URL)
    pub fn fetch_relative(&self, uri: &str) -> Result<Vec<u8>, LoadError> {
        self.check_cancelled()?;
        fetch::fetch(&fetch::resolve_relative(&self.url, uri))
    }
}

/// Turns file bytes into a scene graph
pub trait Decoder: Send + Sync {
    fn decode(&self, bytes: &[u8], ctx: &DecodeContext) -> Result<RawScene, LoadError>;
}

/// Format -> decoder table
pub struct LoaderRegistry {
    decoders: HashMap<ModelFormat, Arc<dyn Decoder>>,
}

impl LoaderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self { decoders: HashMap::new() }
    }

    /// Registry with every built-in decoder
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        let gltf: Arc<dyn Decoder> = Arc::new(gltf::GltfDecoder);
        registry.register(ModelFormat::Gltf, Arc::clone(&gltf));
        registry.register(ModelFormat::Glb, gltf);
        registry.register(ModelFormat::Obj, Arc::new(obj::ObjDecoder));
        registry.register(ModelFormat::Stl, Arc::new(stl::StlDecoder));
        registry.register(ModelFormat::Fbx, Arc::new(fbx::FbxDecoder));
        registry.register(ModelFormat::Dae, Arc::new(dae::DaeDecoder));
        registry
    }

    pub fn register(&mut self, format: ModelFormat, decoder: Arc<dyn Decoder>) {
        self.decoders.insert(format, decoder);
    }

    pub fn get(&self, format: ModelFormat) -> Option<&Arc<dyn Decoder>> {
        self.decoders.get(&format)
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

/// Decode already-fetched bytes and prepare them for display
pub fn build_scene(
    asset: &ModelAsset,
    bytes: &[u8],
    registry: &LoaderRegistry,
    ctx: &DecodeContext,
    target_size: f32,
) -> Result<LoadedScene, LoadError> {
    let decoder = registry
        .get(asset.format)
        .ok_or_else(|| LoadError::UnsupportedFormat(asset.format.to_string()))?;

    let mut raw = decoder.decode(bytes, ctx)?;
    ctx.check_cancelled()?;

    raw.root.for_each_mesh_mut(&mut |mesh| {
        mesh.sanitize();
        mesh.compute_normals_if_missing();
    });
    let stats = raw.root.stats();
    if stats.triangles == 0 {
        return Err(LoadError::Decode("file contains no triangles".to_string()));
    }

    let (mut root, norm) = normalize(raw.root, target_size);
    let report = correct_materials(&mut root);
    log::info!(
        "decoded {} ({}): {} meshes, {} vertices, {} triangles, {} default materials",
        asset.url,
        asset.format,
        stats.meshes,
        stats.vertices,
        stats.triangles,
        report.defaulted
    );

    Ok(LoadedScene {
        url: asset.url.clone(),
        format: asset.format,
        root,
        bounding_box: norm.bounds,
        center: norm.center,
        extent_scale: norm.scale,
        skeleton: raw.skeleton,
        stats,
    })
}

/// Fetch, decode, normalize and correct one model (runs off the render thread)
pub fn load_scene(
    asset: &ModelAsset,
    registry: &LoaderRegistry,
    ctx: &DecodeContext,
    target_size: f32,
) -> Result<LoadedScene, LoadError> {
    if registry.get(asset.format).is_none() {
        return Err(LoadError::UnsupportedFormat(asset.format.to_string()));
    }
    let bytes = fetch::fetch(&asset.url)?;
    ctx.check_cancelled()?;
    build_scene(asset, &bytes, registry, ctx, target_size)
}

/// What the viewer shows for the current model
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    /// No model requested
    Empty,
    Loading { url: String },
    Ready,
    Failed { message: String },
    /// No decoder for the URL (expected; shows "no preview")
    Unsupported,
}

/// Result of polling the loader
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(Box<LoadedScene>),
    Failed(LoadError),
}

struct PendingLoad {
    op: AsyncOp<Result<LoadedScene, LoadError>>,
    generation: u64,
    cancel: Arc<AtomicBool>,
    asset: ModelAsset,
}

/// Runs loads in the background; only the newest request can land
pub struct ModelLoader {
    registry: Arc<LoaderRegistry>,
    codecs: Arc<CodecProvider>,
    target_size: f32,
    generation: u64,
    current: Option<PendingLoad>,
    superseded: Vec<PendingLoad>,
}

impl ModelLoader {
    pub fn new(registry: Arc<LoaderRegistry>, codecs: Arc<CodecProvider>, target_size: f32) -> Self {
        Self {
            registry,
            codecs,
            target_size,
            generation: 0,
            current: None,
            superseded: Vec::new(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.current.is_some()
    }

    /// Start loading `url`. Supersedes anything in flight. Returns the state
    /// the viewer should show until the load finishes.
    pub fn request(&mut self, url: &str, hint: Option<&str>) -> LoadState {
        self.cancel();

        if url.trim().is_empty() {
            return LoadState::Empty;
        }
        let Some(format) = resolve_format(url, hint) else {
            log::info!("no decoder for {} (hint {:?})", url, hint);
            return LoadState::Unsupported;
        };
        if self.registry.get(format).is_none() {
            log::info!("no decoder registered for {}", format);
            return LoadState::Unsupported;
        }

        let asset = ModelAsset { url: url.to_string(), format };
        let cancel = Arc::new(AtomicBool::new(false));
        let ctx = DecodeContext::new(url, Arc::clone(&self.codecs), Arc::clone(&cancel));
        let registry = Arc::clone(&self.registry);
        let target_size = self.target_size;
        let worker_asset = asset.clone();

        log::info!("loading {} as {} (generation {})", url, format, self.generation);
        let op = AsyncOp::spawn("model-load", move || load_scene(&worker_asset, &registry, &ctx, target_size));
        self.current = Some(PendingLoad {
            op,
            generation: self.generation,
            cancel,
            asset,
        });
        LoadState::Loading { url: url.to_string() }
    }

    /// Invalidate the in-flight load, if any
    pub fn cancel(&mut self) {
        self.generation += 1;
        if let Some(pending) = self.current.take() {
            pending.cancel.store(true, Ordering::Relaxed);
            self.superseded.push(pending);
        }
    }

    /// Poll once per frame. Returns the outcome of the current load when it
    /// finishes; superseded results are discarded here.
    pub fn poll(&mut self) -> Option<LoadOutcome> {
        self.superseded.retain_mut(|pending| match pending.op.poll() {
            Poll::Pending => true,
            Poll::Ready(_) | Poll::Lost => {
                log::debug!(
                    "dropping superseded load of {} (generation {})",
                    pending.asset.url,
                    pending.generation
                );
                false
            }
        });

        let pending = self.current.as_mut()?;
        let outcome = match pending.op.poll() {
            Poll::Pending => return None,
            Poll::Ready(result) => result,
            Poll::Lost => Err(LoadError::Decode("decoder crashed".to_string())),
        };
        let generation = pending.generation;
        let url = pending.asset.url.clone();
        self.current = None;

        if generation != self.generation {
            log::debug!("dropping stale load of {}", url);
            return None;
        }

        match outcome {
            Ok(scene) => Some(LoadOutcome::Loaded(Box::new(scene))),
            Err(LoadError::Cancelled) => None,
            Err(e) => {
                log::warn!("failed to load {}: {}", url, e);
                Some(LoadOutcome::Failed(e))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::scene::{Mesh, SceneNode};
    use crate::math::Vec3;
    use std::time::{Duration, Instant};

    /// Block until the loader reports an outcome
    pub(crate) fn wait_for(loader: &mut ModelLoader) -> Option<LoadOutcome> {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if let Some(outcome) = loader.poll() {
                return Some(outcome);
            }
            if !loader.is_loading() {
                return None;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        None
    }

    #[test]
    fn test_resolve_format_from_url() {
        assert_eq!(resolve_format("model.glb", None), Some(ModelFormat::Glb));
        assert_eq!(resolve_format("https://x.io/a/Chair.OBJ?token=1#top", None), Some(ModelFormat::Obj));
        assert_eq!(resolve_format("scene.gltf", Some("")), Some(ModelFormat::Gltf));
        assert_eq!(resolve_format("thing.xyz", None), None);
        assert_eq!(resolve_format("no_extension", None), None);
        assert_eq!(resolve_format("https://x.io/v1.2/download?f=a.stl", None), None);
    }

    #[test]
    fn test_hint_wins_over_extension() {
        assert_eq!(resolve_format("blob/1234", Some("FBX")), Some(ModelFormat::Fbx));
        assert_eq!(resolve_format("model.obj", Some("dae")), Some(ModelFormat::Dae));
        assert_eq!(resolve_format("model.obj", Some("3ds")), None);
    }

    #[test]
    fn test_unsupported_extension_is_not_an_error() {
        let mut loader = ModelLoader::new(Arc::new(LoaderRegistry::with_builtin()), Arc::new(CodecProvider::new()), 4.0);
        assert_eq!(loader.request("model.xyz", None), LoadState::Unsupported);
        assert!(!loader.is_loading());
        assert!(loader.poll().is_none());
    }

    #[test]
    fn test_empty_registry_reports_unsupported() {
        let mut loader = ModelLoader::new(Arc::new(LoaderRegistry::new()), Arc::new(CodecProvider::new()), 4.0);
        assert_eq!(loader.request("model.obj", None), LoadState::Unsupported);
    }

    struct SlowDecoder;

    impl Decoder for SlowDecoder {
        fn decode(&self, bytes: &[u8], ctx: &DecodeContext) -> Result<RawScene, LoadError> {
            if bytes.starts_with(b"slow") {
                std::thread::sleep(Duration::from_millis(200));
                ctx.check_cancelled()?;
            }
            let mut mesh = Mesh::new("m");
            mesh.positions = vec![Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0), Vec3::new(0.0, 8.0, 4.0)];
            mesh.indices = vec![0, 1, 2];
            Ok(RawScene { root: SceneNode::with_mesh("root", mesh), skeleton: Vec::new() })
        }
    }

    #[test]
    fn test_superseded_load_never_lands() {
        let dir = tempfile::tempdir().unwrap();
        let slow = dir.path().join("slow.stl");
        let fast = dir.path().join("fast.stl");
        std::fs::write(&slow, b"slow").unwrap();
        std::fs::write(&fast, b"fast").unwrap();

        let mut registry = LoaderRegistry::new();
        registry.register(ModelFormat::Stl, Arc::new(SlowDecoder));
        let mut loader = ModelLoader::new(Arc::new(registry), Arc::new(CodecProvider::new()), 4.0);

        let slow_url = slow.to_string_lossy().to_string();
        let fast_url = fast.to_string_lossy().to_string();
        assert!(matches!(loader.request(&slow_url, None), LoadState::Loading { .. }));
        assert!(matches!(loader.request(&fast_url, None), LoadState::Loading { .. }));

        match wait_for(&mut loader) {
            Some(LoadOutcome::Loaded(scene)) => assert_eq!(scene.url, fast_url),
            other => panic!("unexpected outcome {:?}", other.map(|_| ())),
        }

        // Let the slow worker finish; its result must be dropped
        std::thread::sleep(Duration::from_millis(300));
        assert!(loader.poll().is_none());
    }

    #[test]
    fn test_missing_file_fails_with_fetch_error() {
        let mut loader = ModelLoader::new(Arc::new(LoaderRegistry::with_builtin()), Arc::new(CodecProvider::new()), 4.0);
        loader.request("/definitely/not/here/model.obj", None);
        match wait_for(&mut loader) {
            Some(LoadOutcome::Failed(LoadError::Fetch(_))) => {}
            other => panic!("expected fetch failure, got {:?}", other.map(|_| ())),
        }
    }
}

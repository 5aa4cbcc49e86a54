//! The viewer
//!
//! `Viewer` owns one model and everything derived from it. The host hands it
//! a `ViewerInputs` value every frame; the viewer diffs it against what it
//! saw last and only does work for what changed:
//! - a new `(url, format)` supersedes the current load
//! - new material settings re-apply overrides to every material
//! - new camera settings re-seed the orbit camera
//! - a new reference-object list rebuilds the proxies
//!
//! Drawing lives in `render`; the rest of this module never touches the GPU.

pub mod camera;
pub mod composition;
pub mod render;
pub mod shading;

use std::sync::Arc;

use crate::capture::{CaptureSender, CaptureService, FrameSource, NoticeLevel, ViewerEvent, ViewerObserver};
use crate::config::{CameraSettings, LightingSettings, MaterialOverride, PhysicsSettings, ViewerConfig, ViewerSettings};
use crate::loader::codec::CodecProvider;
use crate::loader::{fetch, LoadOutcome, LoadState, LoaderRegistry, ModelLoader};
use crate::math::{Mat4, Vec3};
use crate::scene::primitives::{placeholder, PlaceholderKind};
use crate::scene::{apply_material_state, ImageData, LoadedScene, MaterialState, SceneNode, SceneStats};
use crate::sim::exploded::EXPLODE_SPREAD;
use crate::sim::{self, ExplodedView, Pose, SimInput, SimState};
use crate::task::{AsyncOp, Poll};

pub use camera::OrbitCamera;
pub use composition::{
    contact_shadow, ground_height, layout_proxies, ContactShadow, Ground, LightRig, SceneObject,
    SceneObjectKind, SceneObjects, SkeletonOverlay,
};

/// Everything the host controls, compared against the previous frame's value
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerInputs {
    pub model_url: String,
    pub file_format: Option<String>,
    pub settings: ViewerSettings,
    pub lighting: LightingSettings,
    pub camera: CameraSettings,
    pub is_playing: bool,
    /// 0..100
    pub animation_progress: f32,
    pub selected_pose: Option<Pose>,
    pub scene_objects: Vec<SceneObject>,
    pub physics: PhysicsSettings,
    pub physics_active: bool,
    /// URL of an image applied as every material's color map
    pub selected_texture: Option<String>,
    pub material_override: MaterialOverride,
    pub exploded: bool,
}

impl ViewerInputs {
    pub fn from_config(config: &ViewerConfig) -> Self {
        Self {
            model_url: String::new(),
            file_format: None,
            settings: config.viewer,
            lighting: config.lighting,
            camera: config.camera,
            is_playing: false,
            animation_progress: 0.0,
            selected_pose: None,
            scene_objects: Vec::new(),
            physics: config.physics,
            physics_active: false,
            selected_texture: None,
            material_override: MaterialOverride::default(),
            exploded: false,
        }
    }

    fn sim_input(&self) -> SimInput {
        SimInput {
            auto_rotate: self.settings.auto_rotate,
            physics_active: self.physics_active,
            physics: self.physics,
            is_playing: self.is_playing,
            progress: self.animation_progress,
            pose: self.selected_pose,
        }
    }
}

/// Host-selected texture and its background load
#[derive(Default)]
struct SelectedTexture {
    url: Option<String>,
    pending: Option<AsyncOp<Result<ImageData, String>>>,
    image: Option<Arc<ImageData>>,
}

impl SelectedTexture {
    /// Start loading `url` if it differs from the current one
    fn request(&mut self, url: Option<&str>) {
        if self.url.as_deref() == url {
            return;
        }
        self.url = url.map(str::to_string);
        self.image = None;
        self.pending = url.map(|url| {
            let url = url.to_string();
            log::info!("loading texture {}", url);
            AsyncOp::spawn("texture-load", move || {
                let bytes = fetch::fetch(&url).map_err(|e| e.to_string())?;
                ImageData::decode(&bytes)
            })
        });
    }

    /// Returns an error message when the load failed
    fn poll(&mut self) -> Option<String> {
        let op = self.pending.as_mut()?;
        let result = match op.poll() {
            Poll::Pending => return None,
            Poll::Ready(result) => result,
            Poll::Lost => Err("texture worker crashed".to_string()),
        };
        self.pending = None;
        match result {
            Ok(image) => {
                self.image = Some(Arc::new(image));
                None
            }
            Err(e) => Some(e),
        }
    }
}

/// Proxy nodes plus the inputs they were laid out from
#[derive(Default)]
struct Proxies {
    objects: Vec<SceneObject>,
    half_width: f32,
    ground_y: f32,
    nodes: Vec<SceneNode>,
}

pub struct Viewer {
    loader: ModelLoader,
    load_state: LoadState,
    /// Last `(url, format)` handed to the loader
    requested: Option<(String, Option<String>)>,
    scene: Option<LoadedScene>,
    placeholder: SceneNode,
    exploded: Option<ExplodedView>,

    sim: SimState,
    camera: OrbitCamera,
    lighting: LightingSettings,
    rig: LightRig,

    texture: SelectedTexture,
    material_state: Option<MaterialState>,
    /// Bumped whenever mesh or material data changes (render-side caches key on it)
    revision: u64,

    proxies: Proxies,
    capture: CaptureService,
    observer: Box<dyn ViewerObserver>,
}

impl Viewer {
    pub fn new(config: &ViewerConfig, observer: Box<dyn ViewerObserver>) -> Self {
        Self::with_registry(config, Arc::new(LoaderRegistry::with_builtin()), Arc::new(CodecProvider::new()), observer)
    }

    pub fn with_registry(
        config: &ViewerConfig,
        registry: Arc<LoaderRegistry>,
        codecs: Arc<CodecProvider>,
        observer: Box<dyn ViewerObserver>,
    ) -> Self {
        Self {
            loader: ModelLoader::new(registry, codecs, config.target_size),
            load_state: LoadState::Empty,
            requested: None,
            scene: None,
            placeholder: placeholder(PlaceholderKind::Unsupported),
            exploded: None,
            sim: SimState::new(),
            camera: OrbitCamera::new(&config.camera),
            lighting: config.lighting,
            rig: LightRig::from_settings(&config.lighting),
            texture: SelectedTexture::default(),
            material_state: None,
            revision: 0,
            proxies: Proxies::default(),
            capture: CaptureService::new(),
            observer,
        }
    }

    /// Advance one frame
    pub fn update(&mut self, inputs: &ViewerInputs, dt: f32) {
        self.update_load(inputs);
        self.update_materials(inputs);

        self.camera.apply_settings(&inputs.camera);
        if inputs.lighting != self.lighting {
            self.lighting = inputs.lighting;
            self.rig = LightRig::from_settings(&self.lighting);
        }

        self.sim = sim::update(self.sim, &inputs.sim_input(), dt);
        self.update_exploded(inputs.exploded);
        self.update_proxies(&inputs.scene_objects);
    }

    fn update_load(&mut self, inputs: &ViewerInputs) {
        let key = (inputs.model_url.clone(), inputs.file_format.clone());
        if self.requested.as_ref() != Some(&key) {
            self.load_state = self.loader.request(&key.0, key.1.as_deref());
            self.requested = Some(key);
            // Never keep showing the previous asset
            self.scene = None;
            self.exploded = None;
            self.placeholder = placeholder(match self.load_state {
                LoadState::Loading { .. } => PlaceholderKind::Loading,
                _ => PlaceholderKind::Unsupported,
            });
            self.revision += 1;
        }

        match self.loader.poll() {
            Some(LoadOutcome::Loaded(scene)) => self.install(*scene),
            Some(LoadOutcome::Failed(e)) => {
                let message = e.to_string();
                let url = inputs.model_url.clone();
                self.placeholder = placeholder(PlaceholderKind::Error);
                self.load_state = LoadState::Failed { message: message.clone() };
                self.revision += 1;
                self.observer.on_event(ViewerEvent::LoadFailed { url, message });
            }
            None => {}
        }
    }

    fn install(&mut self, mut scene: LoadedScene) {
        log::info!(
            "showing {} ({} meshes, {} triangles)",
            scene.url,
            scene.stats.meshes,
            scene.stats.triangles
        );
        if let Some(state) = &self.material_state {
            apply_material_state(&mut scene.root, state);
        }
        self.exploded = scene.parts_mut().map(|parts| ExplodedView::capture(parts));
        self.scene = Some(scene);
        self.load_state = LoadState::Ready;
        self.revision += 1;
    }

    fn update_materials(&mut self, inputs: &ViewerInputs) {
        self.texture.request(inputs.selected_texture.as_deref());
        if let Some(error) = self.texture.poll() {
            log::warn!("selected texture failed: {}", error);
            self.observer.on_event(ViewerEvent::Notify {
                level: NoticeLevel::Warning,
                message: format!("Texture failed to load: {}", error),
            });
        }

        let state = MaterialState {
            topology: inputs.settings.topology_mode,
            material_override: inputs.material_override,
            wireframe: inputs.settings.wireframe,
            selected_texture: self.texture.image.clone(),
        };
        if self.material_state.as_ref().is_some_and(|s| s.same_as(&state)) {
            return;
        }
        if let Some(scene) = &mut self.scene {
            let touched = apply_material_state(&mut scene.root, &state);
            log::debug!("re-applied material state to {} materials", touched);
            self.revision += 1;
        }
        self.material_state = Some(state);
    }

    fn update_exploded(&mut self, enabled: bool) {
        let (Some(view), Some(scene)) = (&mut self.exploded, &mut self.scene) else { return };
        let spread = EXPLODE_SPREAD / scene.extent_scale.max(f32::EPSILON);
        let Some(parts) = scene.parts_mut() else { return };
        if !view.step(parts, enabled, spread) {
            *view = ExplodedView::capture(parts);
        }
    }

    fn update_proxies(&mut self, objects: &[SceneObject]) {
        let half_width = self.model_half_width();
        let ground_y = self.ground_y();
        let p = &mut self.proxies;
        if p.objects.as_slice() == objects && p.half_width == half_width && p.ground_y == ground_y {
            return;
        }
        p.objects = objects.to_vec();
        p.half_width = half_width;
        p.ground_y = ground_y;
        p.nodes = layout_proxies(objects, half_width, ground_y);
    }

    fn model_half_width(&self) -> f32 {
        match &self.scene {
            Some(s) if !s.bounding_box.is_empty() => s.bounding_box.extent().x * s.extent_scale * 0.5,
            _ => 1.0,
        }
    }

    /// Take capture requests; call at the start of a frame, before drawing
    pub fn begin_frame(&mut self, now: f64, source: &dyn FrameSource) {
        let name = self.model_name();
        self.capture.begin_frame(now, source, &name, self.observer.as_mut());
    }

    /// Read back pending screenshots and recording frames; call after the
    /// scene is drawn and before the frame is presented
    pub fn end_frame(&mut self, now: f64, source: &mut dyn FrameSource) {
        let name = self.model_name();
        self.capture.end_frame(now, source, &name, self.observer.as_mut());
    }

    pub fn capture_sender(&self) -> CaptureSender {
        self.capture.sender()
    }

    pub fn is_recording(&self) -> bool {
        self.capture.is_recording()
    }

    /// File stem of the current model, for artifact names
    pub fn model_name(&self) -> String {
        model_stem(self.requested.as_ref().map(|(u, _)| u.as_str()).unwrap_or(""))
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub fn scene(&self) -> Option<&LoadedScene> {
        self.scene.as_ref()
    }

    /// What to draw: the loaded scene or the placeholder for the current state
    pub fn model_root(&self) -> &SceneNode {
        match &self.scene {
            Some(scene) => &scene.root,
            None => &self.placeholder,
        }
    }

    pub fn stats(&self) -> Option<SceneStats> {
        self.scene.as_ref().map(|s| s.stats)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn sim(&self) -> &SimState {
        &self.sim
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.sim.model_matrix()
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut OrbitCamera {
        &mut self.camera
    }

    pub fn rig(&self) -> &LightRig {
        &self.rig
    }

    pub fn ground_y(&self) -> f32 {
        ground_height(self.scene.as_ref())
    }

    pub fn ground(&self) -> Ground {
        Ground {
            y: self.ground_y(),
            slices: 20,
            spacing: 0.5,
        }
    }

    pub fn contact_shadow(&self) -> Option<ContactShadow> {
        if !self.rig.shadows {
            return None;
        }
        let footprint = match &self.scene {
            Some(s) if !s.bounding_box.is_empty() => {
                let e = s.bounding_box.extent();
                e.x.max(e.z) * s.extent_scale * 0.5
            }
            _ => 1.0,
        };
        contact_shadow(footprint, self.ground_y(), self.sim.position, self.sim.height())
    }

    pub fn skeleton(&self) -> Option<SkeletonOverlay> {
        let scene = self.scene.as_ref()?;
        if scene.skeleton.is_empty() {
            return None;
        }
        Some(SkeletonOverlay::build(scene, &self.model_matrix()))
    }

    pub fn proxies(&self) -> &[SceneNode] {
        &self.proxies.nodes
    }

    /// Eye position in world space
    pub fn eye(&self) -> Vec3 {
        self.camera.position()
    }
}

fn model_stem(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let file = path.rsplit(['/', '\\']).next().unwrap_or("");
    let stem = file.rsplit_once('.').map(|(s, _)| s).unwrap_or(file);
    if stem.is_empty() {
        "vitrine".to_string()
    } else {
        stem.to_string()
    }
}

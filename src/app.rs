//! Host shell
//!
//! Plays the part of the page that embeds the viewer: it owns the
//! `ViewerInputs`, turns key presses into input changes and capture
//! requests, shows notifications, and saves finished artifacts.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use macroquad::color::Color;
use macroquad::input::{is_key_pressed, is_mouse_button_down, mouse_position, mouse_wheel, KeyCode, MouseButton};
use macroquad::shapes::draw_rectangle;
use macroquad::text::{draw_text, measure_text};
use macroquad::window::{screen_height, screen_width};

use crate::capture::{CaptureRequest, CaptureSender, ExportFormat, NoticeLevel, ViewerEvent, ViewerObserver};
use crate::config::ViewerConfig;
use crate::loader::{LoadState, ModelFormat};
use crate::sim::{advance_progress, Pose};
use crate::viewer::render::{Renderer, ScreenFrameSource};
use crate::viewer::{SceneObjectKind, SceneObjects, Viewer, ViewerInputs};

/// Animation progress per second while playing (one loop every two seconds)
pub const ANIMATION_RATE: f32 = 50.0;
const STATUS_SECS: f64 = 3.0;
const ERROR_STATUS_SECS: f64 = 6.0;
const HUD_FONT: f32 = 18.0;

/// Everything a key press can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    OpenFile,
    ToggleAutoRotate,
    ToggleWireframe,
    ToggleSkeleton,
    ToggleGrid,
    CycleTopology,
    CycleEnvironment,
    TogglePhysics,
    TogglePlay,
    SelectPose(Option<Pose>),
    ToggleExploded,
    AddReference(SceneObjectKind),
    RemoveLastReference,
    ClearReferences,
    Screenshot,
    Record,
    Export(ExportFormat),
    ResetCamera,
}

const KEY_BINDINGS: &[(KeyCode, Action)] = &[
    (KeyCode::O, Action::OpenFile),
    (KeyCode::Space, Action::ToggleAutoRotate),
    (KeyCode::W, Action::ToggleWireframe),
    (KeyCode::K, Action::ToggleSkeleton),
    (KeyCode::G, Action::ToggleGrid),
    (KeyCode::T, Action::CycleTopology),
    (KeyCode::L, Action::CycleEnvironment),
    (KeyCode::F, Action::TogglePhysics),
    (KeyCode::Enter, Action::TogglePlay),
    (KeyCode::Key1, Action::SelectPose(Some(Pose::TPose))),
    (KeyCode::Key2, Action::SelectPose(Some(Pose::APose))),
    (KeyCode::Key3, Action::SelectPose(Some(Pose::Crouch))),
    (KeyCode::Key4, Action::SelectPose(Some(Pose::Jump))),
    (KeyCode::Key5, Action::SelectPose(Some(Pose::Sit))),
    (KeyCode::Key6, Action::SelectPose(Some(Pose::Wave))),
    (KeyCode::Key0, Action::SelectPose(None)),
    (KeyCode::X, Action::ToggleExploded),
    (KeyCode::H, Action::AddReference(SceneObjectKind::Human)),
    (KeyCode::C, Action::AddReference(SceneObjectKind::Crate)),
    (KeyCode::Backspace, Action::RemoveLastReference),
    (KeyCode::Delete, Action::ClearReferences),
    (KeyCode::P, Action::Screenshot),
    (KeyCode::R, Action::Record),
    (KeyCode::E, Action::Export(ExportFormat::Json)),
    (KeyCode::B, Action::Export(ExportFormat::Bvh)),
    (KeyCode::J, Action::Export(ExportFormat::Ron)),
    (KeyCode::Home, Action::ResetCamera),
];

/// Apply an input-changing action. Returns a capture request for the
/// actions that produce one; file dialogs and camera resets are handled by
/// the caller.
pub fn apply_action(
    inputs: &mut ViewerInputs,
    objects: &mut SceneObjects,
    config: &ViewerConfig,
    action: Action,
) -> Option<CaptureRequest> {
    let settings = &mut inputs.settings;
    match action {
        Action::ToggleAutoRotate => settings.auto_rotate = !settings.auto_rotate,
        Action::ToggleWireframe => settings.wireframe = !settings.wireframe,
        Action::ToggleSkeleton => settings.show_skeleton = !settings.show_skeleton,
        Action::ToggleGrid => settings.show_grid = !settings.show_grid,
        Action::CycleTopology => settings.topology_mode = settings.topology_mode.next(),
        Action::CycleEnvironment => settings.environment = settings.environment.next(),
        Action::TogglePhysics => inputs.physics_active = !inputs.physics_active,
        Action::TogglePlay => inputs.is_playing = !inputs.is_playing,
        Action::SelectPose(pose) => inputs.selected_pose = pose,
        Action::ToggleExploded => inputs.exploded = !inputs.exploded,
        Action::AddReference(kind) => {
            objects.add(kind, kind.label(), 1.0);
        }
        Action::RemoveLastReference => {
            objects.remove_last();
        }
        Action::ClearReferences => objects.clear(),
        Action::Screenshot => return Some(CaptureRequest::Screenshot),
        Action::Record => {
            return Some(CaptureRequest::StartRecording {
                duration_secs: config.recording.duration_secs,
                fps: config.recording.fps,
            })
        }
        Action::Export(format) => return Some(CaptureRequest::ExportAnimation(format)),
        Action::OpenFile | Action::ResetCamera => {}
    }
    inputs.scene_objects = objects.as_slice().to_vec();
    None
}

/// A message for the status line
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Turn a viewer event into a notice, saving artifacts under `output_dir`
pub fn deliver(event: ViewerEvent, output_dir: &Path) -> Notice {
    let saved = |what: &str, artifact: crate::capture::Artifact| match artifact.save_to(output_dir) {
        Ok(path) => {
            log::info!("saved {}", path.display());
            Notice {
                level: NoticeLevel::Info,
                message: format!("{} saved to {}", what, path.display()),
            }
        }
        Err(e) => Notice {
            level: NoticeLevel::Error,
            message: format!("Could not save {}: {}", what.to_lowercase(), e),
        },
    };

    match event {
        ViewerEvent::Notify { level, message } => Notice { level, message },
        ViewerEvent::ScreenshotReady(a) => saved("Screenshot", a),
        ViewerEvent::RecordingComplete(a) => saved("Recording", a),
        ViewerEvent::ExportComplete(a) => saved("Animation", a),
        ViewerEvent::RecordingProgress { percent } => Notice {
            level: NoticeLevel::Info,
            message: format!("Recording... {}%", percent),
        },
        ViewerEvent::LoadFailed { url, message } => Notice {
            level: NoticeLevel::Error,
            message: format!("Failed to load {}: {}", url, message),
        },
        ViewerEvent::CaptureFailed(e) => Notice {
            level: NoticeLevel::Error,
            message: format!("Capture failed: {}", e),
        },
    }
}

/// Events queued by the viewer, drained by the shell once per frame
#[derive(Clone, Default)]
struct EventQueue(Rc<RefCell<Vec<ViewerEvent>>>);

impl EventQueue {
    fn drain(&self) -> Vec<ViewerEvent> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

impl ViewerObserver for EventQueue {
    fn on_event(&mut self, event: ViewerEvent) {
        self.0.borrow_mut().push(event);
    }
}

pub struct App {
    config: ViewerConfig,
    inputs: ViewerInputs,
    viewer: Viewer,
    renderer: Renderer,
    events: EventQueue,
    capture: CaptureSender,
    objects: SceneObjects,
    status: Option<(Notice, f64)>,
    last_mouse: (f32, f32),
}

impl App {
    pub fn new(config: ViewerConfig, url: Option<String>, format: Option<String>) -> Self {
        let events = EventQueue::default();
        let viewer = Viewer::new(&config, Box::new(events.clone()));
        let mut inputs = ViewerInputs::from_config(&config);
        inputs.model_url = url.unwrap_or_default();
        inputs.file_format = format;
        Self {
            capture: viewer.capture_sender(),
            config,
            inputs,
            viewer,
            renderer: Renderer::new(),
            events,
            objects: SceneObjects::new(),
            status: None,
            last_mouse: mouse_position(),
        }
    }

    /// One frame: capture requests, input, simulation, drawing, readback
    pub fn frame(&mut self, now: f64, dt: f32) {
        self.viewer.begin_frame(now, &ScreenFrameSource);

        for &(key, action) in KEY_BINDINGS {
            if is_key_pressed(key) {
                self.perform(action, now);
            }
        }
        self.handle_mouse();

        if self.inputs.is_playing {
            self.inputs.animation_progress = advance_progress(self.inputs.animation_progress, dt * ANIMATION_RATE);
        }
        self.viewer.update(&self.inputs, dt);

        for event in self.events.drain() {
            let notice = deliver(event, &self.config.output_dir);
            let secs = if notice.level == NoticeLevel::Error { ERROR_STATUS_SECS } else { STATUS_SECS };
            self.status = Some((notice, now + secs));
        }

        self.renderer.draw(&self.viewer, &self.inputs.settings);
        // Before the HUD so captures show only the scene
        self.viewer.end_frame(now, &mut ScreenFrameSource);
        self.draw_hud(now);
    }

    fn perform(&mut self, action: Action, now: f64) {
        match action {
            Action::OpenFile => self.open_file(now),
            Action::ResetCamera => self.viewer.camera_mut().reset(),
            _ => {
                if let Some(request) = apply_action(&mut self.inputs, &mut self.objects, &self.config, action) {
                    self.capture.send(request);
                }
            }
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn open_file(&mut self, _now: f64) {
        let extensions: Vec<&str> = ModelFormat::ALL.iter().map(|f| f.extension()).collect();
        let dialog = rfd::FileDialog::new().add_filter("3D models", &extensions[..]);
        if let Some(path) = dialog.pick_file() {
            self.open_path(path);
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn open_file(&mut self, now: f64) {
        self.notify(NoticeLevel::Warning, "Opening files is not available in the browser", now);
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn open_path(&mut self, path: PathBuf) {
        log::info!("opening {}", path.display());
        self.inputs.model_url = path.to_string_lossy().to_string();
        self.inputs.file_format = None;
    }

    #[cfg(target_arch = "wasm32")]
    #[allow(dead_code)]
    fn notify(&mut self, level: NoticeLevel, message: &str, now: f64) {
        self.status = Some((
            Notice {
                level,
                message: message.to_string(),
            },
            now + STATUS_SECS,
        ));
    }

    fn handle_mouse(&mut self) {
        let (x, y) = mouse_position();
        let (dx, dy) = (x - self.last_mouse.0, y - self.last_mouse.1);
        self.last_mouse = (x, y);

        let camera = self.viewer.camera_mut();
        if is_mouse_button_down(MouseButton::Left) {
            camera.orbit(dx, dy);
        } else if is_mouse_button_down(MouseButton::Right) || is_mouse_button_down(MouseButton::Middle) {
            camera.pan(dx, dy);
        }
        let (_, scroll) = mouse_wheel();
        if scroll != 0.0 {
            camera.zoom(scroll.signum());
        }
    }

    fn hud_line(&self) -> String {
        let state = match self.viewer.load_state() {
            LoadState::Empty => "no model (press O to open)".to_string(),
            LoadState::Loading { url } => format!("loading {}", url),
            LoadState::Ready => self.viewer.model_name(),
            LoadState::Failed { message } => format!("error: {}", message),
            LoadState::Unsupported => "no preview available".to_string(),
        };
        let mut line = state;
        if let Some(stats) = self.viewer.stats() {
            line.push_str(&format!(
                "  |  {} meshes, {} verts, {} tris",
                stats.meshes, stats.vertices, stats.triangles
            ));
        }
        let settings = &self.inputs.settings;
        line.push_str(&format!(
            "  |  {} / {}  |  {:?}",
            settings.topology_mode.label(),
            settings.environment.label(),
            self.viewer.sim().mode
        ));
        if self.viewer.is_recording() {
            line.push_str("  |  REC");
        }
        if let Some(usage) = memory_stats::memory_stats() {
            line.push_str(&format!("  |  {:.0} MB", usage.physical_mem as f64 / (1024.0 * 1024.0)));
        }
        line
    }

    fn draw_hud(&mut self, now: f64) {
        let line = self.hud_line();
        draw_rectangle(0.0, 0.0, screen_width(), HUD_FONT + 10.0, Color::new(0.0, 0.0, 0.0, 0.5));
        draw_text(&line, 8.0, HUD_FONT + 2.0, HUD_FONT, Color::new(0.9, 0.9, 0.9, 1.0));

        if matches!(&self.status, Some((_, expires)) if now >= *expires) {
            self.status = None;
        }
        if let Some((notice, _)) = &self.status {
            let color = match notice.level {
                NoticeLevel::Info => Color::new(0.85, 0.95, 0.85, 1.0),
                NoticeLevel::Warning => Color::new(1.0, 0.85, 0.4, 1.0),
                NoticeLevel::Error => Color::new(1.0, 0.45, 0.45, 1.0),
            };
            let size = measure_text(&notice.message, None, HUD_FONT as u16, 1.0);
            let (x, y) = (12.0, screen_height() - 16.0);
            draw_rectangle(x - 6.0, y - size.height - 6.0, size.width + 12.0, size.height + 12.0, Color::new(0.0, 0.0, 0.0, 0.6));
            draw_text(&notice.message, x, y, HUD_FONT, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Artifact, CaptureError};
    use crate::config::TopologyMode;

    fn setup() -> (ViewerInputs, SceneObjects, ViewerConfig) {
        let config = ViewerConfig::default();
        (ViewerInputs::from_config(&config), SceneObjects::new(), config)
    }

    #[test]
    fn test_key_bindings_are_unique() {
        for (i, (key, _)) in KEY_BINDINGS.iter().enumerate() {
            assert!(KEY_BINDINGS[i + 1..].iter().all(|(k, _)| k != key), "{:?} bound twice", key);
        }
    }

    #[test]
    fn test_toggles_and_cycles() {
        let (mut inputs, mut objects, config) = setup();
        let auto = inputs.settings.auto_rotate;
        assert_eq!(apply_action(&mut inputs, &mut objects, &config, Action::ToggleAutoRotate), None);
        assert_eq!(inputs.settings.auto_rotate, !auto);

        let topology = inputs.settings.topology_mode;
        apply_action(&mut inputs, &mut objects, &config, Action::CycleTopology);
        assert_eq!(inputs.settings.topology_mode, topology.next());
        for _ in 1..TopologyMode::ALL.len() {
            apply_action(&mut inputs, &mut objects, &config, Action::CycleTopology);
        }
        assert_eq!(inputs.settings.topology_mode, topology);

        apply_action(&mut inputs, &mut objects, &config, Action::SelectPose(Some(Pose::Sit)));
        assert_eq!(inputs.selected_pose, Some(Pose::Sit));
        apply_action(&mut inputs, &mut objects, &config, Action::SelectPose(None));
        assert_eq!(inputs.selected_pose, None);
    }

    #[test]
    fn test_reference_objects_sync_into_inputs() {
        let (mut inputs, mut objects, config) = setup();
        apply_action(&mut inputs, &mut objects, &config, Action::AddReference(SceneObjectKind::Human));
        apply_action(&mut inputs, &mut objects, &config, Action::AddReference(SceneObjectKind::Crate));
        assert_eq!(inputs.scene_objects.len(), 2);
        assert_eq!(inputs.scene_objects[1].kind, SceneObjectKind::Crate);

        apply_action(&mut inputs, &mut objects, &config, Action::RemoveLastReference);
        assert_eq!(inputs.scene_objects.len(), 1);
        apply_action(&mut inputs, &mut objects, &config, Action::ClearReferences);
        assert!(inputs.scene_objects.is_empty());
    }

    #[test]
    fn test_capture_actions_produce_requests() {
        let (mut inputs, mut objects, config) = setup();
        assert_eq!(
            apply_action(&mut inputs, &mut objects, &config, Action::Record),
            Some(CaptureRequest::StartRecording {
                duration_secs: config.recording.duration_secs,
                fps: config.recording.fps,
            })
        );
        assert_eq!(
            apply_action(&mut inputs, &mut objects, &config, Action::Export(ExportFormat::Bvh)),
            Some(CaptureRequest::ExportAnimation(ExportFormat::Bvh))
        );
    }

    #[test]
    fn test_deliver_saves_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = Artifact {
            file_name: "shot.png".to_string(),
            mime: "image/png",
            bytes: vec![1, 2, 3],
        };
        let notice = deliver(ViewerEvent::ScreenshotReady(artifact), dir.path());
        assert_eq!(notice.level, NoticeLevel::Info);
        assert_eq!(std::fs::read(dir.path().join("shot.png")).unwrap(), vec![1, 2, 3]);

        let notice = deliver(ViewerEvent::CaptureFailed(CaptureError::Busy), dir.path());
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.contains("already in progress"));
    }
}

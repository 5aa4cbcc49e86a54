//! Capture and export channel
//!
//! The host talks to the viewer through two typed channels:
//! - requests (`CaptureRequest`) go in through a `CaptureSender`
//! - results and notifications (`ViewerEvent`) come out through the
//!   `ViewerObserver` the host injected
//!
//! Requests are serviced at frame boundaries. Encoding and serialization run
//! as background `AsyncOp`s, so a long export never stalls a frame.

pub mod export;
pub mod recording;
pub mod screenshot;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use crate::task::{AsyncOp, Poll};
pub use export::{AnimationExport, ExportFormat};
pub use recording::{RecordStep, Recorder};
pub use screenshot::{Frame, FrameSource};

/// Error type for capture and export
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// The runtime cannot do this (no readback, feature off)
    Unavailable(String),
    Encode(String),
    Io(String),
    /// A recording is already running
    Busy,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Unavailable(why) => write!(f, "capture unavailable: {}", why),
            CaptureError::Encode(e) => write!(f, "encode error: {}", e),
            CaptureError::Io(e) => write!(f, "IO error: {}", e),
            CaptureError::Busy => write!(f, "a recording is already in progress"),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<std::io::Error> for CaptureError {
    fn from(e: std::io::Error) -> Self {
        CaptureError::Io(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureRequest {
    Screenshot,
    StartRecording { duration_secs: f32, fps: u32 },
    ExportAnimation(ExportFormat),
}

/// A finished capture, ready to be saved or offered for download
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// Write into `dir` (created if missing), returning the full path
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf, CaptureError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Everything the viewer reports back to its host
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    Notify { level: NoticeLevel, message: String },
    ScreenshotReady(Artifact),
    RecordingProgress { percent: u32 },
    RecordingComplete(Artifact),
    ExportComplete(Artifact),
    LoadFailed { url: String, message: String },
    CaptureFailed(CaptureError),
}

/// Host-side subscriber for viewer events
pub trait ViewerObserver {
    fn on_event(&mut self, event: ViewerEvent);
}

/// Collects events; handy for hosts that drain once per frame
impl ViewerObserver for Vec<ViewerEvent> {
    fn on_event(&mut self, event: ViewerEvent) {
        self.push(event);
    }
}

/// Cloneable handle the host uses to send requests
#[derive(Debug, Clone)]
pub struct CaptureSender(Sender<CaptureRequest>);

impl CaptureSender {
    /// Returns false if the viewer is gone
    pub fn send(&self, request: CaptureRequest) -> bool {
        self.0.send(request).is_ok()
    }
}

enum JobKind {
    Screenshot,
    Recording,
    Export,
}

struct Job {
    kind: JobKind,
    op: AsyncOp<Result<Artifact, CaptureError>>,
}

/// Timestamped file name, e.g. `robot_screenshot_1712345678.png`
fn artifact_name(stem: &str, what: &str, extension: &str) -> String {
    let stamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let stem: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{}_{}_{}.{}", stem, what, stamp, extension)
}

/// Services capture requests against a frame source
pub struct CaptureService {
    sender: Sender<CaptureRequest>,
    requests: Receiver<CaptureRequest>,
    screenshot_pending: bool,
    recorder: Option<Recorder>,
    jobs: Vec<Job>,
    recording_enabled: bool,
}

impl CaptureService {
    pub fn new() -> Self {
        let (sender, requests) = mpsc::channel();
        Self {
            sender,
            requests,
            screenshot_pending: false,
            recorder: None,
            jobs: Vec::new(),
            recording_enabled: cfg!(feature = "recording"),
        }
    }

    pub fn sender(&self) -> CaptureSender {
        CaptureSender(self.sender.clone())
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    /// Run before the scene is drawn: takes new requests and delivers
    /// finished jobs. `now` is in seconds; `model_name` names artifacts.
    pub fn begin_frame(
        &mut self,
        now: f64,
        source: &dyn FrameSource,
        model_name: &str,
        observer: &mut dyn ViewerObserver,
    ) {
        loop {
            match self.requests.try_recv() {
                Ok(request) => self.handle(request, now, source, model_name, observer),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        self.poll_jobs(observer);
    }

    /// Run after the scene is drawn and before the frame is presented, so
    /// readback sees this frame's pixels.
    pub fn end_frame(
        &mut self,
        now: f64,
        source: &mut dyn FrameSource,
        model_name: &str,
        observer: &mut dyn ViewerObserver,
    ) {
        if std::mem::take(&mut self.screenshot_pending) {
            self.take_screenshot(source, model_name, observer);
        }
        self.sample_recording(now, source, model_name, observer);
    }

    fn handle(
        &mut self,
        request: CaptureRequest,
        now: f64,
        source: &dyn FrameSource,
        model_name: &str,
        observer: &mut dyn ViewerObserver,
    ) {
        match request {
            CaptureRequest::Screenshot => {
                if source.supports_readback() {
                    self.screenshot_pending = true;
                } else {
                    fail(observer, CaptureError::Unavailable("framebuffer readback not supported".to_string()));
                }
            }
            CaptureRequest::StartRecording { duration_secs, fps } => {
                if let Err(e) = self.start_recording(now, duration_secs, fps, source) {
                    fail(observer, e);
                } else {
                    log::info!("recording {:.1}s at {} fps", duration_secs, fps);
                    observer.on_event(ViewerEvent::Notify {
                        level: NoticeLevel::Info,
                        message: format!("Recording {:.0}s...", duration_secs),
                    });
                }
            }
            CaptureRequest::ExportAnimation(format) => {
                let name = model_name.to_string();
                log::info!("exporting animation as {}", format.extension());
                let op = AsyncOp::spawn("animation-export", move || {
                    let bytes = AnimationExport::sampled(&name).serialize(format)?;
                    Ok(Artifact {
                        file_name: artifact_name(&name, "animation", format.extension()),
                        mime: format.mime(),
                        bytes,
                    })
                });
                self.jobs.push(Job { kind: JobKind::Export, op });
            }
        }
    }

    fn start_recording(
        &mut self,
        now: f64,
        duration_secs: f32,
        fps: u32,
        source: &dyn FrameSource,
    ) -> Result<(), CaptureError> {
        if !self.recording_enabled {
            return Err(CaptureError::Unavailable("built without the recording feature".to_string()));
        }
        if !source.supports_readback() {
            return Err(CaptureError::Unavailable("framebuffer readback not supported".to_string()));
        }
        if self.recorder.is_some() || self.jobs.iter().any(|j| matches!(j.kind, JobKind::Recording)) {
            return Err(CaptureError::Busy);
        }
        self.recorder = Some(Recorder::start(now, duration_secs, fps)?);
        Ok(())
    }

    fn take_screenshot(&mut self, source: &mut dyn FrameSource, model_name: &str, observer: &mut dyn ViewerObserver) {
        let Some(frame) = source.grab() else {
            fail(observer, CaptureError::Unavailable("framebuffer readback failed".to_string()));
            return;
        };
        let file_name = artifact_name(model_name, "screenshot", "png");
        let op = AsyncOp::spawn("screenshot-encode", move || {
            let bytes = screenshot::encode_png(&frame)?;
            Ok(Artifact { file_name, mime: "image/png", bytes })
        });
        self.jobs.push(Job { kind: JobKind::Screenshot, op });
    }

    fn sample_recording(
        &mut self,
        now: f64,
        source: &mut dyn FrameSource,
        model_name: &str,
        observer: &mut dyn ViewerObserver,
    ) {
        let Some(recorder) = self.recorder.as_mut() else { return };
        match recorder.sample(now, source) {
            RecordStep::Idle => {}
            RecordStep::Progress(percent) => observer.on_event(ViewerEvent::RecordingProgress { percent }),
            RecordStep::Finished => {
                let Some(recorder) = self.recorder.take() else { return };
                let (frames, fps) = recorder.into_frames();
                log::info!("recording finished with {} frames, encoding", frames.len());
                observer.on_event(ViewerEvent::RecordingProgress { percent: 100 });
                let file_name = artifact_name(model_name, "recording", "gif");
                let op = AsyncOp::spawn("recording-encode", move || {
                    let bytes = recording::encode_gif(&frames, fps)?;
                    Ok(Artifact { file_name, mime: "image/gif", bytes })
                });
                self.jobs.push(Job { kind: JobKind::Recording, op });
            }
        }
    }

    fn poll_jobs(&mut self, observer: &mut dyn ViewerObserver) {
        self.jobs.retain_mut(|job| {
            let result = match job.op.poll() {
                Poll::Pending => return true,
                Poll::Ready(result) => result,
                Poll::Lost => Err(CaptureError::Encode("capture worker crashed".to_string())),
            };
            match result {
                Ok(artifact) => {
                    log::info!("{} ready ({} bytes)", artifact.file_name, artifact.bytes.len());
                    observer.on_event(match job.kind {
                        JobKind::Screenshot => ViewerEvent::ScreenshotReady(artifact),
                        JobKind::Recording => ViewerEvent::RecordingComplete(artifact),
                        JobKind::Export => ViewerEvent::ExportComplete(artifact),
                    });
                }
                Err(e) => fail(observer, e),
            }
            false
        });
    }
}

impl Default for CaptureService {
    fn default() -> Self {
        Self::new()
    }
}

fn fail(observer: &mut dyn ViewerObserver, error: CaptureError) {
    log::warn!("capture failed: {}", error);
    observer.on_event(ViewerEvent::CaptureFailed(error));
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::{ViewerEvent, ViewerObserver};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Observer whose events stay readable after it is boxed into a viewer
    #[derive(Clone, Default)]
    pub(crate) struct SharedEvents(Rc<RefCell<Vec<ViewerEvent>>>);

    impl SharedEvents {
        pub(crate) fn take(&self) -> Vec<ViewerEvent> {
            std::mem::take(&mut *self.0.borrow_mut())
        }
    }

    impl ViewerObserver for SharedEvents {
        fn on_event(&mut self, event: ViewerEvent) {
            self.0.borrow_mut().push(event);
        }
    }
}

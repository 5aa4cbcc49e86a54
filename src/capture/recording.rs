//! Duration-bounded frame recording into an animated GIF

use super::screenshot::{Frame, FrameSource};
use super::CaptureError;

/// Longest recording accepted
pub const MAX_DURATION_SECS: f32 = 30.0;
/// Frames wider than this are downsampled before encoding
const MAX_GIF_WIDTH: u32 = 640;

/// What a recorder did on one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStep {
    Idle,
    /// Whole-percent progress crossed a reporting step
    Progress(u32),
    /// Duration reached; frames are ready to encode
    Finished,
}

/// Collects frames from a `FrameSource` at a fixed rate
#[derive(Debug)]
pub struct Recorder {
    started: f64,
    duration: f64,
    interval: f64,
    next_frame: f64,
    frames: Vec<Frame>,
    reported: u32,
    fps: u32,
}

impl Recorder {
    pub fn start(now: f64, duration_secs: f32, fps: u32) -> Result<Self, CaptureError> {
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(CaptureError::Encode(format!("invalid recording duration {}", duration_secs)));
        }
        let fps = fps.clamp(1, 50);
        let duration = duration_secs.min(MAX_DURATION_SECS) as f64;
        Ok(Self {
            started: now,
            duration,
            interval: 1.0 / fps as f64,
            next_frame: now,
            frames: Vec::new(),
            reported: 0,
            fps,
        })
    }

    pub fn progress(&self, now: f64) -> f32 {
        (((now - self.started) / self.duration).clamp(0.0, 1.0) * 100.0) as f32
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Called once per frame with the current time
    pub fn sample(&mut self, now: f64, source: &mut dyn FrameSource) -> RecordStep {
        if now >= self.started + self.duration {
            return RecordStep::Finished;
        }
        if now >= self.next_frame {
            if let Some(frame) = source.grab() {
                self.frames.push(frame);
            }
            // Skip missed slots rather than bursting to catch up
            while self.next_frame <= now {
                self.next_frame += self.interval;
            }
        }
        // Report every 10%
        let step = (self.progress(now) as u32 / 10) * 10;
        if step > self.reported {
            self.reported = step;
            return RecordStep::Progress(step);
        }
        RecordStep::Idle
    }

    pub fn into_frames(self) -> (Vec<Frame>, u32) {
        (self.frames, self.fps)
    }
}

/// Encode frames as a looping GIF
#[cfg(feature = "recording")]
pub fn encode_gif(frames: &[Frame], fps: u32) -> Result<Vec<u8>, CaptureError> {
    use image::codecs::gif::{GifEncoder, Repeat};
    use image::Delay;

    if frames.is_empty() {
        return Err(CaptureError::Encode("no frames were captured".to_string()));
    }
    let step = frames[0].width.div_ceil(MAX_GIF_WIDTH).max(1);
    let delay = Delay::from_numer_denom_ms(1000, fps.max(1));

    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut out, 10);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
        for frame in frames {
            let image = frame.downsample(step).to_image()?;
            encoder
                .encode_frame(image::Frame::from_parts(image, 0, 0, delay))
                .map_err(|e| CaptureError::Encode(format!("GIF encode failed: {}", e)))?;
        }
    }
    Ok(out)
}

#[cfg(not(feature = "recording"))]
pub fn encode_gif(_frames: &[Frame], _fps: u32) -> Result<Vec<u8>, CaptureError> {
    Err(CaptureError::Unavailable("built without the recording feature".to_string()))
}

//! Framebuffer readback and PNG encoding

use std::io::Cursor;

use image::{ImageFormat, RgbaImage};

use super::CaptureError;

/// One RGBA8 frame, top row first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected || width == 0 || height == 0 {
            return Err(CaptureError::Encode(format!(
                "frame {}x{} has {} bytes, expected {}",
                width,
                height,
                rgba.len(),
                expected
            )));
        }
        Ok(Self { width, height, rgba })
    }

    /// Build from a bottom-up buffer (GL readback order)
    pub fn from_bottom_up(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, CaptureError> {
        let mut frame = Self::new(width, height, rgba)?;
        let row = width as usize * 4;
        let rows: Vec<&[u8]> = frame.rgba.chunks_exact(row).rev().collect();
        frame.rgba = rows.concat();
        Ok(frame)
    }

    /// Every `step`-th pixel in both directions
    pub fn downsample(&self, step: u32) -> Frame {
        let step = step.max(1);
        if step == 1 {
            return self.clone();
        }
        let (w, h) = (self.width.div_ceil(step), self.height.div_ceil(step));
        let mut rgba = Vec::with_capacity(w as usize * h as usize * 4);
        for y in (0..self.height).step_by(step as usize) {
            for x in (0..self.width).step_by(step as usize) {
                let i = (y as usize * self.width as usize + x as usize) * 4;
                rgba.extend_from_slice(&self.rgba[i..i + 4]);
            }
        }
        Frame { width: w, height: h, rgba }
    }

    pub fn to_image(&self) -> Result<RgbaImage, CaptureError> {
        RgbaImage::from_raw(self.width, self.height, self.rgba.clone())
            .ok_or_else(|| CaptureError::Encode("frame size mismatch".to_string()))
    }
}

/// Where frames come from. The render loop implements this over the window.
pub trait FrameSource {
    /// False when the runtime cannot read the framebuffer back
    fn supports_readback(&self) -> bool;
    fn grab(&mut self) -> Option<Frame>;
}

pub fn encode_png(frame: &Frame) -> Result<Vec<u8>, CaptureError> {
    let image = frame.to_image()?;
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| CaptureError::Encode(format!("PNG encode failed: {}", e)))?;
    Ok(out.into_inner())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Solid-color frames for capture tests. `drawn` stands in for the
    /// scene having been drawn into the buffer this frame.
    pub(crate) struct FakeSource {
        pub readback: bool,
        pub grabs: usize,
        pub drawn: bool,
        pub blank_grabs: usize,
    }

    impl FakeSource {
        pub(crate) fn new(readback: bool) -> Self {
            Self { readback, grabs: 0, drawn: true, blank_grabs: 0 }
        }
    }

    impl FrameSource for FakeSource {
        fn supports_readback(&self) -> bool {
            self.readback
        }

        fn grab(&mut self) -> Option<Frame> {
            if !self.readback {
                return None;
            }
            if !self.drawn {
                self.blank_grabs += 1;
            }
            self.grabs += 1;
            let shade = (self.grabs * 20 % 256) as u8;
            Frame::new(4, 2, [shade, 0, 0, 255].repeat(8)).ok()
        }
    }

    #[test]
    fn test_bottom_up_rows_are_flipped() {
        let rgba = [[1u8; 4], [2; 4]].concat();
        let frame = Frame::from_bottom_up(1, 2, rgba).unwrap();
        assert_eq!(&frame.rgba[..4], &[2, 2, 2, 2]);
    }

    #[test]
    fn test_png_signature() {
        let frame = Frame::new(2, 2, vec![255; 16]).unwrap();
        let png = encode_png(&frame).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let back = image::load_from_memory(&png).unwrap();
        assert_eq!(back.to_rgba8().dimensions(), (2, 2));
    }

    #[test]
    fn test_bad_size_is_rejected() {
        assert!(Frame::new(2, 2, vec![0; 15]).is_err());
        assert!(Frame::new(0, 0, vec![]).is_err());
    }

    #[test]
    fn test_downsample() {
        let frame = Frame::new(5, 3, vec![7; 60]).unwrap();
        let small = frame.downsample(2);
        assert_eq!((small.width, small.height), (3, 2));
        assert_eq!(small.rgba.len(), 24);
    }
}

//! Decoded frame container.
//!
//! - `Frame`: RGB24 pixels for one decoded video frame. Pixels are private.
//!
//! Frames are produced by a `VideoSource`, owned by a single analysis run, and
//! dropped after inference. The only way pixels reach a detector is
//! `Frame::run_detector`.

use anyhow::{anyhow, Result};

use crate::detect::{DetectorBackend, RawDetection};

/// One decoded frame. Not `Clone`: a frame belongs to exactly one analysis run.
pub struct Frame {
    /// Packed RGB24 rows, `width * height * 3` bytes.
    pixels: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// Zero-based position of this frame in decode order.
    pub index: u64,
}

impl Frame {
    /// Wrap decoded RGB24 pixels. Fails if the buffer does not match the dimensions.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{} frame, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            index,
        })
    }

    /// Run a detector on this frame. The backend sees the pixels only for the duration of the call.
    pub fn run_detector(&self, backend: &mut dyn DetectorBackend) -> Result<Vec<RawDetection>> {
        backend.detect(&self.pixels, self.width, self.height)
    }

    pub(crate) fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    struct EchoDimensions;

    impl DetectorBackend for EchoDimensions {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>> {
            Ok(vec![RawDetection {
                class_id: pixels.len() as u32,
                confidence: 1.0,
                bbox: BoundingBox::new(0.0, 0.0, width as f32, height as f32),
            }])
        }
    }

    #[test]
    fn frame_rejects_mismatched_buffer() {
        assert!(Frame::new(vec![0u8; 10], 2, 2, 0).is_err());
        assert!(Frame::new(vec![0u8; 12], 2, 2, 0).is_ok());
    }

    #[test]
    fn detector_receives_frame_pixels_and_dimensions() {
        let frame = Frame::new(vec![7u8; 4 * 3 * 3], 4, 3, 9).unwrap();
        let out = frame.run_detector(&mut EchoDimensions).unwrap();
        assert_eq!(out[0].class_id, 36);
        assert_eq!(out[0].bbox.to_array(), [0.0, 0.0, 4.0, 3.0]);
        assert_eq!(frame.byte_len(), 36);
    }

    #[test]
    fn debug_output_omits_pixels() {
        let frame = Frame::new(vec![1u8; 3], 1, 1, 2).unwrap();
        let rendered = format!("{:?}", frame);
        assert!(rendered.contains("index: 2"));
        assert!(!rendered.contains("pixels"));
    }
}

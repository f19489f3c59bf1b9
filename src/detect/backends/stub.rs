use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, RawDetection};

/// Number of classes in the detector taxonomy.
const CLASS_COUNT: u32 = 80;

/// Stub backend for demos and tests. Derives pseudo-detections from a pixel digest,
/// so identical frames always yield identical detections.
#[derive(Default)]
pub struct StubBackend;

impl StubBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>> {
        let digest: [u8; 32] = Sha256::digest(pixels).into();
        let count = (digest[0] % 4) as usize;

        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        let detections = digest[1..]
            .chunks_exact(6)
            .take(count)
            .map(|chunk| {
                let x1 = chunk[2] as f32 / 255.0 * w * 0.5;
                let y1 = chunk[3] as f32 / 255.0 * h * 0.5;
                RawDetection {
                    class_id: chunk[0] as u32 % CLASS_COUNT,
                    confidence: chunk[1] as f32 / 255.0,
                    bbox: BoundingBox::new(
                        x1,
                        y1,
                        x1 + (1.0 + chunk[4] as f32 / 255.0 * w * 0.5),
                        y1 + (1.0 + chunk[5] as f32 / 255.0 * h * 0.5),
                    ),
                }
            })
            .collect();
        Ok(detections)
    }
}

use anyhow::Result;

use crate::detect::result::RawDetection;

/// Detector backend trait.
///
/// The pipeline treats a backend as a black box: it hands over one RGB24 frame
/// and reads back structured detections. Implementations must treat the pixel
/// slice as read-only and must not keep it past the call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one frame of packed RGB24 pixels.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook, run once after construction.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

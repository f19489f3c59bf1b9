//! Video sources.
//!
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` clips (tests, demos)
//!
//! Sources decode frames in memory and hand them to the sampler. They must not
//! write decoded frames to disk or fetch remote URLs. The decoder is released
//! when the source is dropped.

use anyhow::Result;

use crate::frame::Frame;

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

pub use file::FileSource;

/// A sequential decoder over one video.
pub trait VideoSource {
    /// Total frame count as reported by the container, or 0 when unknown.
    fn frame_count(&self) -> u64;

    /// Decode and return the next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Advance past the next frame without converting it. Returns false at end of stream.
    fn skip_frame(&mut self) -> Result<bool> {
        Ok(self.next_frame()?.is_some())
    }
}

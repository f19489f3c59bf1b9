//! Local file video source.
//!
//! `FileSource` opens a local video file and decodes it sequentially. Paths of
//! the form `stub://<name>?frames=N&width=W&height=H` produce a synthetic clip
//! instead, so the pipeline can run without ffmpeg.
//!
//! The file source MUST NOT:
//! - Fetch remote URLs
//! - Store decoded frames to disk

use anyhow::Result;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::VideoSource;
use crate::error::AnalysisError;
use crate::frame::Frame;

const DEFAULT_STUB_FRAMES: u64 = 30;
const DEFAULT_STUB_WIDTH: u32 = 64;
const DEFAULT_STUB_HEIGHT: u32 = 48;

/// Local file video source.
pub struct FileSource {
    path: String,
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    /// Open a source. Any failure here is an `UnreadableVideo`.
    pub fn open(path: &str) -> Result<Self, AnalysisError> {
        if !is_local_file_path(path) {
            return Err(AnalysisError::unreadable(
                path,
                "file ingestion only supports local paths (no URL schemes)",
            ));
        }
        if let Some(spec) = path.strip_prefix("stub://") {
            let source = SyntheticFileSource::parse(spec)
                .map_err(|reason| AnalysisError::unreadable(path, reason))?;
            log::info!(
                "FileSource: opened {} (synthetic, {} frames)",
                path,
                source.frames
            );
            return Ok(Self {
                path: path.to_string(),
                backend: FileBackend::Synthetic(source),
            });
        }

        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            let source = FfmpegFileSource::open(path)
                .map_err(|err| AnalysisError::unreadable(path, format!("{:#}", err)))?;
            log::info!(
                "FileSource: opened {} (ffmpeg, {} frames reported)",
                path,
                source.frame_count()
            );
            Ok(Self {
                path: path.to_string(),
                backend: FileBackend::Ffmpeg(source),
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(AnalysisError::unreadable(
                path,
                "file decoding requires the ingest-file-ffmpeg feature",
            ))
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl VideoSource for FileSource {
    fn frame_count(&self) -> u64 {
        match &self.backend {
            FileBackend::Synthetic(source) => source.frames,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frame_count(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn skip_frame(&mut self) -> Result<bool> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => Ok(source.advance().is_some()),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.skip_frame(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticFileSource {
    frames: u64,
    width: u32,
    height: u32,
    position: u64,
}

impl SyntheticFileSource {
    fn parse(spec: &str) -> std::result::Result<Self, String> {
        let mut source = Self {
            frames: DEFAULT_STUB_FRAMES,
            width: DEFAULT_STUB_WIDTH,
            height: DEFAULT_STUB_HEIGHT,
            position: 0,
        };
        let Some((_, query)) = spec.split_once('?') else {
            return Ok(source);
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("malformed stub parameter '{}'", pair))?;
            let parsed: u64 = value
                .parse()
                .map_err(|_| format!("stub parameter '{}' must be an integer", key))?;
            match key {
                "frames" => source.frames = parsed,
                "width" => source.width = dimension(key, parsed)?,
                "height" => source.height = dimension(key, parsed)?,
                other => return Err(format!("unknown stub parameter '{}'", other)),
            }
        }
        Ok(source)
    }

    fn advance(&mut self) -> Option<u64> {
        if self.position >= self.frames {
            return None;
        }
        let index = self.position;
        self.position += 1;
        Some(index)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(index) = self.advance() else {
            return Ok(None);
        };
        let pixel_count = (self.width as usize) * (self.height as usize) * 3;
        let pixels = (0..pixel_count)
            .map(|i| ((i as u64 + index * 7) % 256) as u8)
            .collect();
        Frame::new(pixels, self.width, self.height, index).map(Some)
    }
}

fn dimension(key: &str, value: u64) -> std::result::Result<u32, String> {
    match u32::try_from(value) {
        Ok(v) if v > 0 && v <= 4096 => Ok(v),
        _ => Err(format!("stub {} must be between 1 and 4096", key)),
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

//! Failure taxonomy for one analysis run.
//!
//! Every variant is converted into the report's `error` string at the
//! orchestration boundary; the variant itself only survives in logs.

use thiserror::Error;

pub const NO_FRAMES_MESSAGE: &str = "No frames could be extracted from video";

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The source could not be opened at all (corrupt, unsupported, empty, remote).
    #[error("Could not open video file: {path}")]
    UnreadableVideo { path: String, reason: String },

    /// Detector output that does not describe a usable detection.
    #[error("malformed detection: {0}")]
    MalformedDetection(String),

    /// The source opened but yielded no frames. Not a fault.
    #[error("No frames could be extracted from video")]
    NoFramesExtracted,

    #[error("{0}")]
    PipelineFailure(String),
}

impl AnalysisError {
    pub fn unreadable(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::UnreadableVideo {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Wraps an arbitrary backend error, keeping the full context chain.
    pub fn pipeline(err: anyhow::Error) -> Self {
        match err.downcast::<AnalysisError>() {
            Ok(inner) => inner,
            Err(err) => Self::PipelineFailure(format!("{:#}", err)),
        }
    }

    /// Stable tag for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnreadableVideo { .. } => "unreadable_video",
            Self::MalformedDetection(_) => "malformed_detection",
            Self::NoFramesExtracted => "no_frames_extracted",
            Self::PipelineFailure(_) => "pipeline_failure",
        }
    }

    /// Detail for logs; for unreadable sources this includes the decoder's reason.
    pub fn detail(&self) -> String {
        match self {
            Self::UnreadableVideo { path, reason } => {
                format!("could not open '{}': {}", path, reason)
            }
            other => other.to_string(),
        }
    }
}

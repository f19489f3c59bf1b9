use std::path::Path;

use serde::Serialize;

use crate::detect::FilteredDetection;
use crate::error::AnalysisError;

/// Final output of one analysis run. Optional fields are omitted from JSON when absent.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// Basename of the analyzed file, or the path as given when the run failed outright.
    pub video: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_analyzed: Option<usize>,
    pub detections: Vec<FilteredDetection>,
    /// Filtered detections across all frames, counted before deduplication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_raw_detections: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisReport {
    pub fn completed(
        video: &str,
        frames_analyzed: usize,
        detections: Vec<FilteredDetection>,
        total_raw_detections: usize,
    ) -> Self {
        Self {
            video: basename(video),
            frames_analyzed: Some(frames_analyzed),
            detections,
            total_raw_detections: Some(total_raw_detections),
            error: None,
        }
    }

    /// A run that stopped on `err` after aggregating some frames.
    pub fn partial(
        video: &str,
        frames_analyzed: usize,
        detections: Vec<FilteredDetection>,
        total_raw_detections: usize,
        err: &AnalysisError,
    ) -> Self {
        Self {
            error: Some(err.to_string()),
            ..Self::completed(video, frames_analyzed, detections, total_raw_detections)
        }
    }

    pub fn no_frames(video: &str) -> Self {
        Self {
            video: basename(video),
            frames_analyzed: None,
            detections: Vec::new(),
            total_raw_detections: None,
            error: Some(AnalysisError::NoFramesExtracted.to_string()),
        }
    }

    /// A run that produced nothing; `video` keeps the path exactly as given.
    pub fn failed(video: &str, err: &AnalysisError) -> Self {
        Self {
            video: video.to_string(),
            frames_analyzed: None,
            detections: Vec::new(),
            total_raw_detections: None,
            error: Some(err.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

fn basename(video: &str) -> String {
    Path::new(video)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| video.to_string())
}

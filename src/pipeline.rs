//! Analysis orchestration: sample → detect → filter → aggregate → report.
//!
//! `Analyzer::analyze` never fails. Every error is logged with its taxonomy
//! kind and folded into the report's `error` field.

use std::sync::Arc;

use crate::aggregate::aggregate;
use crate::detect::{filter_and_map, DetectorHandle, FilteredDetection, SharedDetector};
use crate::error::AnalysisError;
use crate::frame::Frame;
use crate::ingest::{FileSource, VideoSource};
use crate::report::AnalysisReport;
use crate::sample::{sample, DEFAULT_MAX_FRAMES};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalysisSettings {
    pub max_frames: usize,
    pub confidence_threshold: f32,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_MAX_FRAMES,
            confidence_threshold: crate::detect::DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

pub struct Analyzer {
    detector: Arc<SharedDetector>,
    settings: AnalysisSettings,
}

impl Analyzer {
    pub fn new(detector: Arc<SharedDetector>, settings: AnalysisSettings) -> Self {
        Self { detector, settings }
    }

    pub fn settings(&self) -> AnalysisSettings {
        self.settings
    }

    pub fn detector(&self) -> &SharedDetector {
        &self.detector
    }

    /// Analyze the video at `video_path` (a local file or a `stub://` clip).
    pub fn analyze(&self, video_path: &str) -> AnalysisReport {
        log::info!("Processing video: {}", video_path);
        match FileSource::open(video_path) {
            Ok(mut source) => self.analyze_source(video_path, &mut source),
            Err(err) => {
                log_failure(video_path, &err);
                AnalysisReport::failed(video_path, &err)
            }
        }
    }

    /// Analyze an already opened source. `video` names it in the report.
    pub fn analyze_source(&self, video: &str, source: &mut dyn VideoSource) -> AnalysisReport {
        let frames = sample(source, self.settings.max_frames);
        log::info!("Extracted {} frames for analysis", frames.len());

        if frames.is_empty() {
            log::warn!("{} ({})", AnalysisError::NoFramesExtracted, video);
            return AnalysisReport::no_frames(video);
        }

        let detector = match self.detector.get() {
            Ok(detector) => detector,
            Err(err) => {
                let err = AnalysisError::pipeline(err);
                log_failure(video, &err);
                return AnalysisReport::failed(video, &err);
            }
        };

        let mut per_frame: Vec<Vec<FilteredDetection>> = Vec::with_capacity(frames.len());
        for (i, frame) in frames.iter().enumerate() {
            log::info!("Processing frame {}/{}", i + 1, frames.len());
            match self.process_frame(&detector, frame) {
                Ok(filtered) => {
                    log::debug!("Frame {} detections: {:?}", i + 1, filtered);
                    per_frame.push(filtered);
                }
                Err(err) => {
                    log_failure(video, &err);
                    let (detections, total) = summarize(per_frame);
                    return AnalysisReport::partial(video, frames.len(), detections, total, &err);
                }
            }
        }

        let (detections, total) = summarize(per_frame);
        log::info!(
            "Found {} unique detections: {:?}",
            detections.len(),
            detections.iter().map(|d| d.label.as_str()).collect::<Vec<_>>()
        );
        log::info!("Analysis complete for {}", video);
        AnalysisReport::completed(video, frames.len(), detections, total)
    }

    fn process_frame(
        &self,
        detector: &DetectorHandle,
        frame: &Frame,
    ) -> Result<Vec<FilteredDetection>, AnalysisError> {
        let raw = {
            let mut backend = detector
                .lock()
                .map_err(|_| AnalysisError::PipelineFailure("detector lock poisoned".into()))?;
            frame
                .run_detector(&mut **backend)
                .map_err(AnalysisError::pipeline)?
        };
        filter_and_map(&raw, self.settings.confidence_threshold)
    }
}

/// Deduplicated detections plus the pre-dedup count.
fn summarize(per_frame: Vec<Vec<FilteredDetection>>) -> (Vec<FilteredDetection>, usize) {
    let total = per_frame.iter().map(Vec::len).sum();
    let detections = aggregate(per_frame.into_iter().flatten()).into_detections();
    (detections, total)
}

fn log_failure(video: &str, err: &AnalysisError) {
    log::error!(
        "Error processing video {} [{}]: {}",
        video,
        err.kind(),
        err.detail()
    );
}

//! Sightline
//!
//! Samples a handful of frames from a video, runs an object detector on each,
//! and reports one detection per coarse object class (person, vehicle, animal,
//! package) across the whole clip.
//!
//! # Module Structure
//!
//! - `ingest`: Video sources (ffmpeg-decoded local files, synthetic `stub://` clips)
//! - `sample`: Evenly spaced frame selection
//! - `frame`: Decoded frame container
//! - `detect`: Detector backends, class taxonomy, filtering, the shared detector cell
//! - `aggregate`: Cross-frame deduplication
//! - `pipeline`: Orchestration into an `AnalysisReport`
//! - `api`: Upload-and-analyze HTTP service
//! - `config`: Service configuration (JSON file + env overrides)

pub mod aggregate;
pub mod api;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod report;
pub mod sample;

pub use aggregate::{aggregate, AggregatedResult};
pub use detect::{
    filter_and_map, BoundingBox, DetectorBackend, FilteredDetection, ObjectClass, RawDetection,
    ScriptedBackend, SharedDetector, StubBackend,
};
pub use error::AnalysisError;
pub use frame::Frame;
pub use ingest::{FileSource, VideoSource};
pub use pipeline::{AnalysisSettings, Analyzer};
pub use report::AnalysisReport;
pub use sample::{sample, stride_for};

//! sightline-analyze - run the detection pipeline on one local video

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use sightline::config::{DetectorKind, DetectorSettings};
use sightline::{AnalysisSettings, Analyzer};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Local video file, or a synthetic clip such as `stub://demo?frames=40`.
    video: String,
    /// Maximum number of frames to sample.
    #[arg(long, env = "SIGHTLINE_MAX_FRAMES", default_value_t = 5)]
    max_frames: usize,
    /// Minimum detector confidence to report.
    #[arg(long, env = "SIGHTLINE_CONFIDENCE", default_value_t = 0.5)]
    threshold: f32,
    /// Detector backend: stub or tract.
    #[arg(long, env = "SIGHTLINE_DETECTOR", default_value = "stub")]
    backend: String,
    /// ONNX model path for the tract backend.
    #[arg(long, env = "SIGHTLINE_MODEL_PATH", default_value = "yolov8n.onnx")]
    model: PathBuf,
    /// Exit non-zero when the report carries an error.
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    if args.max_frames == 0 {
        return Err(anyhow!("max-frames must be >= 1"));
    }
    if !(0.0..=1.0).contains(&args.threshold) {
        return Err(anyhow!("threshold must be between 0 and 1"));
    }

    let detector = DetectorSettings {
        kind: DetectorKind::parse(&args.backend)?,
        model_path: args.model,
        ..DetectorSettings::default()
    };
    let analyzer = Analyzer::new(
        detector.shared_detector(),
        AnalysisSettings {
            max_frames: args.max_frames,
            confidence_threshold: args.threshold,
        },
    );

    let report = analyzer.analyze(&args.video);
    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.strict {
        if let Some(error) = &report.error {
            return Err(anyhow!("analysis failed: {}", error));
        }
    }
    Ok(())
}

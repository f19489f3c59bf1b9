use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::detect::{DetectorBackend, SharedDetector, StubBackend};
use crate::pipeline::AnalysisSettings;

const DEFAULT_API_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;
const DEFAULT_MAX_CONNECTIONS: usize = 16;
const DEFAULT_MAX_FRAMES: usize = crate::sample::DEFAULT_MAX_FRAMES;
const DEFAULT_CONFIDENCE: f32 = crate::detect::DEFAULT_CONFIDENCE_THRESHOLD;
const DEFAULT_MODEL_PATH: &str = "yolov8n.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_IOU_THRESHOLD: f32 = 0.7;

#[derive(Debug, Deserialize, Default)]
struct ServiceConfigFile {
    api: Option<ApiConfigFile>,
    analysis: Option<AnalysisConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    max_upload_bytes: Option<usize>,
    upload_dir: Option<PathBuf>,
    max_connections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct AnalysisConfigFile {
    max_frames: Option<usize>,
    confidence_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    iou_threshold: Option<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorKind {
    Stub,
    Tract,
}

impl DetectorKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "stub" => Ok(Self::Stub),
            "tract" | "onnx" => Ok(Self::Tract),
            other => Err(anyhow!("unknown detector backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_addr: String,
    pub max_upload_bytes: usize,
    pub upload_dir: PathBuf,
    pub max_connections: usize,
    pub analysis: AnalysisSettings,
    pub detector: DetectorSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub kind: DetectorKind,
    pub model_path: PathBuf,
    pub input_size: u32,
    pub iou_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            kind: DetectorKind::Stub,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            input_size: DEFAULT_INPUT_SIZE,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

impl DetectorSettings {
    /// A detector that is built on first use, at most once.
    pub fn shared_detector(&self) -> Arc<SharedDetector> {
        let settings = self.clone();
        Arc::new(SharedDetector::new(move || settings.build_backend()))
    }

    fn build_backend(&self) -> Result<Box<dyn DetectorBackend>> {
        match self.kind {
            DetectorKind::Stub => Ok(Box::new(StubBackend::new())),
            #[cfg(feature = "backend-tract")]
            DetectorKind::Tract => {
                let backend = crate::detect::TractBackend::new(&self.model_path, self.input_size)?
                    .with_iou_threshold(self.iou_threshold);
                Ok(Box::new(backend))
            }
            #[cfg(not(feature = "backend-tract"))]
            DetectorKind::Tract => Err(anyhow!(
                "detector backend 'tract' requires the backend-tract feature"
            )),
        }
    }
}

impl ServiceConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SIGHTLINE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ServiceConfigFile) -> Result<Self> {
        let api = file.api.unwrap_or_default();
        let analysis = file.analysis.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();

        let kind = match detector.backend.as_deref() {
            Some(name) => DetectorKind::parse(name)?,
            None => DetectorKind::Stub,
        };

        Ok(Self {
            api_addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            max_upload_bytes: api.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            upload_dir: api.upload_dir.unwrap_or_else(std::env::temp_dir),
            max_connections: api.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
            analysis: AnalysisSettings {
                max_frames: analysis.max_frames.unwrap_or(DEFAULT_MAX_FRAMES),
                confidence_threshold: analysis
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE),
            },
            detector: DetectorSettings {
                kind,
                model_path: detector
                    .model_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                input_size: detector.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                iou_threshold: detector.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("SIGHTLINE_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(dir) = std::env::var("SIGHTLINE_UPLOAD_DIR") {
            if !dir.trim().is_empty() {
                self.upload_dir = PathBuf::from(dir);
            }
        }
        if let Ok(bytes) = std::env::var("SIGHTLINE_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = bytes
                .trim()
                .parse()
                .map_err(|_| anyhow!("SIGHTLINE_MAX_UPLOAD_BYTES must be an integer byte count"))?;
        }
        if let Ok(connections) = std::env::var("SIGHTLINE_MAX_CONNECTIONS") {
            self.max_connections = connections
                .trim()
                .parse()
                .map_err(|_| anyhow!("SIGHTLINE_MAX_CONNECTIONS must be a positive integer"))?;
        }
        if let Ok(frames) = std::env::var("SIGHTLINE_MAX_FRAMES") {
            self.analysis.max_frames = frames
                .trim()
                .parse()
                .map_err(|_| anyhow!("SIGHTLINE_MAX_FRAMES must be a positive integer"))?;
        }
        if let Ok(threshold) = std::env::var("SIGHTLINE_CONFIDENCE") {
            self.analysis.confidence_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("SIGHTLINE_CONFIDENCE must be a number between 0 and 1"))?;
        }
        if let Ok(backend) = std::env::var("SIGHTLINE_DETECTOR") {
            if !backend.trim().is_empty() {
                self.detector.kind = DetectorKind::parse(&backend)?;
            }
        }
        if let Ok(path) = std::env::var("SIGHTLINE_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = PathBuf::from(path);
            }
        }
        Ok(())
    }

    /// Settings that are valid but unsuitable for real uploads.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.detector.kind == DetectorKind::Stub {
            warnings.push(
                "detector backend is 'stub': detections are synthetic, set SIGHTLINE_DETECTOR=tract for real inference"
                    .to_string(),
            );
        }
        warnings
    }

    fn validate(&self) -> Result<()> {
        if self.analysis.max_frames == 0 {
            return Err(anyhow!("max_frames must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.analysis.confidence_threshold) {
            return Err(anyhow!("confidence_threshold must be between 0 and 1"));
        }
        if self.max_connections == 0 {
            return Err(anyhow!("max_connections must be greater than zero"));
        }
        if self.max_upload_bytes == 0 {
            return Err(anyhow!("max_upload_bytes must be greater than zero"));
        }
        if self.detector.input_size == 0 || self.detector.input_size % 32 != 0 {
            return Err(anyhow!("detector input_size must be a positive multiple of 32"));
        }
        if !(0.0..=1.0).contains(&self.detector.iou_threshold) {
            return Err(anyhow!("detector iou_threshold must be between 0 and 1"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ServiceConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

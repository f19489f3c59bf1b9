//! sightlined - video object inventory service
//!
//! This daemon:
//! 1. Loads service configuration (SIGHTLINE_CONFIG + env overrides)
//! 2. Prepares a lazily loaded, shared detector
//! 3. Serves `POST /analyze/` and `GET /health`

use anyhow::Result;
use std::sync::{mpsc, Arc};

use sightline::{
    api::{ApiConfig, ApiServer},
    config::ServiceConfig,
    Analyzer,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServiceConfig::load()?;
    log::info!(
        "detector={:?} max_frames={} confidence_threshold={}",
        config.detector.kind,
        config.analysis.max_frames,
        config.analysis.confidence_threshold
    );
    for warning in config.warnings() {
        log::warn!("{}", warning);
    }

    let analyzer = Arc::new(Analyzer::new(
        config.detector.shared_detector(),
        config.analysis,
    ));
    let api_handle = ApiServer::new(ApiConfig::from_service(&config), analyzer).spawn()?;
    log::info!("analysis api listening on {}", api_handle.addr);
    log::info!("uploads are staged in {}", config.upload_dir.display());

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    log::info!("sightlined waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}

use std::sync::Mutex;

use tempfile::NamedTempFile;

use sightline::config::{DetectorKind, ServiceConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SIGHTLINE_CONFIG",
        "SIGHTLINE_API_ADDR",
        "SIGHTLINE_UPLOAD_DIR",
        "SIGHTLINE_MAX_UPLOAD_BYTES",
        "SIGHTLINE_MAX_CONNECTIONS",
        "SIGHTLINE_MAX_FRAMES",
        "SIGHTLINE_CONFIDENCE",
        "SIGHTLINE_DETECTOR",
        "SIGHTLINE_MODEL_PATH",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let upload_dir = file.path().with_extension("uploads");
    let json = format!(
        r#"{{
            "api": {{
                "addr": "127.0.0.1:9100",
                "max_upload_bytes": 1048576,
                "upload_dir": "{}",
                "max_connections": 4
            }},
            "analysis": {{
                "max_frames": 8,
                "confidence_threshold": 0.4
            }},
            "detector": {{
                "backend": "tract",
                "model_path": "/models/yolov8s.onnx",
                "input_size": 320,
                "iou_threshold": 0.5
            }}
        }}"#,
        upload_dir.display()
    );
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SIGHTLINE_CONFIG", file.path());
    std::env::set_var("SIGHTLINE_MAX_FRAMES", "3");
    std::env::set_var("SIGHTLINE_DETECTOR", "stub");

    let cfg = ServiceConfig::load().expect("load config");

    assert_eq!(cfg.api_addr, "127.0.0.1:9100");
    assert_eq!(cfg.max_upload_bytes, 1_048_576);
    assert_eq!(cfg.upload_dir, upload_dir);
    assert_eq!(cfg.max_connections, 4);
    assert_eq!(cfg.analysis.max_frames, 3);
    assert_eq!(cfg.analysis.confidence_threshold, 0.4);
    assert_eq!(cfg.detector.kind, DetectorKind::Stub);
    assert_eq!(cfg.detector.model_path.to_str(), Some("/models/yolov8s.onnx"));
    assert_eq!(cfg.detector.input_size, 320);
    assert_eq!(cfg.detector.iou_threshold, 0.5);

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ServiceConfig::load().expect("load config");
    assert_eq!(cfg.api_addr, "0.0.0.0:8000");
    assert_eq!(cfg.analysis.max_frames, 5);
    assert_eq!(cfg.analysis.confidence_threshold, 0.5);
    assert_eq!(cfg.detector.kind, DetectorKind::Stub);
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SIGHTLINE_MAX_FRAMES", "0");
    assert!(ServiceConfig::load().is_err());

    std::env::set_var("SIGHTLINE_MAX_FRAMES", "five");
    assert!(ServiceConfig::load().is_err());

    clear_env();
    std::env::set_var("SIGHTLINE_CONFIDENCE", "1.5");
    assert!(ServiceConfig::load().is_err());

    clear_env();
    std::env::set_var("SIGHTLINE_MAX_CONNECTIONS", "0");
    assert!(ServiceConfig::load().is_err());

    clear_env();
    std::env::set_var("SIGHTLINE_DETECTOR", "gpu");
    assert!(ServiceConfig::load().is_err());

    clear_env();
}

use anyhow::Result;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

use sightline::api::{ApiConfig, ApiHandle, ApiServer};
use sightline::{AnalysisSettings, Analyzer, ScriptedBackend, SharedDetector};

const BOUNDARY: &str = "sightline-test-boundary";

struct TestApi {
    dir: tempfile::TempDir,
    api_handle: Option<ApiHandle>,
}

impl TestApi {
    fn new() -> Result<Self> {
        Self::with_limits(1024 * 1024, 8)
    }

    fn with_limits(max_upload_bytes: usize, max_connections: usize) -> Result<Self> {
        let dir = tempdir()?;
        let analyzer = Arc::new(Analyzer::new(
            Arc::new(SharedDetector::preloaded(ScriptedBackend::default())),
            AnalysisSettings::default(),
        ));
        let api_config = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
            max_upload_bytes,
            upload_dir: dir.path().to_path_buf(),
            max_connections,
        };
        let api_handle = ApiServer::new(api_config, analyzer).spawn()?;
        Ok(Self {
            dir,
            api_handle: Some(api_handle),
        })
    }

    fn handle(&self) -> &ApiHandle {
        self.api_handle
            .as_ref()
            .expect("test API handle should be initialized")
    }

    fn send(&self, request: &[u8]) -> Result<(String, String)> {
        let mut stream = TcpStream::connect(self.handle().addr)?;
        stream.write_all(request)?;
        read_response(&mut stream)
    }

    fn staged_files(&self) -> usize {
        std::fs::read_dir(self.dir.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.api_handle.take() {
            handle.stop().expect("failed to stop API server");
        }
    }
}

fn read_response(stream: &mut TcpStream) -> Result<(String, String)> {
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let mut parts = response.splitn(2, "\r\n\r\n");
    let headers = parts.next().unwrap_or("").to_string();
    let body = parts.next().unwrap_or("").to_string();
    Ok((headers, body))
}

fn multipart_request(path: &str, field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: video/mp4\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    let mut request = format!(
        "POST {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: multipart/form-data; boundary={}\r\nContent-Length: {}\r\n\r\n",
        path,
        BOUNDARY,
        body.len()
    )
    .into_bytes();
    request.extend_from_slice(&body);
    request
}

#[test]
fn health_reports_detector_state() -> Result<()> {
    let api = TestApi::new()?;
    let (headers, body) = api.send(b"GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(headers.contains("200 OK"));
    let json: Value = serde_json::from_str(&body)?;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["detector"], "loaded");
    Ok(())
}

#[test]
fn unknown_paths_and_methods_are_rejected() -> Result<()> {
    let api = TestApi::new()?;
    let (headers, _) = api.send(b"GET /videos HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(headers.contains("404 Not Found"));

    let (headers, _) = api.send(b"GET /analyze/ HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(headers.contains("405 Method Not Allowed"));
    Ok(())
}

#[test]
fn undecodable_upload_returns_report_and_cleans_up() -> Result<()> {
    let api = TestApi::new()?;
    let request = multipart_request("/analyze/", "file", "holiday.mp4", b"not really a video");

    let (headers, body) = api.send(&request)?;

    assert!(headers.contains("200 OK"));
    assert!(headers.contains("Content-Type: application/json"));
    let json: Value = serde_json::from_str(&body)?;
    let video = json["video"].as_str().unwrap();
    assert!(video.ends_with(".mp4"), "video was {}", video);
    assert_eq!(
        json["error"].as_str().unwrap(),
        format!("Could not open video file: {}", video)
    );
    assert_eq!(json["detections"], Value::Array(Vec::new()));
    assert_eq!(api.staged_files(), 0);
    Ok(())
}

#[test]
fn zero_byte_raw_upload_is_unreadable() -> Result<()> {
    let api = TestApi::new()?;
    let request = b"POST /analyze HTTP/1.1\r\nHost: localhost\r\nContent-Type: video/mp4\r\nX-Filename: empty.mp4\r\nContent-Length: 0\r\n\r\n";

    let (headers, body) = api.send(request)?;

    assert!(headers.contains("200 OK"));
    let json: Value = serde_json::from_str(&body)?;
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("Could not open video file:"));
    assert_eq!(api.staged_files(), 0);
    Ok(())
}

#[test]
fn multipart_without_file_field_is_bad_request() -> Result<()> {
    let api = TestApi::new()?;
    let request = multipart_request("/analyze/", "attachment", "clip.mp4", b"bytes");

    let (headers, body) = api.send(&request)?;

    assert!(headers.contains("400 Bad Request"));
    let json: Value = serde_json::from_str(&body)?;
    assert!(json["error"].as_str().unwrap().contains("'file'"));
    assert_eq!(api.staged_files(), 0);
    Ok(())
}

#[test]
fn post_without_content_length_is_bad_request() -> Result<()> {
    let api = TestApi::new()?;
    let (headers, _) = api.send(b"POST /analyze/ HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(headers.contains("400 Bad Request"));
    Ok(())
}

#[test]
fn oversized_upload_is_rejected_before_reading_body() -> Result<()> {
    let api = TestApi::with_limits(16, 8)?;
    let (headers, body) = api.send(
        b"POST /analyze/ HTTP/1.1\r\nHost: localhost\r\nContent-Type: video/mp4\r\nContent-Length: 4096\r\n\r\n",
    )?;
    assert!(headers.contains("413 Payload Too Large"));
    assert!(body.contains("exceeds limit of 16"));
    assert_eq!(api.staged_files(), 0);
    Ok(())
}

#[test]
fn truncated_body_is_bad_request() -> Result<()> {
    let api = TestApi::new()?;
    let mut stream = TcpStream::connect(api.handle().addr)?;
    stream.write_all(
        b"POST /analyze/ HTTP/1.1\r\nHost: localhost\r\nContent-Type: video/mp4\r\nContent-Length: 900000\r\n\r\nab",
    )?;
    stream.shutdown(Shutdown::Write)?;

    let (headers, body) = read_response(&mut stream)?;
    assert!(headers.contains("400 Bad Request"));
    assert!(body.contains("body shorter than content-length"));
    assert_eq!(api.staged_files(), 0);
    Ok(())
}

#[test]
fn connections_beyond_limit_are_turned_away() -> Result<()> {
    let api = TestApi::with_limits(1024, 1)?;

    let mut first = TcpStream::connect(api.handle().addr)?;
    first.write_all(b"GET /hea")?;
    std::thread::sleep(Duration::from_millis(300));

    let mut second = TcpStream::connect(api.handle().addr)?;
    let (headers, body) = read_response(&mut second)?;
    assert!(headers.contains("503 Service Unavailable"));
    assert!(body.contains("server_busy"));

    first.write_all(b"lth HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    let (headers, _) = read_response(&mut first)?;
    assert!(headers.contains("200 OK"));
    Ok(())
}

//! Upload-and-analyze HTTP service.
//!
//! - `POST /analyze/` (or `/analyze`): multipart or raw video upload, returns the report JSON
//! - `GET /health`: liveness plus whether the detector has been loaded
//!
//! The accept loop runs on one thread; each connection is handled on its own
//! worker thread, up to `max_connections` at once. Further connections get a
//! 503. Uploads are written to a temporary file that is removed on every exit
//! path.

mod upload;

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::json;
use thiserror::Error;

use crate::config::ServiceConfig;
use crate::pipeline::Analyzer;

const MAX_HEADER_BYTES: usize = 16 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub max_upload_bytes: usize,
    pub upload_dir: PathBuf,
    pub max_connections: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8000".to_string(),
            max_upload_bytes: 512 * 1024 * 1024,
            upload_dir: std::env::temp_dir(),
            max_connections: 16,
        }
    }
}

impl ApiConfig {
    pub fn from_service(cfg: &ServiceConfig) -> Self {
        Self {
            addr: cfg.api_addr.clone(),
            max_upload_bytes: cfg.max_upload_bytes,
            upload_dir: cfg.upload_dir.clone(),
            max_connections: cfg.max_connections,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    analyzer: Arc<Analyzer>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, analyzer: Arc<Analyzer>) -> Self {
        Self { cfg, analyzer }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        std::fs::create_dir_all(&self.cfg.upload_dir)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = Arc::new(self.cfg);
        let analyzer = self.analyzer;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, cfg, analyzer, shutdown_thread) {
                log::error!("analysis api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: Arc<ApiConfig>,
    analyzer: Arc<Analyzer>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let active = Arc::new(AtomicUsize::new(0));
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                if active.load(Ordering::SeqCst) >= cfg.max_connections {
                    log::warn!(
                        "rejecting connection from {}: {} requests already in flight",
                        peer,
                        cfg.max_connections
                    );
                    if let Err(err) = reject_busy(stream) {
                        log::debug!("failed to send 503 to {}: {}", peer, err);
                    }
                    continue;
                }
                let slot = ConnectionSlot::acquire(&active);
                let cfg = cfg.clone();
                let analyzer = analyzer.clone();
                std::thread::spawn(move || {
                    let _slot = slot;
                    if let Err(err) = handle_connection(stream, &cfg, &analyzer) {
                        log::warn!("analysis api request from {} failed: {}", peer, err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Counts one in-flight connection until dropped.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self(active.clone())
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn reject_busy(mut stream: TcpStream) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_write_timeout(Some(Duration::from_secs(1)))?;
    write_json(&mut stream, 503, &json!({ "error": "server_busy" }))
}

fn handle_connection(mut stream: TcpStream, cfg: &ApiConfig, analyzer: &Analyzer) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;

    let request = match read_request(&mut stream, cfg.max_upload_bytes) {
        Ok(request) => request,
        Err(RequestError::TooLarge(len)) => {
            write_json(
                &mut stream,
                413,
                &json!({ "error": format!("upload of {} bytes exceeds limit of {}", len, cfg.max_upload_bytes) }),
            )?;
            return Ok(());
        }
        Err(err) => {
            write_json(&mut stream, 400, &json!({ "error": err.to_string() }))?;
            return Err(err.into());
        }
    };

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => {
            let detector = if analyzer.detector().is_loaded() {
                "loaded"
            } else {
                "not_loaded"
            };
            write_json(&mut stream, 200, &json!({ "status": "ok", "detector": detector }))
        }
        ("POST", "/analyze/") | ("POST", "/analyze") => {
            let (status, body) = handle_analyze(request, cfg, analyzer);
            write_response(&mut stream, status, "application/json", &body)
        }
        (_, "/health") | (_, "/analyze/") | (_, "/analyze") => {
            write_json(&mut stream, 405, &json!({ "error": "method_not_allowed" }))
        }
        _ => write_json(&mut stream, 404, &json!({ "error": "not_found" })),
    }
}

fn handle_analyze(request: HttpRequest, cfg: &ApiConfig, analyzer: &Analyzer) -> (u16, Vec<u8>) {
    let content_type = request.headers.get("content-type").cloned();
    let filename = request.headers.get("x-filename").cloned();
    let upload = match upload::extract_upload(content_type.as_deref(), filename.as_deref(), request.body) {
        Ok(upload) => upload,
        Err(err) => {
            log::warn!("rejected upload: {}", err);
            return error_body(400, &err.to_string());
        }
    };
    log::info!(
        "Received video upload: {} ({}, {} bytes)",
        upload.filename,
        upload.content_type,
        upload.bytes.len()
    );

    let tmp = match upload::save_upload(&cfg.upload_dir, &upload) {
        Ok(tmp) => tmp,
        Err(err) => {
            log::error!("Error saving upload {}: {:#}", upload.filename, err);
            return error_body(500, &err.to_string());
        }
    };
    drop(upload);
    let tmp_path = tmp.path().to_string_lossy().into_owned();
    log::info!("Saved uploaded file to: {}", tmp_path);

    let report = analyzer.analyze(&tmp_path);
    let response = serde_json::to_vec(&report).map_err(anyhow::Error::from);
    if let Ok(pretty) = serde_json::to_string_pretty(&report) {
        log::info!("Analysis complete. Response: {}", pretty);
    }

    match tmp.close() {
        Ok(()) => log::info!("Cleaned up temporary file: {}", tmp_path),
        Err(err) => log::warn!("failed to remove temporary file {}: {}", tmp_path, err),
    }

    match response {
        Ok(body) => (200, body),
        Err(err) => {
            log::error!("Error encoding report for {}: {}", tmp_path, err);
            error_body(500, &err.to_string())
        }
    }
}

fn error_body(status: u16, message: &str) -> (u16, Vec<u8>) {
    let body = serde_json::to_vec(&json!({ "error": message }))
        .unwrap_or_else(|_| br#"{"error":"internal_error"}"#.to_vec());
    (status, body)
}

#[derive(Debug, Error)]
enum RequestError {
    #[error("request body of {0} bytes is too large")]
    TooLarge(usize),
    #[error("malformed request: {0}")]
    Malformed(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn read_request(stream: &mut TcpStream, max_body: usize) -> Result<HttpRequest, RequestError> {
    let mut buf = [0u8; 8192];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(RequestError::Malformed("connection closed before headers"));
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(RequestError::Malformed("headers too large"));
        }
    };

    let text = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or(RequestError::Malformed("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or(RequestError::Malformed("missing method"))?;
    let raw_path = parts.next().ok_or(RequestError::Malformed("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| RequestError::Malformed("invalid content-length"))?,
        None if method == "POST" => {
            return Err(RequestError::Malformed("content-length required"))
        }
        None => 0,
    };
    if content_length > max_body {
        return Err(RequestError::TooLarge(content_length));
    }

    // The body grows only as bytes arrive.
    let mut body = data.split_off(header_end + 4);
    if body.len() > content_length {
        body.truncate(content_length);
    } else if body.len() < content_length {
        let remaining = (content_length - body.len()) as u64;
        std::io::Read::by_ref(stream).take(remaining).read_to_end(&mut body)?;
        if body.len() < content_length {
            return Err(RequestError::Malformed("body shorter than content-length"));
        }
    }

    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        body,
    })
}

fn write_json(stream: &mut TcpStream, status: u16, body: &serde_json::Value) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, "application/json", &payload)
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

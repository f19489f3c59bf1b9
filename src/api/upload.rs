//! Upload extraction for `POST /analyze/`.
//!
//! Accepts either `multipart/form-data` with a `file` part, or a raw body whose
//! filename travels in an `X-Filename` header.

use std::io::Write;
use std::ops::Range;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tempfile::NamedTempFile;

const FILE_FIELD: &str = "file";
const MAX_SUFFIX_LEN: usize = 10;

#[derive(Debug)]
pub(crate) struct Upload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Pull the uploaded file out of a request body.
pub(crate) fn extract_upload(
    content_type: Option<&str>,
    filename_header: Option<&str>,
    body: Vec<u8>,
) -> Result<Upload> {
    let content_type = content_type.unwrap_or("application/octet-stream");
    if let Some(boundary) = multipart_boundary(content_type) {
        return parse_multipart(body, &boundary);
    }
    Ok(Upload {
        filename: filename_header
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "upload".to_string()),
        content_type: content_type.to_string(),
        bytes: body,
    })
}

/// Write the upload to a fresh temp file in `dir`, keeping the original extension.
/// The file is removed when the returned handle is dropped or closed.
pub(crate) fn save_upload(dir: &Path, upload: &Upload) -> Result<NamedTempFile> {
    let suffix = upload_suffix(&upload.filename);
    let mut tmp = tempfile::Builder::new()
        .prefix("sightline-")
        .suffix(&suffix)
        .tempfile_in(dir)
        .with_context(|| format!("create temporary file in {}", dir.display()))?;
    tmp.write_all(&upload.bytes)
        .context("write upload to temporary file")?;
    tmp.flush().context("flush temporary file")?;
    Ok(tmp)
}

fn upload_suffix(filename: &str) -> String {
    let ext = Path::new(filename)
        .file_name()
        .map(Path::new)
        .and_then(|name| name.extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_SUFFIX_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        });
    match ext {
        Some(ext) => format!(".{}", ext.to_ascii_lowercase()),
        None => String::new(),
    }
}

fn multipart_boundary(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let mime = params.next()?.trim();
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|boundary| !boundary.is_empty())
}

/// Locate the `file` part and cut the body down to its content in place.
fn parse_multipart(mut body: Vec<u8>, boundary: &str) -> Result<Upload> {
    let (part, content) = find_file_part(&body, boundary)?;
    body.truncate(content.end);
    body.drain(..content.start);
    Ok(Upload {
        filename: part.filename.unwrap_or_else(|| "upload".to_string()),
        content_type: part
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        bytes: body,
    })
}

fn find_file_part(body: &[u8], boundary: &str) -> Result<(PartHeaders, Range<usize>)> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let closing = format!("\r\n--{}", boundary).into_bytes();

    let mut cursor =
        find(body, &delimiter, 0).ok_or_else(|| anyhow!("multipart body has no boundary"))?;
    loop {
        cursor += delimiter.len();
        if body[cursor..].starts_with(b"--") {
            break;
        }
        if !body[cursor..].starts_with(b"\r\n") {
            return Err(anyhow!("malformed multipart boundary line"));
        }
        cursor += 2;

        let headers_end = find(body, b"\r\n\r\n", cursor)
            .ok_or_else(|| anyhow!("multipart part has no header terminator"))?;
        let content_start = headers_end + 4;
        let content_end = find(body, &closing, content_start)
            .ok_or_else(|| anyhow!("multipart part is not terminated"))?;

        let part = PartHeaders::parse(&String::from_utf8_lossy(&body[cursor..headers_end]));
        if part.name.as_deref() == Some(FILE_FIELD) {
            return Ok((part, content_start..content_end));
        }
        // Skip the CRLF that precedes the next delimiter.
        cursor = content_end + 2;
    }
    Err(anyhow!("multipart body has no '{}' field", FILE_FIELD))
}

#[derive(Default)]
struct PartHeaders {
    name: Option<String>,
    filename: Option<String>,
    content_type: Option<String>,
}

impl PartHeaders {
    fn parse(raw: &str) -> Self {
        let mut part = Self::default();
        for line in raw.split("\r\n") {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            if key.eq_ignore_ascii_case("content-disposition") {
                for param in value.split(';').skip(1) {
                    if let Some((k, v)) = param.split_once('=') {
                        let v = v.trim().trim_matches('"').to_string();
                        match k.trim() {
                            "name" => part.name = Some(v),
                            "filename" => part.filename = Some(v),
                            _ => {}
                        }
                    }
                }
            } else if key.eq_ignore_ascii_case("content-type") {
                part.content_type = Some(value.trim().to_string());
            }
        }
        part
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multipart(boundary: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, content) in parts {
            body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            let disposition = match filename {
                Some(f) => format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    name, f
                ),
                None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", name),
            };
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(b"Content-Type: video/mp4\r\n\r\n");
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
        body
    }

    #[test]
    fn extracts_file_part_after_other_fields() {
        let body = multipart(
            "XyZ",
            &[
                ("note", None, b"hello"),
                ("file", Some("clip.MP4"), b"\x00\x01binary\r\nbytes"),
            ],
        );
        let upload =
            extract_upload(Some("multipart/form-data; boundary=XyZ"), None, body).unwrap();
        assert_eq!(upload.filename, "clip.MP4");
        assert_eq!(upload.content_type, "video/mp4");
        assert_eq!(upload.bytes, b"\x00\x01binary\r\nbytes");
    }

    #[test]
    fn file_part_reuses_the_request_buffer() {
        let body = multipart("XyZ", &[("file", Some("a.mp4"), b"payload")]);
        let buffer = body.as_ptr();
        let upload =
            extract_upload(Some("multipart/form-data; boundary=XyZ"), None, body).unwrap();
        assert_eq!(upload.bytes, b"payload");
        assert_eq!(upload.bytes.as_ptr(), buffer);
    }

    #[test]
    fn missing_file_field_is_an_error() {
        let body = multipart("b1", &[("note", None, b"hello")]);
        let err = extract_upload(Some("multipart/form-data; boundary=\"b1\""), None, body)
            .unwrap_err();
        assert!(err.to_string().contains("no 'file' field"));
    }

    #[test]
    fn raw_body_uses_filename_header() {
        let upload =
            extract_upload(Some("video/webm"), Some("cam.webm"), b"abc".to_vec()).unwrap();
        assert_eq!(upload.filename, "cam.webm");
        assert_eq!(upload.bytes, b"abc");

        let unnamed = extract_upload(None, None, Vec::new()).unwrap();
        assert_eq!(unnamed.filename, "upload");
        assert!(unnamed.bytes.is_empty());
    }

    #[test]
    fn suffix_keeps_only_safe_extensions() {
        assert_eq!(upload_suffix("clip.MP4"), ".mp4");
        assert_eq!(upload_suffix("../../etc/passwd"), "");
        assert_eq!(upload_suffix("a.tar.gz"), ".gz");
        assert_eq!(upload_suffix("weird.m p4"), "");
        assert_eq!(upload_suffix("noext"), "");
    }

    #[test]
    fn saved_upload_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let upload = Upload {
            filename: "x.mov".into(),
            content_type: "video/quicktime".into(),
            bytes: b"data".to_vec(),
        };
        let tmp = save_upload(dir.path(), &upload).unwrap();
        let path = tmp.path().to_path_buf();
        assert!(path.to_string_lossy().ends_with(".mov"));
        assert_eq!(std::fs::read(&path).unwrap(), b"data");
        drop(tmp);
        assert!(!path.exists());
    }
}

//! Static asset serving for the web front end

use super::response::{self, ApiError, ResponseBody};
use crate::storage::{PathGuard, StorageError};
use hyper::header::{HeaderValue, CONTENT_LENGTH};
use hyper::{Response, StatusCode};
use std::path::Path;

const INDEX_FILE: &str = "index.html";

/// Serves files below a directory
#[derive(Debug, Clone)]
pub struct StaticFiles {
    guard: PathGuard,
}

impl StaticFiles {
    pub fn new<P: AsRef<Path>>(dir: P) -> std::io::Result<Self> {
        Ok(Self {
            guard: PathGuard::new(dir)?,
        })
    }

    /// Serve the asset for a request path; `/` maps to `index.html`.
    pub async fn serve(&self, request_path: &str) -> Result<Response<ResponseBody>, ApiError> {
        let relative = request_path.trim_start_matches('/');
        let relative = if relative.is_empty() {
            INDEX_FILE
        } else {
            relative
        };

        let path = self.guard.resolve(relative).map_err(StorageError::from)?;
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            _ => return Ok(response::text(StatusCode::NOT_FOUND, "Not Found")),
        };
        let file = tokio::fs::File::open(&path).await.map_err(StorageError::from)?;

        let mut response = response::with_body(
            StatusCode::OK,
            content_type(&path),
            response::file_body(file),
        );
        response
            .headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from(metadata.len()));
        Ok(response)
    }
}

/// Content type by file extension
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

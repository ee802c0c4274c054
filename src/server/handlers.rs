//! Route handlers

use super::response::{
    self, ApiError, FileInfo, FileList, LoginStatus, MessageEnvelope, ResponseBody,
    UploadEnvelope,
};
use super::AppState;
use crate::metrics;
use crate::multipart::{self, DecodeFailure, MultipartError, StoredFile};
use crate::router::{cookie_value, parse_form};
use crate::storage::StorageError;
use bytes::Bytes;
use chrono::{DateTime, Local};
use http_body_util::{BodyExt, Limited};
use hyper::body::Incoming;
use hyper::header::{
    HeaderValue, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, SET_COOKIE,
};
use hyper::{Request, Response, StatusCode};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::HashMap;
use std::io;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Body frames buffered between the connection and its decode worker
pub const UPLOAD_CHANNEL_DEPTH: usize = 16;

/// Cap on urlencoded form bodies (login, register)
const MAX_FORM_BYTES: usize = 16 * 1024;

/// RFC 5987 `attr-char`: everything else is percent-encoded
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

type HandlerResult = Result<Response<ResponseBody>, ApiError>;

/// Session token carried by the request cookie
pub fn session_token<B>(req: &Request<B>, cookie_name: &str) -> Option<String> {
    req.headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|header| cookie_value(header, cookie_name))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

fn session_cookie(state: &AppState, token: &str, max_age: u64) -> Option<HeaderValue> {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        state.config.session.cookie_name, token, max_age
    );
    HeaderValue::from_str(&cookie).ok()
}

/// Run blocking storage work off the async threads
async fn blocking<T, F>(job: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| ApiError::internal(format!("Storage task failed: {}", e)))?
        .map_err(ApiError::from)
}

async fn read_form(body: Incoming) -> Result<HashMap<String, String>, ApiError> {
    let collected = Limited::new(body, MAX_FORM_BYTES)
        .collect()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read form: {}", e)))?;
    Ok(parse_form(&String::from_utf8_lossy(&collected.to_bytes())))
}

fn credentials(form: &HashMap<String, String>) -> (&str, &str) {
    let get = |key: &str| form.get(key).map(String::as_str).unwrap_or_default();
    (get("username"), get("password"))
}

#[tracing::instrument(name = "handler.register", skip_all)]
pub async fn register(req: Request<Incoming>, state: &AppState) -> HandlerResult {
    let form = read_form(req.into_body()).await?;
    let (username, password) = credentials(&form);

    let result = state.credentials.register(username, password).await;
    metrics::record_auth_attempt("register", result.is_ok());
    result?;

    let uploads = state.uploads.clone();
    let user = username.to_string();
    blocking(move || uploads.user_dir(&user).map(|_| ())).await?;

    Ok(response::json(
        StatusCode::OK,
        &MessageEnvelope::ok("Registration successful, please log in"),
    ))
}

#[tracing::instrument(name = "handler.login", skip_all)]
pub async fn login(req: Request<Incoming>, state: &AppState) -> HandlerResult {
    let form = read_form(req.into_body()).await?;
    let (username, password) = credentials(&form);

    let result = state.credentials.verify(username, password).await;
    metrics::record_auth_attempt("login", result.is_ok());
    if let Err(e) = result {
        warn!(username, error = %e, "Login failed");
        return Err(e.into());
    }

    let token = state.sessions.create(username);
    info!(username, "User logged in");

    let mut response = response::json(
        StatusCode::OK,
        &MessageEnvelope {
            success: true,
            message: "Login successful",
            username: Some(username),
        },
    );
    if let Some(cookie) = session_cookie(state, &token, state.config.session.timeout_secs) {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    Ok(response)
}

pub fn logout<B>(req: &Request<B>, state: &AppState) -> HandlerResult {
    if let Some(token) = session_token(req, &state.config.session.cookie_name) {
        state.sessions.invalidate(&token);
    }
    let mut response = response::json(StatusCode::OK, &MessageEnvelope::ok("Logged out"));
    if let Some(cookie) = session_cookie(state, "", 0) {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    Ok(response)
}

pub fn check_login(user: Option<&str>) -> HandlerResult {
    Ok(response::json(
        StatusCode::OK,
        &LoginStatus {
            logged_in: user.is_some(),
            username: user,
        },
    ))
}

/// Forward body frames to the decode worker until the body ends, fails, or
/// the worker stops listening.
async fn pump_body(mut body: Incoming, tx: mpsc::Sender<io::Result<Bytes>>) {
    while let Some(frame) = body.frame().await {
        let item = match frame {
            Ok(frame) => match frame.into_data() {
                Ok(data) => Ok(data),
                // Trailers carry no content
                Err(_) => continue,
            },
            Err(e) => Err(io::Error::other(e)),
        };
        let failed = item.is_err();
        if tx.send(item).await.is_err() || failed {
            break;
        }
    }
}

#[tracing::instrument(name = "handler.upload", skip(req, state))]
pub async fn upload(req: Request<Incoming>, state: &AppState, username: &str) -> HandlerResult {
    let started = Instant::now();
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let boundary = multipart::boundary_from_content_type(content_type)?;

    let (tx, mut rx) = mpsc::channel::<io::Result<Bytes>>(UPLOAD_CHANNEL_DEPTH);
    let uploads = state.uploads.clone();
    let config = state.config.multipart.clone();
    let user = username.to_string();

    let worker = state.pool.run(move || -> Result<Vec<StoredFile>, DecodeFailure> {
        let destination = uploads.user_dir(&user).map_err(|e| DecodeFailure {
            error: MultipartError::from(e),
            stored: Vec::new(),
        })?;
        let chunks = std::iter::from_fn(move || rx.blocking_recv());
        multipart::decode(chunks, &boundary, &destination, &config)
    });
    let (outcome, ()) = tokio::join!(worker, pump_body(req.into_body(), tx));

    let elapsed = started.elapsed().as_secs_f64();
    let total = |files: &[StoredFile]| files.iter().map(|f| f.size).sum::<u64>();

    match outcome.map_err(|e| ApiError::internal(e.to_string()))? {
        Ok(stored) if stored.is_empty() => {
            metrics::record_upload_failure(0, 0, elapsed);
            Err(ApiError::bad_request("No valid file found"))
        }
        Ok(stored) => {
            metrics::record_upload_success(stored.len(), total(&stored), elapsed);
            info!(files = stored.len(), bytes = total(&stored), "Upload complete");
            Ok(response::json(
                StatusCode::OK,
                &UploadEnvelope {
                    success: true,
                    count: stored.len(),
                    message: format!("Uploaded {} file(s)", stored.len()),
                    files: &stored,
                },
            ))
        }
        Err(DecodeFailure { error, stored }) => {
            metrics::record_upload_failure(stored.len(), total(&stored), elapsed);
            let api = ApiError::from(error);
            metrics::record_error(api.kind);
            Ok(response::json(
                api.status,
                &response::ErrorEnvelope {
                    success: false,
                    message: &api.message,
                    files: &stored,
                },
            ))
        }
    }
}

#[tracing::instrument(name = "handler.list_files", skip(state))]
pub async fn list_files(state: &AppState, username: &str) -> HandlerResult {
    let uploads = state.uploads.clone();
    let user = username.to_string();
    let entries = blocking(move || uploads.user_dir(&user)?.list()).await?;

    let files = entries
        .into_iter()
        .map(|entry| {
            let modified: DateTime<Local> = entry.modified.into();
            FileInfo {
                name: entry.name,
                size: entry.size,
                date: modified.timestamp_millis(),
                date_str: modified.format("%Y-%m-%d %H:%M:%S").to_string(),
            }
        })
        .collect();
    Ok(response::json(StatusCode::OK, &FileList { files }))
}

#[tracing::instrument(name = "handler.download", skip(state))]
pub async fn download(state: &AppState, username: &str, file: &str) -> HandlerResult {
    let uploads = state.uploads.clone();
    let user = username.to_string();
    let name = file.to_string();
    let stat = blocking(move || uploads.user_dir(&user)?.stat(&name)).await;
    let (path, size) = match stat {
        Ok(found) => found,
        Err(e) => {
            metrics::record_download(false, 0);
            return Err(e);
        }
    };

    let handle = tokio::fs::File::open(&path)
        .await
        .map_err(|e| ApiError::from(StorageError::from(e)))?;
    let leaf = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string());

    let mut response = response::with_body(
        StatusCode::OK,
        "application/octet-stream",
        response::file_body(handle),
    );
    let headers = response.headers_mut();
    headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        utf8_percent_encode(&leaf, ATTR_CHAR)
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(CONTENT_DISPOSITION, value);
    }

    metrics::record_download(true, size);
    info!(file = %leaf, size, "Download started");
    Ok(response)
}

#[tracing::instrument(name = "handler.delete", skip(state))]
pub async fn delete(state: &AppState, username: &str, file: &str) -> HandlerResult {
    let uploads = state.uploads.clone();
    let user = username.to_string();
    let name = file.to_string();
    blocking(move || uploads.user_dir(&user)?.delete(&name)).await?;
    info!(file, "File deleted");
    Ok(response::json(StatusCode::OK, &MessageEnvelope::ok("File deleted")))
}

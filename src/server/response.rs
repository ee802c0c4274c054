//! Response bodies, JSON envelopes and the handler error type

use crate::auth::AuthError;
use crate::multipart::{ErrorKind, MultipartError, StoredFile};
use crate::storage::StorageError;
use bytes::{Bytes, BytesMut};
use futures::stream;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::io;
use thiserror::Error;
use tokio::io::AsyncReadExt;

/// Body type of every response
pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

/// Read size for streamed file bodies
const FILE_CHUNK_SIZE: usize = 64 * 1024;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// A fixed in-memory body
pub fn full<B: Into<Bytes>>(bytes: B) -> ResponseBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Stream a file in fixed-size chunks without loading it into memory.
pub fn file_body(file: tokio::fs::File) -> ResponseBody {
    let chunks = stream::unfold(Some(file), |state| async move {
        let mut file = state?;
        let mut buf = BytesMut::with_capacity(FILE_CHUNK_SIZE);
        match file.read_buf(&mut buf).await {
            Ok(0) => None,
            Ok(_) => Some((Ok(Frame::data(buf.freeze())), Some(file))),
            Err(e) => Some((Err(e), None)),
        }
    });
    StreamBody::new(chunks).boxed_unsync()
}

/// Build a response with a content type
pub fn with_body(status: StatusCode, content_type: &str, body: ResponseBody) -> Response<ResponseBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    if let Ok(value) = HeaderValue::from_str(content_type) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

pub fn text(status: StatusCode, message: &str) -> Response<ResponseBody> {
    with_body(
        status,
        "text/plain; charset=utf-8",
        full(message.to_string()),
    )
}

/// Serialize `value` as the JSON body
pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<ResponseBody> {
    match serde_json::to_vec(value) {
        Ok(body) => with_body(status, JSON_CONTENT_TYPE, full(body)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

pub fn json_error(status: StatusCode, message: &str) -> Response<ResponseBody> {
    json(
        status,
        &ErrorEnvelope {
            success: false,
            message,
            files: &[],
        },
    )
}

/// `{"success": false, "message": ...}`, with the files stored before a
/// failure when there are any
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope<'a> {
    pub success: bool,
    pub message: &'a str,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    pub files: &'a [StoredFile],
}

/// `{"success": true, "message": ...}`
#[derive(Debug, Serialize)]
pub struct MessageEnvelope<'a> {
    pub success: bool,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<&'a str>,
}

impl<'a> MessageEnvelope<'a> {
    pub fn ok(message: &'a str) -> Self {
        Self {
            success: true,
            message,
            username: None,
        }
    }
}

/// Upload result
#[derive(Debug, Serialize)]
pub struct UploadEnvelope<'a> {
    pub success: bool,
    pub count: usize,
    pub message: String,
    pub files: &'a [StoredFile],
}

/// `/check-login` result
#[derive(Debug, Serialize)]
pub struct LoginStatus<'a> {
    #[serde(rename = "loggedIn")]
    pub logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<&'a str>,
}

/// One row of `/list-files`
#[derive(Debug, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    /// Modification time, milliseconds since the epoch
    pub date: i64,
    #[serde(rename = "dateStr")]
    pub date_str: String,
}

#[derive(Debug, Serialize)]
pub struct FileList {
    pub files: Vec<FileInfo>,
}

/// A failed request as the client sees it
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    /// Label for the errors metric
    pub kind: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            kind,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "protocol", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "auth", AuthError::Unauthenticated.to_string())
    }

    pub fn into_response(self) -> Response<ResponseBody> {
        json_error(self.status, &self.message)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials
            | AuthError::InvalidUsername
            | AuthError::WeakPassword(_)
            | AuthError::UserExists => Self::new(StatusCode::BAD_REQUEST, "auth", err.to_string()),
            AuthError::InvalidCredentials | AuthError::Unauthenticated => {
                Self::new(StatusCode::UNAUTHORIZED, "auth", err.to_string())
            }
            AuthError::Io(e) => {
                tracing::error!(error = %e, "Credential storage failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "storage", "Credential storage error")
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => Self::new(StatusCode::NOT_FOUND, "not_found", "File not found"),
            StorageError::AlreadyExists => {
                Self::new(StatusCode::CONFLICT, "storage", "File already exists")
            }
            StorageError::Security(e) => Self::new(StatusCode::FORBIDDEN, "security", e.to_string()),
            StorageError::Io(e) => {
                tracing::error!(error = %e, "Storage operation failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "storage", "Storage error")
            }
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        match err.kind() {
            ErrorKind::Protocol => Self::new(StatusCode::BAD_REQUEST, "protocol", err.to_string()),
            ErrorKind::Security => Self::new(StatusCode::FORBIDDEN, "security", err.to_string()),
            ErrorKind::Body => Self::new(StatusCode::BAD_REQUEST, "body", err.to_string()),
            ErrorKind::Storage => {
                tracing::error!(error = %err, "Failed to store upload");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage",
                    "Failed to store uploaded file",
                )
            }
        }
    }
}

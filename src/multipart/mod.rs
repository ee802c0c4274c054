//! Streaming multipart/form-data decoder
//!
//! Turns a chunked `multipart/form-data` request body into files on disk
//! without buffering the body. The pieces, leaf first:
//!
//! - [`boundary`]: delimiter set and byte-wise matcher
//! - [`headers`]: part header accumulation and `Content-Disposition` parsing
//! - [`filename`]: filename sanitization and collision handling
//! - [`buffer`]: staging buffer and write-through buffer
//! - [`state`]: the pure state-transition function
//! - [`decoder`]: the orchestrator driving all of the above
//!
//! # Example
//!
//! ```no_run
//! use kura::config::MultipartConfig;
//! use kura::multipart::decode;
//! use kura::storage::UploadDir;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dest = UploadDir::open("uploads/alice")?;
//! let body: Vec<std::io::Result<&[u8]>> = vec![
//!     Ok(b"--X\r\nContent-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\r\n\r\n"),
//!     Ok(b"hello\r\n--X--\r\n"),
//! ];
//! let stored = decode(body, "X", &dest, &MultipartConfig::default())?;
//! assert_eq!(stored[0].name, "a.txt");
//! assert_eq!(stored[0].size, 5);
//! # Ok(())
//! # }
//! ```

use crate::config::MultipartConfig;
use crate::storage::{Destination, PathError, StorageError};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub mod boundary;
pub mod buffer;
pub mod decoder;
pub mod filename;
pub mod headers;
pub mod state;

pub use decoder::PartDecoder;

/// Multipart decoding errors
#[derive(Error, Debug)]
pub enum MultipartError {
    #[error("Request is not multipart/form-data")]
    NotMultipart,

    #[error("Missing multipart boundary")]
    MissingBoundary,

    #[error("Invalid multipart boundary: {0}")]
    InvalidBoundary(String),

    #[error("Part headers exceed {0} bytes")]
    HeadersTooLarge(usize),

    #[error("Part headers were never terminated")]
    UnterminatedHeaders,

    #[error("Body ended before the closing delimiter")]
    Truncated,

    #[error("Rejected file path: {0}")]
    Security(#[from] PathError),

    #[error("Storage error: {0}")]
    Storage(#[source] io::Error),

    #[error("Failed to read request body: {0}")]
    Body(#[source] io::Error),
}

/// Error classes callers map to client-visible outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed request; the client must fix it
    Protocol,
    /// Path confinement violated
    Security,
    /// Sink create/write/close failed
    Storage,
    /// The request body stream itself failed
    Body,
}

impl MultipartError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MultipartError::NotMultipart
            | MultipartError::MissingBoundary
            | MultipartError::InvalidBoundary(_)
            | MultipartError::HeadersTooLarge(_)
            | MultipartError::UnterminatedHeaders
            | MultipartError::Truncated => ErrorKind::Protocol,
            MultipartError::Security(_) => ErrorKind::Security,
            MultipartError::Storage(_) => ErrorKind::Storage,
            MultipartError::Body(_) => ErrorKind::Body,
        }
    }
}

impl From<StorageError> for MultipartError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Security(e) => MultipartError::Security(e),
            StorageError::Io(e) => MultipartError::Storage(e),
            other => MultipartError::Storage(io::Error::other(other.to_string())),
        }
    }
}

/// A file part written to storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    /// Final on-disk leaf name, after sanitization and collision handling
    pub name: String,
    #[serde(skip)]
    pub path: PathBuf,
    /// Content bytes written
    pub size: u64,
}

/// A failed decode, with the files finalized before the failure
#[derive(Error, Debug)]
#[error("{error}")]
pub struct DecodeFailure {
    #[source]
    pub error: MultipartError,
    pub stored: Vec<StoredFile>,
}

/// Extract the boundary token from a `Content-Type` header value.
pub fn boundary_from_content_type(content_type: &str) -> Result<String, MultipartError> {
    let parsed: mime::Mime = content_type
        .parse()
        .map_err(|_| MultipartError::NotMultipart)?;
    if parsed.type_() != mime::MULTIPART || parsed.subtype() != mime::FORM_DATA {
        return Err(MultipartError::NotMultipart);
    }
    let boundary = parsed
        .get_param(mime::BOUNDARY)
        .ok_or(MultipartError::MissingBoundary)?;
    boundary::DelimiterSet::new(boundary.as_str())?;
    Ok(boundary.as_str().to_string())
}

/// Decode a whole body stream into `destination`.
///
/// Returns the stored files in request order; an empty list means the body
/// held no file part. On failure the in-progress file is removed and the
/// files finalized earlier are returned inside the [`DecodeFailure`].
#[tracing::instrument(name = "multipart.decode", skip_all, fields(boundary = %boundary))]
pub fn decode<I, B, D>(
    stream: I,
    boundary: &str,
    destination: &D,
    config: &MultipartConfig,
) -> Result<Vec<StoredFile>, DecodeFailure>
where
    I: IntoIterator<Item = io::Result<B>>,
    B: AsRef<[u8]>,
    D: Destination,
{
    let mut decoder = PartDecoder::new(boundary, destination, config).map_err(|error| {
        DecodeFailure {
            error,
            stored: Vec::new(),
        }
    })?;

    let mut received: u64 = 0;
    let outcome = stream
        .into_iter()
        .try_for_each(|chunk| {
            let chunk = chunk.map_err(MultipartError::Body)?;
            let chunk = chunk.as_ref();
            received += chunk.len() as u64;
            decoder.feed(chunk)
        })
        .and_then(|()| decoder.finish());

    match outcome {
        Ok(stored) => {
            tracing::debug!(bytes = received, files = stored.len(), "Decoded multipart body");
            Ok(stored)
        }
        Err(error) => {
            tracing::warn!(bytes = received, error = %error, "Multipart decode failed");
            Err(DecodeFailure {
                stored: decoder.abort(),
                error,
            })
        }
    }
}

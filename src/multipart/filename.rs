//! Filename sanitization and collision handling

use crate::storage::{Destination, StorageError};
use lazy_static::lazy_static;
use std::path::PathBuf;

/// Replacement for characters that must not reach the filesystem
pub const PLACEHOLDER: &str = "_";

/// Name used when nothing usable is left after sanitization
pub const FALLBACK_NAME: &str = "unnamed";

lazy_static! {
    /// Anything outside Unicode letters, numbers, punctuation and separators
    static ref DISALLOWED_RE: regex::Regex =
        regex::Regex::new(r"[^\p{L}\p{N}\p{P}\p{Z}]").unwrap();
}

/// Longest leaf name most filesystems accept, in bytes
pub const MAX_NAME_BYTES: usize = 255;

/// Attempts at a timestamp-prefixed name before giving up on a collision
const MAX_RENAME_ATTEMPTS: u32 = 16;

/// Map a client-supplied filename to a safe leaf name.
///
/// Keeps only the last path segment (`\` counts as a separator), replaces
/// every character outside the letter, number, punctuation and separator
/// categories with [`PLACEHOLDER`], and caps the length.
pub fn sanitize(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let leaf = unified.rsplit('/').next().unwrap_or_default();

    let mut name = DISALLOWED_RE
        .replace_all(leaf, PLACEHOLDER)
        .into_owned();

    if name.len() > MAX_NAME_BYTES {
        let mut cut = MAX_NAME_BYTES;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        name.truncate(cut);
    }

    if matches!(name.trim(), "" | "." | "..") {
        return FALLBACK_NAME.to_string();
    }
    name
}

/// A sink created under a collision-free name
#[derive(Debug)]
pub struct CreatedFile<F> {
    pub name: String,
    pub path: PathBuf,
    pub file: F,
}

/// Create `name` in `destination`, re-resolving with a millisecond
/// timestamp prefix while the name is taken.
pub fn create_unique<D: Destination>(
    destination: &D,
    name: &str,
) -> Result<CreatedFile<D::File>, StorageError> {
    let millis = chrono::Utc::now().timestamp_millis();
    let mut candidate = name.to_string();

    for attempt in 0..=MAX_RENAME_ATTEMPTS {
        match destination.create_new(&candidate) {
            Ok((path, file)) => {
                if attempt > 0 {
                    tracing::debug!(original = name, renamed = %candidate, "Resolved filename collision");
                }
                return Ok(CreatedFile {
                    name: candidate,
                    path,
                    file,
                });
            }
            Err(StorageError::AlreadyExists) => {
                candidate = if attempt == 0 {
                    format!("{}_{}", millis, name)
                } else {
                    format!("{}_{}_{}", millis, attempt, name)
                };
            }
            Err(e) => return Err(e),
        }
    }

    Err(StorageError::AlreadyExists)
}

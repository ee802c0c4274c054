//! Authentication module
//!
//! User accounts are stored one file per user under the users directory,
//! holding a random salt and the hex SHA-256 of salt plus password.

use async_trait::async_trait;
use lazy_static::lazy_static;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Minimum password length, in characters
pub const MIN_PASSWORD_LEN: usize = 6;

const USER_FILE_EXTENSION: &str = "user";

lazy_static! {
    static ref USERNAME_RE: regex_lite::Regex =
        regex_lite::Regex::new(r"^[a-zA-Z0-9_]{3,20}$").unwrap();
}

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Username and password are required")]
    MissingCredentials,

    #[error("Username must be 3-20 letters, digits or underscores")]
    InvalidUsername,

    #[error("Password must be at least {0} characters")]
    WeakPassword(usize),

    #[error("Username already exists")]
    UserExists,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Login required")]
    Unauthenticated,

    #[error("Credential storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Account storage
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Create an account; fails with [`AuthError::UserExists`] when taken.
    async fn register(&self, username: &str, password: &str) -> Result<(), AuthError>;

    /// Check a username/password pair.
    async fn verify(&self, username: &str, password: &str) -> Result<(), AuthError>;
}

/// Check username syntax.
pub fn validate_username(username: &str) -> Result<(), AuthError> {
    if USERNAME_RE.is_match(username) {
        Ok(())
    } else {
        Err(AuthError::InvalidUsername)
    }
}

/// Check registration input before touching storage.
pub fn validate_registration(username: &str, password: &str) -> Result<(), AuthError> {
    if username.trim().is_empty() || password.trim().is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    validate_username(username)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword(MIN_PASSWORD_LEN));
    }
    Ok(())
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Write a fresh user record. On failure the file is removed so the name
/// can be registered again.
async fn write_record<W>(path: &Path, mut file: W, record: &str) -> Result<(), AuthError>
where
    W: AsyncWrite + Unpin,
{
    let written = match file.write_all(record.as_bytes()).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    drop(file);

    if let Err(e) = written {
        if let Err(cleanup) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %cleanup, "Failed to remove partial user record");
        }
        return Err(e.into());
    }
    Ok(())
}

/// Compare two digests without short-circuiting on the first difference.
fn digest_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

/// Credential files in a directory: `<users_dir>/<username>.user`
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    /// Open the store, creating the directory if missing.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, AuthError> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    fn user_file(&self, username: &str) -> Result<PathBuf, AuthError> {
        // The username pattern admits no separators or dots
        validate_username(username)?;
        Ok(self
            .dir
            .join(format!("{}.{}", username, USER_FILE_EXTENSION)))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    #[tracing::instrument(name = "auth.register", skip(self, password))]
    async fn register(&self, username: &str, password: &str) -> Result<(), AuthError> {
        validate_registration(username, password)?;
        let path = self.user_file(username)?;

        let salt = uuid::Uuid::new_v4().simple().to_string();
        let record = format!("{}${}\n", salt, hash_password(&salt, password));

        let file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(AuthError::UserExists)
            }
            Err(e) => return Err(e.into()),
        };
        write_record(&path, file, &record).await?;

        tracing::info!(username, "User registered");
        Ok(())
    }

    #[tracing::instrument(name = "auth.verify", skip(self, password))]
    async fn verify(&self, username: &str, password: &str) -> Result<(), AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let path = match self.user_file(username) {
            Ok(p) => p,
            Err(AuthError::InvalidUsername) => return Err(AuthError::InvalidCredentials),
            Err(e) => return Err(e),
        };

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::InvalidCredentials)
            }
            Err(e) => return Err(e.into()),
        };

        let record = content.trim();
        let computed = match record.split_once('$') {
            Some((salt, _)) => format!("{}${}", salt, hash_password(salt, password)),
            // Unsalted records hold the bare digest
            None => hash_password("", password),
        };

        if digest_eq(record, &computed) {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

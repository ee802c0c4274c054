//! Configuration module for Kura
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation. Every section has serde
//! defaults, so an empty file (or [`Config::default`]) yields a working setup.

use crate::multipart::buffer::{DEFAULT_STAGING_LIMIT, DEFAULT_WRITE_BUFFER_SIZE};
use crate::multipart::headers::DEFAULT_MAX_HEADER_BYTES;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with an uppercase letter or underscore and
/// contain only uppercase letters, digits, and underscores.
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("MY_VAR", "value");
/// let result = expand_env_vars("prefix-${MY_VAR}-suffix");
/// assert_eq!(result, "prefix-value-suffix");
///
/// let result = expand_env_vars("${MISSING:-default}");
/// assert_eq!(result, "default");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let full_match = cap.get(0).unwrap();
        let var_name = cap.get(1).unwrap().as_str();

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);
    result
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub multipart: MultipartConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.address.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "Invalid server address '{}'",
                self.server.address
            )));
        }

        if self.server.worker_multiplier == 0 {
            return Err(ConfigError::ValidationError(
                "worker_multiplier must be at least 1".into(),
            ));
        }

        for (field, path) in [
            ("upload_dir", &self.storage.upload_dir),
            ("users_dir", &self.storage.users_dir),
            ("static_dir", &self.storage.static_dir),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "storage.{} cannot be empty",
                    field
                )));
            }
        }

        if self.multipart.write_buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "multipart.write_buffer_size must be greater than zero".into(),
            ));
        }

        // Anything shorter cannot hold a Content-Disposition line
        if self.multipart.max_header_bytes < 64 {
            return Err(ConfigError::ValidationError(format!(
                "multipart.max_header_bytes {} is too small (minimum 64)",
                self.multipart.max_header_bytes
            )));
        }

        if self.session.timeout_secs == 0 || self.session.sweep_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "session timeout and sweep interval must be greater than zero".into(),
            ));
        }

        let cookie = &self.session.cookie_name;
        if cookie.is_empty()
            || !cookie
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(ConfigError::ValidationError(format!(
                "Invalid session cookie name '{}'",
                cookie
            )));
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    /// Upload workers per available CPU
    #[serde(default = "default_worker_multiplier")]
    pub worker_multiplier: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            worker_multiplier: default_worker_multiplier(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_worker_multiplier() -> usize {
    4
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the per-user upload directories
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Credential files, one per user
    #[serde(default = "default_users_dir")]
    pub users_dir: PathBuf,
    /// Static assets served for unmatched GET requests
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            users_dir: default_users_dir(),
            static_dir: default_static_dir(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_users_dir() -> PathBuf {
    PathBuf::from("users")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

/// Multipart decoder tuning
///
/// ```yaml
/// multipart:
///   staging_limit: 10485760     # 10MB
///   write_buffer_size: 2097152  # 2MB
///   max_header_bytes: 65536
///   reject_truncated: false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipartConfig {
    /// Cap on bytes held back as a possible delimiter. Raised to the
    /// delimiter length when configured lower.
    #[serde(default = "default_staging_limit")]
    pub staging_limit: usize,
    /// Batch size for writes to the file sink
    #[serde(default = "default_write_buffer_size")]
    pub write_buffer_size: usize,
    /// Cap on one part's header block
    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,
    /// Treat a body that ends inside a part as an error instead of keeping
    /// the received bytes
    #[serde(default)]
    pub reject_truncated: bool,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            staging_limit: default_staging_limit(),
            write_buffer_size: default_write_buffer_size(),
            max_header_bytes: default_max_header_bytes(),
            reject_truncated: false,
        }
    }
}

fn default_staging_limit() -> usize {
    DEFAULT_STAGING_LIMIT
}

fn default_write_buffer_size() -> usize {
    DEFAULT_WRITE_BUFFER_SIZE
}

fn default_max_header_bytes() -> usize {
    DEFAULT_MAX_HEADER_BYTES
}

/// Login session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which a session expires; every use extends it
    #[serde(default = "default_session_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_session_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            cookie_name: default_cookie_name(),
        }
    }
}

fn default_session_timeout() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_cookie_name() -> String {
    "sessionId".to_string()
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

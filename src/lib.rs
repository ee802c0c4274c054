//! Kura Library
//!
//! Self-hosted file store: users register, log in, and upload files through
//! a streaming `multipart/form-data` decoder that writes parts straight to
//! disk.
//!
//! # Features
//!
//! - **Streaming Uploads**: Bodies are decoded chunk by chunk, never buffered whole
//! - **Path Confinement**: Every client-supplied name is resolved inside its root
//! - **Per-User Storage**: One directory per account, listed newest first
//! - **Sessions**: Cookie sessions with sliding expiry
//!
//! # Example
//!
//! ```no_run
//! use kura::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let server = Server::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod metrics;
pub mod multipart;
pub mod router;
pub mod server;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

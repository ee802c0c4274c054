//! End-to-End Tests for Kura
//!
//! These tests drive the HTTP surface with a real client:
//!
//! - Account registration and cookie sessions
//! - Streaming multipart uploads into per-user directories
//! - Listing, downloading and deleting stored files
//! - Error statuses for unauthenticated, malformed and hostile requests

pub mod auth_flow;
pub mod common;
pub mod error_scenarios;
pub mod upload_flow;

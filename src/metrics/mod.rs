//! Metrics module
//!
//! Prometheus counters and histograms for uploads, downloads and logins,
//! exposed in text format on the `/metrics` route.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec,
    register_int_gauge, Counter, CounterVec, Encoder, Histogram, HistogramVec, IntGauge,
    TextEncoder,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "kura_uploads_total",
        "Total number of upload requests",
        &["status"]
    ).unwrap();

    pub static ref FILES_STORED_TOTAL: Counter = register_counter!(
        "kura_files_stored_total",
        "Total number of files written by the multipart decoder"
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "kura_upload_bytes_total",
        "Total file bytes stored"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "kura_upload_duration_seconds",
        "Upload duration in seconds",
        &["status"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 60.0]
    ).unwrap();

    pub static ref FILES_PER_UPLOAD: Histogram = register_histogram!(
        "kura_files_per_upload",
        "Number of files per upload request",
        vec![0.0, 1.0, 2.0, 5.0, 10.0, 50.0, 100.0]
    ).unwrap();

    pub static ref UPLOADS_IN_FLIGHT: IntGauge = register_int_gauge!(
        "kura_uploads_in_flight",
        "Uploads currently holding a decode worker"
    ).unwrap();

    // Download metrics
    pub static ref DOWNLOADS_TOTAL: CounterVec = register_counter_vec!(
        "kura_downloads_total",
        "Total number of download requests",
        &["status"]
    ).unwrap();

    pub static ref DOWNLOAD_BYTES_TOTAL: Counter = register_counter!(
        "kura_download_bytes_total",
        "Total file bytes sent to clients"
    ).unwrap();

    // Auth metrics
    pub static ref AUTH_ATTEMPTS: CounterVec = register_counter_vec!(
        "kura_auth_attempts_total",
        "Authentication attempts",
        &["method", "status"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "kura_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

fn status_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Record a successful upload request
pub fn record_upload_success(files: usize, bytes: u64, duration_secs: f64) {
    UPLOADS_TOTAL.with_label_values(&["success"]).inc();
    FILES_STORED_TOTAL.inc_by(files as f64);
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
    FILES_PER_UPLOAD.observe(files as f64);
    UPLOAD_DURATION
        .with_label_values(&["success"])
        .observe(duration_secs);
}

/// Record a failed upload request. Files finalized before the failure still
/// count as stored.
pub fn record_upload_failure(stored_files: usize, stored_bytes: u64, duration_secs: f64) {
    UPLOADS_TOTAL.with_label_values(&["failure"]).inc();
    FILES_STORED_TOTAL.inc_by(stored_files as f64);
    UPLOAD_BYTES_TOTAL.inc_by(stored_bytes as f64);
    UPLOAD_DURATION
        .with_label_values(&["failure"])
        .observe(duration_secs);
}

/// Record a download
pub fn record_download(success: bool, bytes: u64) {
    DOWNLOADS_TOTAL
        .with_label_values(&[status_label(success)])
        .inc();
    if success {
        DOWNLOAD_BYTES_TOTAL.inc_by(bytes as f64);
    }
}

/// Record authentication attempt
pub fn record_auth_attempt(method: &str, success: bool) {
    AUTH_ATTEMPTS
        .with_label_values(&[method, status_label(success)])
        .inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Encode all registered metrics in the Prometheus text format.
/// Returns the content type with the encoded body.
pub fn encode() -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}

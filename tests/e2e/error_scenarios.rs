//! E2E Error Scenario Tests
//!
//! ## Test Coverage
//!
//! - Protected routes without a session
//! - Path traversal on download and delete
//! - Missing files and parameters
//! - Wrong methods and malformed uploads
//! - Health, metrics and static assets

use super::common::{E2ETestEnv, BOUNDARY};
use serde_json::Value;

/// Test: Protected routes return 401 without a valid session
#[tokio::test]
async fn test_protected_routes_require_session() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    let upload = env.upload(None, &[("a.txt", &b"x"[..])]).await.unwrap();
    assert_eq!(upload.status(), 401);
    let body: Value = upload.json().await.unwrap();
    assert_eq!(body["success"], false);

    assert_eq!(env.get("/list-files", None).await.unwrap().status(), 401);
    assert_eq!(
        env.get("/download?file=a.txt", None).await.unwrap().status(),
        401
    );
    assert_eq!(
        env.delete("/delete?file=a.txt", None).await.unwrap().status(),
        401
    );
    assert_eq!(
        env.get("/list-files", Some("sessionId=made-up"))
            .await
            .unwrap()
            .status(),
        401
    );

    // Nothing was stored for an anonymous upload
    assert!(!env.dir.path().join("uploads").join("a.txt").exists());
}

/// Test: Traversal outside the user's directory is 403, not 404
#[tokio::test]
async fn test_traversal_is_forbidden() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    let cookie = env.session_for("alice").await;
    std::fs::write(env.dir.path().join("secret.txt"), "top secret").unwrap();

    for path in [
        "/download?file=../../secret.txt",
        "/download?file=..%2F..%2Fsecret.txt",
        "/download?file=/etc/passwd",
    ] {
        let response = env.get(path, Some(&cookie)).await.unwrap();
        assert_eq!(response.status(), 403, "{}", path);
    }

    let response = env
        .delete("/delete?file=../../secret.txt", Some(&cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    assert!(env.dir.path().join("secret.txt").exists());
}

/// Test: Missing files are 404
#[tokio::test]
async fn test_missing_file_not_found() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    let cookie = env.session_for("bob").await;

    let download = env
        .get("/download?file=nothing.txt", Some(&cookie))
        .await
        .unwrap();
    assert_eq!(download.status(), 404);

    let delete = env
        .delete("/delete?file=nothing.txt", Some(&cookie))
        .await
        .unwrap();
    assert_eq!(delete.status(), 404);
}

/// Test: Missing `file` parameter is 400
#[tokio::test]
async fn test_missing_file_parameter() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    let cookie = env.session_for("carol").await;

    let response = env.get("/download", Some(&cookie)).await.unwrap();
    assert_eq!(response.status(), 400);
    let response = env.get("/download?file=", Some(&cookie)).await.unwrap();
    assert_eq!(response.status(), 400);
}

/// Test: Wrong methods are 405
#[tokio::test]
async fn test_wrong_method_rejected() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    assert_eq!(env.get("/upload", None).await.unwrap().status(), 405);
    assert_eq!(env.get("/login", None).await.unwrap().status(), 405);
    assert_eq!(
        env.delete("/download?file=a.txt", None).await.unwrap().status(),
        405
    );
    let response = env
        .client
        .put(env.url("/index.html"))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 405);
}

/// Test: Uploads that are not usable multipart bodies are 400
#[tokio::test]
async fn test_malformed_uploads_rejected() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    let cookie = env.session_for("dave").await;

    // Not multipart at all
    let response = env
        .client
        .post(env.url("/upload"))
        .header("Cookie", &cookie)
        .header("Content-Type", "application/json")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Multipart without a boundary
    let response = env
        .client
        .post(env.url("/upload"))
        .header("Cookie", &cookie)
        .header("Content-Type", "multipart/form-data")
        .body("--x\r\n")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Only plain fields
    let fields_only = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhi\r\n--{b}--\r\n",
        b = BOUNDARY
    );
    let response = env
        .client
        .post(env.url("/upload"))
        .header("Cookie", &cookie)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(fields_only)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "No valid file found");

    assert!(std::fs::read_dir(env.user_dir("dave")).unwrap().next().is_none());
}

/// Test: Health and metrics endpoints
#[tokio::test]
async fn test_health_and_metrics() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    let health = env.get("/health", None).await.unwrap();
    assert_eq!(health.status(), 200);
    assert_eq!(health.text().await.unwrap(), "ok");

    // A failed login guarantees at least one auth sample
    env.login("nobody", "whatever").await.unwrap();
    let metrics = env.get("/metrics", None).await.unwrap();
    assert_eq!(metrics.status(), 200);
    let text = metrics.text().await.unwrap();
    assert!(text.contains("kura_auth_attempts_total"));
}

/// Test: Metrics route is 404 when disabled
#[tokio::test]
async fn test_metrics_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = E2ETestEnv::default_config(&dir);
    config.metrics.enabled = false;
    let env = E2ETestEnv::with_config(dir, config)
        .await
        .expect("Failed to create test env");

    assert_eq!(env.get("/metrics", None).await.unwrap().status(), 404);
}

/// Test: Static assets are served from the public directory
#[tokio::test]
async fn test_static_assets() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    let index = env.get("/", None).await.unwrap();
    assert_eq!(index.status(), 200);
    assert_eq!(
        index.headers().get("content-type").unwrap(),
        "text/html; charset=utf-8"
    );
    assert!(index.text().await.unwrap().contains("kura"));

    assert_eq!(env.get("/missing.css", None).await.unwrap().status(), 404);
}

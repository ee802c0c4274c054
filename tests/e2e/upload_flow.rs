//! E2E Upload Flow Tests
//!
//! ## Test Coverage
//!
//! - Upload, list, download, delete round trip
//! - Several files in one request
//! - Large bodies streamed through the decoder
//! - Name collisions across uploads
//! - Users only see their own files

use super::common::{payload, E2ETestEnv};
use serde_json::Value;

/// Test: Upload a file, see it listed, download it, delete it
#[tokio::test]
async fn test_upload_list_download_delete() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    let cookie = env.session_for("alice").await;

    let content = b"Hello, Kura E2E Test!\r\n--not-a-boundary\r\n";
    let response = env
        .upload(Some(&cookie), &[("hello.txt", &content[..])])
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 1);
    assert_eq!(body["files"][0]["name"], "hello.txt");
    assert_eq!(body["files"][0]["size"], content.len());

    let listing: Value = env
        .get("/list-files", Some(&cookie))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let files = listing["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["name"], "hello.txt");
    assert_eq!(files[0]["size"], content.len());
    assert!(files[0]["date"].as_i64().unwrap() > 0);
    assert!(files[0]["dateStr"].is_string());

    let download = env
        .get("/download?file=hello.txt", Some(&cookie))
        .await
        .unwrap();
    assert_eq!(download.status(), 200);
    assert_eq!(
        download.headers().get("content-disposition").unwrap(),
        "attachment; filename*=UTF-8''hello.txt"
    );
    assert_eq!(download.bytes().await.unwrap().as_ref(), &content[..]);

    let deleted = env
        .delete("/delete?file=hello.txt", Some(&cookie))
        .await
        .unwrap();
    assert_eq!(deleted.status(), 200);
    assert!(!env.user_dir("alice").join("hello.txt").exists());

    let listing: Value = env
        .get("/list-files", Some(&cookie))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listing["files"].as_array().unwrap().is_empty());
}

/// Test: Several files in one request are all stored, in order
#[tokio::test]
async fn test_upload_multiple_files() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    let cookie = env.session_for("bob").await;

    let response = env
        .upload(
            Some(&cookie),
            &[
                ("a.txt", &b"first"[..]),
                ("b.bin", &payload(10_000)[..]),
                ("c.txt", &b""[..]),
            ],
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["count"], 3);
    let names: Vec<&str> = body["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["a.txt", "b.bin", "c.txt"]);

    assert_eq!(std::fs::read(env.user_dir("bob").join("b.bin")).unwrap(), payload(10_000));
}

/// Test: A multi-megabyte upload round-trips byte for byte
#[tokio::test]
async fn test_large_upload_round_trip() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    let cookie = env.session_for("carol").await;
    let data = payload(5 * 1024 * 1024 + 123);

    let response = env
        .upload(Some(&cookie), &[("big.bin", &data[..])])
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let download = env
        .get("/download?file=big.bin", Some(&cookie))
        .await
        .unwrap();
    assert_eq!(download.status(), 200);
    assert_eq!(
        download.headers().get("content-length").unwrap(),
        &data.len().to_string()
    );
    assert_eq!(download.bytes().await.unwrap().as_ref(), data.as_slice());
}

/// Test: Uploading an existing name keeps both files intact
#[tokio::test]
async fn test_upload_collision_renames() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    let cookie = env.session_for("dave").await;

    env.upload(Some(&cookie), &[("notes.txt", &b"version one"[..])])
        .await
        .unwrap();
    let response = env
        .upload(Some(&cookie), &[("notes.txt", &b"version two"[..])])
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let renamed = body["files"][0]["name"].as_str().unwrap().to_string();
    assert_ne!(renamed, "notes.txt");
    assert!(renamed.ends_with("_notes.txt"));

    let dir = env.user_dir("dave");
    assert_eq!(std::fs::read(dir.join("notes.txt")).unwrap(), b"version one");
    assert_eq!(std::fs::read(dir.join(&renamed)).unwrap(), b"version two");
}

/// Test: Uploaded names are reduced to a safe leaf
#[tokio::test]
async fn test_upload_sanitizes_names() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    let cookie = env.session_for("erin").await;

    let response = env
        .upload(Some(&cookie), &[("../../../escape.txt", &b"x"[..])])
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["files"][0]["name"], "escape.txt");
    assert!(env.user_dir("erin").join("escape.txt").is_file());
    assert!(!env.dir.path().join("escape.txt").exists());
}

/// Test: Each user lists only their own directory
#[tokio::test]
async fn test_users_are_isolated() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    let alice = env.session_for("alice").await;
    let mallory = env.session_for("mallory").await;

    env.upload(Some(&alice), &[("private.txt", &b"alice only"[..])])
        .await
        .unwrap();

    let listing: Value = env
        .get("/list-files", Some(&mallory))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listing["files"].as_array().unwrap().is_empty());

    let response = env
        .get("/download?file=private.txt", Some(&mallory))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let escape = env
        .get("/download?file=../alice/private.txt", Some(&mallory))
        .await
        .unwrap();
    assert_eq!(escape.status(), 403);
}

//! E2E Authentication Flow Tests
//!
//! ## Test Coverage
//!
//! - Registration creates the account and its upload directory
//! - Registration validation (username pattern, password length, duplicates)
//! - Login sets an HttpOnly session cookie
//! - Wrong passwords are rejected
//! - `/check-login` reflects the session
//! - Logout invalidates the session

use super::common::{session_cookie, E2ETestEnv, TEST_PASSWORD};
use serde_json::Value;

/// Test: Registration succeeds and creates the user's upload directory
#[tokio::test]
async fn test_register_creates_account() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    let response = env.register("alice", TEST_PASSWORD).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);

    assert!(env.user_dir("alice").is_dir());
    assert!(env.dir.path().join("users").join("alice.user").is_file());
}

/// Test: Invalid registrations return 400 with an error envelope
#[tokio::test]
async fn test_register_validation() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    for (username, password) in [
        ("ab", TEST_PASSWORD),
        ("bad-name!", TEST_PASSWORD),
        ("averyveryverylongusername", TEST_PASSWORD),
        ("carol", "short"),
        ("", ""),
    ] {
        let response = env.register(username, password).await.unwrap();
        assert_eq!(
            response.status(),
            400,
            "register {:?}/{:?}",
            username,
            password
        );
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert!(body["message"].is_string());
    }
}

/// Test: A username can only be registered once
#[tokio::test]
async fn test_register_duplicate() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    assert_eq!(env.register("dave", TEST_PASSWORD).await.unwrap().status(), 200);
    let response = env.register("dave", "another-password").await.unwrap();
    assert_eq!(response.status(), 400);
}

/// Test: Login sets the session cookie
#[tokio::test]
async fn test_login_sets_session_cookie() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    env.register("erin", TEST_PASSWORD).await.unwrap();

    let response = env.login("erin", TEST_PASSWORD).await.unwrap();
    assert_eq!(response.status(), 200);

    let raw = response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(raw.starts_with("sessionId="));
    assert!(raw.contains("HttpOnly"));
    assert!(raw.contains("Max-Age=3600"));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["username"], "erin");
}

/// Test: Wrong password or unknown user returns 401 without a cookie
#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    env.register("frank", TEST_PASSWORD).await.unwrap();

    let wrong = env.login("frank", "not-the-password").await.unwrap();
    assert_eq!(wrong.status(), 401);
    assert!(session_cookie(&wrong).is_none());

    let unknown = env.login("nobody", TEST_PASSWORD).await.unwrap();
    assert_eq!(unknown.status(), 401);
}

/// Test: /check-login reflects whether the cookie names a live session
#[tokio::test]
async fn test_check_login() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    let anonymous: Value = env
        .get("/check-login", None)
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(anonymous["loggedIn"], false);

    let cookie = env.session_for("grace").await;
    let status: Value = env
        .get("/check-login", Some(&cookie))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["loggedIn"], true);
    assert_eq!(status["username"], "grace");

    let forged: Value = env
        .get("/check-login", Some("sessionId=forged-token"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(forged["loggedIn"], false);
}

/// Test: Logout ends the session and clears the cookie
#[tokio::test]
async fn test_logout_invalidates_session() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    let cookie = env.session_for("heidi").await;

    assert_eq!(
        env.get("/list-files", Some(&cookie)).await.unwrap().status(),
        200
    );

    let response = env
        .client
        .post(env.url("/logout"))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let cleared = response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cleared.contains("Max-Age=0"));

    assert_eq!(
        env.get("/list-files", Some(&cookie)).await.unwrap().status(),
        401
    );
}

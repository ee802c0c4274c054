//! Common E2E Test Infrastructure
//!
//! Provides shared utilities for E2E tests:
//! - Test server management
//! - Account and session helpers
//! - Multipart body construction

use kura::config::Config;
use kura::server::Server;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Boundary used by [`multipart_body`]
pub const BOUNDARY: &str = "----KuraE2EBoundaryq2w3e4r5";

pub const TEST_PASSWORD: &str = "secret123";

/// E2E Test Environment
///
/// Owns a running server and the temporary directory holding its storage.
pub struct E2ETestEnv {
    pub server_addr: SocketAddr,
    pub client: reqwest::Client,
    pub dir: TempDir,
    _server_handle: tokio::task::JoinHandle<()>,
}

impl E2ETestEnv {
    /// Create a new E2E test environment with a running server
    pub async fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("public"))?;
        std::fs::write(
            dir.path().join("public").join("index.html"),
            "<html><body>kura</body></html>",
        )?;
        let config = Self::default_config(&dir);
        Self::with_config(dir, config).await
    }

    /// Config with all storage inside `dir` and a port chosen by the OS
    pub fn default_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.server.address = "127.0.0.1:0".to_string();
        config.server.worker_multiplier = 1;
        config.storage.upload_dir = dir.path().join("uploads");
        config.storage.users_dir = dir.path().join("users");
        config.storage.static_dir = dir.path().join("public");
        config
    }

    /// Create a new E2E test environment with custom config
    pub async fn with_config(
        dir: TempDir,
        config: Config,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let server = Server::new(config).await?;
        let server_addr = server.local_addr();

        let server_handle = tokio::spawn(async move {
            let _ = server.run().await;
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            server_addr,
            client,
            dir,
            _server_handle: server_handle,
        })
    }

    /// Get the base URL for the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.server_addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Upload directory of `username`
    pub fn user_dir(&self, username: &str) -> PathBuf {
        self.dir.path().join("uploads").join(username)
    }

    /// POST an urlencoded form
    pub async fn post_form(
        &self,
        path: &str,
        form: &str,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(self.url(path))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(form.to_string())
            .send()
            .await
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.post_form(
            "/register",
            &format!("username={}&password={}", username, password),
        )
        .await
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.post_form(
            "/login",
            &format!("username={}&password={}", username, password),
        )
        .await
    }

    /// Register `username` and log in; returns the `Cookie` header value.
    pub async fn session_for(&self, username: &str) -> String {
        let registered = self.register(username, TEST_PASSWORD).await.unwrap();
        assert_eq!(registered.status(), 200, "register {}", username);
        let response = self.login(username, TEST_PASSWORD).await.unwrap();
        assert_eq!(response.status(), 200, "login {}", username);
        session_cookie(&response).expect("login response sets a session cookie")
    }

    pub async fn get(
        &self,
        path: &str,
        cookie: Option<&str>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut request = self.client.get(self.url(path));
        if let Some(cookie) = cookie {
            request = request.header("Cookie", cookie);
        }
        request.send().await
    }

    pub async fn delete(
        &self,
        path: &str,
        cookie: Option<&str>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut request = self.client.delete(self.url(path));
        if let Some(cookie) = cookie {
            request = request.header("Cookie", cookie);
        }
        request.send().await
    }

    /// POST files to `/upload` as `multipart/form-data`
    pub async fn upload(
        &self,
        cookie: Option<&str>,
        files: &[(&str, &[u8])],
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut request = self
            .client
            .post(self.url("/upload"))
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(multipart_body(files));
        if let Some(cookie) = cookie {
            request = request.header("Cookie", cookie);
        }
        request.send().await
    }
}

/// `name=value` of the session cookie set by a response
pub fn session_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("sessionId="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

/// Multipart body with one plain field followed by the given files
pub fn multipart_body(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nuploaded by e2e\r\n",
            BOUNDARY
        )
        .as_bytes(),
    );
    for (name, content) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Deterministic binary payload
pub fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 31 % 251) as u8).collect()
}

//! HTTP server module
//!
//! Binds the listener, accepts connections and routes each request to its
//! handler. The server is built on `hyper` 1.x over `tokio`:
//!
//! - HTTP/1.1 connections, one task per connection
//! - Streaming request and response bodies
//! - Graceful shutdown through [`Server::run_until`]
//!
//! # Example
//!
//! ```no_run
//! use kura::config::Config;
//! use kura::server::Server;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = Config::default();
//! config.server.address = "127.0.0.1:0".to_string();
//! let server = Server::new(config).await?;
//! println!("Listening on {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use crate::auth::{AuthError, CredentialStore, FileCredentialStore};
use crate::config::{Config, ConfigError};
use crate::metrics;
use crate::router::{RequestParser, Route, RouterError};
use crate::session::{self, MemorySessionStore, SessionStore};
use crate::storage::{StorageError, UploadRoot};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, Instrument};

pub mod handlers;
pub mod pool;
pub mod response;
pub mod static_files;

pub use pool::UploadPool;
pub use response::ResponseBody;
pub use static_files::StaticFiles;

use response::ApiError;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Server error: {0}")]
    RuntimeError(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage setup failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Credential store setup failed: {0}")]
    Auth(#[from] AuthError),
}

/// Shared state handed to every request
pub struct AppState {
    pub config: Config,
    pub uploads: UploadRoot,
    pub credentials: Arc<dyn CredentialStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub pool: UploadPool,
    pub static_files: StaticFiles,
}

impl AppState {
    /// Build the default stores (filesystem credentials, in-memory sessions)
    /// from configuration, creating storage directories as needed.
    pub fn from_config(config: Config) -> Result<Self, ServerError> {
        config.validate()?;

        let uploads = UploadRoot::open(&config.storage.upload_dir)?;
        let credentials = FileCredentialStore::open(&config.storage.users_dir)?;
        let sessions =
            MemorySessionStore::new(Duration::from_secs(config.session.timeout_secs));
        let static_files = StaticFiles::new(&config.storage.static_dir)
            .map_err(|e| ServerError::Storage(StorageError::Io(e)))?;
        let pool = UploadPool::with_multiplier(config.server.worker_multiplier);

        info!(
            upload_dir = %uploads.path().display(),
            workers = pool.size(),
            "Storage ready"
        );

        Ok(Self {
            config,
            uploads,
            credentials: Arc::new(credentials),
            sessions: Arc::new(sessions),
            pool,
            static_files,
        })
    }
}

/// HTTP Server
pub struct Server {
    state: Arc<AppState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Create a server and bind to the configured address. Port 0 lets the
    /// OS pick a port; see [`local_addr`](Self::local_addr).
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        let state = AppState::from_config(config)?;
        Self::with_state(state).await
    }

    /// Bind a server around prepared state
    pub async fn with_state(state: AppState) -> Result<Self, ServerError> {
        let addr: SocketAddr = state
            .config
            .server
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!("Server bound to {}", local_addr);

        Ok(Self {
            state: Arc::new(state),
            listener,
            local_addr,
        })
    }

    /// The address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until the process is stopped
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` completes. In-flight connections keep running
    /// on their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        info!("Starting server on {}", self.local_addr);

        let sweeper = session::spawn_sweeper(
            Arc::clone(&self.state.sessions),
            Duration::from_secs(self.state.config.session.sweep_interval_secs),
        );
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { handle_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }

        sweeper.abort();
        info!("Shutting down server");
        Ok(())
    }
}

/// Handle one HTTP request inside its own span
async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<ResponseBody>, Infallible> {
    let span = tracing::info_span!(
        "http.request",
        http.method = %req.method(),
        http.target = %req.uri().path(),
        http.route = tracing::field::Empty,
        http.status_code = tracing::field::Empty,
    );

    async move {
        let response = match dispatch(req, &state).await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_error(e.kind);
                e.into_response()
            }
        };
        let status = response.status().as_u16();
        tracing::Span::current().record("http.status_code", status);
        info!(status, "Handled request");
        Ok(response)
    }
    .instrument(span)
    .await
}

async fn dispatch(
    req: Request<Incoming>,
    state: &AppState,
) -> Result<Response<ResponseBody>, ApiError> {
    let route = RequestParser::parse(req.method().as_str(), req.uri().path(), req.uri().query())
        .map_err(|e| match e {
            RouterError::MethodNotAllowed { .. } => {
                ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "protocol", e.to_string())
            }
            RouterError::MissingParameter(_) => ApiError::bad_request(e.to_string()),
        })?;
    tracing::Span::current().record("http.route", route.name());

    let user = handlers::session_token(&req, &state.config.session.cookie_name)
        .and_then(|token| state.sessions.validate(&token));

    if route.requires_session() && user.is_none() {
        return Err(ApiError::unauthorized());
    }

    match (route, user) {
        (Route::Health, _) => Ok(response::text(StatusCode::OK, "ok")),
        (Route::Metrics, _) if state.config.metrics.enabled => {
            let (content_type, body) = metrics::encode()
                .map_err(|e| ApiError::internal(format!("Failed to encode metrics: {}", e)))?;
            Ok(response::with_body(
                StatusCode::OK,
                &content_type,
                response::full(body),
            ))
        }
        (Route::Metrics, _) => Ok(response::text(StatusCode::NOT_FOUND, "Not Found")),
        (Route::Register, _) => handlers::register(req, state).await,
        (Route::Login, _) => handlers::login(req, state).await,
        (Route::Logout, _) => handlers::logout(&req, state),
        (Route::CheckLogin, user) => handlers::check_login(user.as_deref()),
        (Route::Upload, Some(user)) => handlers::upload(req, state, &user).await,
        (Route::ListFiles, Some(user)) => handlers::list_files(state, &user).await,
        (Route::Download { file }, Some(user)) => handlers::download(state, &user, &file).await,
        (Route::Delete { file }, Some(user)) => handlers::delete(state, &user, &file).await,
        (Route::Static { path }, _) => state.static_files.serve(&path).await,
        (_, None) => Err(ApiError::unauthorized()),
    }
}

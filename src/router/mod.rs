//! HTTP API Router
//!
//! Parses the method, path and query of an incoming request into a [`Route`].
//! Also holds the `application/x-www-form-urlencoded` and cookie helpers the
//! handlers share.

use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use thiserror::Error;

/// Router errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RouterError {
    #[error("Method {method} not allowed for {path}")]
    MethodNotAllowed { method: String, path: String },

    #[error("Missing query parameter: {0}")]
    MissingParameter(&'static str),
}

/// API operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// GET /health
    Health,
    /// GET /metrics
    Metrics,
    /// POST /register
    Register,
    /// POST /login
    Login,
    /// ANY /logout
    Logout,
    /// GET /check-login
    CheckLogin,
    /// POST /upload
    Upload,
    /// GET /list-files
    ListFiles,
    /// GET /download?file=NAME
    Download { file: String },
    /// DELETE /delete?file=NAME
    Delete { file: String },
    /// GET anything else, served from the static directory
    Static { path: String },
}

impl Route {
    /// Whether the route needs a logged-in session
    pub fn requires_session(&self) -> bool {
        matches!(
            self,
            Route::Upload | Route::ListFiles | Route::Download { .. } | Route::Delete { .. }
        )
    }

    /// Short label for the request span
    pub fn name(&self) -> &'static str {
        match self {
            Route::Health => "health",
            Route::Metrics => "metrics",
            Route::Register => "register",
            Route::Login => "login",
            Route::Logout => "logout",
            Route::CheckLogin => "check_login",
            Route::Upload => "upload",
            Route::ListFiles => "list_files",
            Route::Download { .. } => "download",
            Route::Delete { .. } => "delete",
            Route::Static { .. } => "static",
        }
    }
}

/// Request parser
pub struct RequestParser;

impl RequestParser {
    /// Parse an HTTP request line into a route
    pub fn parse(method: &str, path: &str, query: Option<&str>) -> Result<Route, RouterError> {
        let not_allowed = || RouterError::MethodNotAllowed {
            method: method.to_string(),
            path: path.to_string(),
        };
        let (route, allowed): (Route, &[&str]) = match path {
            "/health" => (Route::Health, &["GET", "HEAD"][..]),
            "/metrics" => (Route::Metrics, &["GET"][..]),
            "/register" => (Route::Register, &["POST"][..]),
            "/login" => (Route::Login, &["POST"][..]),
            "/logout" => return Ok(Route::Logout),
            "/check-login" => (Route::CheckLogin, &["GET"][..]),
            "/upload" => (Route::Upload, &["POST"][..]),
            "/list-files" => (Route::ListFiles, &["GET"][..]),
            "/download" if method == "GET" => {
                return Ok(Route::Download {
                    file: Self::file_param(query)?,
                })
            }
            "/delete" if method == "DELETE" => {
                return Ok(Route::Delete {
                    file: Self::file_param(query)?,
                })
            }
            "/download" | "/delete" => return Err(not_allowed()),
            _ => (
                Route::Static {
                    path: percent_decode_str(path).decode_utf8_lossy().into_owned(),
                },
                &["GET", "HEAD"][..],
            ),
        };

        if allowed.iter().any(|m| *m == method) {
            Ok(route)
        } else {
            Err(not_allowed())
        }
    }

    fn file_param(query: Option<&str>) -> Result<String, RouterError> {
        parse_form(query.unwrap_or_default())
            .remove("file")
            .filter(|f| !f.is_empty())
            .ok_or(RouterError::MissingParameter("file"))
    }
}

/// Decode one `application/x-www-form-urlencoded` component (`+` is a space)
fn decode_component(s: &str) -> String {
    let spaced = s.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Parse a query string or urlencoded form body. Later keys win.
pub fn parse_form(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in input.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.insert(decode_component(key), decode_component(value));
    }
    params
}

/// Value of cookie `name` in a `Cookie` header
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|cookie| {
        let (key, value) = cookie.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}

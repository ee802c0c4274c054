//! Login sessions
//!
//! A session maps an opaque token (sent back as a cookie) to a username.
//! Sessions expire after a period of inactivity; every successful
//! validation extends them.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

/// Session storage
pub trait SessionStore: Send + Sync {
    /// Start a session for `username` and return its token.
    fn create(&self, username: &str) -> String;

    /// Username behind `token`, refreshing its expiry. Expired sessions are
    /// removed and reported as absent.
    fn validate(&self, token: &str) -> Option<String>;

    fn invalidate(&self, token: &str);

    /// Drop every expired session; returns how many were removed.
    fn sweep(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct Session {
    username: String,
    last_seen: Instant,
}

/// In-process session table
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: DashMap<String, Session>,
    timeout: Duration,
}

impl MemorySessionStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            timeout,
        }
    }

    fn expired(&self, session: &Session) -> bool {
        session.last_seen.elapsed() > self.timeout
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, username: &str) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        self.sessions.insert(
            token.clone(),
            Session {
                username: username.to_string(),
                last_seen: Instant::now(),
            },
        );
        debug!(username, "Session created");
        token
    }

    fn validate(&self, token: &str) -> Option<String> {
        let mut session = self.sessions.get_mut(token)?;
        if self.expired(&session) {
            // Release the shard lock before removing
            drop(session);
            self.sessions.remove_if(token, |_, s| self.expired(s));
            return None;
        }
        session.last_seen = Instant::now();
        Some(session.username.clone())
    }

    fn invalidate(&self, token: &str) {
        if let Some((_, session)) = self.sessions.remove(token) {
            debug!(username = %session.username, "Session invalidated");
        }
    }

    fn sweep(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !self.expired(s));
        before.saturating_sub(self.sessions.len())
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}

/// Run [`SessionStore::sweep`] every `interval` until the task is aborted.
pub fn spawn_sweeper(store: Arc<dyn SessionStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.sweep();
            if removed > 0 {
                debug!(removed, remaining = store.len(), "Swept expired sessions");
            }
        }
    })
}

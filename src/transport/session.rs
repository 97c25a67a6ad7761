//! # Session Manager
//!
//! Issues, validates and expires per-client session tokens.
//!
//! ## Lifecycle
//! ```text
//! absent --create--> active --validate after timeout--> absent
//!                      ^  |
//!                      +--+ create again (token replaced)
//! ```
//!
//! Expiry is lazy: a session past its timeout stays in the table until the
//! next validation for that client (or until [`SessionManager::purge_expired`]
//! runs), and is removed at that point. A validation with the wrong token never
//! mutates the stored session.
//!
//! ## Features
//! - **Thread-safe**: table behind an `Arc<Mutex<>>`, held for one map operation
//! - **Last writer wins**: creating a session for a client replaces any prior one
//! - **Optional sweeping**: [`SessionManager::spawn_sweeper`] purges expired
//!   entries in the background without changing validation results

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::RngCore;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::error::{ProtocolError, Result};
use crate::utils::Metrics;

/// Random bytes per token; rendered as twice as many hex characters
const TOKEN_BYTES: usize = 16;

#[derive(Clone, Debug)]
struct SessionEntry {
    session_id: String,
    created_at: Instant,
    timeout: Duration,
}

impl SessionEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.timeout
    }
}

/// Shared session table keyed by client id
#[derive(Clone)]
pub struct SessionManager {
    timeout: Duration,
    sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,
    metrics: Option<Arc<Metrics>>,
}

impl SessionManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            metrics: None,
        }
    }

    /// Attach a metrics sink for session counters
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create a session for `client_id`, replacing any existing one.
    ///
    /// Returns the new token: 32 lowercase hex characters.
    pub async fn create_session(&self, client_id: &str) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let session_id = hex::encode(bytes);

        let entry = SessionEntry {
            session_id: session_id.clone(),
            created_at: Instant::now(),
            timeout: self.timeout,
        };

        let replaced = self
            .sessions
            .lock()
            .await
            .insert(client_id.to_string(), entry)
            .is_some();

        if let Some(metrics) = &self.metrics {
            metrics.session_created();
        }
        debug!(client_id, replaced, "Session created");
        session_id
    }

    /// Check a client's token.
    ///
    /// False when no session exists, when the token differs (session left
    /// untouched), or when the session has expired (session removed).
    pub async fn validate_session(&self, client_id: &str, session_id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;

        let Some(entry) = sessions.get(client_id) else {
            trace!(client_id, "No session for client");
            return false;
        };

        if entry.session_id != session_id {
            debug!(client_id, "Session token mismatch");
            return false;
        }

        if entry.is_expired() {
            sessions.remove(client_id);
            drop(sessions);
            if let Some(metrics) = &self.metrics {
                metrics.sessions_expired(1);
            }
            debug!(client_id, "Session expired and removed");
            return false;
        }

        true
    }

    /// [`validate_session`](Self::validate_session) as a `Result`, for callers
    /// that gate work on a session with `?`
    pub async fn require_session(&self, client_id: &str, session_id: &str) -> Result<()> {
        if self.validate_session(client_id, session_id).await {
            Ok(())
        } else {
            Err(ProtocolError::AuthInvalid(client_id.to_string()))
        }
    }

    /// Drop a client's session regardless of its state
    pub async fn remove_session(&self, client_id: &str) -> bool {
        self.sessions.lock().await.remove(client_id).is_some()
    }

    /// Remove every expired session; returns how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, entry| !entry.is_expired());
        let removed = before - sessions.len();
        drop(sessions);

        if removed > 0 {
            if let Some(metrics) = &self.metrics {
                metrics.sessions_expired(removed as u64);
            }
            debug!(removed_count = removed, "Expired sessions purged");
        }
        removed
    }

    /// Purge expired sessions every `interval` until the handle is aborted
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        info!(interval_ms = interval.as_millis() as u64, "Session sweeper started");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.purge_expired().await;
            }
        })
    }

    /// Get current table statistics
    pub async fn stats(&self) -> SessionStats {
        let sessions = self.sessions.lock().await;
        SessionStats {
            total_entries: sessions.len(),
            expired_count: sessions.values().filter(|e| e.is_expired()).count(),
        }
    }
}

/// Statistics about the session table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Sessions currently stored, including expired ones not yet purged
    pub total_entries: usize,
    /// Stored sessions already past their timeout
    pub expired_count: usize,
}

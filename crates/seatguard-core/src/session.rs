//! Portal session persistence model and store contract.
//!
//! A session is the durable authentication artifact (cookies + client
//! storage snapshot) that lets a run skip the login flow entirely when the
//! portal still honors it.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// Sessions older than this are never reused and are deleted on load.
pub const SESSION_MAX_AGE_DAYS: i64 = 7;

/// A single browser cookie as captured from the authenticated page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookieEntry {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    /// Unix expiry timestamp; `None` for session cookies.
    #[serde(default)]
    pub expiry: Option<i64>,
}

/// Per-account authentication state persisted between runs.
///
/// Created on successful authentication, overwritten on every successful
/// re-authentication, deleted explicitly on invalidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalSession {
    /// Cookie set captured after login verification.
    pub cookies: Vec<CookieEntry>,
    /// Flat key-value snapshot of client-side storage.
    #[serde(default)]
    pub local_storage: HashMap<String, String>,
    /// Timestamp of the last successful login verification.
    pub last_authenticated: DateTime<Utc>,
    /// Client signature (user-agent string) the session was created under.
    pub user_agent: String,
}

impl PortalSession {
    /// True when the session is past the freshness window and must be
    /// treated as absent.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.last_authenticated > Duration::days(SESSION_MAX_AGE_DAYS)
    }
}

/// Durable store for per-account portal sessions.
///
/// `load` returns `None` when no record exists, when the record is
/// malformed, or when the record is stale; staleness additionally deletes
/// the record. `save` is idempotent and atomic.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, account: &str) -> Result<Option<PortalSession>>;

    async fn save(&self, account: &str, session: &PortalSession) -> Result<()>;

    async fn clear(&self, account: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_aged(days: i64) -> PortalSession {
        PortalSession {
            cookies: vec![],
            local_storage: HashMap::new(),
            last_authenticated: Utc::now() - Duration::days(days),
            user_agent: "Mozilla/5.0".to_string(),
        }
    }

    #[test]
    fn test_fresh_session_is_not_stale() {
        assert!(!session_aged(0).is_stale(Utc::now()));
        assert!(!session_aged(6).is_stale(Utc::now()));
    }

    #[test]
    fn test_session_past_window_is_stale() {
        assert!(session_aged(8).is_stale(Utc::now()));
        assert!(session_aged(10).is_stale(Utc::now()));
    }

    #[test]
    fn test_staleness_ignores_cookie_validity() {
        // A cookie with a far-future expiry does not rescue an old session.
        let mut session = session_aged(10);
        session.cookies.push(CookieEntry {
            name: "auth".to_string(),
            value: "token".to_string(),
            domain: None,
            path: None,
            secure: true,
            http_only: true,
            expiry: Some((Utc::now() + Duration::days(365)).timestamp()),
        });
        assert!(session.is_stale(Utc::now()));
    }
}

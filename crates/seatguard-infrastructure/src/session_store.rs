//! File-backed session store.
//!
//! One JSON file per account under the sessions directory. Records are
//! written atomically; malformed records read as absent, stale records
//! (older than the freshness window) are deleted on load.

use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;

use seatguard_core::error::{Result, SeatguardError};
use seatguard_core::session::{PortalSession, SessionStore};

use crate::paths::SeatguardPaths;
use crate::storage::{AtomicJsonError, AtomicJsonFile};

/// Session store persisting one `<account>.json` per account.
pub struct FileSessionStore {
    base_dir: PathBuf,
}

impl FileSessionStore {
    /// Creates a store rooted at the default location
    /// (`~/.config/seatguard/sessions`).
    pub fn default_location() -> Result<Self> {
        let base_dir = SeatguardPaths::sessions_dir()
            .map_err(|e| SeatguardError::config(format!("Failed to resolve sessions dir: {e}")))?;
        Ok(Self::new(base_dir))
    }

    /// Creates a store rooted at `base_dir` (created lazily on save).
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn file_for(&self, account: &str) -> AtomicJsonFile<PortalSession> {
        AtomicJsonFile::new(self.base_dir.join(format!("{}.json", sanitize(account))))
    }
}

/// Keeps account names safe as file names.
fn sanitize(account: &str) -> String {
    account
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn map_storage_error(err: AtomicJsonError) -> SeatguardError {
    match err {
        AtomicJsonError::IoError(e) => e.into(),
        AtomicJsonError::JsonError(e) => e.into(),
        AtomicJsonError::LockError(message) => SeatguardError::Io { message },
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, account: &str) -> Result<Option<PortalSession>> {
        let file = self.file_for(account);
        let account = account.to_string();

        let loaded = tokio::task::spawn_blocking(move || match file.load() {
            Ok(session) => Ok((file, session)),
            Err(AtomicJsonError::JsonError(e)) => {
                // Malformed record: same as no session at all.
                tracing::warn!("Session record for '{account}' is malformed ({e}), ignoring");
                Ok((file, None))
            }
            Err(e) => Err(map_storage_error(e)),
        })
        .await
        .map_err(|e| SeatguardError::internal(format!("session load task failed: {e}")))??;

        let (file, session) = loaded;
        match session {
            Some(session) if session.is_stale(Utc::now()) => {
                tracing::info!(
                    "Session last authenticated {} is stale, removing",
                    session.last_authenticated
                );
                tokio::task::spawn_blocking(move || file.remove().map_err(map_storage_error))
                    .await
                    .map_err(|e| {
                        SeatguardError::internal(format!("session delete task failed: {e}"))
                    })??;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn save(&self, account: &str, session: &PortalSession) -> Result<()> {
        let file = self.file_for(account);
        let session = session.clone();
        tokio::task::spawn_blocking(move || file.save(&session).map_err(map_storage_error))
            .await
            .map_err(|e| SeatguardError::internal(format!("session save task failed: {e}")))??;
        Ok(())
    }

    async fn clear(&self, account: &str) -> Result<()> {
        let file = self.file_for(account);
        tokio::task::spawn_blocking(move || file.remove().map_err(map_storage_error))
            .await
            .map_err(|e| SeatguardError::internal(format!("session clear task failed: {e}")))??;
        Ok(())
    }
}

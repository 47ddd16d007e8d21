//! Persisted session file handling
//!
//! Only `refresh_token` and `session_id` survive a restart. Read failures of
//! any kind are logged and skipped so a corrupt or missing file only forces a
//! fresh login.

use crate::error::{FreetradeError, FtResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// On-disk session document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedSession {
    /// Long-lived rotating refresh token
    pub refresh_token: String,
    /// Correlation id stable across refreshes
    pub session_id: String,
}

/// Session file as read, before the session id is settled
#[derive(Debug, Deserialize)]
struct RawSession {
    refresh_token: String,
    #[serde(default)]
    session_id: Option<String>,
}

/// A usable candidate file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSession {
    /// File it came from
    pub path: PathBuf,
    /// Refresh token found in the file
    pub refresh_token: String,
    /// Session id, when the file carried one
    pub session_id: Option<String>,
}

/// Ordered list of session file candidates
#[derive(Debug, Clone)]
pub struct SessionStore {
    candidates: Vec<PathBuf>,
}

impl SessionStore {
    /// Create a store over the given candidates, first one is primary
    #[must_use]
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    /// Candidate paths in lookup order
    #[must_use]
    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Path written after a successful login
    #[must_use]
    pub fn primary(&self) -> Option<&Path> {
        self.candidates.first().map(PathBuf::as_path)
    }

    /// First candidate that exists and holds a refresh token
    pub fn load(&self) -> Option<LoadedSession> {
        for path in &self.candidates {
            if !path.is_file() {
                debug!("No session file at {}", path.display());
                continue;
            }
            match read_session_file(path) {
                Ok(session) => {
                    info!("Found persisted session at {}", path.display());
                    return Some(session);
                }
                Err(e) => error!("Error reading session file: {e}"),
            }
        }
        None
    }

    /// Write the session to the primary candidate, creating parent dirs
    ///
    /// # Errors
    /// Returns an error if there is no candidate or the write fails
    pub fn save(&self, session: &PersistedSession) -> FtResult<PathBuf> {
        let path = self
            .primary()
            .ok_or_else(|| FreetradeError::SessionWrite {
                path: PathBuf::new(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no session file candidate configured",
                ),
            })?
            .to_path_buf();

        let write = |path: &Path| -> std::io::Result<()> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let content = serde_json::to_string(session)?;
            fs::write(path, content)
        };

        write(&path).map_err(|source| FreetradeError::SessionWrite {
            path: path.clone(),
            source,
        })?;

        info!("Session saved at: {}", path.display());
        Ok(path)
    }
}

fn read_session_file(path: &Path) -> FtResult<LoadedSession> {
    let unreadable = |reason: String| FreetradeError::SessionFileUnreadable {
        path: path.to_path_buf(),
        reason,
    };

    let content = fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
    let raw: RawSession = serde_json::from_str(&content).map_err(|e| unreadable(e.to_string()))?;

    Ok(LoadedSession {
        path: path.to_path_buf(),
        refresh_token: raw.refresh_token,
        session_id: raw.session_id,
    })
}

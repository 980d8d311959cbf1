use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::UserProfile;

/// Session file name in the session directory
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionData {
    pub token: String,
    pub user: Option<UserProfile>,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(token: impl Into<String>, user: Option<UserProfile>) -> Self {
        Self {
            token: token.into(),
            user,
            created_at: Utc::now(),
        }
    }
}

/// Shared authentication state: the current bearer credential and user.
///
/// Clone is cheap and every clone sees the same state. The API client only
/// reads from it; sign-in, sign-out and the session-expiry action write.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<Option<SessionData>>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("authenticated", &self.is_authenticated())
            .field("path", &self.path)
            .finish()
    }
}

impl SessionStore {
    /// In-memory store; nothing is written to disk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store persisted as `session.json` under `dir`.
    pub fn persistent(dir: PathBuf) -> Self {
        Self {
            inner: Arc::default(),
            path: Some(dir.join(SESSION_FILE)),
        }
    }

    /// Load the persisted session, if any. Returns whether one was found.
    pub fn load(&self) -> Result<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        if !path.exists() {
            return Ok(false);
        }
        let contents = std::fs::read_to_string(path).context("Failed to read session file")?;
        let data: SessionData =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        *self.write() = Some(data);
        Ok(true)
    }

    /// Save the current session to disk. No-op for in-memory stores.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let Some(data) = self.snapshot() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&data)?;
        std::fs::write(path, contents).context("Failed to write session file")?;
        Ok(())
    }

    /// Current bearer token, read at call time.
    pub fn token(&self) -> Option<String> {
        self.read().as_ref().map(|d| d.token.clone())
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.read().as_ref().and_then(|d| d.user.clone())
    }

    pub fn snapshot(&self) -> Option<SessionData> {
        self.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    pub fn set_credential(&self, data: SessionData) {
        *self.write() = Some(data);
    }

    /// Replace the user of the current session. Ignored when signed out.
    pub fn update_user(&self, user: UserProfile) {
        if let Some(data) = self.write().as_mut() {
            data.user = Some(user);
        }
    }

    /// Drop token and user, and remove the persisted file.
    pub fn clear_credential(&self) {
        *self.write() = None;
        if let Some(path) = &self.path {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    debug!(error = %e, "Failed to remove session file");
                }
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<SessionData>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<SessionData>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

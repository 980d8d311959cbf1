//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the
//! backend base URL, transport timeout, session-expiry redirect delay, the
//! paths treated as authentication pages, and the object storage bucket.
//!
//! Configuration is stored at `~/.config/carebridge/config.json`.
//! `CAREBRIDGE_API_URL` and `CAREBRIDGE_STORAGE_BUCKET` override the file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "carebridge";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend used when neither the config file nor the environment names one.
const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Delay between the "Session Expired" notification and the redirect,
/// long enough for the notification to render.
const DEFAULT_REDIRECT_DELAY_MS: u64 = 1500;

pub const ENV_API_URL: &str = "CAREBRIDGE_API_URL";
pub const ENV_STORAGE_BUCKET: &str = "CAREBRIDGE_STORAGE_BUCKET";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub redirect_delay_ms: u64,
    /// Path prefixes on which a 401 must not redirect (login loop guard).
    pub auth_paths: Vec<String>,
    pub storage_bucket: Option<String>,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            redirect_delay_ms: DEFAULT_REDIRECT_DELAY_MS,
            auth_paths: default_auth_paths(),
            storage_bucket: None,
            last_email: None,
        }
    }
}

fn default_auth_paths() -> Vec<String> {
    ["/login", "/signup", "/register", "/forgot-password", "/reset-password", "/auth"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply environment overrides. Takes a lookup so tests do not have to
    /// touch the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(bucket) = lookup(ENV_STORAGE_BUCKET).filter(|v| !v.trim().is_empty()) {
            self.storage_bucket = Some(bucket);
        }
    }

    /// Base URL without a trailing slash, ready for `{base}/{resource}`.
    pub fn base_url(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the persisted session.
    pub fn session_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

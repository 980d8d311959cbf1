//! Object storage for user files (profile avatars, care documents).
//!
//! Objects are addressed by hierarchical keys such as
//! `user-profiles/{userId}/avatar/{timestamp}_{filename}`. Uploading returns a
//! URL the front end can fetch directly.

pub mod firebase;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use firebase::FirebaseStorage;
pub use memory::MemoryStorage;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage request failed with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Storage not configured: {0}")]
    NotConfigured(String),
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `data` under `key` and return its download URL.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String, StorageError>;

    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// Key for a profile avatar uploaded at `at`.
///
/// Only the last path component of `filename` is kept.
pub fn avatar_key(user_id: &str, filename: &str, at: DateTime<Utc>) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or("avatar");
    format!("user-profiles/{}/avatar/{}_{}", user_id, at.timestamp_millis(), name)
}

/// Keys are relative, non-empty, and have no empty or dot segments.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && key.split('/').all(|s| !s.is_empty() && s != "." && s != "..");
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

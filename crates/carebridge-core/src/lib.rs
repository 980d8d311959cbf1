//! CareBridge core library.
//!
//! Session-aware REST client for the CareBridge dementia-support backend:
//! bearer credential handling, de-duplicated session-expiry handling,
//! object storage for user files, and configuration.

pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod models;
pub mod storage;

pub use api::{ApiClient, ApiError, Service};
pub use auth::{CredentialStore, SessionData, SessionStore};
pub use config::Config;
pub use guard::{
    GuardState, Interception, Location, Navigator, Notification, Notifier, SessionEvent,
    SessionGuard, Severity, TracingNotifier,
};
pub use models::UserProfile;
pub use storage::{avatar_key, FirebaseStorage, MemoryStorage, ObjectStorage, StorageError};

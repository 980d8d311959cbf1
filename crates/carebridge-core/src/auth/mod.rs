//! Authentication state and credential storage.
//!
//! This module provides:
//! - `SessionStore`: shared bearer credential and signed-in user, optionally
//!   persisted to disk so a restart keeps the session
//! - `CredentialStore`: OS keychain storage for remembered passwords

pub mod credentials;
pub mod session;

pub use credentials::CredentialStore;
pub use session::{SessionData, SessionStore};

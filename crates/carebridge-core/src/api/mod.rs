//! REST API client module for the CareBridge backend.
//!
//! This module provides the `ApiClient` and the per-resource `Service`
//! operations (`create`, `find`, `find_one`, `find_by_user_id`, `update`,
//! `patch`, `delete`, and sub-path `post`/`get`).
//!
//! The API uses bearer token authentication. A 401 from any call is handed
//! to the shared `SessionGuard` before the error reaches the caller.

pub mod client;
pub mod error;

pub use client::{ApiClient, Service};
pub use error::ApiError;

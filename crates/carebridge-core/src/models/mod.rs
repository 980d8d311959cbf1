//! Data models shared between the client and its callers.
//!
//! Resource bodies are opaque JSON and are handed back to callers as
//! `serde_json::Value` (or any type they choose to deserialize into).
//! The only typed model is the signed-in user carried by the session.

pub mod user;

pub use user::UserProfile;

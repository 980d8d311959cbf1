use std::sync::{Arc, PoisonError, RwLock};

/// Read and change the application's current location.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;

    /// Full top-level navigation to `path`.
    fn navigate(&self, path: &str);
}

/// In-process location shared between the shell and the session guard.
#[derive(Debug, Clone)]
pub struct Location {
    path: Arc<RwLock<String>>,
}

impl Default for Location {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Location {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Arc::new(RwLock::new(path.into())),
        }
    }
}

impl Navigator for Location {
    fn current_path(&self) -> String {
        self.path.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn navigate(&self, path: &str) {
        *self.path.write().unwrap_or_else(PoisonError::into_inner) = path.to_string();
    }
}

/// Whether `path` is one of the authentication pages in `auth_paths`.
///
/// Matches a prefix on a segment boundary, so `/login/reset` matches
/// `/login` but `/loginhelp` does not.
pub fn is_auth_page(path: &str, auth_paths: &[String]) -> bool {
    auth_paths.iter().any(|auth| {
        let auth = auth.trim_end_matches('/');
        if auth.is_empty() {
            return false;
        }
        match path.strip_prefix(auth) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
            None => false,
        }
    })
}

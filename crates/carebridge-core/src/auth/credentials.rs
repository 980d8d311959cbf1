use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "carebridge";

/// OS keychain storage for the password behind "remember me" sign-in.
///
/// Only the password lives here; the bearer token is held by the
/// `SessionStore` and expires with the backend session.
pub struct CredentialStore {
    service: String,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl CredentialStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, email: &str) -> Result<Entry> {
        Entry::new(&self.service, email).context("Failed to create keyring entry")
    }

    /// Remember the password for an account.
    pub fn remember(&self, email: &str, password: &str) -> Result<()> {
        self.entry(email)?
            .set_password(password)
            .context("Failed to store password in keychain")
    }

    /// Remembered password for an account, if there is one.
    pub fn recall(&self, email: &str) -> Option<String> {
        self.entry(email).ok()?.get_password().ok()
    }

    /// Forget the remembered password. Forgetting a missing entry is not an error.
    pub fn forget(&self, email: &str) -> Result<()> {
        match self.entry(email)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credential from keychain"),
        }
    }
}

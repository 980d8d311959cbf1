//! Application shell: wires config, session, guard and client together and
//! reacts to session events.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use carebridge_core::{
    avatar_key, ApiClient, ApiError, Config, CredentialStore, FirebaseStorage, GuardState,
    Location, Navigator, Notification, Notifier, ObjectStorage, SessionEvent, SessionGuard,
    SessionStore, UserProfile,
};
use chrono::Utc;
use futures::future::join_all;
use serde_json::{json, Map, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Resources shown by `dashboard`, all keyed by user id.
const DASHBOARD_RESOURCES: [&str; 4] = ["dementia-profiles", "medications", "appointments", "caregivers"];

/// Resource holding user accounts.
const USERS_RESOURCE: &str = "users";

const LOGIN_PATH: &str = "/login";
const HOME_PATH: &str = "/dashboard";

/// Writes notifications to stderr.
struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, n: Notification) {
        eprintln!("[{}] {}: {}", n.severity, n.title, n.description);
    }
}

pub struct Shell {
    config: Config,
    api: ApiClient,
    location: Location,
    credentials: CredentialStore,
    listener: JoinHandle<()>,
}

impl Shell {
    pub fn start(api_url: Option<String>) -> Result<Self> {
        let mut config = Config::load().context("Failed to load config")?;
        config.apply_env(|key| std::env::var(key).ok());
        if let Some(url) = api_url {
            config.api_base_url = url;
        }

        let session = SessionStore::persistent(config.session_dir()?);
        match session.load() {
            Ok(found) => debug!(found, "Session loaded"),
            Err(e) => warn!(error = %e, "Failed to load session"),
        }

        let location = Location::new(if session.is_authenticated() { HOME_PATH } else { LOGIN_PATH });
        let guard = Arc::new(SessionGuard::for_session(
            &config,
            session.clone(),
            Arc::new(StderrNotifier),
            Arc::new(location.clone()),
        ));
        let listener = tokio::spawn(listen(guard.subscribe()));
        let api = ApiClient::new(&config, session, guard)?;

        Ok(Self {
            config,
            api,
            location,
            credentials: CredentialStore::default(),
            listener,
        })
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Let a pending session-expiry redirect finish before exiting.
    pub async fn finish(self) {
        let guard = self.api.guard();
        let mut events = guard.subscribe();
        if guard.state() != GuardState::Idle {
            let redirected = async {
                loop {
                    match events.recv().await {
                        Ok(SessionEvent::Redirected { .. }) | Err(RecvError::Closed) => break,
                        Ok(_) | Err(RecvError::Lagged(_)) => {}
                    }
                }
            };
            if tokio::time::timeout(self.config.redirect_delay() * 2, redirected).await.is_err() {
                warn!("Timed out waiting for session redirect");
            }
        }
        self.listener.abort();
    }

    /// Pretty-print a resource result.
    pub fn print(&self, result: Result<Value, ApiError>) -> Result<()> {
        let value = result?;
        println!("{}", serde_json::to_string_pretty(&value)?);
        Ok(())
    }

    pub async fn login(&self, email: Option<String>, remember: bool) -> Result<()> {
        let email = match email.or_else(|| self.config.last_email.clone()) {
            Some(email) => email,
            None => prompt("Email: ")?,
        };
        let password = match self.credentials.recall(&email) {
            Some(password) if !remember => password,
            _ => rpassword::prompt_password("Password: ")?,
        };

        self.location.navigate(LOGIN_PATH);
        let data = self
            .api
            .authenticate(&email, &password)
            .await
            .context("Sign in failed")?;
        self.api.session().save()?;
        self.location.navigate(HOME_PATH);

        if remember {
            if let Err(e) = self.credentials.remember(&email, &password) {
                warn!(error = %e, "Failed to remember password");
            }
        }

        // Persist only the email; env/flag overrides stay out of the file
        let mut stored = Config::load().unwrap_or_default();
        stored.last_email = Some(email.clone());
        stored.save()?;

        let name = data.user.as_ref().map(UserProfile::display_name).unwrap_or(email);
        println!("Signed in as {}", name);
        Ok(())
    }

    pub fn logout(&self, forget: bool) -> Result<()> {
        self.api.sign_out();
        if forget {
            if let Some(email) = &self.config.last_email {
                self.credentials.forget(email)?;
            }
        }
        self.location.navigate(LOGIN_PATH);
        println!("Signed out");
        Ok(())
    }

    pub fn whoami(&self) -> Result<()> {
        match self.api.session().snapshot() {
            Some(data) => {
                let name = data
                    .user
                    .as_ref()
                    .map(UserProfile::display_name)
                    .unwrap_or_else(|| "unknown user".to_string());
                println!("{} (signed in {})", name, data.created_at.format("%Y-%m-%d %H:%M UTC"));
            }
            None => println!("Not signed in"),
        }
        Ok(())
    }

    /// Fetch every dashboard section at once. Sections fail independently;
    /// the command fails only when all of them do.
    pub async fn dashboard(&self, user_id: &str) -> Result<()> {
        let calls = DASHBOARD_RESOURCES.map(|resource| {
            let service = self.api.service(resource);
            async move { (resource, service.find_by_user_id::<Value>(user_id).await) }
        });
        let results = join_all(calls).await;

        let mut overview = Map::new();
        let mut first_error = None;
        let mut failures = 0;
        for (resource, result) in results {
            match result {
                Ok(value) => {
                    overview.insert(resource.to_string(), value);
                }
                Err(e) => {
                    failures += 1;
                    overview.insert(resource.to_string(), json!({ "error": e.to_string() }));
                    first_error.get_or_insert(e);
                }
            }
        }

        if failures == DASHBOARD_RESOURCES.len() {
            if let Some(e) = first_error {
                return Err(e.into());
            }
        }
        println!("{}", serde_json::to_string_pretty(&Value::Object(overview))?);
        Ok(())
    }

    pub async fn upload_avatar(&self, user_id: &str, file: &Path) -> Result<()> {
        let storage = FirebaseStorage::from_config(&self.config)
            .context("Cannot upload avatar (set CAREBRIDGE_STORAGE_BUCKET)")?;

        let data = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
        let filename = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("avatar");
        let key = avatar_key(user_id, filename, Utc::now());
        let content_type = content_type_for(&data);
        debug!(file = %file.display(), content_type, "Uploading avatar");
        let url = storage.upload(&key, data, content_type).await?;

        let user: UserProfile = self
            .api
            .service(USERS_RESOURCE)
            .patch(user_id, &json!({ "avatarUrl": url }))
            .await?;
        if self.api.session().user().is_some_and(|u| u.id == user.id) {
            self.api.session().update_user(user);
            self.api.session().save()?;
        }

        println!("{}", url);
        Ok(())
    }
}

async fn listen(mut events: tokio::sync::broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Expired) => eprintln!("Run `carebridge login` to sign in again."),
            Ok(SessionEvent::Redirected { to }) => debug!(to = %to, "Session redirect finished"),
            Err(RecvError::Lagged(n)) => debug!(skipped = n, "Session listener lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let value = line.trim().to_string();
    anyhow::ensure!(!value.is_empty(), "{} is required", label.trim_end_matches(": "));
    Ok(value)
}

/// Content type sniffed from the file's leading bytes; the extension is
/// not trusted.
fn content_type_for(data: &[u8]) -> &'static str {
    infer::get(data).map_or("application/octet-stream", |kind| kind.mime_type())
}

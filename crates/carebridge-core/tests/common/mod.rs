//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use carebridge_core::{
    ApiClient, Config, Navigator, Notification, Notifier, SessionData, SessionGuard, SessionStore,
};

/// Redirect delay used by the tests; short so they stay fast.
pub const REDIRECT_DELAY: Duration = Duration::from_millis(50);

/// Comfortably past `REDIRECT_DELAY`.
pub const SETTLE: Duration = Duration::from_millis(300);

#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn seen(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}

/// Navigator that records every navigation.
pub struct RecordingNavigator {
    current: Mutex<String>,
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn at(path: &str) -> Self {
        Self {
            current: Mutex::new(path.to_string()),
            visits: Mutex::new(Vec::new()),
        }
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        self.current.lock().unwrap().clone()
    }

    fn navigate(&self, path: &str) {
        *self.current.lock().unwrap() = path.to_string();
        self.visits.lock().unwrap().push(path.to_string());
    }
}

pub struct Harness {
    pub api: ApiClient,
    pub session: SessionStore,
    pub guard: Arc<SessionGuard>,
    pub notifier: Arc<RecordingNotifier>,
    pub navigator: Arc<RecordingNavigator>,
}

/// Client against `base_url`, signed in with `token`, currently showing `path`.
pub fn harness(base_url: &str, path: &str, token: Option<&str>) -> Harness {
    harness_with_delay(base_url, path, token, REDIRECT_DELAY)
}

pub fn harness_with_delay(base_url: &str, path: &str, token: Option<&str>, delay: Duration) -> Harness {
    let config = Config {
        api_base_url: base_url.to_string(),
        redirect_delay_ms: delay.as_millis() as u64,
        ..Config::default()
    };
    let session = SessionStore::new();
    if let Some(token) = token {
        session.set_credential(SessionData::new(token, None));
    }
    let notifier = Arc::new(RecordingNotifier::default());
    let navigator = Arc::new(RecordingNavigator::at(path));
    let guard = Arc::new(SessionGuard::for_session(
        &config,
        session.clone(),
        notifier.clone(),
        navigator.clone(),
    ));
    let api = ApiClient::new(&config, session.clone(), Arc::clone(&guard)).expect("client");

    Harness {
        api,
        session,
        guard,
        notifier,
        navigator,
    }
}

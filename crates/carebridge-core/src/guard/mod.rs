//! Session-expiry guard shared by every API client in the process.
//!
//! When a request fails with 401 the guard decides whether this failure
//! starts a new expiry episode. Only the first failure of an episode notifies
//! the user, clears the session and schedules the redirect to `/`; the rest
//! pass through untouched. The guard publishes `SessionEvent`s so the
//! application shell can react without the transport knowing about it.
//!
//! Episode state machine:
//!
//! ```text
//! Idle --401--> Pending --auth page--> Idle
//!                  |
//!                  +--notify + clear--> Redirecting --delay, navigate /--> Idle
//! ```

pub mod navigate;
pub mod notify;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::auth::SessionStore;
use crate::config::Config;

pub use navigate::{is_auth_page, Location, Navigator};
pub use notify::{Notification, Notifier, Severity, TracingNotifier};

/// Where the user lands after the session expired.
pub const ROOT_PATH: &str = "/";

/// Capacity of the session event channel. Slow subscribers only miss
/// events, they never block the guard.
const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GuardState {
    Idle = 0,
    Pending = 1,
    Redirecting = 2,
}

impl GuardState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => GuardState::Pending,
            2 => GuardState::Redirecting,
            _ => GuardState::Idle,
        }
    }
}

/// Signals for the application shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Session was cleared after an authentication failure.
    Expired,
    /// The delayed redirect ran and the guard is idle again.
    Redirected { to: String },
}

/// What the guard did with one authentication failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interception {
    /// Another failure already owns the current episode.
    AlreadyHandled,
    /// The user is on an authentication page; nothing to do.
    OnAuthPage,
    /// This failure started an episode: notified, cleared, redirect scheduled.
    Redirecting,
}

type ExpiredAction = Arc<dyn Fn() + Send + Sync>;

pub struct SessionGuard {
    state: AtomicU8,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    on_expired: ExpiredAction,
    auth_paths: Vec<String>,
    redirect_delay: Duration,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("state", &self.state())
            .field("auth_paths", &self.auth_paths)
            .field("redirect_delay", &self.redirect_delay)
            .finish_non_exhaustive()
    }
}

impl SessionGuard {
    /// Guard with default auth pages and delay and no expiry action.
    pub fn new(notifier: Arc<dyn Notifier>, navigator: Arc<dyn Navigator>) -> Self {
        let defaults = Config::default();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: AtomicU8::new(GuardState::Idle as u8),
            notifier,
            navigator,
            on_expired: Arc::new(|| {}),
            redirect_delay: defaults.redirect_delay(),
            auth_paths: defaults.auth_paths,
            events,
        }
    }

    /// Guard wired to `config` whose expiry action clears `session`.
    pub fn for_session(
        config: &Config,
        session: SessionStore,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self::new(notifier, navigator)
            .with_auth_paths(config.auth_paths.clone())
            .with_redirect_delay(config.redirect_delay())
            .with_on_expired(move || session.clear_credential())
    }

    pub fn with_on_expired<F>(mut self, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_expired = Arc::new(action);
        self
    }

    pub fn with_auth_paths(mut self, auth_paths: Vec<String>) -> Self {
        self.auth_paths = auth_paths;
        self
    }

    pub fn with_redirect_delay(mut self, delay: Duration) -> Self {
        self.redirect_delay = delay;
        self
    }

    pub fn state(&self) -> GuardState {
        GuardState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Handle one authentication failure.
    ///
    /// Must run inside a tokio runtime: the redirect is scheduled on a
    /// spawned task so the failing request returns immediately.
    pub fn intercept(self: &Arc<Self>) -> Interception {
        if self
            .state
            .compare_exchange(
                GuardState::Idle as u8,
                GuardState::Pending as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            debug!(state = ?self.state(), "Session expiry already being handled");
            return Interception::AlreadyHandled;
        }

        let path = self.navigator.current_path();
        if is_auth_page(&path, &self.auth_paths) {
            debug!(path = %path, "Unauthorized on an authentication page, not redirecting");
            self.state.store(GuardState::Idle as u8, Ordering::Release);
            return Interception::OnAuthPage;
        }

        warn!(path = %path, "Session expired, signing out");
        self.notifier.notify(Notification::session_expired());
        (self.on_expired)();
        // No subscribers is fine
        let _ = self.events.send(SessionEvent::Expired);
        self.state.store(GuardState::Redirecting as u8, Ordering::Release);

        let guard = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(guard.redirect_delay).await;
            guard.navigator.navigate(ROOT_PATH);
            info!(to = ROOT_PATH, "Redirected after session expiry");
            // Idle before publishing, so subscribers reacting to the event
            // can start a new episode
            guard.state.store(GuardState::Idle as u8, Ordering::Release);
            let _ = guard.events.send(SessionEvent::Redirected {
                to: ROOT_PATH.to_string(),
            });
        });

        Interception::Redirecting
    }
}

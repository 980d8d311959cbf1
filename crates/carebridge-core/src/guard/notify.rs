use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Success => write!(f, "success"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A transient user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    #[cfg_attr(feature = "ts", ts(type = "{ secs: number, nanos: number }"))]
    pub duration: Duration,
}

impl Notification {
    pub fn session_expired() -> Self {
        Self {
            title: "Session Expired".to_string(),
            description: "Your session has expired. Please log in again.".to_string(),
            severity: Severity::Warning,
            duration: Duration::from_secs(5),
        }
    }
}

/// Sink that renders notifications to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Notifier that only logs. Used when no UI is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: Notification) {
        match n.severity {
            Severity::Error => error!(title = %n.title, "{}", n.description),
            Severity::Warning => warn!(title = %n.title, "{}", n.description),
            Severity::Info | Severity::Success => info!(title = %n.title, "{}", n.description),
        }
    }
}

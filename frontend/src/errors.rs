//! Error taxonomy and the single default transport-error handler
//!
//! Components never classify transport failures themselves: the reconciler
//! hands every current-key failure to one `ErrorSink`, which decides between
//! re-authentication, maintenance mode and a transient notification.

use crate::config::ErrorSection;
use crate::dataflow::{Atom, ReadOnly, Relay, Runtime, relay};
use chrono::{DateTime, Utc};
use futures::channel::mpsc::UnboundedReceiver;
use serde::{Deserialize, Serialize};
use std::cell::Cell;

// ===== ERROR TYPES =====

/// Failure reported by the data transport. `status` 0 means no usable response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("request failed with status {status}")]
pub struct TransportError {
    pub status: u16,
    #[serde(default)]
    pub code: Option<String>,
}

impl TransportError {
    pub const INVALID_PAYLOAD: &'static str = "invalid_payload";

    pub fn new(status: u16) -> Self {
        Self { status, code: None }
    }

    pub fn with_code(status: u16, code: impl Into<String>) -> Self {
        Self {
            status,
            code: Some(code.into()),
        }
    }

    pub fn network() -> Self {
        Self::new(0)
    }

    pub fn invalid_payload(error: &serde_json::Error) -> Self {
        log::debug!("Response payload did not match the expected shape: {error}");
        Self::with_code(0, Self::INVALID_PAYLOAD)
    }
}

/// Local input constraint violation. Never reaches the network.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("range start {start} must be before its end {end}")]
    EmptyRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("frequency size must be at least 1")]
    ZeroFrequency,
    #[error("a {frequency} bucket does not fit in the selected range")]
    FrequencyExceedsRange { frequency: String },
}

/// Classified failure kept in a `LoadState`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    Unavailable,
    Failed { status: u16, code: Option<String> },
}

// ===== CLASSIFICATION =====

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorPolicy {
    pub reauthenticate_statuses: Vec<u16>,
    pub maintenance_statuses: Vec<u16>,
}

impl ErrorPolicy {
    pub fn from_config(config: &ErrorSection) -> Self {
        Self {
            reauthenticate_statuses: config.reauthenticate_statuses.clone(),
            maintenance_statuses: config.maintenance_statuses.clone(),
        }
    }

    pub fn classify(&self, error: &TransportError) -> ErrorKind {
        if self.reauthenticate_statuses.contains(&error.status) {
            ErrorKind::Unauthorized
        } else if self.maintenance_statuses.contains(&error.status) {
            ErrorKind::Unavailable
        } else {
            ErrorKind::Failed {
                status: error.status,
                code: error.code.clone(),
            }
        }
    }
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self::from_config(&ErrorSection::default())
    }
}

/// The one place transport errors for current requests are reported to.
pub trait ErrorSink {
    fn report(&self, error: &TransportError) -> ErrorKind;
}

// ===== DEFAULT HANDLER =====

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub title: String,
    pub message: String,
    /// Raw error for logs and bug reports
    pub technical_error: String,
    pub auto_dismiss_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReauthenticationRequest {
    pub status: u16,
}

/// Routes classified transport errors to app-wide UI state.
///
/// It is the only writer of the maintenance flag and the notification list,
/// and the only emitter of reauthentication requests.
pub struct DefaultErrorHandler {
    policy: ErrorPolicy,
    auto_dismiss_ms: u64,
    maintenance: Atom<bool>,
    notifications: Atom<Vec<Notification>>,
    reauthentication_requested_relay: Relay<ReauthenticationRequest>,
    next_notification_id: Cell<u64>,
}

impl DefaultErrorHandler {
    pub fn new(
        runtime: &Runtime,
        config: &ErrorSection,
    ) -> (Self, UnboundedReceiver<ReauthenticationRequest>) {
        let (reauthentication_requested_relay, reauthentication_requested_stream) = relay();
        let handler = Self {
            policy: ErrorPolicy::from_config(config),
            auto_dismiss_ms: config.notification_auto_dismiss_ms,
            maintenance: runtime.atom(false),
            notifications: runtime.atom(Vec::new()),
            reauthentication_requested_relay,
            next_notification_id: Cell::new(1),
        };
        (handler, reauthentication_requested_stream)
    }

    pub fn policy(&self) -> &ErrorPolicy {
        &self.policy
    }

    pub fn maintenance(&self) -> ReadOnly<bool> {
        self.maintenance.read_only()
    }

    pub fn notifications(&self) -> ReadOnly<Vec<Notification>> {
        self.notifications.read_only()
    }

    /// Called once the backend answers normally again.
    pub fn leave_maintenance(&self) {
        self.maintenance.set_neq(false);
    }

    pub fn dismiss(&self, id: u64) {
        if self.notifications.with_untracked(|list| list.iter().any(|n| n.id == id)) {
            self.notifications
                .update(|list| list.iter().filter(|n| n.id != id).cloned().collect());
        }
    }

    fn push_notification(&self, error: &TransportError) {
        let id = self.next_notification_id.get();
        self.next_notification_id.set(id + 1);
        let notification = Notification {
            id,
            title: "Request Failed".to_string(),
            message: user_friendly_message(error).to_string(),
            technical_error: format!("{error} (code: {:?})", error.code),
            auto_dismiss_ms: self.auto_dismiss_ms,
        };
        self.notifications.update(|list| {
            let mut list = list.clone();
            list.push(notification);
            list
        });
    }
}

impl ErrorSink for DefaultErrorHandler {
    fn report(&self, error: &TransportError) -> ErrorKind {
        let kind = self.policy.classify(error);
        match &kind {
            ErrorKind::Unauthorized => {
                log::warn!("Session rejected with status {}, requesting sign-in", error.status);
                self.reauthentication_requested_relay
                    .send(ReauthenticationRequest {
                        status: error.status,
                    });
            }
            ErrorKind::Unavailable => {
                log::warn!("Backend unavailable (status {}), entering maintenance mode", error.status);
                self.maintenance.set_neq(true);
            }
            ErrorKind::Failed { .. } => {
                log::debug!("Transport error surfaced as notification: {error}");
                self.push_notification(error);
            }
        }
        kind
    }
}

fn user_friendly_message(error: &TransportError) -> &'static str {
    match (error.status, error.code.as_deref()) {
        (0, Some(TransportError::INVALID_PAYLOAD)) => "The server sent data we could not read",
        (0, _) => "Cannot reach the server, check your connection",
        (403, _) => "You do not have permission to view this data",
        (404, _) => "The requested data was not found",
        (400..=499, _) => "The request was rejected",
        (500..=599, _) => "The server ran into a problem, try again shortly",
        _ => "The request failed",
    }
}

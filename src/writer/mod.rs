/// Writer: sends user edits back to the telemetry server.
///
/// A toggle or click on a bound control becomes one form-encoded `POST /`
/// carrying the field path as the key and `true`/`false` as the value. The
/// writer never touches the page: the next poll cycle shows whatever the
/// server accepted.
///
/// Start actions may be guarded by a dependency (the LTV ping needs the
/// DUST simulator). A closed guard either blocks with a user-facing message
/// or silently drops the action, per guard; in both cases no request goes
/// out.
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::binding::{Action, BindingKind, BindingTable};
use crate::poller::Transport;

pub const SERVER_ERROR_NOTICE: &str = "Server may be down.";
pub const UNREACHABLE_NOTICE: &str =
    "Cannot communicate with server. Check your network connection.";

// ---------------------------------------------------------------------------
// Events and requests
// ---------------------------------------------------------------------------

/// A user interaction with a bound control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEvent {
    Toggle { element: String, checked: bool },
    Click { element: String },
}

impl UserEvent {
    pub fn element(&self) -> &str {
        match self {
            Self::Toggle { element, .. } | Self::Click { element } => element,
        }
    }
}

/// One field write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub path: String,
    pub value: String,
    /// Set when the write came from a start button, for guard checks.
    pub action: Option<Action>,
}

impl WriteRequest {
    pub fn new(path: &str, value: impl ToString) -> Self {
        Self {
            path: path.to_string(),
            value: value.to_string(),
            action: None,
        }
    }

    /// Form fields for the request body.
    pub fn form(&self, room: Option<u32>) -> Vec<(String, String)> {
        let mut fields = vec![(self.path.clone(), self.value.clone())];
        if let Some(room) = room {
            fields.push(("room".to_string(), room.to_string()));
        }
        fields
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("no bound element '{0}' on this page")]
    UnknownElement(String),
    #[error("element '{element}' does not accept {event}")]
    WrongEvent { element: String, event: &'static str },
    #[error("element '{0}' is read-only on this page")]
    ReadOnly(String),
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// What to do with a guarded start action whose dependency is down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum GuardPolicy {
    /// Refuse and show `message` to the user.
    Block { message: String },
    /// Drop the action without a word.
    Ignore,
}

/// A dependency that must be connected before `path` may be started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionGuard {
    pub path: String,
    /// Field path of the dependency's connected flag.
    pub requires: String,
    #[serde(flatten)]
    pub policy: GuardPolicy,
}

/// Find the guard covering `path`, if any.
pub fn guard_for<'a>(guards: &'a [ActionGuard], path: &str) -> Option<&'a ActionGuard> {
    guards.iter().find(|g| g.path == path)
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Sent { status: u16 },
    /// 4xx — logged and otherwise swallowed.
    ClientRejected { status: u16 },
    /// 5xx — optionally surfaced to the user.
    ServerFailed { status: u16, notice: Option<String> },
    Unreachable { notice: Option<String> },
    /// Guard closed; nothing was sent.
    Blocked { message: String },
    /// Guard closed with the ignore policy; nothing was sent.
    Ignored,
}

impl WriteOutcome {
    /// Message to show the user, if any.
    pub fn notice(&self) -> Option<&str> {
        match self {
            Self::ServerFailed { notice, .. } | Self::Unreachable { notice } => notice.as_deref(),
            Self::Blocked { message } => Some(message),
            _ => None,
        }
    }

    /// Whether a request reached the network.
    pub fn was_sent(&self) -> bool {
        !matches!(self, Self::Blocked { .. } | Self::Ignored)
    }

    /// Short tag used in the event log.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Sent { .. } => "sent",
            Self::ClientRejected { .. } => "client-error",
            Self::ServerFailed { .. } => "server-error",
            Self::Unreachable { .. } => "unreachable",
            Self::Blocked { .. } => "blocked",
            Self::Ignored => "ignored",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Sent { status }
            | Self::ClientRejected { status }
            | Self::ServerFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Writer {
    endpoint: String,
    timeout: Duration,
    alert_on_server_error: bool,
}

impl Writer {
    pub fn new(base_url: &str, timeout: Duration, alert_on_server_error: bool) -> Self {
        Self {
            endpoint: format!("{}/", base_url.trim_end_matches('/')),
            timeout,
            alert_on_server_error,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Work out which field an event writes and with what value.
    pub fn request_for(table: &BindingTable, event: &UserEvent) -> Result<WriteRequest, WriteError> {
        let binding = table
            .by_element(event.element())
            .ok_or_else(|| WriteError::UnknownElement(event.element().to_string()))?;
        if binding.readonly {
            return Err(WriteError::ReadOnly(binding.element.clone()));
        }

        match (event, binding.kind) {
            (UserEvent::Toggle { checked, .. }, BindingKind::Checkbox) => {
                Ok(WriteRequest::new(&binding.path, checked))
            }
            (UserEvent::Click { .. }, BindingKind::Action(action)) => Ok(WriteRequest {
                action: Some(action),
                ..WriteRequest::new(&binding.path, action.value())
            }),
            (UserEvent::Click { .. }, BindingKind::Button { value }) => {
                Ok(WriteRequest::new(&binding.path, value))
            }
            (UserEvent::Toggle { .. }, _) => Err(WriteError::WrongEvent {
                element: binding.element.clone(),
                event: "toggles",
            }),
            (UserEvent::Click { .. }, _) => Err(WriteError::WrongEvent {
                element: binding.element.clone(),
                event: "clicks",
            }),
        }
    }

    /// Check a request against the page's guards.
    ///
    /// `link_open` reports whether a guard's dependency is currently
    /// connected. Returns the outcome to report when the request must not
    /// be sent.
    pub fn check_guard<F>(
        request: &WriteRequest,
        guards: &[ActionGuard],
        link_open: F,
    ) -> Option<WriteOutcome>
    where
        F: Fn(&ActionGuard) -> bool,
    {
        if request.action != Some(Action::Start) {
            return None;
        }
        let guard = guard_for(guards, &request.path)?;
        if link_open(guard) {
            return None;
        }
        Some(match &guard.policy {
            GuardPolicy::Block { message } => WriteOutcome::Blocked {
                message: message.clone(),
            },
            GuardPolicy::Ignore => WriteOutcome::Ignored,
        })
    }

    /// POST a request and classify the response.
    pub fn send<T: Transport + ?Sized>(
        &self,
        transport: &T,
        request: &WriteRequest,
        room: Option<u32>,
    ) -> WriteOutcome {
        match transport.post_form(&self.endpoint, &request.form(room), self.timeout) {
            Ok(status) if status >= 500 => WriteOutcome::ServerFailed {
                status,
                notice: self.alert_on_server_error.then(|| {
                    format!(
                        "Server error while updating {}. {SERVER_ERROR_NOTICE}",
                        request.path
                    )
                }),
            },
            Ok(status) if status >= 400 => WriteOutcome::ClientRejected { status },
            Ok(status) => WriteOutcome::Sent { status },
            Err(_) => WriteOutcome::Unreachable {
                notice: self
                    .alert_on_server_error
                    .then(|| UNREACHABLE_NOTICE.to_string()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

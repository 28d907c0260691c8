//! Backend push events and user-facing notifications
//!
//! The backend announces state changes on an [`EventBus`]; the controller
//! consumes them through a scoped [`EventSubscription`] and answers with
//! [`Notification`]s for the presentation layer.

use crate::error::EnhanceError;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default queue depth of the event bus
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Fallback text for a formatting error without a message
pub const FORMATTING_FAILED: &str = "Formatting failed";

/// Fire-and-forget notification pushed by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum BackendEvent {
    /// The active provider was validated by the backend
    AiReady,
    ApiKeySaved { provider: String },
    ApiKeyRemoved { provider: String },
    /// Enhancing a transcript failed
    FormattingError { message: String },
}

impl BackendEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            BackendEvent::AiReady => "ai-ready",
            BackendEvent::ApiKeySaved { .. } => "api-key-saved",
            BackendEvent::ApiKeyRemoved { .. } => "api-key-removed",
            BackendEvent::FormattingError { .. } => "formatting-error",
        }
    }
}

/// Broadcast channel carrying [`BackendEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BackendEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; returns how many subscribers saw it
    pub fn emit(&self, event: BackendEvent) -> usize {
        tracing::debug!(event = event.name(), "backend event");
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.sender.subscribe()
    }
}

/// Handle of a running event consumer
///
/// Dropping it stops the consumer from taking new events. A handler that is
/// already running finishes; its state changes are still gated by the
/// controller's liveness flag.
#[derive(Debug)]
pub struct EventSubscription {
    handle: JoinHandle<()>,
    token: CancellationToken,
}

impl EventSubscription {
    pub fn new(handle: JoinHandle<()>, token: CancellationToken) -> Self {
        Self { handle, token }
    }

    /// Stop consuming events now
    pub fn unsubscribe(self) {}

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Error,
}

/// Transient toast shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn from_error(err: &EnhanceError) -> Self {
        Self::error(err.title(), err.to_string())
    }

    /// Toast for a `formatting-error` event
    pub fn formatting_failed(message: &str) -> Self {
        let message = if message.trim().is_empty() {
            FORMATTING_FAILED
        } else {
            message
        };
        Self::error("AI Formatting Failed", message)
    }

    pub fn is_error(&self) -> bool {
        self.level == NotificationLevel::Error
    }
}

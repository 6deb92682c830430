use crate::models::ObjectRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Severity of a notice, mirrored from the control plane's event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeKind {
    Normal,
    Warning,
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Warning => write!(f, "Warning"),
        }
    }
}

/// User-visible notice attached to a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreNotice {
    pub subject: ObjectRef,
    pub kind: NoticeKind,
    pub reason: String,
    pub message: String,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

/// Sink for user-visible notices
pub trait EventRecorder: Send + Sync {
    fn record(&self, subject: &ObjectRef, kind: NoticeKind, reason: &str, message: &str);

    fn normal(&self, subject: &ObjectRef, reason: &str, message: &str) {
        self.record(subject, NoticeKind::Normal, reason, message);
    }

    fn warning(&self, subject: &ObjectRef, reason: &str, message: &str) {
        self.record(subject, NoticeKind::Warning, reason, message);
    }
}

/// Broadcast publisher for restore notices
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<RestoreNotice>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a notice
    pub fn publish(&self, notice: RestoreNotice) {
        // No subscribers is fine; the notice is still logged by the caller
        let _ = self.sender.send(notice);
    }

    /// Subscribe to notices
    pub fn subscribe(&self) -> broadcast::Receiver<RestoreNotice> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventRecorder for EventPublisher {
    fn record(&self, subject: &ObjectRef, kind: NoticeKind, reason: &str, message: &str) {
        match kind {
            NoticeKind::Normal => info!(subject = %subject, reason = reason, "{message}"),
            NoticeKind::Warning => warn!(subject = %subject, reason = reason, "{message}"),
        }
        self.publish(RestoreNotice {
            subject: subject.clone(),
            kind,
            reason: reason.to_string(),
            message: message.to_string(),
            published_at: chrono::Utc::now(),
        });
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

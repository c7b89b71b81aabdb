//! Progress events streamed to subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::AuditStatus;

/// A state delta produced by the orchestrator. The event bus assigns the
/// per-audit sequence number and delivery metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub audit_id: i64,
    pub stage: String,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AuditStatus>,
}

impl ProgressUpdate {
    pub fn new(audit_id: i64, stage: impl Into<String>, progress: u8) -> Self {
        Self {
            audit_id,
            stage: stage.into(),
            progress,
            message: None,
            status: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_status(mut self, status: AuditStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// A delivered progress event. `seq` is strictly increasing per audit;
/// `dropped` is non-zero when ring-buffer overflow discarded events since
/// the subscriber's previous delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub audit_id: i64,
    pub seq: u64,
    pub stage: String,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AuditStatus>,
    #[serde(default)]
    pub dropped: u64,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn from_update(update: ProgressUpdate, seq: u64) -> Self {
        Self {
            audit_id: update.audit_id,
            seq,
            stage: update.stage,
            progress: update.progress,
            message: update.message,
            status: update.status,
            dropped: 0,
            timestamp: Utc::now(),
        }
    }

    /// Heartbeat for a still-running audit; carries the last known stage
    /// and progress.
    pub fn heartbeat(audit_id: i64, seq: u64, stage: String, progress: u8) -> Self {
        Self {
            audit_id,
            seq,
            stage,
            progress,
            message: Some("heartbeat".to_string()),
            status: None,
            dropped: 0,
            timestamp: Utc::now(),
        }
    }
}

/// Sink for orchestrator progress. Implemented by the job manager's event
/// bus; a no-op implementation serves direct invocations and tests.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, update: ProgressUpdate);
}

/// Discards all updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn emit(&self, _update: ProgressUpdate) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_builder_carries_fields() {
        let update = ProgressUpdate::new(3, "crawl", 35)
            .with_message("12 pages")
            .with_status(AuditStatus::Running);
        assert_eq!(update.audit_id, 3);
        assert_eq!(update.stage, "crawl");
        assert_eq!(update.progress, 35);
        assert_eq!(update.message.as_deref(), Some("12 pages"));
        assert_eq!(update.status, Some(AuditStatus::Running));
    }

    #[test]
    fn event_from_update_keeps_seq() {
        let event = ProgressEvent::from_update(ProgressUpdate::new(1, "validate", 5), 42);
        assert_eq!(event.seq, 42);
        assert_eq!(event.dropped, 0);
    }
}

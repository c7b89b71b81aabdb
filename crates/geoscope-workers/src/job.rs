//! Audit queue entries and their retry policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use geoscope_fetch::backoff_delay;
use geoscope_types::AuditError;

/// Attempts per job, including the first.
pub const MAX_ATTEMPTS: u32 = 3;
/// Backoff base for infrastructure retries.
pub const RETRY_BASE: Duration = Duration::from_secs(2);
/// Backoff ceiling.
pub const RETRY_MAX: Duration = Duration::from_secs(60);

/// One queued audit run.
#[derive(Debug, Clone)]
pub struct AuditJob {
    pub audit_id: i64,
    pub submitted_at: DateTime<Utc>,
    /// Completed attempts so far.
    pub attempt: u32,
}

impl AuditJob {
    pub fn new(audit_id: i64) -> Self {
        Self {
            audit_id,
            submitted_at: Utc::now(),
            attempt: 0,
        }
    }

    /// Infrastructure failures retry with backoff; logical failures and
    /// cancellation never do.
    pub fn should_retry(&self, error: &AuditError) -> bool {
        error.is_retryable() && self.attempt + 1 < MAX_ATTEMPTS
    }

    /// Jittered delay before the next attempt.
    pub fn retry_delay(&self) -> Duration {
        backoff_delay(self.attempt.saturating_sub(1), RETRY_BASE, RETRY_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infra_failures_retry_until_exhausted() {
        let mut job = AuditJob::new(1);
        let outage = AuditError::Http5xx { status: 503 };
        assert!(job.should_retry(&outage));
        job.attempt = 1;
        assert!(job.should_retry(&outage));
        job.attempt = 2;
        assert!(!job.should_retry(&outage), "third attempt is the last");
    }

    #[test]
    fn logical_failures_never_retry() {
        let job = AuditJob::new(1);
        assert!(!job.should_retry(&AuditError::invalid_config("bad seed")));
        assert!(!job.should_retry(&AuditError::Canceled));
        assert!(!job.should_retry(&AuditError::SsrfBlocked {
            host: "127.0.0.1".into()
        }));
    }

    #[test]
    fn retry_delay_is_capped() {
        let mut job = AuditJob::new(1);
        job.attempt = 30;
        assert!(job.retry_delay() <= RETRY_MAX);
    }
}

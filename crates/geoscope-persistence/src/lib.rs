//! Audit persistence surface.
//!
//! The core depends only on [`AuditStore`]; any backing store works as
//! long as `set_results` is atomic with respect to readers. The in-memory
//! implementation is the reference one and enforces the audit lifecycle:
//! terminal states are never left, and progress never decreases while
//! running.

use async_trait::async_trait;
use chrono::Utc;
use geoscope_types::{
    Audit, AuditConfig, AuditError, AuditResults, AuditStatus, Result,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Storage surface for audits.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Allocate an id and persist a new pending audit.
    async fn create(
        &self,
        owner_id: &str,
        owner_email: Option<String>,
        config: AuditConfig,
    ) -> Result<Audit>;

    async fn get(&self, audit_id: i64) -> Result<Audit>;

    /// Update lifecycle fields. Rejected with `conflict` once the audit is
    /// terminal. Progress is clamped monotonic while running.
    async fn update_status(
        &self,
        audit_id: i64,
        status: AuditStatus,
        progress: u8,
        stage: Option<String>,
        error: Option<String>,
    ) -> Result<()>;

    /// Replace the results block as one atomic unit.
    async fn set_results(&self, audit_id: i64, results: AuditResults) -> Result<()>;

    /// Append non-fatal warnings.
    async fn add_warnings(&self, audit_id: i64, warnings: Vec<String>) -> Result<()>;
}

/// In-memory store backed by a read-write lock.
#[derive(Default)]
pub struct InMemoryAuditStore {
    audits: RwLock<HashMap<i64, Audit>>,
    next_id: AtomicI64,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self {
            audits: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.audits.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.audits.read().await.is_empty()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn create(
        &self,
        owner_id: &str,
        owner_email: Option<String>,
        config: AuditConfig,
    ) -> Result<Audit> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut audit = Audit::new(id, owner_id, config);
        audit.owner_email = owner_email;
        self.audits.write().await.insert(id, audit.clone());
        debug!(audit_id = id, "audit created");
        Ok(audit)
    }

    async fn get(&self, audit_id: i64) -> Result<Audit> {
        self.audits
            .read()
            .await
            .get(&audit_id)
            .cloned()
            .ok_or(AuditError::NotFound { id: audit_id })
    }

    async fn update_status(
        &self,
        audit_id: i64,
        status: AuditStatus,
        progress: u8,
        stage: Option<String>,
        error: Option<String>,
    ) -> Result<()> {
        let mut audits = self.audits.write().await;
        let audit = audits
            .get_mut(&audit_id)
            .ok_or(AuditError::NotFound { id: audit_id })?;

        if audit.status.is_terminal() {
            return Err(AuditError::Conflict {
                message: format!("audit {} is already {:?}", audit_id, audit.status),
            });
        }

        if status == AuditStatus::Running && audit.started_at.is_none() {
            audit.started_at = Some(Utc::now());
        }
        if status.is_terminal() {
            audit.finished_at = Some(Utc::now());
            audit.progress = if status == AuditStatus::Completed {
                100
            } else {
                audit.progress.max(progress)
            };
        } else {
            audit.progress = audit.progress.max(progress.min(100));
        }
        audit.status = status;
        audit.current_stage = stage.or(audit.current_stage.take());
        if error.is_some() {
            audit.error = error;
        }
        Ok(())
    }

    async fn set_results(&self, audit_id: i64, results: AuditResults) -> Result<()> {
        let mut audits = self.audits.write().await;
        let audit = audits
            .get_mut(&audit_id)
            .ok_or(AuditError::NotFound { id: audit_id })?;
        audit.results = results;
        Ok(())
    }

    async fn add_warnings(&self, audit_id: i64, warnings: Vec<String>) -> Result<()> {
        if warnings.is_empty() {
            return Ok(());
        }
        let mut audits = self.audits.write().await;
        let audit = audits
            .get_mut(&audit_id)
            .ok_or(AuditError::NotFound { id: audit_id })?;
        audit.warnings.extend(warnings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuditConfig {
        AuditConfig::new("https://example.com")
    }

    #[tokio::test]
    async fn create_allocates_increasing_ids() {
        let store = InMemoryAuditStore::new();
        let first = store.create("user-1", None, config()).await.unwrap();
        let second = store.create("user-1", None, config()).await.unwrap();
        assert!(second.id > first.id);
        assert_eq!(first.status, AuditStatus::Pending);
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let store = InMemoryAuditStore::new();
        let err = store.get(999).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn progress_is_monotonic_while_running() {
        let store = InMemoryAuditStore::new();
        let audit = store.create("u", None, config()).await.unwrap();
        store
            .update_status(audit.id, AuditStatus::Running, 35, Some("crawl".into()), None)
            .await
            .unwrap();
        // A lower progress value never rolls the audit backwards.
        store
            .update_status(audit.id, AuditStatus::Running, 15, Some("retry".into()), None)
            .await
            .unwrap();
        let fetched = store.get(audit.id).await.unwrap();
        assert_eq!(fetched.progress, 35);
        assert!(fetched.started_at.is_some());
    }

    #[tokio::test]
    async fn terminal_state_is_never_left() {
        let store = InMemoryAuditStore::new();
        let audit = store.create("u", None, config()).await.unwrap();
        store
            .update_status(audit.id, AuditStatus::Completed, 100, None, None)
            .await
            .unwrap();

        let err = store
            .update_status(audit.id, AuditStatus::Running, 5, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");

        let fetched = store.get(audit.id).await.unwrap();
        assert_eq!(fetched.status, AuditStatus::Completed);
        assert_eq!(fetched.progress, 100);
        assert!(fetched.finished_at.is_some());
    }

    #[tokio::test]
    async fn failed_audit_keeps_error_message() {
        let store = InMemoryAuditStore::new();
        let audit = store.create("u", None, config()).await.unwrap();
        store
            .update_status(
                audit.id,
                AuditStatus::Failed,
                5,
                Some("validate".into()),
                Some("ssrf_blocked: 127.0.0.1".into()),
            )
            .await
            .unwrap();
        let fetched = store.get(audit.id).await.unwrap();
        assert_eq!(fetched.status, AuditStatus::Failed);
        assert!(fetched.error.as_deref().unwrap().contains("ssrf_blocked"));
    }

    #[tokio::test]
    async fn set_results_replaces_block_atomically() {
        let store = InMemoryAuditStore::new();
        let audit = store.create("u", None, config()).await.unwrap();
        let mut results = AuditResults::default();
        results.report_markdown = Some("## Executive Summary".to_string());
        store.set_results(audit.id, results).await.unwrap();
        let fetched = store.get(audit.id).await.unwrap();
        assert_eq!(
            fetched.results.report_markdown.as_deref(),
            Some("## Executive Summary")
        );
    }

    #[tokio::test]
    async fn warnings_accumulate() {
        let store = InMemoryAuditStore::new();
        let audit = store.create("u", None, config()).await.unwrap();
        store
            .add_warnings(audit.id, vec!["a".into()])
            .await
            .unwrap();
        store
            .add_warnings(audit.id, vec!["b".into(), "c".into()])
            .await
            .unwrap();
        assert_eq!(store.get(audit.id).await.unwrap().warnings.len(), 3);
    }
}

//! The audit job manager: worker pool, retries, and progress fan-out.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use geoscope_pipeline::Orchestrator;
use geoscope_types::{AppConfig, AuditConfig, AuditStatus, ProgressUpdate, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::events::{ProgressBus, ProgressSubscription, EVENT_BUFFER, HEARTBEAT_INTERVAL, SUBSCRIPTION_TTL};
use crate::job::AuditJob;
use crate::queue::JobQueue;

/// Tunables, derived from [`AppConfig`] with test-friendly overrides.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub event_buffer: usize,
    pub heartbeat_interval: Duration,
    pub subscription_ttl: Duration,
}

impl ManagerOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            worker_count: config.worker_pool_size,
            queue_capacity: config.queue_capacity,
            event_buffer: EVENT_BUFFER,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            subscription_ttl: SUBSCRIPTION_TTL,
        }
    }
}

/// Counters across the pool's lifetime.
#[derive(Debug, Default)]
pub struct ManagerStats {
    pub jobs_completed: AtomicU64,
    pub jobs_failed: AtomicU64,
    pub jobs_retried: AtomicU64,
}

/// Point-in-time view of [`ManagerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_retried: u64,
    pub queued: usize,
}

/// Owns the queue, the worker pool, and the progress bus. One instance
/// per process: `new` → `start` → `shutdown`.
pub struct JobManager {
    options: ManagerOptions,
    queue: Arc<JobQueue>,
    bus: Arc<ProgressBus>,
    orchestrator: Arc<Orchestrator>,
    stats: Arc<ManagerStats>,
    shutdown_token: CancellationToken,
    audit_cancels: Arc<DashMap<i64, CancellationToken>>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    heartbeat: std::sync::Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl JobManager {
    pub fn new(options: ManagerOptions, orchestrator: Arc<Orchestrator>) -> Self {
        let bus = Arc::new(ProgressBus::new(
            options.event_buffer,
            options.subscription_ttl,
        ));
        Self {
            queue: Arc::new(JobQueue::new(options.queue_capacity)),
            bus,
            orchestrator,
            stats: Arc::new(ManagerStats::default()),
            shutdown_token: CancellationToken::new(),
            audit_cancels: Arc::new(DashMap::new()),
            workers: std::sync::Mutex::new(Vec::new()),
            heartbeat: std::sync::Mutex::new(None),
            options,
            started: AtomicBool::new(false),
        }
    }

    /// Spawn the worker pool and the heartbeat task. Idempotent.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("job manager already started");
            return;
        }
        info!(workers = self.options.worker_count, "starting job manager");

        let mut handles = self.workers.lock().expect("worker registry lock poisoned");
        for _ in 0..self.options.worker_count {
            let worker = WorkerContext {
                id: format!("worker-{}", Uuid::new_v4().simple()),
                queue: self.queue.clone(),
                bus: self.bus.clone(),
                orchestrator: self.orchestrator.clone(),
                stats: self.stats.clone(),
                shutdown: self.shutdown_token.clone(),
                audit_cancels: self.audit_cancels.clone(),
            };
            handles.push(tokio::spawn(worker.run()));
        }

        drop(handles);

        // Heartbeats for subscribed, still-running audits.
        let bus = self.bus.clone();
        let shutdown = self.shutdown_token.clone();
        let interval = self.options.heartbeat_interval;
        let heartbeat = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => bus.heartbeat_tick(),
                }
            }
        });
        *self.heartbeat.lock().expect("heartbeat lock poisoned") = Some(heartbeat);
    }

    /// Enqueue an already-persisted audit for execution.
    pub fn submit(&self, audit_id: i64) -> Result<()> {
        self.queue.submit(AuditJob::new(audit_id))
    }

    /// Create, enqueue, and subscribe in one step: the submission surface
    /// offered to the request-handling layer.
    pub async fn submit_audit(
        &self,
        owner_id: &str,
        owner_email: Option<String>,
        config: AuditConfig,
    ) -> Result<(i64, ProgressSubscription)> {
        let audit = self
            .orchestrator
            .store()
            .create(owner_id, owner_email, config)
            .await?;
        let subscription = self.bus.subscribe(audit.id);
        self.queue.submit(AuditJob::new(audit.id))?;
        Ok((audit.id, subscription))
    }

    /// Subscribe to an audit's progress events.
    pub fn subscribe(&self, audit_id: i64) -> ProgressSubscription {
        self.bus.subscribe(audit_id)
    }

    /// Request cancellation of a specific audit.
    pub fn cancel_audit(&self, audit_id: i64) {
        if let Some(token) = self.audit_cancels.get(&audit_id) {
            info!(audit_id = audit_id, "audit cancellation requested");
            token.cancel();
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            jobs_completed: self.stats.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.stats.jobs_failed.load(Ordering::Relaxed),
            jobs_retried: self.stats.jobs_retried.load(Ordering::Relaxed),
            queued: self.queue.len(),
        }
    }

    /// Graceful shutdown: stop accepting submissions, let in-flight
    /// audits finish within `deadline`, then close all event channels.
    pub async fn shutdown(&self, deadline: Duration) {
        info!("job manager shutting down");
        self.queue.close();

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().expect("worker registry lock poisoned");
            workers.drain(..).collect()
        };

        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(deadline, drain).await.is_err() {
            warn!("shutdown deadline reached, canceling in-flight audits");
        }
        self.shutdown_token.cancel();

        let heartbeat = {
            let mut slot = self.heartbeat.lock().expect("heartbeat lock poisoned");
            slot.take()
        };
        if let Some(heartbeat) = heartbeat {
            let _ = tokio::time::timeout(Duration::from_secs(1), heartbeat).await;
        }
        self.bus.shutdown();
        info!("job manager stopped");
    }
}

struct WorkerContext {
    id: String,
    queue: Arc<JobQueue>,
    bus: Arc<ProgressBus>,
    orchestrator: Arc<Orchestrator>,
    stats: Arc<ManagerStats>,
    shutdown: CancellationToken,
    audit_cancels: Arc<DashMap<i64, CancellationToken>>,
}

impl WorkerContext {
    async fn run(self) {
        info!(worker_id = %self.id, "worker started");
        while let Some(job) = self.queue.pop().await {
            self.process(job).await;
        }
        info!(worker_id = %self.id, "worker stopped");
    }

    async fn process(&self, mut job: AuditJob) {
        let audit_id = job.audit_id;
        let cancel = self
            .audit_cancels
            .entry(audit_id)
            .or_insert_with(|| self.shutdown.child_token())
            .clone();

        loop {
            let result = self
                .orchestrator
                .run(&cancel, audit_id, self.bus.as_ref())
                .await;
            match result {
                Ok(()) => {
                    self.stats.jobs_completed.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                Err(e) if job.should_retry(&e) && !cancel.is_cancelled() => {
                    job.attempt += 1;
                    self.stats.jobs_retried.fetch_add(1, Ordering::Relaxed);
                    let delay = job.retry_delay();
                    warn!(
                        worker_id = %self.id,
                        audit_id = audit_id,
                        attempt = job.attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "audit attempt failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            self.fail_audit(audit_id, &geoscope_types::AuditError::Canceled).await;
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    self.fail_audit(audit_id, &e).await;
                    break;
                }
            }
        }

        self.audit_cancels.remove(&audit_id);
    }

    async fn fail_audit(&self, audit_id: i64, error: &geoscope_types::AuditError) {
        self.stats.jobs_failed.fetch_add(1, Ordering::Relaxed);
        error!(worker_id = %self.id, audit_id = audit_id, error = %error, "audit failed");
        let progress = self
            .orchestrator
            .store()
            .get(audit_id)
            .await
            .map(|audit| audit.progress)
            .unwrap_or(0);
        if let Err(store_err) = self
            .orchestrator
            .store()
            .update_status(
                audit_id,
                AuditStatus::Failed,
                progress,
                None,
                Some(error.to_string()),
            )
            .await
        {
            error!(audit_id = audit_id, error = %store_err, "failed to persist audit failure");
        }
        self.bus.publish(
            ProgressUpdate::new(audit_id, "failed", progress)
                .with_message(error.to_string())
                .with_status(AuditStatus::Failed),
        );
    }
}

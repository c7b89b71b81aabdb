//! Bounded in-process FIFO of pending audit jobs.

use std::collections::VecDeque;
use std::sync::Mutex;

use geoscope_types::{AuditError, Result};
use tokio::sync::Notify;
use tracing::debug;

use crate::job::AuditJob;

/// FIFO queue with a hard capacity. Submission on a full queue fails
/// immediately rather than blocking the caller. Closing the queue stops
/// hand-out: jobs still queued at close time are not started.
pub struct JobQueue {
    jobs: Mutex<QueueState>,
    capacity: usize,
    notify: Notify,
}

struct QueueState {
    items: VecDeque<AuditJob>,
    closed: bool,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            capacity: capacity.max(1),
            notify: Notify::new(),
        }
    }

    /// Enqueue a job. Fails with `rate_limited` when the queue is full
    /// and `conflict` after shutdown has begun.
    pub fn submit(&self, job: AuditJob) -> Result<()> {
        {
            let mut state = self.jobs.lock().expect("job queue lock poisoned");
            if state.closed {
                return Err(AuditError::Conflict {
                    message: "job queue is shut down".to_string(),
                });
            }
            if state.items.len() >= self.capacity {
                return Err(AuditError::RateLimited {
                    service: "job queue".to_string(),
                });
            }
            debug!(audit_id = job.audit_id, depth = state.items.len() + 1, "job queued");
            state.items.push_back(job);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Wait for the next job. Returns `None` once the queue is closed.
    pub async fn pop(&self) -> Option<AuditJob> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.jobs.lock().expect("job queue lock poisoned");
                if state.closed {
                    return None;
                }
                if let Some(job) = state.items.pop_front() {
                    return Some(job);
                }
            }
            notified.await;
        }
    }

    /// Stop accepting and handing out jobs.
    pub fn close(&self) {
        {
            let mut state = self.jobs.lock().expect("job queue lock poisoned");
            state.closed = true;
        }
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().expect("job queue lock poisoned").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let queue = JobQueue::new(8);
        queue.submit(AuditJob::new(1)).unwrap();
        queue.submit(AuditJob::new(2)).unwrap();
        queue.submit(AuditJob::new(3)).unwrap();
        assert_eq!(queue.pop().await.unwrap().audit_id, 1);
        assert_eq!(queue.pop().await.unwrap().audit_id, 2);
        assert_eq!(queue.pop().await.unwrap().audit_id, 3);
    }

    #[tokio::test]
    async fn full_queue_rejects_submissions() {
        let queue = JobQueue::new(2);
        queue.submit(AuditJob::new(1)).unwrap();
        queue.submit(AuditJob::new(2)).unwrap();
        let err = queue.submit(AuditJob::new(3)).unwrap_err();
        assert_eq!(err.kind(), "rate_limited");
    }

    #[tokio::test]
    async fn pop_wakes_on_submit() {
        let queue = Arc::new(JobQueue::new(4));
        let popper = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.submit(AuditJob::new(9)).unwrap();
        let job = tokio::time::timeout(Duration::from_secs(1), popper)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(job.audit_id, 9);
    }

    #[tokio::test]
    async fn close_ends_waiters_and_rejects_new_jobs() {
        let queue = Arc::new(JobQueue::new(4));
        queue.submit(AuditJob::new(1)).unwrap();
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move {
                // Drain the one job, then wait for more.
                let first = queue.pop().await;
                let second = queue.pop().await;
                (first, second)
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();
        let (first, second) = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.unwrap().audit_id, 1);
        assert!(second.is_none());

        assert_eq!(queue.submit(AuditJob::new(2)).unwrap_err().kind(), "conflict");
    }
}

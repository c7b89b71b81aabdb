//! Audit job management for geoscope.
//!
//! The job manager owns an audit's execution from submission to its
//! terminal state: a bounded FIFO queue, a fixed-size worker pool that
//! invokes the pipeline orchestrator, infrastructure-failure retries with
//! jittered backoff, and per-audit progress event fan-out consumed by
//! long-lived streaming connections.

pub mod events;
pub mod job;
pub mod manager;
pub mod queue;

pub use events::{ProgressBus, ProgressSubscription};
pub use job::AuditJob;
pub use manager::{JobManager, ManagerOptions, StatsSnapshot};
pub use queue::JobQueue;

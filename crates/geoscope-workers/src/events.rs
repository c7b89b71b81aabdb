//! Per-audit progress event fan-out.
//!
//! Each audit gets a broadcast channel with ring-buffer semantics: slow
//! subscribers lose the oldest events and see a `dropped=N` marker on
//! their next delivery, never a reordering. Sequence numbers are strictly
//! increasing per audit. Subscriptions expire after a fixed wall-time TTL
//! so abandoned streaming connections cannot leak channels.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use geoscope_types::{AuditStatus, ProgressEvent, ProgressSink, ProgressUpdate};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

/// Default per-audit event buffer.
pub const EVENT_BUFFER: usize = 64;
/// Default heartbeat period for running, subscribed audits.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Default subscription lifetime.
pub const SUBSCRIPTION_TTL: Duration = Duration::from_secs(600);

struct AuditChannel {
    tx: broadcast::Sender<ProgressEvent>,
    next_seq: AtomicU64,
    running: AtomicBool,
    last: Mutex<(String, u8)>,
}

impl AuditChannel {
    fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer);
        Self {
            tx,
            next_seq: AtomicU64::new(1),
            running: AtomicBool::new(false),
            last: Mutex::new((String::from("pending"), 0)),
        }
    }
}

/// Event bus shared by the job manager and its workers.
pub struct ProgressBus {
    channels: DashMap<i64, AuditChannel>,
    buffer: usize,
    subscription_ttl: Duration,
}

impl ProgressBus {
    pub fn new(buffer: usize, subscription_ttl: Duration) -> Self {
        Self {
            channels: DashMap::new(),
            buffer,
            subscription_ttl,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(EVENT_BUFFER, SUBSCRIPTION_TTL)
    }

    /// Publish an update, assigning the audit's next sequence number.
    pub fn publish(&self, update: ProgressUpdate) {
        let channel = self
            .channels
            .entry(update.audit_id)
            .or_insert_with(|| AuditChannel::new(self.buffer));

        match update.status {
            Some(AuditStatus::Running) => channel.running.store(true, Ordering::Relaxed),
            Some(AuditStatus::Completed) | Some(AuditStatus::Failed) => {
                channel.running.store(false, Ordering::Relaxed)
            }
            _ => {}
        }
        {
            let mut last = channel.last.lock().expect("progress bus lock poisoned");
            *last = (update.stage.clone(), update.progress);
        }

        let seq = channel.next_seq.fetch_add(1, Ordering::SeqCst);
        let event = ProgressEvent::from_update(update, seq);
        // No receivers is fine; the ring buffer keeps recent history for
        // late subscribers within the same channel lifetime.
        let _ = channel.tx.send(event);
    }

    /// Subscribe to one audit's events. The subscription expires after
    /// the bus TTL regardless of audit state.
    pub fn subscribe(&self, audit_id: i64) -> ProgressSubscription {
        let channel = self
            .channels
            .entry(audit_id)
            .or_insert_with(|| AuditChannel::new(self.buffer));
        ProgressSubscription {
            rx: channel.tx.subscribe(),
            expires_at: Instant::now() + self.subscription_ttl,
            pending_dropped: 0,
        }
    }

    /// Emit a heartbeat for every running audit that has at least one
    /// subscriber.
    pub fn heartbeat_tick(&self) {
        for entry in self.channels.iter() {
            let channel = entry.value();
            if !channel.running.load(Ordering::Relaxed) || channel.tx.receiver_count() == 0 {
                continue;
            }
            let (stage, progress) = channel
                .last
                .lock()
                .expect("progress bus lock poisoned")
                .clone();
            let seq = channel.next_seq.fetch_add(1, Ordering::SeqCst);
            let _ = channel
                .tx
                .send(ProgressEvent::heartbeat(*entry.key(), seq, stage, progress));
        }
    }

    /// Drop every channel; pending subscriptions see end-of-stream.
    pub fn shutdown(&self) {
        debug!(channels = self.channels.len(), "closing progress channels");
        self.channels.clear();
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl ProgressSink for ProgressBus {
    fn emit(&self, update: ProgressUpdate) {
        self.publish(update);
    }
}

/// Receiving half of one audit subscription.
pub struct ProgressSubscription {
    rx: broadcast::Receiver<ProgressEvent>,
    expires_at: Instant,
    pending_dropped: u64,
}

impl ProgressSubscription {
    /// Next event, in order. Returns `None` once the subscription has
    /// expired or the bus shut down. Events lost to ring-buffer overflow
    /// surface as a `dropped` count on the next delivered event.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            let now = Instant::now();
            if now >= self.expires_at {
                return None;
            }
            let remaining = self.expires_at - now;
            match tokio::time::timeout(remaining, self.rx.recv()).await {
                Err(_) => return None, // expired
                Ok(Ok(mut event)) => {
                    event.dropped = std::mem::take(&mut self.pending_dropped);
                    return Some(event);
                }
                Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                    self.pending_dropped += n;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(audit_id: i64, stage: &str, progress: u8) -> ProgressUpdate {
        ProgressUpdate::new(audit_id, stage, progress)
    }

    #[tokio::test]
    async fn sequence_numbers_strictly_increase() {
        let bus = ProgressBus::with_defaults();
        let mut sub = bus.subscribe(1);
        bus.publish(update(1, "validate", 5));
        bus.publish(update(1, "seed_fetch", 15));
        bus.publish(update(1, "crawl", 35));

        let mut last_seq = 0;
        for _ in 0..3 {
            let event = sub.recv().await.unwrap();
            assert!(event.seq > last_seq);
            last_seq = event.seq;
        }
    }

    #[tokio::test]
    async fn audits_have_independent_sequences() {
        let bus = ProgressBus::with_defaults();
        let mut sub_a = bus.subscribe(1);
        let mut sub_b = bus.subscribe(2);
        bus.publish(update(1, "validate", 5));
        bus.publish(update(2, "validate", 5));
        assert_eq!(sub_a.recv().await.unwrap().seq, 1);
        assert_eq!(sub_b.recv().await.unwrap().seq, 1);
    }

    #[tokio::test]
    async fn slow_subscriber_sees_dropped_marker() {
        let bus = ProgressBus::new(4, SUBSCRIPTION_TTL);
        let mut sub = bus.subscribe(1);
        // Overflow the 4-slot ring buffer before reading anything.
        for i in 0..10u8 {
            bus.publish(update(1, "crawl", i));
        }
        let event = sub.recv().await.unwrap();
        assert_eq!(event.dropped, 6, "oldest events are dropped, not newest");
        // Delivery continues in order after the gap.
        let next = sub.recv().await.unwrap();
        assert_eq!(next.dropped, 0);
        assert!(next.seq > event.seq);
    }

    #[tokio::test]
    async fn subscription_expires() {
        let bus = ProgressBus::new(EVENT_BUFFER, Duration::from_millis(50));
        let mut sub = bus.subscribe(1);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn heartbeat_reaches_running_subscribed_audits() {
        let bus = ProgressBus::with_defaults();
        let mut sub = bus.subscribe(1);
        bus.publish(update(1, "crawl", 20).with_status(AuditStatus::Running));
        assert_eq!(sub.recv().await.unwrap().stage, "crawl");

        bus.heartbeat_tick();
        let heartbeat = sub.recv().await.unwrap();
        assert_eq!(heartbeat.message.as_deref(), Some("heartbeat"));
        assert_eq!(heartbeat.stage, "crawl");
        assert_eq!(heartbeat.progress, 20);
    }

    #[tokio::test]
    async fn heartbeat_skips_terminal_audits() {
        let bus = ProgressBus::with_defaults();
        let mut sub = bus.subscribe(1);
        bus.publish(update(1, "finalize", 100).with_status(AuditStatus::Completed));
        sub.recv().await.unwrap();

        bus.heartbeat_tick();
        // Nothing further: the next recv should block until expiry. Use a
        // short poll instead of waiting out the TTL.
        let got = tokio::time::timeout(Duration::from_millis(50), sub.recv()).await;
        assert!(got.is_err(), "no heartbeat for a completed audit");
    }

    #[tokio::test]
    async fn shutdown_ends_subscriptions() {
        let bus = ProgressBus::with_defaults();
        let mut sub = bus.subscribe(1);
        bus.publish(update(1, "validate", 5));
        sub.recv().await.unwrap();
        bus.shutdown();
        assert!(sub.recv().await.is_none());
    }
}

//! Batch accumulator: groups events per logger and flushes on size or time.
//!
//! The pending buffer is a single shared resource guarded by a mutex that
//! is never held across an await point. A flush drains the buffer under
//! the lock and hands the drained batch to a spawned, non-awaited
//! transport send, so producers only ever wait for the buffer swap, never
//! for the network.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use reqwest::Method;
use tokio::time::interval;
use tracing::{debug, warn};

use crate::config::Config;
use crate::event::LogEvent;
use crate::transport::{Transport, TransportError};

/// What caused a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// The pending buffer reached the batch size
    Size,

    /// The periodic flush timer fired
    Timer,

    /// An explicit flush request
    Manual,
}

/// Counters describing accumulator activity.
#[derive(Debug, Clone, Default)]
pub struct BatcherStats {
    /// Total number of events accepted
    pub events_received: u64,

    /// Total number of events handed to the transport
    pub events_flushed: u64,

    /// Flushes triggered by the size threshold
    pub size_flushes: u64,

    /// Flushes triggered by the periodic timer
    pub time_flushes: u64,

    /// Flushes triggered by explicit request
    pub manual_flushes: u64,
}

/// Per-logger batch accumulator.
///
/// Events are appended in call order; reaching the configured batch size
/// drains the buffer in-line before the enqueue returns, so the pending
/// buffer never exceeds the batch size between flushes. The periodic
/// flush timer is armed on the first enqueue and re-arms for the
/// accumulator's lifetime; a timer tick with an empty buffer is a no-op.
///
/// Batches are dispatched in the order their flushes were triggered, but
/// deliveries may complete out of order since each send runs on its own
/// task.
pub struct Batcher {
    shared: Arc<Shared>,
}

struct Shared {
    /// Pending events awaiting the next flush
    queue: Mutex<Vec<LogEvent>>,

    /// Set once the periodic flush task has been spawned
    timer_armed: AtomicBool,

    batch_size: usize,
    batch_interval: Duration,
    transport: Arc<Transport>,
    batch_path: String,
    debug_enabled: bool,

    events_received: AtomicU64,
    events_flushed: AtomicU64,
    size_flushes: AtomicU64,
    time_flushes: AtomicU64,
    manual_flushes: AtomicU64,
}

impl Batcher {
    /// Create an accumulator that posts drained batches to `batch_path`.
    pub fn new(config: &Config, transport: Arc<Transport>, batch_path: String) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Vec::with_capacity(config.batch_size)),
                timer_armed: AtomicBool::new(false),
                batch_size: config.batch_size,
                batch_interval: config.batch_interval,
                transport,
                batch_path,
                debug_enabled: config.debug_enabled,
                events_received: AtomicU64::new(0),
                events_flushed: AtomicU64::new(0),
                size_flushes: AtomicU64::new(0),
                time_flushes: AtomicU64::new(0),
                manual_flushes: AtomicU64::new(0),
            }),
        }
    }

    /// Append an event to the pending buffer.
    ///
    /// Arms the periodic flush timer on first use. If the buffer reaches
    /// the batch size, it is drained and dispatched before this call
    /// returns. Must be called from within a tokio runtime.
    pub fn enqueue(&self, event: LogEvent) {
        self.arm_timer();

        self.shared.events_received.fetch_add(1, Ordering::Relaxed);

        let mut queue = self.shared.lock_queue();
        queue.push(event);

        if queue.len() >= self.shared.batch_size {
            self.shared.flush_locked(&mut queue, FlushTrigger::Size);
        }
    }

    /// Drain and dispatch whatever is pending, regardless of size.
    ///
    /// Draining is synchronous; the resulting network send completes on
    /// its own task. An empty buffer makes this a no-op.
    pub fn flush(&self) {
        self.shared.flush_with(FlushTrigger::Manual);
    }

    /// Number of events currently pending.
    pub fn pending(&self) -> usize {
        self.shared.lock_queue().len()
    }

    /// Check if no events are pending.
    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Get a snapshot of the accumulator counters.
    pub fn stats(&self) -> BatcherStats {
        BatcherStats {
            events_received: self.shared.events_received.load(Ordering::Relaxed),
            events_flushed: self.shared.events_flushed.load(Ordering::Relaxed),
            size_flushes: self.shared.size_flushes.load(Ordering::Relaxed),
            time_flushes: self.shared.time_flushes.load(Ordering::Relaxed),
            manual_flushes: self.shared.manual_flushes.load(Ordering::Relaxed),
        }
    }

    /// Spawn the periodic flush task the first time an event arrives.
    ///
    /// The task holds only a weak reference, so it ends once the
    /// accumulator is dropped.
    fn arm_timer(&self) {
        if self.shared.timer_armed.swap(true, Ordering::SeqCst) {
            return;
        }

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let period = self.shared.batch_interval;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(shared) => shared.flush_with(FlushTrigger::Timer),
                    None => break,
                }
            }
        });
    }
}

impl Shared {
    fn lock_queue(&self) -> MutexGuard<'_, Vec<LogEvent>> {
        match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn flush_with(&self, trigger: FlushTrigger) {
        let mut queue = self.lock_queue();
        self.flush_locked(&mut queue, trigger);
    }

    /// Drain the buffer and dispatch the batch, lock already held.
    ///
    /// Dispatching under the lock keeps batch dispatch order equal to
    /// flush-trigger order.
    fn flush_locked(&self, queue: &mut Vec<LogEvent>, trigger: FlushTrigger) {
        if queue.is_empty() {
            return;
        }

        let batch = std::mem::take(queue);
        *queue = Vec::with_capacity(self.batch_size);

        match trigger {
            FlushTrigger::Size => self.size_flushes.fetch_add(1, Ordering::Relaxed),
            FlushTrigger::Timer => self.time_flushes.fetch_add(1, Ordering::Relaxed),
            FlushTrigger::Manual => self.manual_flushes.fetch_add(1, Ordering::Relaxed),
        };
        self.events_flushed
            .fetch_add(batch.len() as u64, Ordering::Relaxed);

        debug!(
            batch_size = batch.len(),
            trigger = ?trigger,
            "flushing pending events"
        );

        self.dispatch(batch);
    }

    /// Hand a drained batch to an independent, non-awaited transport send.
    fn dispatch(&self, batch: Vec<LogEvent>) {
        let transport = Arc::clone(&self.transport);
        let path = self.batch_path.clone();
        let debug_enabled = self.debug_enabled;

        tokio::spawn(async move {
            let body = match serde_json::to_string(&batch) {
                Ok(body) => body,
                Err(e) => {
                    let err = TransportError::Serialize(e.to_string());
                    report_dropped(debug_enabled, batch.len(), &err);
                    return;
                }
            };

            if let Err(e) = transport.send(Method::POST, &path, Some(body)).await {
                report_dropped(debug_enabled, batch.len(), &e);
            }
        });
    }
}

/// Diagnostic for a batch that could not be delivered. Delivery failures
/// never propagate to the producing caller.
fn report_dropped(debug_enabled: bool, batch_size: usize, err: &TransportError) {
    if debug_enabled {
        warn!(batch_size, error = %err, "dropping undeliverable batch");
    } else {
        debug!(batch_size, error = %err, "dropping undeliverable batch");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::LogLevel;
    use tokio::time::sleep;

    /// Transport pointing at a closed local port, failing fast and quietly.
    fn dead_transport() -> Arc<Transport> {
        let config = Config {
            endpoint: "http://127.0.0.1:9".to_string(),
            max_retries: 0,
            retry_backoff: Duration::from_millis(1),
            request_timeout: Duration::from_millis(200),
            ..Config::default()
        };
        Arc::new(Transport::new(&config).expect("Failed to create transport"))
    }

    fn batcher_with(batch_size: usize, batch_interval: Duration) -> Batcher {
        let config = Config {
            batch_size,
            batch_interval,
            ..Config::default()
        };
        Batcher::new(&config, dead_transport(), "/logs/test/batch".to_string())
    }

    fn test_event() -> LogEvent {
        LogEvent::new(LogLevel::Info, "test message")
    }

    #[tokio::test]
    async fn test_enqueue_below_threshold_keeps_pending() {
        let batcher = batcher_with(5, Duration::from_secs(60));

        batcher.enqueue(test_event());
        batcher.enqueue(test_event());

        assert_eq!(batcher.pending(), 2);
        assert_eq!(batcher.stats().events_received, 2);
        assert_eq!(batcher.stats().size_flushes, 0);
    }

    #[tokio::test]
    async fn test_size_threshold_drains_inline() {
        let batcher = batcher_with(3, Duration::from_secs(60));

        for _ in 0..3 {
            batcher.enqueue(test_event());
        }

        // The third enqueue drained the buffer before returning
        assert!(batcher.is_empty());
        let stats = batcher.stats();
        assert_eq!(stats.size_flushes, 1);
        assert_eq!(stats.events_flushed, 3);

        // Remaining events accumulate toward the next batch
        batcher.enqueue(test_event());
        assert_eq!(batcher.pending(), 1);
    }

    #[tokio::test]
    async fn test_pending_never_exceeds_batch_size() {
        let batcher = batcher_with(3, Duration::from_secs(60));

        for _ in 0..10 {
            batcher.enqueue(test_event());
            assert!(batcher.pending() < 3);
        }

        assert_eq!(batcher.stats().size_flushes, 3);
        assert_eq!(batcher.pending(), 1);
    }

    #[tokio::test]
    async fn test_manual_flush_drains_any_size() {
        let batcher = batcher_with(100, Duration::from_secs(60));

        batcher.enqueue(test_event());
        batcher.enqueue(test_event());
        batcher.flush();

        assert!(batcher.is_empty());
        let stats = batcher.stats();
        assert_eq!(stats.manual_flushes, 1);
        assert_eq!(stats.events_flushed, 2);
    }

    #[tokio::test]
    async fn test_empty_flush_is_noop() {
        let batcher = batcher_with(100, Duration::from_secs(60));

        batcher.flush();
        batcher.flush();

        assert_eq!(batcher.stats().manual_flushes, 0);
        assert_eq!(batcher.stats().events_flushed, 0);
    }

    #[tokio::test]
    async fn test_timer_flush_drains_partial_batch() {
        let batcher = batcher_with(100, Duration::from_millis(50));

        batcher.enqueue(test_event());
        batcher.enqueue(test_event());

        sleep(Duration::from_millis(200)).await;

        assert!(batcher.is_empty());
        let stats = batcher.stats();
        assert!(stats.time_flushes >= 1);
        assert_eq!(stats.events_flushed, 2);
    }

    #[tokio::test]
    async fn test_timer_ticks_on_empty_buffer_flush_nothing() {
        let batcher = batcher_with(100, Duration::from_millis(30));

        // Arm the timer, drain the single event, then let it tick empty
        batcher.enqueue(test_event());
        batcher.flush();
        sleep(Duration::from_millis(150)).await;

        assert_eq!(batcher.stats().time_flushes, 0);
        assert_eq!(batcher.stats().events_flushed, 1);
    }
}

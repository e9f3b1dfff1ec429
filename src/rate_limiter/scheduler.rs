//! # Blocking Refill Scheduler
//!
//! One background thread refills every registered bucket, so N buckets cost
//! one timer-driven loop rather than N threads.
//!
//! ## Architecture
//!
//! ```text
//!     register(bucket) ──┐
//!     deregister(id) ────┼──► command channel ──► refill worker thread
//!     stop() ────────────┘                              │
//!                                                       ▼
//!                                            ┌─────────────────────┐
//!                                            │  min-heap by due    │
//!                                            │  (t=0.10, bucket#3) │ ◄─ head
//!                                            │  (t=0.25, bucket#1) │
//!                                            │  (t=1.00, bucket#2) │
//!                                            └─────────────────────┘
//! ```
//!
//! ## The Refill Loop
//!
//! Each wake computes a window `[now, now + batch_window)` and pops every
//! entry due inside it: `fill(1)` on the bucket, then push it back at
//! `due + interval`. Buckets with similar rates therefore share one wake.
//!
//! Between batches the worker sleeps on its command channel until the head
//! of the heap is due (or indefinitely when nothing is registered), so an
//! idle scheduler uses no CPU, and a new registration wakes it at once.
//!
//! The heap lives on the worker thread only. The scheduler touches a bucket
//! solely through `fill`, holding the bucket's lock for that one call.

use super::clock;
use super::config::SchedulerConfig;
use super::core::{BlockingBucket, BucketId};
use super::error::SchedulerError;
use super::metrics::SchedulerStats;
use dashmap::DashSet;
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// How far, in refill intervals, a bucket may fall behind before its
/// schedule is reset instead of replayed.
///
/// If the process was suspended for an hour we don't want to spin through an
/// hour's worth of single-token fills; the bucket would be full after
/// `capacity` of them anyway.
pub const MAX_CATCH_UP_INTERVALS: u32 = 100;

enum Command {
    Register(Scheduled),
    Deregister(BucketId),
    Stop,
}

/// A bucket's next refill.
struct Scheduled {
    due: Instant,
    id: BucketId,
    interval: Duration,
    bucket: Weak<BlockingBucket>,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.id == other.id
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed so the max-heap yields the earliest due time first
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// State visible to both the scheduler handle and its worker.
struct Shared {
    members: DashSet<BucketId, ahash::RandomState>,
    stopping: AtomicBool,
    total_registered: AtomicU64,
    total_fills: AtomicU64,
    total_batches: AtomicU64,
    total_wakeups: AtomicU64,
}

struct Worker {
    commands: mpsc::Sender<Command>,
    handle: thread::JoinHandle<()>,
}

/// Refill scheduler for [`BlockingBucket`]s.
///
/// Drives `fill(1)` on every registered bucket once per
/// [`inter_token_interval`] from a single worker thread. The thread starts
/// with the first registration and runs until [`stop`] (or drop).
///
/// Share one scheduler among all the rate limits of a process, by reference
/// or inside an `Arc`.
///
/// ## Example
///
/// ```rust
/// use pacer::{BlockingBucket, RefillScheduler};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let scheduler = RefillScheduler::new();
/// let bucket = Arc::new(BlockingBucket::new(20.0, 1).unwrap());
/// scheduler.register(&bucket).unwrap();
///
/// assert!(bucket.consume(1, None));
/// // Refilled within ~50ms
/// assert!(bucket.consume(1, Some(Duration::from_secs(1))));
///
/// scheduler.stop();
/// assert!(scheduler.register(&bucket).is_err());
/// ```
///
/// [`inter_token_interval`]: crate::TokenBucket::inter_token_interval
/// [`stop`]: RefillScheduler::stop
pub struct RefillScheduler {
    config: SchedulerConfig,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl RefillScheduler {
    /// Creates a scheduler with default settings.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Creates a scheduler with custom settings.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                members: DashSet::with_hasher(ahash::RandomState::new()),
                stopping: AtomicBool::new(false),
                total_registered: AtomicU64::new(0),
                total_fills: AtomicU64::new(0),
                total_batches: AtomicU64::new(0),
                total_wakeups: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Starts refilling `bucket`.
    ///
    /// The first refill is due one inter-token interval from now. The
    /// scheduler keeps only a weak reference: once every `Arc` to the bucket
    /// is dropped, it is retired automatically.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::AlreadyStopped`] after [`stop`](Self::stop)
    /// - [`SchedulerError::AlreadyRegistered`] if the bucket is already here
    /// - [`SchedulerError::Unschedulable`] if one interval from now cannot be
    ///   represented
    /// - [`SchedulerError::Spawn`] if the worker thread could not be started
    pub fn register(&self, bucket: &Arc<BlockingBucket>) -> Result<(), SchedulerError> {
        let mut guard = self.worker.lock();

        if self.shared.stopping.load(Ordering::Acquire) {
            warn!(bucket = %bucket.id(), "register called on a stopped refill scheduler");
            return Err(SchedulerError::AlreadyStopped);
        }

        let id = bucket.id();
        if self.shared.members.contains(&id) {
            return Err(SchedulerError::AlreadyRegistered(id));
        }

        if guard.is_none() {
            *guard = Some(self.spawn_worker()?);
        }
        let Some(worker) = guard.as_ref() else {
            return Err(SchedulerError::AlreadyStopped);
        };

        let interval = bucket.inter_token_interval();
        let Some(due) = clock::now().checked_add(interval) else {
            warn!(bucket = %id, ?interval, "refill interval too long to schedule");
            return Err(SchedulerError::Unschedulable(id));
        };

        self.shared.members.insert(id);
        let entry = Scheduled {
            due,
            id,
            interval,
            bucket: Arc::downgrade(bucket),
        };
        if worker.commands.send(Command::Register(entry)).is_err() {
            self.shared.members.remove(&id);
            return Err(SchedulerError::AlreadyStopped);
        }

        self.shared.total_registered.fetch_add(1, Ordering::Relaxed);
        debug!(bucket = %id, ?interval, "registered bucket for refill");
        Ok(())
    }

    /// Stops refilling a bucket.
    ///
    /// Returns `false` if it was not registered.
    pub fn deregister(&self, id: BucketId) -> bool {
        let guard = self.worker.lock();

        if self.shared.members.remove(&id).is_none() {
            return false;
        }
        if let Some(worker) = guard.as_ref() {
            // A closed channel means the worker is gone and holds nothing
            let _ = worker.commands.send(Command::Deregister(id));
        }

        debug!(bucket = %id, "deregistered bucket");
        true
    }

    /// Stops all refilling.
    ///
    /// Waits for the worker thread to finish any fill in progress and exit,
    /// then forgets every registration. This is one-way: afterwards
    /// [`register`](Self::register) fails. Calling it again does nothing.
    pub fn stop(&self) {
        let worker = {
            let mut guard = self.worker.lock();
            if self.shared.stopping.swap(true, Ordering::AcqRel) {
                return;
            }
            guard.take()
        };

        if let Some(worker) = worker {
            let _ = worker.commands.send(Command::Stop);
            if worker.handle.join().is_err() {
                warn!("refill worker thread panicked");
            }
        }

        self.shared.members.clear();
        info!("refill scheduler stopped");
    }

    /// Returns `true` once [`stop`](Self::stop) has been called.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.shared.stopping.load(Ordering::Acquire)
    }

    /// Returns the number of buckets currently registered.
    #[inline]
    pub fn registered(&self) -> usize {
        self.shared.members.len()
    }

    /// Returns a snapshot of the scheduler's counters.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            registered: self.registered(),
            total_registered: self.shared.total_registered.load(Ordering::Relaxed),
            total_fills: self.shared.total_fills.load(Ordering::Relaxed),
            total_batches: self.shared.total_batches.load(Ordering::Relaxed),
            total_wakeups: self.shared.total_wakeups.load(Ordering::Relaxed),
            stopped: self.is_stopped(),
        }
    }

    fn spawn_worker(&self) -> Result<Worker, SchedulerError> {
        let (commands, receiver) = mpsc::channel();
        let refill = RefillLoop {
            shared: self.shared.clone(),
            commands: receiver,
            scheduled: BinaryHeap::new(),
            batch_window: self.config.batch_window,
        };

        let handle = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || refill.run())?;

        info!(
            "Started refill worker '{}' (batch window: {:?})",
            self.config.thread_name, self.config.batch_window
        );
        Ok(Worker { commands, handle })
    }
}

impl Default for RefillScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RefillScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for RefillScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefillScheduler")
            .field("thread_name", &self.config.thread_name)
            .field("batch_window", &self.config.batch_window)
            .field("registered", &self.registered())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// The worker thread's state. Owns the heap.
struct RefillLoop {
    shared: Arc<Shared>,
    commands: mpsc::Receiver<Command>,
    scheduled: BinaryHeap<Scheduled>,
    batch_window: Duration,
}

impl RefillLoop {
    fn run(mut self) {
        loop {
            self.fill_due();

            // Sleep until the head is due, or until a command arrives
            let until_due = self
                .scheduled
                .peek()
                .map(|head| head.due.saturating_duration_since(clock::now()));
            let command = match until_due {
                Some(wait) => self.commands.recv_timeout(wait),
                None => self
                    .commands
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };
            self.shared.total_wakeups.fetch_add(1, Ordering::Relaxed);

            match command {
                Ok(Command::Register(entry)) => self.scheduled.push(entry),
                Ok(Command::Deregister(id)) => self.scheduled.retain(|entry| entry.id != id),
                Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }

        self.scheduled.clear();
        debug!("refill worker exiting");
    }

    /// Fills every bucket due within the current batch window.
    fn fill_due(&mut self) {
        let now = clock::now();
        let window_end = now.checked_add(self.batch_window).unwrap_or(now);
        let mut filled = 0u64;

        while self
            .scheduled
            .peek()
            .map_or(false, |head| head.due < window_end)
        {
            let Some(mut entry) = self.scheduled.pop() else {
                break;
            };

            let Some(bucket) = entry.bucket.upgrade() else {
                self.shared.members.remove(&entry.id);
                debug!(bucket = %entry.id, "bucket dropped, retiring it");
                continue;
            };
            bucket.fill(1);
            drop(bucket);
            filled += 1;

            let Some(next) = entry.due.checked_add(entry.interval) else {
                self.shared.members.remove(&entry.id);
                warn!(bucket = %entry.id, "next refill unrepresentable, retiring bucket");
                continue;
            };

            let max_lag = entry.interval.saturating_mul(MAX_CATCH_UP_INTERVALS);
            entry.due = if now.saturating_duration_since(next) > max_lag {
                debug!(bucket = %entry.id, "refill schedule fell behind, resetting");
                now.checked_add(entry.interval).unwrap_or(next)
            } else {
                next
            };
            self.scheduled.push(entry);
        }

        if filled > 0 {
            self.shared.total_fills.fetch_add(filled, Ordering::Relaxed);
            self.shared.total_batches.fetch_add(1, Ordering::Relaxed);
            trace!(filled, pending = self.scheduled.len(), "refill batch done");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn drained(rate: f64, capacity: u64) -> Arc<BlockingBucket> {
        let bucket = Arc::new(BlockingBucket::new(rate, capacity).unwrap());
        assert!(bucket.consume(capacity, None));
        bucket
    }

    #[test]
    fn test_heap_orders_by_due_time() {
        let base = clock::now();
        let mut heap = BinaryHeap::new();
        for offset_ms in [30, 10, 20] {
            let bucket = Arc::new(BlockingBucket::new(1.0, 1).unwrap());
            heap.push(Scheduled {
                due: base + Duration::from_millis(offset_ms),
                id: bucket.id(),
                interval: Duration::from_secs(1),
                bucket: Arc::downgrade(&bucket),
            });
        }

        let order: Vec<_> = std::iter::from_fn(|| heap.pop())
            .map(|entry| entry.due.duration_since(base).as_millis())
            .collect();
        assert_eq!(order, vec![10, 20, 30]);
    }

    #[test]
    fn test_worker_starts_lazily() {
        let scheduler = RefillScheduler::new();
        assert!(scheduler.worker.lock().is_none());

        let bucket = Arc::new(BlockingBucket::new(1.0, 1).unwrap());
        scheduler.register(&bucket).unwrap();
        assert!(scheduler.worker.lock().is_some());
        assert_eq!(scheduler.registered(), 1);
    }

    #[test]
    fn test_refills_drained_bucket() {
        let scheduler = RefillScheduler::new();
        let bucket = drained(20.0, 5);
        scheduler.register(&bucket).unwrap();

        thread::sleep(Duration::from_millis(180));
        let tokens = bucket.available_tokens();
        assert!((2..=4).contains(&tokens), "unexpected token count {}", tokens);

        // Waiting blocks until the worker delivers
        assert!(bucket.consume(5, Some(Duration::from_secs(2))));
    }

    #[test]
    fn test_never_fills_past_capacity() {
        let scheduler = RefillScheduler::new();
        let bucket = Arc::new(BlockingBucket::new(1000.0, 3).unwrap());
        scheduler.register(&bucket).unwrap();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(bucket.available_tokens(), 3);
        assert!(scheduler.stats().total_fills > 0);
    }

    #[test]
    fn test_duplicate_registration() {
        let scheduler = RefillScheduler::new();
        let bucket = Arc::new(BlockingBucket::new(1.0, 1).unwrap());

        scheduler.register(&bucket).unwrap();
        assert!(matches!(
            scheduler.register(&bucket),
            Err(SchedulerError::AlreadyRegistered(id)) if id == bucket.id()
        ));
        assert_eq!(scheduler.registered(), 1);
    }

    #[test]
    fn test_register_after_stop_fails() {
        let scheduler = RefillScheduler::new();
        let kept = drained(50.0, 2);
        scheduler.register(&kept).unwrap();

        scheduler.stop();
        assert!(scheduler.is_stopped());
        assert_eq!(scheduler.registered(), 0);

        let late = Arc::new(BlockingBucket::new(1.0, 1).unwrap());
        assert!(matches!(
            scheduler.register(&late),
            Err(SchedulerError::AlreadyStopped)
        ));
        assert_eq!(scheduler.registered(), 0);

        // Stopping again is a no-op
        scheduler.stop();

        // Nothing refills after stop
        let tokens = kept.available_tokens();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(kept.available_tokens(), tokens);
    }

    #[test]
    fn test_stop_never_started() {
        let scheduler = RefillScheduler::new();
        scheduler.stop();
        assert!(scheduler.stats().stopped);
    }

    #[test]
    fn test_stop_does_not_wait_for_far_refills() {
        let scheduler = RefillScheduler::new();
        let bucket = Arc::new(BlockingBucket::new(0.001, 1).unwrap());
        scheduler.register(&bucket).unwrap();

        let start = Instant::now();
        scheduler.stop();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_idle_worker_sleeps_until_due() {
        let scheduler = RefillScheduler::new();
        let bucket = Arc::new(BlockingBucket::new(0.01, 1).unwrap());
        scheduler.register(&bucket).unwrap();

        thread::sleep(Duration::from_millis(300));

        // One wake for the registration, none while waiting 100s for the refill
        let stats = scheduler.stats();
        assert!(stats.total_wakeups <= 2, "worker kept waking: {}", stats);
        assert_eq!(stats.total_fills, 0);
    }

    #[test]
    fn test_wakeups_count_empty_cycles() {
        let scheduler = RefillScheduler::new();
        let bucket = Arc::new(BlockingBucket::new(0.01, 1).unwrap());
        scheduler.register(&bucket).unwrap();
        let other = Arc::new(BlockingBucket::new(0.01, 1).unwrap());
        scheduler.register(&other).unwrap();
        assert!(scheduler.deregister(other.id()));

        let start = Instant::now();
        while scheduler.stats().total_wakeups < 3 {
            assert!(start.elapsed() < Duration::from_secs(2), "commands never woke the worker");
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(scheduler.stats().total_batches, 0);
    }

    #[test]
    fn test_unschedulable_interval_is_rejected() {
        let scheduler = RefillScheduler::new();
        let bucket = Arc::new(BlockingBucket::new(1e-19, 1).unwrap());

        assert!(matches!(
            scheduler.register(&bucket),
            Err(SchedulerError::Unschedulable(id)) if id == bucket.id()
        ));
        assert_eq!(scheduler.registered(), 0);
        assert_eq!(scheduler.stats().total_registered, 0);

        drop(bucket);
        assert_eq!(scheduler.registered(), 0);
    }

    #[test]
    fn test_deregister() {
        let scheduler = RefillScheduler::new();
        let bucket = drained(100.0, 5);
        scheduler.register(&bucket).unwrap();

        assert!(scheduler.deregister(bucket.id()));
        assert!(!scheduler.deregister(bucket.id()));
        assert_eq!(scheduler.registered(), 0);

        let tokens = bucket.available_tokens();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(bucket.available_tokens(), tokens);

        // And it can come back
        scheduler.register(&bucket).unwrap();
        assert!(bucket.consume(1, Some(Duration::from_secs(1))));
    }

    #[test]
    fn test_dropped_bucket_is_retired() {
        let scheduler = RefillScheduler::new();
        let bucket = Arc::new(BlockingBucket::new(200.0, 1).unwrap());
        scheduler.register(&bucket).unwrap();
        assert_eq!(scheduler.registered(), 1);

        drop(bucket);

        let start = Instant::now();
        while scheduler.registered() > 0 {
            assert!(start.elapsed() < Duration::from_secs(2), "bucket never retired");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_similar_rates_share_wakes() {
        let scheduler = RefillScheduler::with_config(
            SchedulerConfig::default().with_batch_window(Duration::from_millis(5)),
        );

        let buckets: Vec<_> = (0..10).map(|_| drained(10.0, 10)).collect();
        for bucket in &buckets {
            scheduler.register(bucket).unwrap();
        }

        thread::sleep(Duration::from_millis(350));
        let stats = scheduler.stats();
        assert!(stats.total_fills >= 20, "{}", stats);
        assert!(stats.average_batch_size() > 1.0, "{}", stats);
        assert_eq!(stats.total_registered, 10);
    }

    #[test]
    fn test_custom_thread_name() {
        let scheduler =
            RefillScheduler::with_config(SchedulerConfig::default().with_thread_name("test-refill"));
        let bucket = Arc::new(BlockingBucket::new(1.0, 1).unwrap());
        scheduler.register(&bucket).unwrap();

        let guard = scheduler.worker.lock();
        let name = guard.as_ref().and_then(|w| w.handle.thread().name().map(str::to_owned));
        assert_eq!(name.as_deref(), Some("test-refill"));
    }
}

//! # Cooperative Refill Scheduler
//!
//! Refills [`AsyncBucket`]s from tokio tasks instead of a dedicated thread.
//!
//! ```text
//!     register(bucket#1) ──► task: interval(1s)    ──tick──► fill(1)
//!     register(bucket#2) ──► task: interval(250ms) ──tick──► fill(1)
//!                                 │
//!                                 └── bucket dropped? task exits on next tick
//! ```
//!
//! Each bucket gets its own periodic task. The runtime's timer wheel does the
//! ordering that the blocking scheduler's heap does by hand, and idle tasks
//! cost nothing while they wait for their next tick.
//!
//! If the runtime stalls past several ticks, the task fills once and then
//! restarts its schedule from that moment. Missed refills are dropped rather
//! than replayed; the bucket would be full after `capacity` of them anyway.

use super::core::{AsyncBucket, BucketId};
use super::error::SchedulerError;
use super::metrics::SchedulerStats;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

struct Registration {
    /// Tells this registration apart from a later one for the same bucket
    generation: u64,
    handle: JoinHandle<()>,
}

struct Shared {
    tasks: DashMap<BucketId, Registration, ahash::RandomState>,
    total_fills: AtomicU64,
}

/// Refill scheduler for [`AsyncBucket`]s.
///
/// Must be used from within a tokio runtime; refill tasks are spawned on the
/// runtime that is current when [`register`](Self::register) is called.
///
/// ## Example
///
/// ```rust
/// use pacer::{AsyncBucket, AsyncRefillScheduler};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let scheduler = AsyncRefillScheduler::new();
/// let bucket = Arc::new(AsyncBucket::new(50.0, 1).unwrap());
/// scheduler.register(&bucket).unwrap();
///
/// assert!(bucket.consume(1).await);
/// // Suspends ~20ms until the next refill
/// assert!(bucket.consume(1).await);
///
/// scheduler.stop();
/// # }
/// ```
pub struct AsyncRefillScheduler {
    shared: Arc<Shared>,
    stopping: AtomicBool,
    next_generation: AtomicU64,
    total_registered: AtomicU64,
}

impl AsyncRefillScheduler {
    /// Creates a scheduler. No task is spawned until a bucket is registered.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tasks: DashMap::with_hasher(ahash::RandomState::new()),
                total_fills: AtomicU64::new(0),
            }),
            stopping: AtomicBool::new(false),
            next_generation: AtomicU64::new(0),
            total_registered: AtomicU64::new(0),
        }
    }

    /// Spawns a refill task for `bucket`.
    ///
    /// The first fill happens one inter-token interval from now. The task
    /// holds only a weak reference and exits once the bucket is dropped.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::AlreadyStopped`] after [`stop`](Self::stop)
    /// - [`SchedulerError::AlreadyRegistered`] if the bucket is already here
    /// - [`SchedulerError::Unschedulable`] if one interval from now cannot be
    ///   represented
    /// - [`SchedulerError::NoRuntime`] outside a tokio runtime
    pub fn register(&self, bucket: &Arc<AsyncBucket>) -> Result<(), SchedulerError> {
        let id = bucket.id();
        if self.is_stopped() {
            warn!(bucket = %id, "register called on a stopped refill scheduler");
            return Err(SchedulerError::AlreadyStopped);
        }
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let interval = bucket.inter_token_interval();
        let Some(start) = Instant::now().checked_add(interval) else {
            warn!(bucket = %id, ?interval, "refill interval too long to schedule");
            return Err(SchedulerError::Unschedulable(id));
        };
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        match self.shared.tasks.entry(id) {
            Entry::Occupied(_) => {
                return Err(SchedulerError::AlreadyRegistered(id));
            }
            Entry::Vacant(slot) => {
                let handle = runtime.spawn(refill(
                    Arc::downgrade(bucket),
                    id,
                    start,
                    interval,
                    generation,
                    self.shared.clone(),
                ));
                slot.insert(Registration { generation, handle });
            }
        }

        // stop() may have drained the map between our check and the insert
        if self.is_stopped() {
            self.abort(id);
            return Err(SchedulerError::AlreadyStopped);
        }

        self.total_registered.fetch_add(1, Ordering::Relaxed);
        debug!(bucket = %id, ?interval, "spawned refill task");
        Ok(())
    }

    /// Aborts the refill task of a bucket.
    ///
    /// Returns `false` if it was not registered.
    pub fn deregister(&self, id: BucketId) -> bool {
        let removed = self.abort(id);
        if removed {
            debug!(bucket = %id, "deregistered bucket");
        }
        removed
    }

    /// Aborts every refill task. Later registrations fail; calling it again
    /// does nothing.
    pub fn stop(&self) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shared.tasks.retain(|_, registration| {
            registration.handle.abort();
            false
        });
        info!("cooperative refill scheduler stopped");
    }

    /// Returns `true` once [`stop`](Self::stop) has been called.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Returns the number of buckets currently registered.
    #[inline]
    pub fn registered(&self) -> usize {
        self.shared.tasks.len()
    }

    /// Returns a snapshot of the scheduler's counters.
    ///
    /// Every tick fills one bucket, so `total_batches` and `total_wakeups`
    /// both equal `total_fills`.
    pub fn stats(&self) -> SchedulerStats {
        let total_fills = self.shared.total_fills.load(Ordering::Relaxed);
        SchedulerStats {
            registered: self.registered(),
            total_registered: self.total_registered.load(Ordering::Relaxed),
            total_fills,
            total_batches: total_fills,
            total_wakeups: total_fills,
            stopped: self.is_stopped(),
        }
    }

    fn abort(&self, id: BucketId) -> bool {
        match self.shared.tasks.remove(&id) {
            Some((_, registration)) => {
                registration.handle.abort();
                true
            }
            None => false,
        }
    }
}

/// Body of a bucket's refill task.
async fn refill(
    bucket: Weak<AsyncBucket>,
    id: BucketId,
    start: Instant,
    interval: Duration,
    generation: u64,
    shared: Arc<Shared>,
) {
    let mut ticker = time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(bucket) = bucket.upgrade() else {
            break;
        };
        bucket.fill(1);
        shared.total_fills.fetch_add(1, Ordering::Relaxed);
    }

    shared
        .tasks
        .remove_if(&id, |_, registration| registration.generation == generation);
    trace!(bucket = %id, "bucket dropped, refill task exiting");
}

impl Default for AsyncRefillScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AsyncRefillScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for AsyncRefillScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncRefillScheduler")
            .field("registered", &self.registered())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

//! # Metrics
//!
//! Point-in-time snapshots of a bucket and of a refill scheduler, for
//! monitoring and debugging.
//!
//! ```text
//!     Bucket snapshot:
//!     ┌─────────────────────────────────────┐
//!     │  Tokens: 3/5   Utilization: 40%     │
//!     │  ▓▓▓▓▓▓▓▓░░░░░░░░░░░░               │
//!     │  Waiting: 2    Timeouts: 1          │
//!     └─────────────────────────────────────┘
//! ```

use super::core::BucketId;
use std::fmt;

/// Snapshot of a token bucket.
///
/// ## Example
///
/// ```rust
/// use pacer::BlockingBucket;
///
/// let bucket = BlockingBucket::new(1.0, 4).unwrap();
/// assert!(bucket.consume(1, None));
///
/// let metrics = bucket.metrics();
/// assert_eq!(metrics.available_tokens, 3);
/// assert_eq!(metrics.utilization(), 0.25);
/// println!("{}", metrics.summary());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BucketMetrics {
    /// Id of the bucket.
    pub id: BucketId,

    /// Refill rate in tokens per second.
    pub rate: f64,

    /// Maximum tokens the bucket can hold.
    pub capacity: u64,

    /// Tokens available when the snapshot was taken.
    pub available_tokens: u64,

    /// Consumers waiting for tokens when the snapshot was taken.
    pub waiting: usize,

    /// Tokens handed out to consumers since creation.
    pub total_consumed: u64,

    /// Tokens actually added by fills, after clamping to capacity.
    pub total_filled: u64,

    /// Number of fill calls, including ones that found the bucket full.
    pub total_fills: u64,

    /// Consume calls that gave up at their deadline.
    pub total_timeouts: u64,
}

impl BucketMetrics {
    /// Fraction of the capacity currently in use.
    ///
    /// - 0.0 = bucket is full
    /// - 1.0 = bucket is empty
    #[inline]
    pub fn utilization(&self) -> f64 {
        1.0 - (self.available_tokens as f64 / self.capacity as f64)
    }

    /// Returns `true` if no tokens are available.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.available_tokens == 0
    }

    /// Fraction of fills that were wasted because the bucket was already full.
    ///
    /// A value close to 1.0 means the limit is rarely reached.
    pub fn overflow_ratio(&self) -> f64 {
        if self.total_fills == 0 {
            0.0
        } else {
            let wasted = self.total_fills.saturating_sub(self.total_filled);
            wasted as f64 / self.total_fills as f64
        }
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Token Bucket {}:\n\
             ├─ Tokens: {}/{} ({:.1}% used)\n\
             ├─ Rate: {:.3} tokens/s\n\
             ├─ Waiting: {}\n\
             └─ Lifetime:\n\
                ├─ Consumed: {}\n\
                ├─ Filled: {} over {} fills\n\
                └─ Timeouts: {}",
            self.id,
            self.available_tokens,
            self.capacity,
            self.utilization() * 100.0,
            self.rate,
            self.waiting,
            self.total_consumed,
            self.total_filled,
            self.total_fills,
            self.total_timeouts,
        )
    }
}

impl fmt::Display for BucketMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Snapshot of a refill scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Buckets currently registered.
    pub registered: usize,

    /// Registrations accepted since creation.
    pub total_registered: u64,

    /// Single-token fills performed since creation.
    pub total_fills: u64,

    /// Wake cycles that performed at least one fill.
    ///
    /// For the blocking scheduler each cycle is one batch; the cooperative
    /// scheduler fills one bucket per wake, so this equals `total_fills`.
    pub total_batches: u64,

    /// Times the scheduler woke up, whether or not anything was due.
    ///
    /// An idle scheduler should barely move this; the cooperative scheduler
    /// only wakes to fill, so it equals `total_fills` there.
    pub total_wakeups: u64,

    /// Whether `stop()` has been called.
    pub stopped: bool,
}

impl SchedulerStats {
    /// Average number of fills performed per wake cycle.
    pub fn average_batch_size(&self) -> f64 {
        if self.total_batches == 0 {
            0.0
        } else {
            self.total_fills as f64 / self.total_batches as f64
        }
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Refill Scheduler Stats:\n\
             ├─ State: {}\n\
             ├─ Registered Buckets: {} ({} lifetime)\n\
             └─ Fills:\n\
                ├─ Total: {}\n\
                ├─ Batches: {}\n\
                ├─ Avg Batch Size: {:.2}\n\
                └─ Wake-ups: {}",
            if self.stopped { "stopped" } else { "running" },
            self.registered,
            self.total_registered,
            self.total_fills,
            self.total_batches,
            self.average_batch_size(),
            self.total_wakeups,
        )
    }
}

impl fmt::Display for SchedulerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

//! # Core Token Bucket Implementation
//!
//! This module implements the token bucket that every rate limit is built on.
//! The bucket holds a token count protected by a mutex; callers take tokens
//! out with `consume`, and a refill scheduler puts them back with `fill`.
//!
//! ## The Token Bucket Algorithm
//!
//! ```text
//!     capacity = 5, rate = 1 token/s
//!
//!     t=0.0   [● ● ● ● ●]  5/5   starts full
//!     t=0.0   [● ● ● ● ○]  4/5   consume(1)
//!     t=0.0   [○ ○ ○ ○ ○]  0/5   consume(4)
//!     t=0.0   consume(1) ──► parked, nothing to take
//!     t=1.0   fill(1)    ──► [●] wake all waiters ──► waiter takes it
//! ```
//!
//! ## One Core, Two Ways to Wait
//!
//! The token arithmetic is written once. What differs between the thread
//! model and the async model is only *how a consumer waits* for a fill, so
//! the bucket is generic over a [`Signal`]:
//!
//! ```text
//!     TokenBucket<Blocking>      parks the calling thread on a Condvar
//!     TokenBucket<Cooperative>   suspends the calling future on a Notify
//! ```
//!
//! Both follow the same protocol: check under the lock, wait, re-check after
//! every wakeup. A fill wakes *all* waiters because waiters may need
//! different amounts; each one re-checks and at most the satisfiable ones
//! proceed. This makes a fill O(waiters), which is fine at the expected scale
//! but is the first thing to revisit if thousands of consumers park on one
//! bucket.

use super::clock;
use super::config::validate_bucket;
use super::error::ConfigError;
use super::metrics::BucketMetrics;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

// Source of process-unique bucket ids.
static NEXT_BUCKET_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a token bucket.
///
/// Schedulers key their registrations on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketId(u64);

impl BucketId {
    fn next() -> Self {
        Self(NEXT_BUCKET_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bucket#{}", self.0)
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Blocking {}
    impl Sealed for super::Cooperative {}
}

/// How consumers of a bucket wait for tokens.
///
/// Implemented by [`Blocking`] and [`Cooperative`] only.
pub trait Signal: sealed::Sealed + Default + fmt::Debug + Send + Sync + 'static {
    /// Wakes every consumer currently waiting on the bucket.
    fn wake_all(&self);
}

/// Thread model: consumers park their thread on a condition variable.
#[derive(Debug, Default)]
pub struct Blocking {
    condvar: Condvar,
}

impl Signal for Blocking {
    #[inline]
    fn wake_all(&self) {
        self.condvar.notify_all();
    }
}

/// Async model: consumers suspend their task until notified.
#[derive(Debug, Default)]
pub struct Cooperative {
    notify: Notify,
}

impl Signal for Cooperative {
    #[inline]
    fn wake_all(&self) {
        self.notify.notify_waiters();
    }
}

/// A bucket whose consumers block threads.
pub type BlockingBucket = TokenBucket<Blocking>;

/// A bucket whose consumers suspend async tasks.
pub type AsyncBucket = TokenBucket<Cooperative>;

/// A token bucket.
///
/// Holds up to `capacity` tokens and starts full. Consumers remove tokens;
/// a refill scheduler adds one every [`inter_token_interval`] by calling
/// [`fill`]. The token count never leaves `[0, capacity]`.
///
/// Buckets are shared behind an `Arc`. Schedulers only keep a weak reference,
/// so dropping the last `Arc` stops the refills for that bucket.
///
/// ## Example
///
/// ```rust
/// use pacer::BlockingBucket;
/// use std::time::Duration;
///
/// let bucket = BlockingBucket::new(1.0, 2).unwrap();
/// assert!(bucket.consume(2, None));
///
/// // Empty, and nobody is filling it
/// assert!(!bucket.consume(1, Some(Duration::from_millis(10))));
///
/// bucket.fill(1);
/// assert!(bucket.consume(1, Some(Duration::ZERO)));
/// ```
///
/// [`inter_token_interval`]: TokenBucket::inter_token_interval
/// [`fill`]: TokenBucket::fill
pub struct TokenBucket<S: Signal = Blocking> {
    id: BucketId,

    /// Tokens added per second
    rate: f64,

    /// Maximum tokens the bucket can hold (burst capacity)
    capacity: u64,

    /// Time between single-token fills (1 / rate)
    interval: Duration,

    /// Current token count; only ever touched under this lock
    tokens: Mutex<u64>,

    signal: S,

    /// Consumers currently waiting for tokens
    waiting: AtomicUsize,

    // Counters for metrics (cold path)
    total_consumed: AtomicU64,
    total_filled: AtomicU64,
    total_fills: AtomicU64,
    total_timeouts: AtomicU64,
}

impl<S: Signal> TokenBucket<S> {
    /// Creates a full bucket.
    ///
    /// # Arguments
    ///
    /// * `rate` - Tokens added per second; one token every `1 / rate` seconds
    /// * `capacity` - Maximum number of tokens the bucket can hold
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidRate`] if `rate` is not a finite number > 0
    /// - [`ConfigError::InvalidCapacity`] if `capacity` is 0
    pub fn new(rate: f64, capacity: u64) -> Result<Self, ConfigError> {
        let interval = validate_bucket(rate, capacity)?;

        Ok(Self {
            id: BucketId::next(),
            rate,
            capacity,
            interval,
            tokens: Mutex::new(capacity),
            signal: S::default(),
            waiting: AtomicUsize::new(0),
            total_consumed: AtomicU64::new(0),
            total_filled: AtomicU64::new(0),
            total_fills: AtomicU64::new(0),
            total_timeouts: AtomicU64::new(0),
        })
    }

    /// Adds `n` tokens, clamped to capacity, and wakes all waiters.
    ///
    /// Fill is monotonic: it never lowers the token count, and never raises
    /// it above capacity.
    pub fn fill(&self, n: u64) {
        let added = {
            let mut tokens = self.tokens.lock();
            let before = *tokens;
            *tokens = before.saturating_add(n).min(self.capacity);
            *tokens - before
        };

        self.total_fills.fetch_add(1, Ordering::Relaxed);
        if added > 0 {
            self.total_filled.fetch_add(added, Ordering::Relaxed);
            self.signal.wake_all();
        }
        trace!(bucket = %self.id, added, "filled");
    }

    /// Takes `n` tokens if they are available right now.
    ///
    /// Never waits. Takes all `n` or nothing.
    pub fn try_consume(&self, n: u64) -> bool {
        n == 0 || self.try_take(n)
    }

    /// Returns the current number of tokens.
    #[inline]
    pub fn available_tokens(&self) -> u64 {
        *self.tokens.lock()
    }

    /// Returns the bucket's id.
    #[inline]
    pub fn id(&self) -> BucketId {
        self.id
    }

    /// Returns the refill rate in tokens per second.
    #[inline]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Returns the capacity.
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns the time between two single-token fills.
    #[inline]
    pub fn inter_token_interval(&self) -> Duration {
        self.interval
    }

    /// Returns the number of consumers currently waiting for tokens.
    #[inline]
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    /// Returns a snapshot of the bucket's state and counters.
    pub fn metrics(&self) -> BucketMetrics {
        BucketMetrics {
            id: self.id,
            rate: self.rate,
            capacity: self.capacity,
            available_tokens: self.available_tokens(),
            waiting: self.waiting(),
            total_consumed: self.total_consumed.load(Ordering::Relaxed),
            total_filled: self.total_filled.load(Ordering::Relaxed),
            total_fills: self.total_fills.load(Ordering::Relaxed),
            total_timeouts: self.total_timeouts.load(Ordering::Relaxed),
        }
    }

    #[inline]
    fn try_take(&self, n: u64) -> bool {
        let mut tokens = self.tokens.lock();
        if *tokens >= n {
            self.take(&mut tokens, n);
            true
        } else {
            false
        }
    }

    /// Removes `n` tokens; the caller holds the lock and has checked the count.
    #[inline]
    fn take(&self, tokens: &mut u64, n: u64) {
        debug_assert!(*tokens >= n);
        *tokens -= n;
        self.total_consumed.fetch_add(n, Ordering::Relaxed);
    }

    /// A request for more than `capacity` tokens can never be satisfied.
    #[inline]
    fn exceeds_capacity(&self, n: u64) -> bool {
        if n > self.capacity {
            warn!(
                bucket = %self.id,
                "requested {} tokens from a bucket of capacity {}; this can never succeed",
                n, self.capacity
            );
            true
        } else {
            false
        }
    }

    fn on_timeout(&self, n: u64) {
        self.total_timeouts.fetch_add(1, Ordering::Relaxed);
        debug!(bucket = %self.id, "timed out waiting for {} tokens", n);
    }
}

impl TokenBucket<Blocking> {
    /// Takes `n` tokens, blocking the calling thread until they are available.
    ///
    /// With `timeout = None` this waits indefinitely. With a timeout, the
    /// deadline is fixed when the call starts and is not extended by
    /// spurious or unsatisfying wakeups.
    ///
    /// ## How it Works
    ///
    /// ```text
    ///     lock ──► tokens >= n? ──yes──► take n ──► true
    ///                  │  ▲
    ///                  no │ woken by fill (or spuriously): re-check
    ///                  ▼  │
    ///            wait on condvar (lock released while parked)
    ///                  │
    ///            deadline passed and still short ──► false, nothing taken
    /// ```
    ///
    /// # Returns
    ///
    /// - `true` once `n` tokens were taken (`n == 0` succeeds at once)
    /// - `false` if the deadline passed first, or if `n > capacity`; the
    ///   token count is left unchanged
    pub fn consume(&self, n: u64, timeout: Option<Duration>) -> bool {
        if n == 0 {
            return true;
        }
        if self.exceeds_capacity(n) {
            return false;
        }

        let deadline = clock::deadline_after(timeout);
        let mut tokens = self.tokens.lock();

        if *tokens < n {
            let _waiting = WaitGuard::new(&self.waiting);
            while *tokens < n {
                match deadline {
                    Some(deadline) => {
                        let result = self.signal.condvar.wait_until(&mut tokens, deadline);
                        if result.timed_out() && *tokens < n {
                            drop(tokens);
                            self.on_timeout(n);
                            return false;
                        }
                    }
                    None => self.signal.condvar.wait(&mut tokens),
                }
            }
        }

        self.take(&mut tokens, n);
        true
    }
}

impl TokenBucket<Cooperative> {
    /// Takes `n` tokens, suspending the calling task until they are available.
    ///
    /// Only the task waits; the thread is free to run other tasks. Dropping
    /// the future before it completes takes no tokens.
    ///
    /// # Returns
    ///
    /// - `true` once `n` tokens were taken
    /// - `false` immediately if `n > capacity`
    pub async fn consume(&self, n: u64) -> bool {
        if n == 0 {
            return true;
        }
        if self.exceeds_capacity(n) {
            return false;
        }
        if self.try_take(n) {
            return true;
        }

        let _waiting = WaitGuard::new(&self.waiting);
        loop {
            let notified = self.signal.notify.notified();
            tokio::pin!(notified);

            // Register before checking so a fill landing in between still
            // wakes this task.
            notified.as_mut().enable();
            if self.try_take(n) {
                return true;
            }
            notified.await;
        }
    }

    /// Like [`consume`](Self::consume), giving up after `timeout`.
    ///
    /// Returns `false` with the token count unchanged if the timeout elapses
    /// first.
    pub async fn consume_timeout(&self, n: u64, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.consume(n)).await {
            Ok(acquired) => acquired,
            Err(_) => {
                self.on_timeout(n);
                false
            }
        }
    }
}

impl<S: Signal> fmt::Debug for TokenBucket<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucket")
            .field("id", &self.id)
            .field("rate", &self.rate)
            .field("capacity", &self.capacity)
            .field("tokens", &self.available_tokens())
            .field("signal", &self.signal)
            .finish()
    }
}

/// Counts a consumer as waiting for as long as the guard lives.
///
/// Dropped on every exit path, including a cancelled future.
struct WaitGuard<'a> {
    waiting: &'a AtomicUsize,
}

impl<'a> WaitGuard<'a> {
    fn new(waiting: &'a AtomicUsize) -> Self {
        waiting.fetch_add(1, Ordering::AcqRel);
        Self { waiting }
    }
}

impl<'a> Drop for WaitGuard<'a> {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::AcqRel);
    }
}

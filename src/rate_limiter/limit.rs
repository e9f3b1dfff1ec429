//! # Rate Limit Facade
//!
//! Turns "N calls per period, bursts of up to B" into a registered bucket.
//!
//! ```text
//!     RateLimit::new(Per::second(2), 5, &scheduler)
//!          │
//!          ├─► TokenBucket::new(rate = 2.0, capacity = 5)   config errors stop here
//!          └─► scheduler.register(&bucket)                 +1 token every 500ms
//!
//!     limit.wait(1, None)  ──► bucket.consume(1, None)
//! ```
//!
//! Each limit owns its bucket; limits share nothing but the scheduler.

use super::config::{Per, RateLimitConfig};
use super::cooperative::AsyncRefillScheduler;
use super::core::{AsyncBucket, BlockingBucket};
use super::error::Error;
use super::metrics::BucketMetrics;
use super::scheduler::RefillScheduler;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A blocking rate limit.
///
/// ## Example
///
/// ```rust
/// use pacer::{Per, RateLimit, RefillScheduler};
/// use std::time::Duration;
///
/// let scheduler = RefillScheduler::new();
/// let limit = RateLimit::new(Per::second(10), 2, &scheduler).unwrap();
///
/// // The burst goes through at once
/// assert!(limit.wait(1, None));
/// assert!(limit.wait(1, None));
///
/// // Then calls are paced at 10/s
/// assert!(!limit.try_wait(1));
/// assert!(limit.wait(1, Some(Duration::from_secs(1))));
/// ```
#[derive(Debug, Clone)]
pub struct RateLimit {
    bucket: Arc<BlockingBucket>,
}

impl RateLimit {
    /// Creates a limit of `per` with bursts of up to `burst` calls, refilled
    /// by `scheduler`.
    ///
    /// # Arguments
    ///
    /// * `per` - Sustained rate, e.g. `Per::second(1)`
    /// * `burst` - Bucket capacity; the limit starts with this many tokens
    /// * `scheduler` - Refill scheduler driving the bucket
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the rate is not positive or `burst` is 0; nothing
    ///   is registered in that case
    /// - [`Error::Scheduler`] if the scheduler rejects the registration
    pub fn new(per: Per, burst: u64, scheduler: &RefillScheduler) -> Result<Self, Error> {
        let bucket = Arc::new(BlockingBucket::new(per.rate(), burst)?);
        scheduler.register(&bucket)?;

        debug!(bucket = %bucket.id(), ?per, burst, "created rate limit");
        Ok(Self { bucket })
    }

    /// Creates a limit from a [`RateLimitConfig`].
    pub fn from_config(config: RateLimitConfig, scheduler: &RefillScheduler) -> Result<Self, Error> {
        Self::new(config.per, config.burst, scheduler)
    }

    /// Blocks until `n` calls are permitted.
    ///
    /// # Returns
    ///
    /// - `true` once the calls may proceed
    /// - `false` if `timeout` elapsed first (nothing is consumed), or if `n`
    ///   exceeds the burst size
    #[inline]
    pub fn wait(&self, n: u64, timeout: Option<Duration>) -> bool {
        self.bucket.consume(n, timeout)
    }

    /// Permits `n` calls only if that needs no waiting.
    #[inline]
    pub fn try_wait(&self, n: u64) -> bool {
        self.bucket.try_consume(n)
    }

    /// Returns the underlying bucket.
    pub fn bucket(&self) -> &Arc<BlockingBucket> {
        &self.bucket
    }

    /// Returns a snapshot of the underlying bucket.
    pub fn metrics(&self) -> BucketMetrics {
        self.bucket.metrics()
    }
}

/// An async rate limit; waiting suspends the task instead of the thread.
///
/// ## Example
///
/// ```rust
/// use pacer::{AsyncRateLimit, AsyncRefillScheduler, Per};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let scheduler = AsyncRefillScheduler::new();
/// let limit = AsyncRateLimit::new(Per::second(20), 1, &scheduler).unwrap();
///
/// for _ in 0..3 {
///     assert!(limit.wait(1).await);
/// }
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AsyncRateLimit {
    bucket: Arc<AsyncBucket>,
}

impl AsyncRateLimit {
    /// Creates a limit of `per` with bursts of up to `burst` calls.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// As [`RateLimit::new`], plus [`SchedulerError::NoRuntime`] outside a
    /// runtime.
    ///
    /// [`SchedulerError::NoRuntime`]: crate::SchedulerError::NoRuntime
    pub fn new(per: Per, burst: u64, scheduler: &AsyncRefillScheduler) -> Result<Self, Error> {
        let bucket = Arc::new(AsyncBucket::new(per.rate(), burst)?);
        scheduler.register(&bucket)?;

        debug!(bucket = %bucket.id(), ?per, burst, "created async rate limit");
        Ok(Self { bucket })
    }

    /// Creates a limit from a [`RateLimitConfig`].
    pub fn from_config(
        config: RateLimitConfig,
        scheduler: &AsyncRefillScheduler,
    ) -> Result<Self, Error> {
        Self::new(config.per, config.burst, scheduler)
    }

    /// Waits until `n` calls are permitted.
    ///
    /// Returns `false` at once if `n` exceeds the burst size.
    #[inline]
    pub async fn wait(&self, n: u64) -> bool {
        self.bucket.consume(n).await
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    #[inline]
    pub async fn wait_timeout(&self, n: u64, timeout: Duration) -> bool {
        self.bucket.consume_timeout(n, timeout).await
    }

    /// Permits `n` calls only if that needs no waiting.
    #[inline]
    pub fn try_wait(&self, n: u64) -> bool {
        self.bucket.try_consume(n)
    }

    /// Returns the underlying bucket.
    pub fn bucket(&self) -> &Arc<AsyncBucket> {
        &self.bucket
    }

    /// Returns a snapshot of the underlying bucket.
    pub fn metrics(&self) -> BucketMetrics {
        self.bucket.metrics()
    }
}

//! # Pacer - Token Bucket Rate Limiting with a Shared Refill Scheduler
//!
//! Pacer gates how often an action may happen: before each call you `wait` on
//! a rate limit, and it lets you through at a steady pace, with room for short
//! bursts. Waiting either blocks the thread or suspends the async task.
//!
//! ## The Token Bucket Algorithm
//!
//! ```text
//!     Per::second(1), burst 5:
//!
//!     t=0.0   [● ● ● ● ●]  five calls go straight through
//!     t=0.0   [○ ○ ○ ○ ○]  the sixth waits...
//!     t=1.0   [●]          ...one token arrives, the sixth proceeds
//!     t=2.0   [●]          and so on, one call per second
//! ```
//!
//! - **Tokens** = Permission to make one call
//! - **Burst** = The bucket's capacity, the most calls allowed back to back
//! - **Refill** = One token every `1 / rate`, delivered by a scheduler
//!
//! ## Features
//!
//! - **Two concurrency models** - Blocking consumers on threads, or async
//!   consumers on tokio, over the same bucket core
//! - **One refill thread for all buckets** - A min-heap of due times, with
//!   refills that fall due together batched into one wake
//! - **No busy waiting** - Consumers park until a fill, the refill thread
//!   sleeps until the next due time
//! - **Exact timeouts** - A timed-out wait takes nothing
//! - **Metrics** - Snapshots of every bucket and scheduler
//!
//! ## Quick Start
//!
//! ### Blocking
//!
//! ```rust
//! use pacer::{Per, RateLimit, RefillScheduler};
//! use std::time::Duration;
//!
//! // One scheduler per process, shared by every limit
//! let scheduler = RefillScheduler::new();
//!
//! // 5 calls per second, bursts of up to 5
//! let limit = RateLimit::new(Per::second(5), 5, &scheduler).unwrap();
//!
//! if limit.wait(1, Some(Duration::from_secs(1))) {
//!     println!("calling the API");
//! } else {
//!     println!("rate limited, try again later");
//! }
//! ```
//!
//! ### Async
//!
//! ```rust
//! use pacer::{AsyncRateLimit, AsyncRefillScheduler, Per};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let scheduler = AsyncRefillScheduler::new();
//! let limit = AsyncRateLimit::new(Per::minute(600), 10, &scheduler).unwrap();
//!
//! limit.wait(1).await;
//! # }
//! ```
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │   Your Application      │
//!                    └──────────┬──────────────┘
//!                               │ wait(n)
//!                    ┌──────────▼──────────────┐
//!                    │  RateLimit / Async...   │
//!                    └──────────┬──────────────┘
//!                               │ consume(n)
//!                    ┌──────────▼──────────────┐       fill(1)
//!                    │  TokenBucket<Signal>    │ ◄──────────────┐
//!                    ├─────────────────────────┤                │
//!                    │ • Mutex<tokens>         │     ┌──────────┴──────────┐
//!                    │ • Condvar / Notify      │     │  RefillScheduler    │
//!                    └─────────────────────────┘     │  (thread + heap)    │
//!                                                    │  AsyncRefillSched.  │
//!                                                    │  (task per bucket)  │
//!                                                    └─────────────────────┘
//! ```
//!
//! ## Performance Characteristics
//!
//! | Operation | Time Complexity |
//! |-----------|----------------|
//! | try_wait() | O(1) |
//! | wait() | O(1) per wakeup |
//! | fill | O(waiters), all are woken to re-check |
//! | blocking refill | O(log buckets) per token |
//!
//! ## Thread Safety
//!
//! All types are `Send + Sync`:
//! - `RateLimit` / `AsyncRateLimit` - Cheap to clone, clones share one bucket
//! - `RefillScheduler` / `AsyncRefillScheduler` - Share by reference or `Arc`
//!
//! ## Examples
//!
//! See the `demos/` directory for complete programs:
//! - `basic.rs` - One limit, bursts and pacing
//! - `http_like.rs` - A thread pool sharing one limit in front of "requests"
//! - `async_tasks.rs` - Tokio tasks sharing an async limit
//!
//! ## Logging
//!
//! Scheduler lifecycle events are logged with [`tracing`] at `info`,
//! registrations at `debug`, individual fills at `trace`. Install any
//! subscriber to see them.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    missing_debug_implementations
)]
#![forbid(unsafe_code)]

// Internal module
mod rate_limiter;

// Public re-exports
pub use rate_limiter::{
    resolution as clock_resolution, AsyncBucket, AsyncRateLimit, AsyncRefillScheduler, Blocking,
    BlockingBucket, BucketId, BucketMetrics, ConfigError, Cooperative, Error, Per, RateLimit,
    RateLimitConfig, RefillScheduler, SchedulerConfig, SchedulerError, SchedulerStats, Signal,
    TokenBucket, DEFAULT_THREAD_NAME, MAX_CATCH_UP_INTERVALS, MIN_INTER_TOKEN_INTERVAL,
};

/// A refill scheduler wrapped in `Arc`, for sharing across threads that
/// create their own limits.
///
/// # Example
/// ```rust
/// use pacer::{Per, RateLimit, RefillScheduler, SharedScheduler};
/// use std::sync::Arc;
///
/// let scheduler: SharedScheduler = Arc::new(RefillScheduler::new());
///
/// let worker_scheduler = scheduler.clone();
/// std::thread::spawn(move || {
///     let limit = RateLimit::new(Per::second(10), 1, &worker_scheduler).unwrap();
///     limit.wait(1, None);
/// })
/// .join()
/// .unwrap();
/// ```
pub type SharedScheduler = std::sync::Arc<RefillScheduler>;

/// An async refill scheduler wrapped in `Arc`, for sharing across tasks.
pub type SharedAsyncScheduler = std::sync::Arc<AsyncRefillScheduler>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum supported Rust version.
///
/// This crate requires at least Rust 1.70.0 due to:
/// - `std::sync::OnceLock`
/// - `let ... else`
/// - Edition 2021 features
pub const MSRV: &str = "1.70.0";

/// Prelude module for convenient imports.
///
/// Import everything you need with a single line:
/// ```rust
/// use pacer::prelude::*;
/// ```
pub mod prelude {
    //! Common imports for typical rate limiting use cases.
    //!
    //! # Example
    //! ```rust
    //! use pacer::prelude::*;
    //!
    //! let scheduler = RefillScheduler::new();
    //! let limit = RateLimit::from_config(RateLimitConfig::per_second(50), &scheduler).unwrap();
    //! assert!(limit.try_wait(1));
    //! ```

    pub use crate::{
        AsyncRateLimit, AsyncRefillScheduler, BucketMetrics, Error, Per, RateLimit,
        RateLimitConfig, RefillScheduler, SchedulerConfig, SchedulerStats, SharedAsyncScheduler,
        SharedScheduler,
    };
}

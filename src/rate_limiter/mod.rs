//! # Rate Limiter Module
//!
//! Internal implementation of the token bucket, its refill schedulers and the
//! rate limit facade built on them.
//!
//! ## Module Structure
//!
//! ```text
//!     rate_limiter/
//!     ├── mod.rs          (You are here - Module organization)
//!     ├── clock.rs        (Monotonic time and deadlines)
//!     ├── error.rs        (Error types)
//!     ├── config.rs       (Rates, burst sizes, scheduler settings)
//!     ├── core.rs         (Token bucket, blocking and async waiting)
//!     ├── metrics.rs      (Bucket and scheduler snapshots)
//!     ├── scheduler.rs    (Refill thread for blocking buckets)
//!     ├── cooperative.rs  (Refill tasks for async buckets)
//!     └── limit.rs        (RateLimit / AsyncRateLimit)
//! ```
//!
//! ## Architecture Flow
//!
//! ```text
//!     caller
//!        │ wait(n)
//!        ▼
//!     ┌───────────┐
//!     │ RateLimit │ ◄── Per + burst, validated by config
//!     └─────┬─────┘
//!           │ consume(n)                   fill(1)
//!           ▼                                 │
//!     ┌─────────────┐               ┌─────────┴─────────┐
//!     │ TokenBucket │ ◄──────────── │ Refill scheduler  │ ◄── clock
//!     └─────────────┘               └───────────────────┘
//! ```
//!
//! ## Component Responsibilities
//!
//! - **clock**: The single source of "now" and of timeout deadlines
//! - **core**: Token arithmetic and the wait/re-check protocol
//! - **scheduler** / **cooperative**: When to call `fill`
//! - **limit**: Wiring a bucket to a scheduler from a human-facing rate
//! - **metrics**: Read-only views for monitoring

mod clock;
mod config;
mod cooperative;
mod core;
mod error;
mod limit;
mod metrics;
mod scheduler;

/// Measured resolution of the monotonic clock
pub use clock::resolution;

/// Rate specifications and settings
pub use config::{
    Per, RateLimitConfig, SchedulerConfig, DEFAULT_THREAD_NAME, MIN_INTER_TOKEN_INTERVAL,
};

/// The token bucket and its waiting strategies
pub use core::{AsyncBucket, Blocking, BlockingBucket, BucketId, Cooperative, Signal, TokenBucket};

/// Error types
pub use error::{ConfigError, Error, SchedulerError};

/// Monitoring snapshots
pub use metrics::{BucketMetrics, SchedulerStats};

/// Refill schedulers
pub use cooperative::AsyncRefillScheduler;
pub use scheduler::{RefillScheduler, MAX_CATCH_UP_INTERVALS};

/// Rate limit facades
pub use limit::{AsyncRateLimit, RateLimit};

//! # Errors
//!
//! Two kinds of failure exist, and both are programming errors rather than
//! transient conditions:
//!
//! ```text
//!     ConfigError     ── bad rate or capacity, raised by the bucket
//!                        constructor before anything is registered
//!     SchedulerError  ── registering with a stopped scheduler, twice,
//!                        or outside a runtime
//! ```
//!
//! A consume that times out is *not* an error; it returns `false` and leaves
//! the bucket untouched.

use super::core::BucketId;
use thiserror::Error;

/// Invalid bucket parameters.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The refill rate must be a finite number greater than zero.
    #[error("rate must be > 0 and finite, got {0}")]
    InvalidRate(f64),

    /// The bucket must be able to hold at least one token.
    #[error("bucket capacity must be > 0")]
    InvalidCapacity,
}

/// Misuse of a refill scheduler.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchedulerError {
    /// `register` was called after `stop`.
    #[error("refill scheduler already stopped")]
    AlreadyStopped,

    /// The bucket is already driven by this scheduler.
    #[error("{0} is already registered")]
    AlreadyRegistered(BucketId),

    /// The bucket refills so rarely that its first refill lies beyond any
    /// representable instant.
    #[error("{0} refills too rarely to be scheduled")]
    Unschedulable(BucketId),

    /// The cooperative scheduler needs a tokio runtime to spawn refill tasks.
    #[error("no tokio runtime available to spawn refill tasks")]
    NoRuntime,

    /// The refill worker thread could not be started.
    #[error("failed to spawn refill worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors returned when constructing a rate limit.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The rate specification or burst size is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The bucket could not be registered with its scheduler.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

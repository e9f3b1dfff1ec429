//! # Rate Limit Configuration
//!
//! Human-facing rate specifications and scheduler settings.
//!
//! ## From "calls per period" to a bucket
//!
//! ```text
//!     Per { calls: 3, period: 2s }, burst: 5
//!
//!     rate     = calls / period      = 1.5 tokens/s
//!     interval = 1 / rate            = 666.7ms between single-token fills
//!     capacity = burst               = 5 tokens
//!
//!     ┌──────────────────────────────┐
//!     │   Capacity (burst) = 5       │
//!     │   ┌─────────────────────┐    │
//!     │   │ ● ● ● ● ●           │    │
//!     │   └─────────────────────┘    │
//!     │   +1 token every 666.7ms     │
//!     └──────────────────────────────┘
//! ```

use super::clock;
use super::error::ConfigError;
use std::time::Duration;

/// Smallest interval between two single-token fills.
///
/// Rates above one token per nanosecond are clamped to this so the refill
/// scheduler always makes forward progress.
pub const MIN_INTER_TOKEN_INTERVAL: Duration = Duration::from_nanos(1);

/// Default name of the blocking scheduler's worker thread.
pub const DEFAULT_THREAD_NAME: &str = "pacer-refill";

/// A nominal rate: `calls` permitted per `period`.
///
/// ```rust
/// use pacer::Per;
/// use std::time::Duration;
///
/// let per = Per::new(3, Duration::from_secs(2));
/// assert_eq!(per.rate(), 1.5);
///
/// assert_eq!(Per::minute(120).rate(), 2.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Per {
    /// Number of calls permitted per period.
    pub calls: u32,
    /// Length of the period.
    pub period: Duration,
}

impl Per {
    /// `calls` per arbitrary `period`.
    pub const fn new(calls: u32, period: Duration) -> Self {
        Self { calls, period }
    }

    /// `calls` per second.
    pub const fn second(calls: u32) -> Self {
        Self::new(calls, Duration::from_secs(1))
    }

    /// `calls` per minute.
    pub const fn minute(calls: u32) -> Self {
        Self::new(calls, Duration::from_secs(60))
    }

    /// `calls` per hour.
    pub const fn hour(calls: u32) -> Self {
        Self::new(calls, Duration::from_secs(3600))
    }

    /// Tokens per second this specification amounts to.
    ///
    /// A zero period yields an infinite rate, which bucket construction
    /// rejects.
    pub fn rate(&self) -> f64 {
        self.calls as f64 / self.period.as_secs_f64()
    }
}

/// Checks bucket parameters and derives the inter-token interval.
///
/// Shared by the bucket constructor and [`RateLimitConfig::validate`] so both
/// reject exactly the same inputs.
pub(crate) fn validate_bucket(rate: f64, capacity: u64) -> Result<Duration, ConfigError> {
    if !(rate > 0.0) || !rate.is_finite() {
        return Err(ConfigError::InvalidRate(rate));
    }
    if capacity == 0 {
        return Err(ConfigError::InvalidCapacity);
    }

    let interval =
        Duration::try_from_secs_f64(1.0 / rate).map_err(|_| ConfigError::InvalidRate(rate))?;
    Ok(interval.max(MIN_INTER_TOKEN_INTERVAL))
}

/// Configuration of a single rate limit.
///
/// ```rust
/// use pacer::{Per, RateLimitConfig};
///
/// // 10 calls/s sustained, bursts of up to 50
/// let config = RateLimitConfig::per_second(10).with_burst(50);
/// assert!(config.validate().is_ok());
///
/// let invalid = RateLimitConfig::new(Per::second(0), 5);
/// assert!(invalid.validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Nominal sustained rate.
    pub per: Per,

    /// Bucket capacity, the largest instantaneous allowance.
    pub burst: u64,
}

impl Default for RateLimitConfig {
    /// One call per second with a burst of one.
    fn default() -> Self {
        Self {
            per: Per::second(1),
            burst: 1,
        }
    }
}

impl RateLimitConfig {
    /// Creates a configuration from a rate and a burst size.
    pub fn new(per: Per, burst: u64) -> Self {
        Self { per, burst }
    }

    /// `calls` per second; the burst defaults to one second's worth of calls.
    pub fn per_second(calls: u32) -> Self {
        Self::new(Per::second(calls), calls as u64)
    }

    /// `calls` per minute; the burst defaults to one minute's worth of calls.
    pub fn per_minute(calls: u32) -> Self {
        Self::new(Per::minute(calls), calls as u64)
    }

    /// Sets the burst size.
    pub fn with_burst(mut self, burst: u64) -> Self {
        self.burst = burst;
        self
    }

    /// Tokens per second.
    pub fn rate(&self) -> f64 {
        self.per.rate()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidRate`] if the rate is zero, negative or infinite
    /// - [`ConfigError::InvalidCapacity`] if `burst` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_bucket(self.rate(), self.burst).map(|_| ())
    }
}

/// Settings for the blocking refill scheduler.
///
/// ```rust
/// use pacer::SchedulerConfig;
/// use std::time::Duration;
///
/// let config = SchedulerConfig::default()
///     .with_thread_name("api-refill")
///     .with_batch_window(Duration::from_micros(50));
/// assert_eq!(config.thread_name, "api-refill");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Name of the worker thread.
    pub thread_name: String,

    /// Width of the window in which due refills are batched into one wake.
    ///
    /// Defaults to the monotonic clock's resolution.
    pub batch_window: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            batch_window: clock::resolution(),
        }
    }
}

impl SchedulerConfig {
    /// Sets the worker thread name.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Sets the batching window.
    ///
    /// Wider windows coalesce more refills per wake at the cost of filling
    /// some buckets slightly early.
    pub fn with_batch_window(mut self, window: Duration) -> Self {
        self.batch_window = window;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_rates() {
        assert_eq!(Per::second(5).rate(), 5.0);
        assert_eq!(Per::minute(120).rate(), 2.0);
        assert_eq!(Per::hour(3600).rate(), 1.0);
        assert_eq!(Per::new(1, Duration::from_millis(250)).rate(), 4.0);
        assert!(Per::new(1, Duration::ZERO).rate().is_infinite());
    }

    #[test]
    fn test_validate_bucket_interval() {
        assert_eq!(validate_bucket(1.0, 5), Ok(Duration::from_secs(1)));
        assert_eq!(validate_bucket(4.0, 5), Ok(Duration::from_millis(250)));

        // Absurd rates clamp to the minimum interval
        assert_eq!(validate_bucket(1e12, 1), Ok(MIN_INTER_TOKEN_INTERVAL));
    }

    #[test]
    fn test_validate_bucket_rejects_bad_input() {
        assert_eq!(validate_bucket(0.0, 5), Err(ConfigError::InvalidRate(0.0)));
        assert_eq!(validate_bucket(-1.0, 5), Err(ConfigError::InvalidRate(-1.0)));
        assert!(matches!(
            validate_bucket(f64::NAN, 5),
            Err(ConfigError::InvalidRate(_))
        ));
        assert!(matches!(
            validate_bucket(f64::INFINITY, 5),
            Err(ConfigError::InvalidRate(_))
        ));
        assert_eq!(validate_bucket(1.0, 0), Err(ConfigError::InvalidCapacity));

        // 1 / rate overflows Duration
        assert!(matches!(
            validate_bucket(1e-300, 5),
            Err(ConfigError::InvalidRate(_))
        ));
    }

    #[test]
    fn test_config_builders() {
        let config = RateLimitConfig::per_second(10);
        assert_eq!(config.burst, 10);
        assert_eq!(config.rate(), 10.0);

        let config = RateLimitConfig::per_minute(60).with_burst(3);
        assert_eq!(config.burst, 3);
        assert_eq!(config.rate(), 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(RateLimitConfig::default().validate().is_ok());

        let zero_burst = RateLimitConfig::per_second(10).with_burst(0);
        assert_eq!(zero_burst.validate(), Err(ConfigError::InvalidCapacity));

        let zero_calls = RateLimitConfig::new(Per::second(0), 5);
        assert_eq!(zero_calls.validate(), Err(ConfigError::InvalidRate(0.0)));

        let zero_period = RateLimitConfig::new(Per::new(1, Duration::ZERO), 5);
        assert!(matches!(
            zero_period.validate(),
            Err(ConfigError::InvalidRate(_))
        ));
    }

    #[test]
    fn test_scheduler_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.thread_name, DEFAULT_THREAD_NAME);
        assert_eq!(config.batch_window, clock::resolution());

        let config = config
            .with_thread_name("custom")
            .with_batch_window(Duration::from_millis(1));
        assert_eq!(config.thread_name, "custom");
        assert_eq!(config.batch_window, Duration::from_millis(1));
    }
}

//! # Clock (clock.rs)
//!
//! The monotonic time source every bucket and scheduler measures against.
//!
//! ```text
//!     Time sources:
//!
//!     Instant::now() ──► now()          (monotonic, never jumps back)
//!          │
//!          └─────────► resolution()     (smallest observable tick,
//!                                        measured once per process)
//! ```
//!
//! The scheduler batches every refill that falls due inside one clock tick,
//! so `resolution()` is also the default width of its batching window.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Number of tick samples taken when measuring the clock resolution.
const RESOLUTION_SAMPLES: usize = 16;

// Measured lazily on first use; the clock's granularity does not change
// during the life of the process.
static RESOLUTION: OnceLock<Duration> = OnceLock::new();

/// Returns the current monotonic instant.
#[inline(always)]
pub(crate) fn now() -> Instant {
    Instant::now()
}

/// Returns the resolution of the monotonic clock.
///
/// The standard library does not expose the granularity of `Instant`, so it
/// is measured: the smallest non-zero step between consecutive readings over
/// a handful of samples. The result is cached for the process lifetime.
///
/// # Example
///
/// ```rust
/// use pacer::clock_resolution;
///
/// let tick = clock_resolution();
/// assert!(!tick.is_zero());
/// ```
pub fn resolution() -> Duration {
    *RESOLUTION.get_or_init(|| {
        let mut best = Duration::MAX;
        for _ in 0..RESOLUTION_SAMPLES {
            let start = Instant::now();
            let mut next = Instant::now();
            while next == start {
                std::hint::spin_loop();
                next = Instant::now();
            }
            best = best.min(next - start);
        }
        best
    })
}

/// Converts a relative timeout into an absolute deadline.
///
/// Returns `None` when there is no timeout, or when `now + timeout` cannot be
/// represented (an effectively infinite wait).
#[inline]
pub(crate) fn deadline_after(timeout: Option<Duration>) -> Option<Instant> {
    timeout.and_then(|t| now().checked_add(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_is_positive_and_cached() {
        let first = resolution();
        assert!(first > Duration::ZERO);
        assert!(first < Duration::from_millis(20));
        assert_eq!(resolution(), first);
    }

    #[test]
    fn test_now_is_monotonic() {
        let mut last = now();
        for _ in 0..1000 {
            let current = now();
            assert!(current >= last);
            last = current;
        }
    }

    #[test]
    fn test_deadline_after() {
        assert!(deadline_after(None).is_none());

        let before = now();
        let deadline = deadline_after(Some(Duration::from_millis(50))).unwrap();
        assert!(deadline >= before + Duration::from_millis(50));

        // Unrepresentable deadlines degrade to "wait forever"
        assert!(deadline_after(Some(Duration::MAX)).is_none());
    }
}

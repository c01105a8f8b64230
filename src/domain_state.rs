//! Per-host throughput bookkeeping for the rate limiter.

use std::time::Instant;

/// Per-host rate-limiting state.
///
/// Created lazily on first request to a new host and mutated only through
/// [`crate::rate_limiter::RateLimiter`].
#[derive(Debug, Clone)]
pub struct DomainState {
    /// Monotonic timestamp of the last dispatch for this domain.
    pub(crate) last_request_time: Option<Instant>,
    /// Seconds to wait before the next request.
    pub(crate) current_delay: f64,
    /// Consecutive rate-limited responses.
    pub(crate) fail_count: u32,
}

impl DomainState {
    /// Create a fresh domain state with `current_delay` seeded from `base_delay`.
    pub(crate) fn new(initial_delay: f64) -> Self {
        Self {
            last_request_time: None,
            current_delay: initial_delay,
            fail_count: 0,
        }
    }

    #[must_use]
    pub fn current_delay(&self) -> f64 {
        self.current_delay
    }

    #[must_use]
    pub fn fail_count(&self) -> u32 {
        self.fail_count
    }

    #[must_use]
    pub fn last_request_time(&self) -> Option<Instant> {
        self.last_request_time
    }
}

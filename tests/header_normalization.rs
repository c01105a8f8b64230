use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use kodegen_crawl_dispatch::RateLimiter;
use proptest::prelude::*;

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the epoch")
        .as_secs_f64()
}

proptest! {
    /// `Retry-After: N` (integer seconds) must be honored as-is, within a
    /// small tolerance for the time spent computing the delay.
    #[test]
    fn retry_after_seconds_round_trips(seconds in 1u32..=3600) {
        let limiter = RateLimiter::new((1.0, 1.0), 3600.0, 3, vec![429, 503]);
        let mut headers = HashMap::new();
        headers.insert("Retry-After".to_string(), seconds.to_string());

        let delay = limiter.retry_after(2.0, Some(&headers));
        prop_assert!((delay - f64::from(seconds)).abs() < 1.0);
    }

    /// A `RateLimit-Reset` timestamp expressed in seconds, milliseconds,
    /// microseconds, or nanoseconds since the epoch must normalize to the
    /// same delay regardless of unit.
    #[test]
    fn reset_header_normalizes_across_units(delta in 1u32..=3600, unit_exponent in 0u32..=3) {
        let limiter = RateLimiter::new((1.0, 1.0), 3600.0, 3, vec![429, 503]);
        let now = now_secs();
        let scale = 1000f64.powi(unit_exponent as i32);
        let reset_value = (now + f64::from(delta)) * scale;

        let mut headers = HashMap::new();
        headers.insert("ratelimit-remaining".to_string(), "0".to_string());
        headers.insert("ratelimit-reset".to_string(), format!("{reset_value:.0}"));

        let delay = limiter.retry_after(2.0, Some(&headers));
        prop_assert!((delay - f64::from(delta)).abs() < 1.0);
    }

    /// GitHub-style `x-ratelimit-remaining`/`x-ratelimit-reset` headers take
    /// the same normalization path as the draft standard headers.
    #[test]
    fn github_style_reset_normalizes(delta in 1u32..=3600) {
        let limiter = RateLimiter::new((1.0, 1.0), 3600.0, 3, vec![429, 503]);
        let now = now_secs();
        let reset_value = now + f64::from(delta);

        let mut headers = HashMap::new();
        headers.insert("x-ratelimit-remaining".to_string(), "0".to_string());
        headers.insert("x-ratelimit-reset".to_string(), format!("{reset_value:.0}"));

        let delay = limiter.retry_after(2.0, Some(&headers));
        prop_assert!((delay - f64::from(delta)).abs() < 1.0);
    }

    /// A nonzero remaining count means the reset header is irrelevant; the
    /// limiter falls back to exponential backoff, capped at `max_delay`.
    #[test]
    fn nonzero_remaining_falls_back_to_backoff(current_delay in 1.0f64..=30.0) {
        let limiter = RateLimiter::new((1.0, 1.0), 60.0, 3, vec![429, 503]);
        let mut headers = HashMap::new();
        headers.insert("x-ratelimit-remaining".to_string(), "5".to_string());
        headers.insert("x-ratelimit-reset".to_string(), "9999999999".to_string());

        let delay = limiter.retry_after(current_delay, Some(&headers));
        prop_assert!(delay <= 60.0);
        prop_assert!(delay >= current_delay * 2.0 * 0.75 - 0.01);
    }
}

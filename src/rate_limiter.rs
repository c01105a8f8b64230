//! Polite, per-domain pacing with RFC 2616 / draft-ietf-httpapi-ratelimit
//! header cooperation and exponential backoff.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::Mutex as AsyncMutex;

use crate::crawler::CrawlResult;
use crate::domain_state::DomainState;

/// Outcome of [`RateLimiter::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitStatus {
    /// Retries exhausted; the dispatcher must emit a terminal failure.
    NoRetry,
    /// Advisory: the dispatcher should requeue.
    Retry,
    /// Not rate limited; proceed.
    Continue,
}

/// Cooperative, per-domain rate limiter.
///
/// `wait_if_needed` serializes access to a domain's last-request timestamp
/// under a per-host async mutex, cloned out of the domain map so a slow
/// sleep on one host never holds the map's shard lock and blocks lookups
/// for other hosts.
pub struct RateLimiter {
    base_delay: (f64, f64),
    max_delay: f64,
    max_retries: u32,
    rate_limit_codes: Vec<u16>,
    domains: DashMap<String, Arc<AsyncMutex<DomainState>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(base_delay: (f64, f64), max_delay: f64, max_retries: u32, rate_limit_codes: Vec<u16>) -> Self {
        Self {
            base_delay,
            max_delay,
            max_retries,
            rate_limit_codes,
            domains: DashMap::new(),
        }
    }

    /// Build a limiter from a [`crate::config::DispatchConfig`].
    #[must_use]
    pub fn from_config(config: &crate::config::DispatchConfig) -> Self {
        Self::new(
            config.base_delay(),
            config.max_delay(),
            config.max_retries(),
            config.rate_limit_codes().to_vec(),
        )
    }

    pub(crate) fn domain_of(url: &str) -> String {
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string())
    }

    fn initial_delay(&self) -> f64 {
        let (min, max) = self.base_delay;
        if (max - min).abs() < f64::EPSILON {
            return min;
        }
        rand::rng().random_range(min..=max)
    }

    /// Fetch (creating if absent) the per-host state handle, dropping the
    /// `DashMap` shard guard before returning so callers never hold it
    /// across an `await`.
    fn domain_handle(&self, domain: &str) -> Arc<AsyncMutex<DomainState>> {
        Arc::clone(
            self.domains
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(DomainState::new(0.0))))
                .value(),
        )
    }

    /// Suspend the caller until the domain's `last_request_time + current_delay`
    /// has elapsed, then record a new `last_request_time`. Creates the
    /// domain's state lazily, seeded from `base_delay`, on first use.
    pub async fn wait_if_needed(&self, url: &str) {
        let domain = Self::domain_of(url);
        let handle = self.domain_handle(&domain);
        let mut state = handle.lock().await;

        if state.current_delay == 0.0 {
            state.current_delay = self.initial_delay();
        }

        let now = Instant::now();
        if let Some(last) = state.last_request_time {
            let elapsed = now.duration_since(last).as_secs_f64();
            let wait = state.current_delay - elapsed;
            if wait > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(wait)).await;
            }
        }

        state.last_request_time = Some(Instant::now());
    }

    /// Record the outcome of a dispatch and decide whether to retry.
    pub async fn update(&self, result: &CrawlResult) -> RateLimitStatus {
        let domain = Self::domain_of(&result.url);
        let handle = self.domain_handle(&domain);
        let mut state = handle.lock().await;

        let is_rate_limited = result
            .status_code
            .is_some_and(|code| self.rate_limit_codes.contains(&code));

        if is_rate_limited {
            state.fail_count += 1;
            if state.fail_count > self.max_retries {
                log::warn!(
                    "domain {domain}: rate limit retries exhausted ({} > {})",
                    state.fail_count,
                    self.max_retries
                );
                return RateLimitStatus::NoRetry;
            }

            let headers = result.response_headers.as_ref();
            let new_delay = self.retry_after(state.current_delay, headers);
            log::debug!(
                "domain {domain}: rate limited, new delay {new_delay:.2}s (fail_count={})",
                state.fail_count
            );
            state.current_delay = new_delay;
            return RateLimitStatus::Retry;
        }

        let floor = self.initial_delay();
        state.current_delay = f64::max(floor, state.current_delay * 0.75);
        state.fail_count = 0;
        RateLimitStatus::Continue
    }

    /// Compute the delay to honor before retrying, in ordered precedence:
    /// `Retry-After`, then the draft `RateLimit-*` headers, then vendor
    /// `x-ratelimit-*`/`x-rate-limit-*` variants, falling back to
    /// exponential backoff with jitter capped at `max_delay`.
    ///
    /// The reset-value normalization heuristic (seconds vs. ms vs. µs vs.
    /// ns) can misinterpret a delta-seconds value that happens to land just
    /// above `now` as an absolute epoch; no perfect fix exists without
    /// server cooperation.
    #[must_use]
    pub fn retry_after(&self, current_delay: f64, headers: Option<&HashMap<String, String>>) -> f64 {
        if let Some(headers) = headers {
            let now = now_unix_secs();

            if let Some(value) = header_delay(headers, "retry-after", now)
                && value > 0.0
            {
                return value;
            }

            if let Some(value) = remaining_then_reset(headers, now, "ratelimit-remaining", "ratelimit-reset")
                && value > 0.0
            {
                return value;
            }

            if let Some(value) = remaining_then_reset(headers, now, "x-ratelimit-remaining", "x-ratelimit-reset")
                && value > 0.0
            {
                return value;
            }

            if let Some(value) = remaining_then_reset(headers, now, "x-rate-limit-remaining", "x-rate-limit-reset")
                && value > 0.0
            {
                return value;
            }

            if let Some(value) =
                remaining_then_reset(headers, now, "x-ratelimit-userremaining", "x-ratelimit-userreset")
                && value > 0.0
            {
                return value;
            }

            if let Some(value) = remaining_then_reset(
                headers,
                now,
                "x-ratelimit-userpathremaining",
                "x-ratelimit-userpathreset",
            ) && value > 0.0
            {
                return value;
            }
        }

        let jitter = rand::rng().random_range(0.75..=1.25);
        f64::min(current_delay * 2.0 * jitter, self.max_delay)
    }
}

fn now_unix_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Parse a header as a bare float, returning `default` on absence or parse failure.
fn header_numeric(headers: &HashMap<String, String>, name: &str, default: f64) -> f64 {
    header_value(headers, name)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(default)
}

/// Parse a header as a delay relative to `now`: an HTTP-date (RFC 7231),
/// delta-seconds, or an epoch timestamp in seconds/ms/µs/ns (see the
/// reset-value normalization heuristic documented on [`RateLimiter::retry_after`]).
fn header_delay(headers: &HashMap<String, String>, name: &str, now: f64) -> Option<f64> {
    let value = header_value(headers, name)?;

    if let Ok(mut numeric) = value.trim().parse::<f64>() {
        if numeric > now {
            // Looks like an absolute epoch timestamp; normalize its unit.
            while numeric / 1000.0 > now {
                numeric /= 1000.0;
            }
            return Some(numeric - now);
        }
        return Some(numeric);
    }

    parse_http_date(value).map(|epoch| epoch - now)
}

/// Parse an RFC 7231 / RFC 2822-style HTTP-date into Unix epoch seconds.
fn parse_http_date(value: &str) -> Option<f64> {
    httpdate::parse_http_date(value.trim())
        .ok()
        .map(|t| t.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64())
}

/// `RateLimit-Remaining == 0` (or missing, treated as 1 and then found `<= 0`)
/// resolves to `RateLimit-Reset`.
fn remaining_then_reset(
    headers: &HashMap<String, String>,
    now: f64,
    remaining_header: &str,
    reset_header: &str,
) -> Option<f64> {
    let remaining = header_numeric(headers, remaining_header, 1.0);
    if remaining <= 0.0 {
        let delay = header_delay(headers, reset_header, now)?;
        if delay > 0.0 {
            return Some(delay);
        }
    }
    None
}

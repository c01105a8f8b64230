//! Configuration for the crawl dispatcher
//!
//! This module provides [`DispatchConfig`] and its builder, [`DispatchConfigBuilder`],
//! for configuring dispatcher behavior with validation and sensible defaults.

use std::time::Duration;

use crate::error::{DispatchError, DispatchResult};

/// HTTP status codes treated as rate limiting by default.
pub const DEFAULT_RATE_LIMIT_CODES: [u16; 2] = [429, 503];

/// Main configuration struct for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub(crate) memory_threshold_percent: f64,
    pub(crate) critical_threshold_percent: f64,
    pub(crate) recovery_threshold_percent: f64,
    pub(crate) check_interval: Duration,
    pub(crate) max_session_permit: usize,
    pub(crate) fairness_timeout: Duration,
    pub(crate) base_delay: (f64, f64),
    pub(crate) max_delay: f64,
    pub(crate) max_retries: u32,
    pub(crate) rate_limit_codes: Vec<u16>,
    pub(crate) semaphore_count: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            memory_threshold_percent: 90.0,
            critical_threshold_percent: 95.0,
            recovery_threshold_percent: 85.0,
            check_interval: Duration::from_secs(1),
            max_session_permit: 20,
            fairness_timeout: Duration::from_secs(600),
            base_delay: (1.0, 3.0),
            max_delay: 60.0,
            max_retries: 3,
            rate_limit_codes: DEFAULT_RATE_LIMIT_CODES.to_vec(),
            semaphore_count: 5,
        }
    }
}

impl DispatchConfig {
    /// Start building a configuration from the documented defaults.
    #[must_use]
    pub fn builder() -> DispatchConfigBuilder {
        DispatchConfigBuilder::default()
    }

    #[must_use]
    pub fn memory_threshold_percent(&self) -> f64 {
        self.memory_threshold_percent
    }

    #[must_use]
    pub fn critical_threshold_percent(&self) -> f64 {
        self.critical_threshold_percent
    }

    #[must_use]
    pub fn recovery_threshold_percent(&self) -> f64 {
        self.recovery_threshold_percent
    }

    #[must_use]
    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    #[must_use]
    pub fn max_session_permit(&self) -> usize {
        self.max_session_permit
    }

    #[must_use]
    pub fn fairness_timeout(&self) -> Duration {
        self.fairness_timeout
    }

    #[must_use]
    pub fn base_delay(&self) -> (f64, f64) {
        self.base_delay
    }

    #[must_use]
    pub fn max_delay(&self) -> f64 {
        self.max_delay
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[must_use]
    pub fn rate_limit_codes(&self) -> &[u16] {
        &self.rate_limit_codes
    }

    #[must_use]
    pub fn semaphore_count(&self) -> usize {
        self.semaphore_count
    }
}

/// Fluent builder for [`DispatchConfig`].
#[derive(Debug, Clone)]
pub struct DispatchConfigBuilder {
    inner: DispatchConfig,
}

impl Default for DispatchConfigBuilder {
    fn default() -> Self {
        Self {
            inner: DispatchConfig::default(),
        }
    }
}

impl DispatchConfigBuilder {
    #[must_use]
    pub fn memory_threshold_percent(mut self, value: f64) -> Self {
        self.inner.memory_threshold_percent = value;
        self
    }

    #[must_use]
    pub fn critical_threshold_percent(mut self, value: f64) -> Self {
        self.inner.critical_threshold_percent = value;
        self
    }

    #[must_use]
    pub fn recovery_threshold_percent(mut self, value: f64) -> Self {
        self.inner.recovery_threshold_percent = value;
        self
    }

    #[must_use]
    pub fn check_interval(mut self, value: Duration) -> Self {
        self.inner.check_interval = value;
        self
    }

    #[must_use]
    pub fn max_session_permit(mut self, value: usize) -> Self {
        self.inner.max_session_permit = value;
        self
    }

    #[must_use]
    pub fn fairness_timeout(mut self, value: Duration) -> Self {
        self.inner.fairness_timeout = value;
        self
    }

    #[must_use]
    pub fn base_delay(mut self, min: f64, max: f64) -> Self {
        self.inner.base_delay = (min, max);
        self
    }

    #[must_use]
    pub fn max_delay(mut self, value: f64) -> Self {
        self.inner.max_delay = value;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, value: u32) -> Self {
        self.inner.max_retries = value;
        self
    }

    #[must_use]
    pub fn rate_limit_codes(mut self, codes: Vec<u16>) -> Self {
        self.inner.rate_limit_codes = codes;
        self
    }

    #[must_use]
    pub fn semaphore_count(mut self, value: usize) -> Self {
        self.inner.semaphore_count = value;
        self
    }

    /// Validate and finalize the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidConfig`] if the thresholds are out of
    /// order, the base delay range is inverted, or either concurrency cap is
    /// zero.
    pub fn build(self) -> DispatchResult<DispatchConfig> {
        let cfg = self.inner;

        if !(cfg.recovery_threshold_percent < cfg.memory_threshold_percent) {
            return Err(DispatchError::InvalidConfig(format!(
                "recovery_threshold_percent ({}) must be less than memory_threshold_percent ({})",
                cfg.recovery_threshold_percent, cfg.memory_threshold_percent
            )));
        }

        if !(cfg.memory_threshold_percent < cfg.critical_threshold_percent) {
            return Err(DispatchError::InvalidConfig(format!(
                "memory_threshold_percent ({}) must be less than critical_threshold_percent ({})",
                cfg.memory_threshold_percent, cfg.critical_threshold_percent
            )));
        }

        if cfg.base_delay.0 > cfg.base_delay.1 {
            return Err(DispatchError::InvalidConfig(format!(
                "base_delay min ({}) must not exceed max ({})",
                cfg.base_delay.0, cfg.base_delay.1
            )));
        }

        if cfg.base_delay.0 < 0.0 {
            return Err(DispatchError::InvalidConfig(
                "base_delay must be non-negative".to_string(),
            ));
        }

        if cfg.max_delay < cfg.base_delay.1 {
            return Err(DispatchError::InvalidConfig(format!(
                "max_delay ({}) must be at least base_delay max ({})",
                cfg.max_delay, cfg.base_delay.1
            )));
        }

        if cfg.rate_limit_codes.is_empty() {
            return Err(DispatchError::InvalidConfig(
                "rate_limit_codes must not be empty".to_string(),
            ));
        }

        if cfg.max_session_permit == 0 {
            return Err(DispatchError::InvalidConfig(
                "max_session_permit must be at least 1".to_string(),
            ));
        }

        if cfg.semaphore_count == 0 {
            return Err(DispatchError::InvalidConfig(
                "semaphore_count must be at least 1".to_string(),
            ));
        }

        Ok(cfg)
    }
}

//! Memory-adaptive, rate-limited crawl dispatcher core.
//!
//! This crate schedules a bulk list of URLs through an injected [`Crawler`]
//! capability, subject to live host memory pressure, per-domain rate-limit
//! cooperation, fairness across long-waiting work, and bounded concurrency.
//! It does not fetch anything itself: callers supply a [`Crawler`]
//! implementation and get back [`CrawlerTaskResult`]s, either as a batch or
//! as a stream.
//!
//! Two [`Dispatcher`] implementations are provided:
//! [`MemoryAdaptiveDispatcher`] (priority queue, memory-gated admission,
//! requeue-on-pressure, fairness promotion) and [`SemaphoreDispatcher`] (a
//! simpler fixed-concurrency variant). Both share the same
//! [`DispatchConfig`], [`RateLimiter`], and [`Crawler`] contract.
//!
//! The dispatcher itself fails in only two ways, modeled as
//! [`DispatchError`]: invalid configuration and an (in practice
//! unreachable) queue failure. Everything else (a rate limit exhausted, a
//! crawl that failed, a worker panic) surfaces as a failed
//! [`CrawlerTaskResult`] instead, so a bad URL never aborts the run.

pub mod config;
pub mod crawler;
pub mod dispatcher;
pub mod domain_state;
pub mod error;
pub mod memory_monitor;
pub mod observer;
pub mod priority_queue;
pub mod rate_limiter;
mod result_channel;
pub mod task;

pub use config::{DispatchConfig, DispatchConfigBuilder};
pub use crawler::{CrawlResult, Crawler};
pub use dispatcher::{Dispatcher, MemoryAdaptiveDispatcher, SemaphoreDispatcher};
pub use domain_state::DomainState;
pub use error::{DispatchError, DispatchResult};
pub use memory_monitor::{MemoryMonitor, MemorySampler, MemoryState};
pub use observer::{LoggingObserver, NoOpObserver, TaskFields, TaskObserver};
pub use priority_queue::PriorityQueue;
pub use rate_limiter::{RateLimiter, RateLimitStatus};
pub use task::{CrawlerTaskResult, QueueEntry, TaskStatus};

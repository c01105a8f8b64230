//! Queue entries and terminal results.

use std::time::Instant;

use uuid::Uuid;

use crate::crawler::CrawlResult;

/// Lifecycle status reported to the [`crate::observer::TaskObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

/// An admitted-but-not-yet-completed unit of work.
///
/// Replaced (not mutated in place) on requeue: a requeue always produces a
/// new `QueueEntry` with a fresh `enqueue_time`, incremented `retry_count`,
/// and recomputed `priority_score`.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub url: String,
    pub task_id: Uuid,
    pub retry_count: u32,
    pub enqueue_time: Instant,
    pub priority_score: f64,
}

impl QueueEntry {
    /// Create the initial entry for a freshly submitted URL.
    #[must_use]
    pub fn new(url: String, task_id: Uuid, now: Instant) -> Self {
        Self {
            url,
            task_id,
            retry_count: 0,
            enqueue_time: now,
            priority_score: 0.0,
        }
    }

    /// Build the replacement entry for a requeue.
    #[must_use]
    pub fn requeued(&self, now: Instant, priority_score: f64) -> Self {
        Self {
            url: self.url.clone(),
            task_id: self.task_id,
            retry_count: self.retry_count + 1,
            enqueue_time: now,
            priority_score,
        }
    }
}

/// Terminal record produced exactly once per originally submitted URL
/// (absent caller cancellation).
#[derive(Debug, Clone)]
pub struct CrawlerTaskResult {
    pub task_id: Uuid,
    pub url: String,
    pub result: Option<CrawlResult>,
    pub start_time: Instant,
    pub end_time: Instant,
    /// Positive RSS delta sampled around the crawl call, in megabytes.
    /// Negative deltas (allocator give-back) are clamped to zero.
    pub memory_usage: f64,
    pub peak_memory: f64,
    pub retry_count: u32,
    pub error_message: String,
}

impl CrawlerTaskResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.success) && self.error_message.is_empty()
    }
}

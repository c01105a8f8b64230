//! Error types for the dispatcher core
//!
//! The dispatcher itself fails in only a handful of ways; everything
//! that can go wrong with an individual crawl surfaces as a failed
//! [`crate::task::CrawlerTaskResult`] instead (see the crate-level docs).

/// Errors that abort a `run`/`run_stream` call before or during scheduling.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The supplied `DispatchConfig` failed validation.
    #[error("invalid dispatcher configuration: {0}")]
    InvalidConfig(String),

    /// The priority queue itself failed. In practice unreachable with the
    /// in-process queue implementation, but modeled so callers never see a
    /// silently swallowed catastrophic failure.
    #[error("priority queue failure: {0}")]
    QueueFailure(String),
}

/// Convenience alias for dispatcher-level results.
pub type DispatchResult<T> = Result<T, DispatchError>;

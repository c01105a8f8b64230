//! The injected crawling capability.
//!
//! The dispatcher never fetches a URL itself; it is handed a [`Crawler`]
//! implementation and only reads the handful of [`CrawlResult`] fields it
//! needs to drive rate limiting and result delivery. The run-config type is
//! generic so callers can thread through whatever crawl options their own
//! `Crawler` implementation needs without the dispatcher knowing its shape.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The outcome of a single crawl attempt, as reported by the injected [`Crawler`].
///
/// The dispatcher reads only `url`, `success`, `status_code`,
/// `response_headers`, and `error_message`. `extra` is an opaque,
/// pass-through payload: whatever the real crawler attaches there (markdown,
/// extracted links, a DOM snapshot) rides along in the terminal
/// `CrawlerTaskResult` unexamined. `Serialize`/`Deserialize` let callers log
/// or persist results without hand-writing a parallel DTO.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    pub success: bool,
    pub status_code: Option<u16>,
    pub response_headers: Option<HashMap<String, String>>,
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl CrawlResult {
    /// Construct a successful result for `url`.
    #[must_use]
    pub fn success(url: impl Into<String>, status_code: u16) -> Self {
        Self {
            url: url.into(),
            success: true,
            status_code: Some(status_code),
            response_headers: None,
            error_message: None,
            extra: None,
        }
    }

    /// Construct a failed result carrying `error_message`.
    #[must_use]
    pub fn failure(url: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            success: false,
            status_code: None,
            response_headers: None,
            error_message: Some(error_message.into()),
            extra: None,
        }
    }

    /// Attach response headers (builder-style convenience, handy in tests).
    #[must_use]
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.response_headers = Some(headers);
        self
    }

    /// Override the status code (builder-style convenience, handy in tests).
    #[must_use]
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Injected capability that actually fetches a URL.
///
/// Implementations must be safe to call concurrently with distinct
/// `session_id`s; the dispatcher relies on this to drive many in-flight
/// crawls against the same `Crawler` instance.
pub trait Crawler<RunConfig>: Send + Sync
where
    RunConfig: Send + Sync,
{
    /// Crawl `url` under `run_config`, identified to the crawler by `session_id`.
    fn run<'a>(
        &'a self,
        url: &'a str,
        run_config: &'a RunConfig,
        session_id: Uuid,
    ) -> BoxFuture<'a, CrawlResult>;
}

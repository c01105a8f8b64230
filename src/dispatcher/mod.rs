//! The two dispatch strategies and the trait they share.

mod memory_adaptive;
mod semaphore;

pub use memory_adaptive::MemoryAdaptiveDispatcher;
pub use semaphore::SemaphoreDispatcher;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::Stream;

use crate::crawler::Crawler;
use crate::error::DispatchResult;
use crate::task::CrawlerTaskResult;

/// Drives a bulk crawl of `urls` through an injected [`Crawler`], either
/// collecting results into a batch or streaming them as they complete.
///
/// Implementors share a single `run_config` value, cloned per task, so
/// callers parameterize a run the same way regardless of which dispatcher
/// they pick.
pub trait Dispatcher<RunConfig>: Send + Sync
where
    RunConfig: Clone + Send + Sync + 'static,
{
    /// Dispatch every URL and return once all have a terminal result.
    fn run(
        &self,
        urls: Vec<String>,
        crawler: Arc<dyn Crawler<RunConfig>>,
        run_config: RunConfig,
    ) -> impl Future<Output = DispatchResult<Vec<CrawlerTaskResult>>> + Send;

    /// Dispatch every URL, yielding each terminal result as it completes.
    ///
    /// Emission order is completion order, not submission order.
    fn run_stream(
        &self,
        urls: Vec<String>,
        crawler: Arc<dyn Crawler<RunConfig>>,
        run_config: RunConfig,
    ) -> DispatchResult<Pin<Box<dyn Stream<Item = CrawlerTaskResult> + Send>>>;
}

/// Extract a human-readable message from a caught worker panic payload.
fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked with a non-string payload".to_string()
    }
}

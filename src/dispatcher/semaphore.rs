//! Fixed-concurrency dispatch without memory adaptation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{FuturesUnordered, Stream, StreamExt};
use futures::FutureExt;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::crawler::Crawler;
use crate::error::DispatchResult;
use crate::observer::{TaskFields, TaskObserver};
use crate::rate_limiter::{RateLimiter, RateLimitStatus};
use crate::result_channel::{self, ResultSender};
use crate::task::{CrawlerTaskResult, TaskStatus};

use super::panic_message;
use super::Dispatcher;

/// Holds a counting semaphore of `semaphore_count` permits; every URL is
/// launched as an independent task that acquires a permit, consults the
/// rate limiter, dispatches once, and releases.
///
/// Unlike [`super::MemoryAdaptiveDispatcher`], a rate-limited `RETRY` here is
/// reported to the observer but **not** requeued: the task simply never
/// reaches a terminal result. This reproduces the fixed-concurrency
/// variant's original behavior rather than silently requeuing, so the two
/// dispatchers can emit a different number of results for the same
/// rate-limited input.
pub struct SemaphoreDispatcher {
    config: DispatchConfig,
    observer: Arc<dyn TaskObserver>,
}

impl SemaphoreDispatcher {
    #[must_use]
    pub fn new(config: DispatchConfig, observer: Arc<dyn TaskObserver>) -> Self {
        Self { config, observer }
    }
}

impl<RunConfig> Dispatcher<RunConfig> for SemaphoreDispatcher
where
    RunConfig: Clone + Send + Sync + 'static,
{
    fn run(
        &self,
        urls: Vec<String>,
        crawler: Arc<dyn Crawler<RunConfig>>,
        run_config: RunConfig,
    ) -> impl Future<Output = DispatchResult<Vec<CrawlerTaskResult>>> + Send {
        let stream = self.run_stream(urls, crawler, run_config);
        async move {
            let mut stream = stream?;
            let mut results = Vec::new();
            while let Some(result) = stream.next().await {
                results.push(result);
            }
            Ok(results)
        }
    }

    fn run_stream(
        &self,
        urls: Vec<String>,
        crawler: Arc<dyn Crawler<RunConfig>>,
        run_config: RunConfig,
    ) -> DispatchResult<Pin<Box<dyn Stream<Item = CrawlerTaskResult> + Send>>> {
        let (tx, rx) = result_channel::channel();

        let semaphore = Arc::new(Semaphore::new(self.config.semaphore_count()));
        let rate_limiter = Arc::new(RateLimiter::from_config(&self.config));
        let observer = Arc::clone(&self.observer);

        tokio::spawn(run_all(urls, crawler, run_config, semaphore, rate_limiter, observer, tx));

        Ok(rx)
    }
}

async fn run_all<RunConfig>(
    urls: Vec<String>,
    crawler: Arc<dyn Crawler<RunConfig>>,
    run_config: RunConfig,
    semaphore: Arc<Semaphore>,
    rate_limiter: Arc<RateLimiter>,
    observer: Arc<dyn TaskObserver>,
    tx: ResultSender,
) where
    RunConfig: Clone + Send + Sync + 'static,
{
    observer.run_started();

    let mut tasks: FuturesUnordered<tokio::task::JoinHandle<()>> = FuturesUnordered::new();
    for url in urls {
        let task_id = Uuid::new_v4();
        observer.task_added(task_id, &url);

        let semaphore = Arc::clone(&semaphore);
        let crawler = Arc::clone(&crawler);
        let run_config = run_config.clone();
        let rate_limiter = Arc::clone(&rate_limiter);
        let observer = Arc::clone(&observer);
        let tx = tx.clone();

        tasks.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };
            run_one(task_id, url, crawler, run_config, rate_limiter, observer, tx).await;
        }));
    }

    drop(tx);
    while tasks.next().await.is_some() {}
    observer.run_finished();
}

async fn run_one<RunConfig>(
    task_id: Uuid,
    url: String,
    crawler: Arc<dyn Crawler<RunConfig>>,
    run_config: RunConfig,
    rate_limiter: Arc<RateLimiter>,
    observer: Arc<dyn TaskObserver>,
    mut tx: ResultSender,
) where
    RunConfig: Send + Sync + 'static,
{
    let start_time = Instant::now();
    observer.task_updated(
        task_id,
        &TaskFields {
            status: Some(TaskStatus::InProgress),
            ..Default::default()
        },
    );

    rate_limiter.wait_if_needed(&url).await;

    let crawl = std::panic::AssertUnwindSafe(crawler.run(&url, &run_config, task_id)).catch_unwind();
    let result = match crawl.await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(&*panic);
            emit(&observer, &mut tx, task_id, url, None, start_time, message);
            return;
        }
    };

    match rate_limiter.update(&result).await {
        RateLimitStatus::NoRetry => {
            let domain = RateLimiter::domain_of(&url);
            let message = format!("Rate limit retry count exceeded for domain {domain}");
            emit(&observer, &mut tx, task_id, url, Some(result), start_time, message);
        }
        RateLimitStatus::Retry => {
            log::warn!("task {task_id} rate limited for {url}; SemaphoreDispatcher does not requeue");
            observer.task_updated(
                task_id,
                &TaskFields {
                    error_message: Some("rate limited; not requeued by SemaphoreDispatcher".to_string()),
                    ..Default::default()
                },
            );
        }
        RateLimitStatus::Continue => {
            let message = if result.success {
                String::new()
            } else {
                result.error_message.clone().unwrap_or_default()
            };
            emit(&observer, &mut tx, task_id, url, Some(result), start_time, message);
        }
    }
}

fn emit(
    observer: &Arc<dyn TaskObserver>,
    tx: &mut ResultSender,
    task_id: Uuid,
    url: String,
    result: Option<crate::crawler::CrawlResult>,
    start_time: Instant,
    error_message: String,
) {
    let task_result = CrawlerTaskResult {
        task_id,
        url,
        result,
        start_time,
        end_time: Instant::now(),
        memory_usage: 0.0,
        peak_memory: 0.0,
        retry_count: 0,
        error_message,
    };

    observer.task_updated(
        task_id,
        &TaskFields {
            status: Some(if task_result.is_success() { TaskStatus::Completed } else { TaskStatus::Failed }),
            error_message: (!task_result.error_message.is_empty()).then(|| task_result.error_message.clone()),
            ..Default::default()
        },
    );

    let _ = tx.unbounded_send(task_result);
}

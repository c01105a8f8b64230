mod common;

use std::sync::Arc;
use std::time::Duration;

use common::ScriptedCrawler;
use kodegen_crawl_dispatch::{CrawlResult, DispatchConfig, Dispatcher, MemoryAdaptiveDispatcher, NoOpObserver};
use kodegen_crawl_dispatch::memory_monitor::ManualSampler;

/// Memory forced into CRITICAL for the duration of a task's admission
/// window: the task is requeued (at least once) and eventually completes
/// once CRITICAL clears.
#[tokio::test]
async fn task_requeues_under_critical_memory_and_finishes_after_recovery() {
    let crawler = Arc::new(ScriptedCrawler::new(|url, _| CrawlResult::success(url, 200)));

    let sampler = Arc::new(ManualSampler::new(99.0));
    let config = DispatchConfig::builder()
        .check_interval(Duration::from_millis(20))
        .base_delay(0.0, 0.0)
        .build()
        .expect("valid config");
    let dispatcher = MemoryAdaptiveDispatcher::with_sampler(config, Arc::new(NoOpObserver), sampler.clone());

    let recovery_sampler = Arc::clone(&sampler);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        recovery_sampler.set(10.0);
    });

    let results = dispatcher
        .run(vec!["https://criticalhost.test/a".to_string()], crawler.clone(), ())
        .await
        .expect("run succeeds");

    assert_eq!(results.len(), 1);
    assert!(results[0].is_success());
    assert!(results[0].retry_count >= 1, "expected at least one requeue under CRITICAL memory");
}

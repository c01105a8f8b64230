mod common;

use std::sync::Arc;

use common::ScriptedCrawler;
use kodegen_crawl_dispatch::{CrawlResult, DispatchConfig, Dispatcher, MemoryAdaptiveDispatcher, NoOpObserver};

/// `max_retries=2` against a host that always 429s: exactly one failed
/// `CrawlerTaskResult` with the standard exhaustion message, and the crawler
/// called exactly 3 times (the initial attempt plus two retries).
#[tokio::test]
async fn exhausted_retries_produce_one_failed_result() {
    let crawler = Arc::new(ScriptedCrawler::new(|url, _| CrawlResult {
        url: url.to_string(),
        success: false,
        status_code: Some(429),
        response_headers: None,
        error_message: None,
        extra: None,
    }));

    let config = DispatchConfig::builder()
        .max_retries(2)
        .base_delay(0.01, 0.01)
        .max_delay(0.2)
        .build()
        .expect("valid config");
    let dispatcher = MemoryAdaptiveDispatcher::new(config, Arc::new(NoOpObserver));

    let results = dispatcher
        .run(vec!["https://alwayslimited.test/a".to_string()], crawler.clone(), ())
        .await
        .expect("run succeeds");

    assert_eq!(results.len(), 1);
    assert!(!results[0].is_success());
    assert!(
        results[0].error_message.contains("Rate limit retry count exceeded"),
        "unexpected message: {}",
        results[0].error_message
    );

    assert_eq!(crawler.call_count("https://alwayslimited.test/a"), 3);
}

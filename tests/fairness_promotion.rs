mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::ScriptedCrawler;
use kodegen_crawl_dispatch::{CrawlResult, DispatchConfig, Dispatcher, MemoryAdaptiveDispatcher, NoOpObserver};

/// `max_session_permit=1`, `fairness_timeout=500ms`: two URLs queued behind
/// a long-running blocker both exceed the fairness timeout while waiting,
/// so once the permit frees they are served in the stable order the
/// fairness sweep preserves among equally-starved entries.
#[tokio::test]
async fn starved_tasks_are_served_once_capacity_frees() {
    let blocker = "https://blocker.test/".to_string();
    let waiter_a = "https://waiter-a.test/".to_string();
    let waiter_b = "https://waiter-b.test/".to_string();

    let mut delays = HashMap::new();
    delays.insert(blocker.clone(), Duration::from_millis(1300));
    let crawler = Arc::new(ScriptedCrawler::with_delays(
        |url, _| CrawlResult::success(url, 200),
        delays,
    ));

    let config = DispatchConfig::builder()
        .max_session_permit(1)
        .fairness_timeout(Duration::from_millis(500))
        .base_delay(0.0, 0.0)
        .build()
        .expect("valid config");
    let dispatcher = MemoryAdaptiveDispatcher::new(config, Arc::new(NoOpObserver));

    let results = dispatcher
        .run(vec![blocker.clone(), waiter_a.clone(), waiter_b.clone()], crawler.clone(), ())
        .await
        .expect("run succeeds");

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.is_success()));

    let mut calls = crawler.calls();
    calls.sort_by_key(|c| c.at);
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].url, blocker);
    assert_eq!(calls[1].url, waiter_a);
    assert_eq!(calls[2].url, waiter_b);
}

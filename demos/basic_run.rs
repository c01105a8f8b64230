//! Minimal end-to-end wiring example for the dispatcher core.
//!
//! Usage: cargo run --example basic_run -- <url> [<url> ...]
//!
//! This crate has no opinion on how a URL is actually fetched; the
//! `Crawler` here is a toy stand-in that just sleeps briefly and reports
//! success, so the example can run with zero network dependencies. Swap it
//! for a real HTTP/browser-backed implementation to use this against the
//! live web.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use kodegen_crawl_dispatch::{CrawlResult, Crawler, DispatchConfig, Dispatcher, LoggingObserver, MemoryAdaptiveDispatcher};
use uuid::Uuid;

struct ToyCrawler;

impl Crawler<()> for ToyCrawler {
    fn run<'a>(
        &'a self,
        url: &'a str,
        _run_config: &'a (),
        session_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = CrawlResult> + Send + 'a>> {
        Box::pin(async move {
            log::info!("session {session_id}: fetching {url}");
            tokio::time::sleep(Duration::from_millis(100)).await;
            CrawlResult::success(url, 200)
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    let urls = if urls.is_empty() {
        vec![
            "https://example.com/a".to_string(),
            "https://example.com/b".to_string(),
            "https://example.org/c".to_string(),
        ]
    } else {
        urls
    };

    let config = DispatchConfig::builder()
        .max_session_permit(10)
        .base_delay(0.1, 0.3)
        .build()?;

    let dispatcher = MemoryAdaptiveDispatcher::new(config, Arc::new(LoggingObserver));
    let results = dispatcher.run(urls, Arc::new(ToyCrawler), ()).await?;

    for result in &results {
        log::info!(
            "{}: {} (retries={})",
            result.url,
            if result.is_success() { "ok" } else { "failed" },
            result.retry_count
        );
    }

    Ok(())
}

//! A scripted [`Crawler`] for integration tests: returns canned results and
//! records when each call happened, optionally after an artificial delay.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kodegen_crawl_dispatch::{CrawlResult, Crawler};
use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub at: Instant,
}

type Responder = dyn Fn(&str, u32) -> CrawlResult + Send + Sync;

#[derive(Clone)]
pub struct ScriptedCrawler {
    calls: Arc<Mutex<Vec<Call>>>,
    call_counts: Arc<Mutex<HashMap<String, u32>>>,
    responder: Arc<Responder>,
    delays: Arc<HashMap<String, Duration>>,
}

impl ScriptedCrawler {
    pub fn new(responder: impl Fn(&str, u32) -> CrawlResult + Send + Sync + 'static) -> Self {
        Self::with_delays(responder, HashMap::new())
    }

    pub fn with_delays(
        responder: impl Fn(&str, u32) -> CrawlResult + Send + Sync + 'static,
        delays: HashMap<String, Duration>,
    ) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            call_counts: Arc::new(Mutex::new(HashMap::new())),
            responder: Arc::new(responder),
            delays: Arc::new(delays),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    #[allow(dead_code)]
    pub fn call_count(&self, url: &str) -> u32 {
        *self.call_counts.lock().get(url).unwrap_or(&0)
    }
}

impl Crawler<()> for ScriptedCrawler {
    fn run<'a>(
        &'a self,
        url: &'a str,
        _run_config: &'a (),
        _session_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = CrawlResult> + Send + 'a>> {
        Box::pin(async move {
            if let Some(delay) = self.delays.get(url) {
                tokio::time::sleep(*delay).await;
            }

            self.calls.lock().push(Call {
                url: url.to_string(),
                at: Instant::now(),
            });

            let count = {
                let mut counts = self.call_counts.lock();
                let entry = counts.entry(url.to_string()).or_insert(0);
                *entry += 1;
                *entry
            };

            (self.responder)(url, count)
        })
    }
}

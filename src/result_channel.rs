//! Batch-or-stream delivery of terminal [`CrawlerTaskResult`]s.
//!
//! Both dispatchers push into the same kind of unbounded channel; `run`
//! drains it into a `Vec` and `run_stream` hands the receiving half back to
//! the caller as a `Stream`.

use std::pin::Pin;

use futures::channel::mpsc;
use futures::stream::Stream;

use crate::task::CrawlerTaskResult;

pub(crate) type ResultSender = mpsc::UnboundedSender<CrawlerTaskResult>;
pub(crate) type ResultStream = Pin<Box<dyn Stream<Item = CrawlerTaskResult> + Send>>;

pub(crate) fn channel() -> (ResultSender, ResultStream) {
    let (tx, rx) = mpsc::unbounded();
    (tx, Box::pin(rx))
}

//! Optional telemetry sink the dispatcher calls but does not depend on.
//!
//! A narrow set of lifecycle hooks with a no-op default implementation.
//! All calls must be non-blocking with respect to the scheduler; an
//! implementation that performs terminal rendering or I/O must buffer.

use uuid::Uuid;

use crate::memory_monitor::MemoryState;

/// A subset of fields updated on a task; unset fields are left `None`.
#[derive(Debug, Clone, Default)]
pub struct TaskFields {
    pub status: Option<crate::task::TaskStatus>,
    pub wait_time: Option<f64>,
    pub memory_usage: Option<f64>,
    pub peak_memory: Option<f64>,
    pub retry_count: Option<u32>,
    pub error_message: Option<String>,
}

/// Sink for task/queue/memory telemetry emitted by the scheduler.
pub trait TaskObserver: Send + Sync {
    /// A URL has been enqueued for the first time or requeued.
    fn task_added(&self, task_id: Uuid, url: &str) {
        let _ = (task_id, url);
    }

    /// One or more fields of a tracked task changed.
    fn task_updated(&self, task_id: Uuid, fields: &TaskFields) {
        let _ = (task_id, fields);
    }

    /// Periodic queue statistics from the fairness sweep.
    fn queue_stats_updated(&self, total_queued: usize, highest_wait_time: f64, avg_wait_time: f64) {
        let _ = (total_queued, highest_wait_time, avg_wait_time);
    }

    /// The memory monitor transitioned to a new state.
    fn memory_state_changed(&self, new_state: MemoryState) {
        let _ = new_state;
    }

    /// The dispatcher's `run`/`run_stream` call has started.
    fn run_started(&self) {}

    /// The dispatcher's `run`/`run_stream` call has finished.
    fn run_finished(&self) {}
}

/// An observer that does nothing; the default when the caller does not
/// need telemetry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl TaskObserver for NoOpObserver {}

/// An observer that forwards every call to the `log` facade.
///
/// Useful as a working example of the trait and as the default observer
/// for CLI-style callers that just want to see scheduling decisions go by.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl TaskObserver for LoggingObserver {
    fn task_added(&self, task_id: Uuid, url: &str) {
        log::debug!("task {task_id} queued: {url}");
    }

    fn task_updated(&self, task_id: Uuid, fields: &TaskFields) {
        if let Some(status) = fields.status {
            log::debug!("task {task_id} -> {status:?}");
        }
        if let Some(msg) = &fields.error_message {
            log::warn!("task {task_id}: {msg}");
        }
    }

    fn queue_stats_updated(&self, total_queued: usize, highest_wait_time: f64, avg_wait_time: f64) {
        log::debug!(
            "queue stats: total_queued={total_queued} highest_wait={highest_wait_time:.2}s avg_wait={avg_wait_time:.2}s"
        );
    }

    fn memory_state_changed(&self, new_state: MemoryState) {
        log::info!("memory state -> {new_state:?}");
    }

    fn run_started(&self) {
        log::info!("dispatcher run started");
    }

    fn run_finished(&self) {
        log::info!("dispatcher run finished");
    }
}

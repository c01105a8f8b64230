//! Host memory sampling and the NORMAL/PRESSURE/CRITICAL state machine.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use sysinfo::System;
use tokio::task::JoinHandle;

use crate::config::DispatchConfig;
use crate::observer::TaskObserver;

/// Memory pressure state of the host process, as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryState {
    Normal,
    Pressure,
    Critical,
}

impl MemoryState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Pressure => 1,
            Self::Critical => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Pressure,
            2 => Self::Critical,
            _ => Self::Normal,
        }
    }
}

/// Pluggable source of "percent of system memory used" samples.
///
/// Production code samples the real host via [`SysinfoSampler`]; tests use
/// [`ManualSampler`] to force arbitrary readings without depending on the
/// machine running the suite actually being under memory pressure.
pub trait MemorySampler: Send + Sync {
    fn sample_percent(&self) -> f64;
}

/// Samples real host memory via `sysinfo`.
pub struct SysinfoSampler {
    system: Mutex<System>,
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoSampler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new_all()),
        }
    }
}

impl MemorySampler for SysinfoSampler {
    fn sample_percent(&self) -> f64 {
        let mut system = self.system.lock();
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return 0.0;
        }
        (system.used_memory() as f64 / total as f64) * 100.0
    }
}

/// Best-effort resident memory of the current process, in megabytes.
///
/// Used by the dispatchers to compute per-task `memory_usage`/`peak_memory`,
/// which is unrelated to the host-wide percentage the [`MemoryState`]
/// machine tracks.
#[must_use]
pub fn current_process_memory_mb() -> f64 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0.0;
    };
    let system = System::new_all();
    system
        .process(pid)
        .map(|process| process.memory() as f64 / (1024.0 * 1024.0))
        .unwrap_or(0.0)
}

/// A sampler whose reading is set directly by the caller; used in tests to
/// force memory state transitions deterministically.
#[derive(Clone)]
pub struct ManualSampler {
    percent: Arc<AtomicU64Bits>,
}

/// `f64` has no native atomic; store its bit pattern in an `AtomicU64`.
struct AtomicU64Bits(std::sync::atomic::AtomicU64);

impl Default for ManualSampler {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl ManualSampler {
    #[must_use]
    pub fn new(initial_percent: f64) -> Self {
        Self {
            percent: Arc::new(AtomicU64Bits(std::sync::atomic::AtomicU64::new(
                initial_percent.to_bits(),
            ))),
        }
    }

    pub fn set(&self, percent: f64) {
        self.percent.0.store(percent.to_bits(), Ordering::SeqCst);
    }
}

impl MemorySampler for ManualSampler {
    fn sample_percent(&self) -> f64 {
        f64::from_bits(self.percent.0.load(Ordering::SeqCst))
    }
}

/// Samples memory at `check_interval` and maintains the NORMAL/PRESSURE/CRITICAL
/// state machine described in the crate docs, reporting transitions to the
/// observer. The monitor does not act on its own readings; the dispatcher
/// reads [`MemoryMonitor::state`].
pub struct MemoryMonitor {
    state: Arc<AtomicU8>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryMonitor {
    /// Spawn the background sampling task.
    pub fn spawn(
        config: &DispatchConfig,
        sampler: Arc<dyn MemorySampler>,
        observer: Arc<dyn TaskObserver>,
    ) -> Self {
        let state = Arc::new(AtomicU8::new(MemoryState::Normal.to_u8()));
        let loop_state = Arc::clone(&state);
        let memory_threshold = config.memory_threshold_percent();
        let critical_threshold = config.critical_threshold_percent();
        let recovery_threshold = config.recovery_threshold_percent();
        let interval = config.check_interval();

        let handle = tokio::spawn(async move {
            loop {
                let percent = sampler.sample_percent();
                let previous = MemoryState::from_u8(loop_state.load(Ordering::SeqCst));

                let next = if percent >= critical_threshold {
                    MemoryState::Critical
                } else if previous == MemoryState::Critical || previous == MemoryState::Pressure {
                    if percent <= recovery_threshold {
                        MemoryState::Normal
                    } else {
                        MemoryState::Pressure
                    }
                } else if percent >= memory_threshold {
                    MemoryState::Pressure
                } else {
                    MemoryState::Normal
                };

                if next != previous {
                    loop_state.store(next.to_u8(), Ordering::SeqCst);
                    observer.memory_state_changed(next);
                    log::info!("memory state {previous:?} -> {next:?} ({percent:.1}% used)");
                }

                tokio::time::sleep(interval).await;
            }
        });

        Self {
            state,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Current memory state, as last observed by the sampling task.
    #[must_use]
    pub fn state(&self) -> MemoryState {
        MemoryState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Stop the background sampling task.
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for MemoryMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Wall-clock budget enforcement.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use codeyard_types::{ExecutionError, RunId};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::host::KillSwitch;
use crate::settlement::{Outcome, Settlement};

/// Arms one timer per run.
#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    budget: Duration,
}

impl Watchdog {
    /// Create a watchdog with the given budget.
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    /// The configured budget.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Start the timer for a run.
    ///
    /// When the budget elapses first, the run is settled as a timeout and
    /// the context is killed. Must be called inside a Tokio runtime.
    pub fn arm(&self, run_id: RunId, settlement: Arc<Settlement>, kill: KillSwitch) -> WatchdogGuard {
        let budget = self.budget;
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            if settlement.settle(Outcome::Failed(ExecutionError::timeout(budget))) {
                warn!(
                    run_id = %run_id,
                    budget_ms = budget.as_millis() as u64,
                    "Execution budget exceeded, terminating context"
                );
                flag.store(true, Ordering::Release);
            }
            kill.trip();
        });

        WatchdogGuard {
            task: Some(task),
            fired,
        }
    }
}

/// Handle to an armed timer. Dropping it disarms the timer.
#[derive(Debug)]
pub struct WatchdogGuard {
    task: Option<JoinHandle<()>>,
    fired: Arc<AtomicBool>,
}

impl WatchdogGuard {
    /// Cancel the timer. Safe to call more than once.
    pub fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Whether the timer settled the run as a timeout.
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

impl Drop for WatchdogGuard {
    fn drop(&mut self) {
        self.disarm();
    }
}

//! First-writer-wins resolution of a run.
//!
//! A run can be settled by the listener (error or ready), the watchdog
//! (timeout), a stop request, or a failure to start the context. Whoever
//! gets there first decides the outcome; every later attempt is a no-op.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use codeyard_types::ExecutionError;
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The guest signalled ready without a prior error.
    Completed,
    /// Error, timeout, or stop.
    Failed(ExecutionError),
}

impl Outcome {
    /// Whether the run succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

/// Shared settle-once cell for one run.
#[derive(Debug)]
pub struct Settlement {
    settled: AtomicBool,
    tx: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl Settlement {
    /// Create a cell and the receiver its outcome is delivered to.
    pub fn new() -> (Arc<Self>, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let settlement = Arc::new(Self {
            settled: AtomicBool::new(false),
            tx: Mutex::new(Some(tx)),
        });
        (settlement, rx)
    }

    /// Settle with `outcome`. Returns `true` if this call won.
    pub fn settle(&self, outcome: Outcome) -> bool {
        if self
            .settled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if let Some(tx) = self.tx.lock().take() {
            // The receiver may be gone if the run was abandoned.
            let _ = tx.send(outcome);
        }
        true
    }

    /// Whether an outcome was already chosen.
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }
}

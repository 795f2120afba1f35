//! Timer bookkeeping for the guest event loop.
//!
//! Only deadlines live here. Callbacks and arguments stay on the JS side,
//! keyed by the same id.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// Longest delay honoured, matching the 32-bit limit browsers apply.
pub(crate) const MAX_DELAY_MS: f64 = i32::MAX as f64;

/// Pending timers ordered by deadline, then by scheduling order.
#[derive(Debug, Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<Reverse<(Instant, u64, i32)>>,
    seq: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Schedule `id` to fire after `delay`.
    pub(crate) fn schedule(&mut self, id: i32, delay: Duration) {
        self.seq += 1;
        self.heap
            .push(Reverse((Instant::now() + delay, self.seq, id)));
    }

    /// Forget every pending deadline for `id`.
    pub(crate) fn cancel(&mut self, id: i32) {
        self.heap.retain(|Reverse((_, _, timer))| *timer != id);
    }

    /// Earliest pending deadline.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse((deadline, _, _))| *deadline)
    }

    /// Remove and return the ids due at `now`, earliest first.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Vec<i32> {
        let mut due = Vec::new();
        while let Some(Reverse((deadline, _, id))) = self.heap.peek().copied() {
            if deadline > now {
                break;
            }
            self.heap.pop();
            due.push(id);
        }
        due
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Convert a delay passed from JS into a duration.
///
/// Negative, NaN and infinite values become zero.
pub(crate) fn delay_from_js(delay_ms: f64) -> Duration {
    if delay_ms.is_finite() && delay_ms > 0.0 {
        Duration::from_millis(delay_ms.min(MAX_DELAY_MS) as u64)
    } else {
        Duration::ZERO
    }
}

//! State of one execution while it is in flight.

use codeyard_types::{ConsoleEvent, ExecutionResult, RunId, SourceBundle, Timestamp};

use crate::settlement::Outcome;

/// One execution attempt.
///
/// Owns the console events captured so far. Consumed by
/// [`into_result`](Self::into_result) once the run is settled.
#[derive(Debug, Clone)]
pub struct ExecutionRun {
    /// Unique identifier.
    pub id: RunId,
    /// Source being executed.
    pub bundle: SourceBundle,
    /// When the run was created.
    pub started_at: Timestamp,
    events: Vec<ConsoleEvent>,
    dropped: usize,
}

impl ExecutionRun {
    /// Start tracking a run for `bundle`.
    pub fn new(bundle: SourceBundle) -> Self {
        Self {
            id: RunId::new(),
            bundle,
            started_at: codeyard_types::now(),
            events: Vec::new(),
            dropped: 0,
        }
    }

    /// Append an event, or count it as dropped once `limit` is reached.
    /// Returns `true` if the event was kept.
    pub fn record(&mut self, event: ConsoleEvent, limit: usize) -> bool {
        if self.events.len() < limit {
            self.events.push(event);
            true
        } else {
            self.dropped += 1;
            false
        }
    }

    /// Events captured so far, in arrival order.
    pub fn events(&self) -> &[ConsoleEvent] {
        &self.events
    }

    /// Events that arrived after the cap.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Build the final result.
    pub fn into_result(self, outcome: Outcome) -> ExecutionResult {
        let result = match outcome {
            Outcome::Completed => ExecutionResult::succeeded(self.events),
            Outcome::Failed(error) => ExecutionResult::failed(error, self.events),
        };
        result.with_dropped(self.dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeyard_types::{ConsoleLevel, ErrorKind, ExecutionError};

    #[test]
    fn test_record_respects_limit() {
        let mut run = ExecutionRun::new(SourceBundle::default());
        assert!(run.record(ConsoleEvent::new(ConsoleLevel::Log, "1"), 2));
        assert!(run.record(ConsoleEvent::new(ConsoleLevel::Log, "2"), 2));
        assert!(!run.record(ConsoleEvent::new(ConsoleLevel::Log, "3"), 2));

        assert_eq!(run.events().len(), 2);
        assert_eq!(run.dropped(), 1);
    }

    #[test]
    fn test_into_result_success() {
        let mut run = ExecutionRun::new(SourceBundle::script_only("1"));
        run.record(ConsoleEvent::new(ConsoleLevel::Info, "hi"), 10);

        let result = run.into_result(Outcome::Completed);
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.messages(), vec!["hi"]);
    }

    #[test]
    fn test_into_result_failure_keeps_events() {
        let mut run = ExecutionRun::new(SourceBundle::default());
        run.record(ConsoleEvent::new(ConsoleLevel::Log, "before"), 1);
        run.record(ConsoleEvent::new(ConsoleLevel::Log, "after"), 1);

        let result = run.into_result(Outcome::Failed(ExecutionError::runtime("boom")));
        assert!(!result.success);
        assert_eq!(result.error_kind(), Some(ErrorKind::Runtime));
        assert_eq!(result.messages(), vec!["before"]);
        assert_eq!(result.dropped_console_events, 1);
    }
}

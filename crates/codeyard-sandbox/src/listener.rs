//! Host-side handling of guest messages for one run.

use std::fmt;
use std::sync::Arc;

use codeyard_types::{ConsoleEvent, ExecutionError, ExecutionResult, GuestMessage};
use tracing::{debug, trace, warn};

use crate::channel::{Envelope, Subscription};
use crate::run::ExecutionRun;
use crate::settlement::{Outcome, Settlement};

/// Callback invoked for every console event as it arrives, including
/// events past the buffer cap.
pub type ConsoleSubscriber = Arc<dyn Fn(&ConsoleEvent) + Send + Sync>;

/// Turns raw envelopes into console events and settlement attempts.
pub struct MessageListener {
    run: ExecutionRun,
    settlement: Arc<Settlement>,
    subscriber: Option<ConsoleSubscriber>,
    max_events: usize,
}

impl fmt::Debug for MessageListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageListener")
            .field("run_id", &self.run.id)
            .field("events", &self.run.events().len())
            .field("settled", &self.settlement.is_settled())
            .finish_non_exhaustive()
    }
}

impl MessageListener {
    /// Create a listener for `run`.
    pub fn new(run: ExecutionRun, settlement: Arc<Settlement>, max_events: usize) -> Self {
        Self {
            run,
            settlement,
            subscriber: None,
            max_events,
        }
    }

    /// Forward each console event to `subscriber` as it arrives.
    pub fn with_subscriber(mut self, subscriber: Option<ConsoleSubscriber>) -> Self {
        self.subscriber = subscriber;
        self
    }

    /// The run being listened to.
    pub fn run(&self) -> &ExecutionRun {
        &self.run
    }

    /// Handle one envelope.
    pub fn handle(&mut self, envelope: Envelope) {
        if envelope.run_id != self.run.id {
            warn!(
                run_id = %self.run.id,
                origin = %envelope.run_id,
                "Dropping message from another run"
            );
            return;
        }

        let Some(message) = GuestMessage::parse(&envelope.payload) else {
            trace!(run_id = %self.run.id, payload = %envelope.payload, "Ignoring unrecognised guest message");
            return;
        };
        trace!(run_id = %self.run.id, kind = message.kind(), "Guest message");

        match message {
            GuestMessage::Console { level, args } => {
                self.push_console(ConsoleEvent::from_args(level, &args));
            }
            GuestMessage::Error {
                message,
                stack,
                line_number,
            } => {
                let error = ExecutionError::runtime(message)
                    .with_stack(stack)
                    .with_line(line_number);
                if self.settlement.settle(Outcome::Failed(error)) {
                    debug!(run_id = %self.run.id, "Run settled by guest error");
                }
            }
            GuestMessage::Ready => {
                if self.settlement.settle(Outcome::Completed) {
                    debug!(run_id = %self.run.id, "Run settled by ready signal");
                }
            }
        }
    }

    /// Drain console messages already queued, then stop listening.
    ///
    /// Errors and ready signals found here lose to the existing settlement
    /// and are ignored.
    pub fn flush(&mut self, subscription: &mut Subscription) {
        while let Some(envelope) = subscription.try_recv() {
            if envelope.run_id != self.run.id {
                continue;
            }
            if let Some(GuestMessage::Console { level, args }) =
                GuestMessage::parse(&envelope.payload)
            {
                self.push_console(ConsoleEvent::from_args(level, &args));
            }
        }
        subscription.close();
    }

    /// Build the final result.
    pub fn into_result(self, outcome: Outcome) -> ExecutionResult {
        self.run.into_result(outcome)
    }

    fn push_console(&mut self, event: ConsoleEvent) {
        if let Some(subscriber) = &self.subscriber {
            subscriber(&event);
        }
        trace!(
            target: "codeyard_sandbox::guest",
            run_id = %self.run.id,
            level = %event.level,
            "{}",
            event.message
        );
        if !self.run.record(event, self.max_events) && self.run.dropped() == 1 {
            warn!(
                run_id = %self.run.id,
                limit = self.max_events,
                "Console buffer full, further events are counted but not kept"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;
    use codeyard_types::{ConsoleLevel, ErrorKind, RunId, SourceBundle};
    use parking_lot::Mutex;

    fn listener(max_events: usize) -> (MessageListener, tokio::sync::oneshot::Receiver<Outcome>) {
        let (settlement, rx) = Settlement::new();
        let run = ExecutionRun::new(SourceBundle::default());
        (MessageListener::new(run, settlement, max_events), rx)
    }

    fn envelope(listener: &MessageListener, payload: &str) -> Envelope {
        Envelope::new(listener.run().id, payload)
    }

    #[tokio::test]
    async fn test_console_then_error() {
        let (mut l, rx) = listener(10);
        l.handle(envelope(&l, r#"{"type":"console","level":"log","args":["a","b"]}"#));
        l.handle(envelope(
            &l,
            r#"{"type":"error","message":"boom","stack":"at x","lineNumber":3}"#,
        ));
        l.handle(envelope(&l, r#"{"type":"ready"}"#));

        let outcome = rx.await.unwrap();
        let result = l.into_result(outcome);
        assert!(!result.success);
        let error = result.error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::Runtime);
        assert_eq!(error.message, "boom");
        assert_eq!(error.stack.as_deref(), Some("at x"));
        assert_eq!(error.line, Some(3));
        assert_eq!(result.messages(), vec!["a b"]);
    }

    #[tokio::test]
    async fn test_ready_settles_success() {
        let (mut l, rx) = listener(10);
        l.handle(envelope(&l, r#"{"type":"ready"}"#));
        l.handle(envelope(&l, r#"{"type":"error","message":"late"}"#));

        let result = l.into_result(rx.await.unwrap());
        assert!(result.success);
        assert!(result.console_events.is_empty());
    }

    #[tokio::test]
    async fn test_ignores_foreign_and_malformed() {
        let (mut l, _rx) = listener(10);
        l.handle(Envelope::new(RunId::new(), r#"{"type":"ready"}"#));
        l.handle(envelope(&l, r#"{"type":"navigate"}"#));
        l.handle(envelope(&l, "garbage"));
        l.handle(envelope(&l, r#"{"type":"console","level":"debug","args":[]}"#));

        assert!(!l.settlement.is_settled());
        assert!(l.run().events().is_empty());
    }

    #[test]
    fn test_cap_counts_dropped_and_notifies_all() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscriber: ConsoleSubscriber = Arc::new(move |event: &ConsoleEvent| {
            sink.lock().push(event.message.clone());
        });

        let (l, _rx) = listener(2);
        let mut l = l.with_subscriber(Some(subscriber));
        for i in 0..5 {
            let payload = format!(r#"{{"type":"console","level":"info","args":["{i}"]}}"#);
            l.handle(envelope(&l, &payload));
        }

        assert_eq!(l.run().events().len(), 2);
        assert_eq!(l.run().dropped(), 3);
        assert_eq!(seen.lock().len(), 5);
        assert_eq!(l.run().events()[0].level, ConsoleLevel::Info);
    }

    #[test]
    fn test_flush_keeps_console_only() {
        let (mut l, _rx) = listener(10);
        let (sink, mut sub) = channel::open(l.run().id, 8);
        std::thread::spawn(move || {
            sink.post(r#"{"type":"console","level":"warn","args":["late"]}"#);
            sink.post(r#"{"type":"error","message":"ignored"}"#);
        })
        .join()
        .unwrap();

        l.flush(&mut sub);
        assert!(sub.is_closed());
        assert_eq!(l.run().events().len(), 1);
        assert_eq!(l.run().events()[0].message, "late");
        assert!(!l.settlement.is_settled());
    }
}

//! Per-run message channel between an isolated context and the host.
//!
//! The guest side holds a [`MessageSink`] and posts raw payloads from its
//! own thread. The host side holds the [`Subscription`]. Every envelope is
//! tagged with the run it belongs to, so a listener can ignore traffic that
//! is not addressed to it.

use codeyard_types::RunId;
use tokio::sync::mpsc;

/// One raw message from a guest, tagged with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Run whose context posted the message.
    pub run_id: RunId,
    /// Raw payload as posted by guest code.
    pub payload: String,
}

impl Envelope {
    /// Create a new envelope.
    pub fn new(run_id: RunId, payload: impl Into<String>) -> Self {
        Self {
            run_id,
            payload: payload.into(),
        }
    }
}

/// Open a bounded channel for one run.
pub fn open(run_id: RunId, capacity: usize) -> (MessageSink, Subscription) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (MessageSink { run_id, tx }, Subscription { rx, closed: false })
}

/// Guest-side end of the channel.
///
/// `post` blocks the calling thread while the channel is full, so it must
/// only be called from the context thread, never from an async task.
#[derive(Debug, Clone)]
pub struct MessageSink {
    run_id: RunId,
    tx: mpsc::Sender<Envelope>,
}

impl MessageSink {
    /// Run this sink posts for.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Post a payload. Returns `false` once the host stopped listening.
    pub fn post(&self, payload: impl Into<String>) -> bool {
        self.tx
            .blocking_send(Envelope::new(self.run_id, payload))
            .is_ok()
    }

    /// Whether the host side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Host-side end of the channel.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<Envelope>,
    closed: bool,
}

impl Subscription {
    /// Wait for the next envelope. `None` once every sink is dropped.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Take an envelope that is already queued.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting messages. Pending posts fail and a guest blocked on a
    /// full channel is released. Calling it again does nothing.
    pub fn close(&mut self) {
        if !self.closed {
            self.rx.close();
            self.closed = true;
        }
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_post_and_receive() {
        let run_id = RunId::new();
        let (sink, mut sub) = open(run_id, 4);

        let poster = std::thread::spawn(move || sink.post(r#"{"type":"ready"}"#));
        assert!(poster.join().unwrap());

        let envelope = sub.recv().await.unwrap();
        assert_eq!(envelope.run_id, run_id);
        assert_eq!(envelope.payload, r#"{"type":"ready"}"#);
    }

    #[tokio::test]
    async fn test_recv_ends_when_sinks_drop() {
        let (sink, mut sub) = open(RunId::new(), 1);
        drop(sink);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_releases_blocked_guest() {
        let (sink, mut sub) = open(RunId::new(), 1);
        let poster = std::thread::spawn(move || {
            let first = sink.post("a");
            // Channel is full now; this blocks until the host closes.
            let second = sink.post("b");
            (first, second)
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        sub.close();
        sub.close();

        let (first, second) = poster.join().unwrap();
        assert!(first);
        assert!(!second);
        assert!(sub.is_closed());
    }

    #[test]
    fn test_try_recv_empty() {
        let (_sink, mut sub) = open(RunId::new(), 2);
        assert!(sub.try_recv().is_none());
    }
}

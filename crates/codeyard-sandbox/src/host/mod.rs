//! Isolated contexts.
//!
//! Each run gets a fresh QuickJS runtime on its own OS thread. Nothing is
//! shared between runs: no globals, no storage, no timers. The host side
//! only sees what guest code posts through the run's
//! [`MessageSink`](crate::channel::MessageSink).
//!
//! Termination is cooperative from the host's point of view and forced from
//! the guest's: tripping the [`KillSwitch`] makes the QuickJS interrupt
//! handler abort whatever script is running, and wakes the guest loop if it
//! is waiting for a timer.

mod environment;
mod guest;
pub mod markup;
mod timers;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use codeyard_types::RunId;
use parking_lot::{Condvar, Mutex};
use tokio::sync::{oneshot, watch};
use tracing::debug;

use crate::channel::MessageSink;
use crate::config::SandboxConfig;
use crate::error::{SandboxError, SandboxResult};

/// Smallest OS stack given to a context thread.
const MIN_THREAD_STACK: usize = 4 * 1024 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Kill switch
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct KillState {
    tripped: AtomicBool,
    lock: Mutex<()>,
    cv: Condvar,
}

/// One-way stop signal shared by the host, the watchdog and a context.
#[derive(Clone, Default)]
pub struct KillSwitch {
    state: Arc<KillState>,
}

impl fmt::Debug for KillSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KillSwitch")
            .field("tripped", &self.is_tripped())
            .finish()
    }
}

impl KillSwitch {
    /// Create an untripped switch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the switch. Later calls do nothing.
    pub fn trip(&self) {
        if !self.state.tripped.swap(true, Ordering::AcqRel) {
            let _guard = self.state.lock.lock();
            self.state.cv.notify_all();
        }
    }

    /// Whether the switch was tripped.
    pub fn is_tripped(&self) -> bool {
        self.state.tripped.load(Ordering::Acquire)
    }

    /// Block the calling thread for up to `timeout`. Returns `true` if the
    /// switch is tripped on return.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut guard = self.state.lock.lock();
        if self.is_tripped() {
            return true;
        }
        self.state.cv.wait_for(&mut guard, timeout);
        self.is_tripped()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Host
// ─────────────────────────────────────────────────────────────────────────────

/// Resource limits applied to every context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    pub memory_limit_bytes: usize,
    pub max_stack_bytes: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self::from(&SandboxConfig::default())
    }
}

impl From<&SandboxConfig> for ContextLimits {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            memory_limit_bytes: config.memory_limit_bytes,
            max_stack_bytes: config.max_stack_bytes,
        }
    }
}

impl ContextLimits {
    fn thread_stack_size(&self) -> usize {
        self.max_stack_bytes.saturating_mul(4).max(MIN_THREAD_STACK)
    }
}

/// Creates isolated contexts and tracks how many are alive.
#[derive(Debug, Clone)]
pub struct IsolationHost {
    limits: ContextLimits,
    live: Arc<AtomicUsize>,
}

impl IsolationHost {
    /// Create a host that applies `limits` to each context.
    pub fn new(limits: ContextLimits) -> Self {
        Self {
            limits,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Contexts whose thread has not exited yet.
    pub fn live_contexts(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Start a context that loads `document` and posts through `sink`.
    ///
    /// Returns once the context is created and about to evaluate scripts.
    /// The context exits on its own when it goes idle, or when `kill` trips.
    pub async fn start(
        &self,
        run_id: RunId,
        document: String,
        sink: MessageSink,
        kill: KillSwitch,
    ) -> SandboxResult<ContextHandle> {
        let (started_tx, started_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = watch::channel(false);
        let live = LiveGuard::enter(self.live.clone(), exited_tx);

        let setup = guest::GuestSetup {
            run_id,
            document,
            limits: self.limits,
            sink,
            kill: kill.clone(),
        };

        std::thread::Builder::new()
            .name(format!("codeyard-run-{}", run_id.short()))
            .stack_size(self.limits.thread_stack_size())
            .spawn(move || {
                let _live = live;
                guest::run_guest(setup, started_tx);
            })?;

        let failure = match started_rx.await {
            Ok(Ok(())) => {
                debug!(run_id = %run_id, "Context started");
                return Ok(ContextHandle {
                    run_id,
                    kill,
                    exited: exited_rx,
                });
            }
            Ok(Err(message)) => message,
            Err(_) => "context thread exited during startup".to_string(),
        };

        // The thread returns right after reporting failure; wait so the
        // live count is accurate once the error is seen.
        let mut exited = exited_rx;
        let _ = exited.wait_for(|done| *done).await;
        Err(SandboxError::ContextCreation(failure))
    }
}

/// Counts a context as live until its thread finishes.
struct LiveGuard {
    live: Arc<AtomicUsize>,
    exited: watch::Sender<bool>,
}

impl LiveGuard {
    fn enter(live: Arc<AtomicUsize>, exited: watch::Sender<bool>) -> Self {
        live.fetch_add(1, Ordering::AcqRel);
        Self { live, exited }
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        self.exited.send_replace(true);
    }
}

/// Host-side handle to a running context.
#[derive(Debug)]
pub struct ContextHandle {
    run_id: RunId,
    kill: KillSwitch,
    exited: watch::Receiver<bool>,
}

impl ContextHandle {
    /// Run this context belongs to.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Ask the context to stop. Safe to call more than once.
    pub fn stop(&self) {
        self.kill.trip();
    }

    /// Whether the context thread has exited.
    pub fn is_closed(&self) -> bool {
        *self.exited.borrow()
    }

    /// Wait for the context thread to exit.
    pub async fn closed(&self) {
        let mut exited = self.exited.clone();
        // An error means the sender is gone, which also means the thread exited.
        let _ = exited.wait_for(|done| *done).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;

    #[test]
    fn test_kill_switch_wakes_waiter() {
        let kill = KillSwitch::new();
        let waiter = kill.clone();
        let handle = std::thread::spawn(move || waiter.wait_timeout(Duration::from_secs(10)));

        std::thread::sleep(Duration::from_millis(20));
        kill.trip();
        kill.trip();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_wait_timeout_expires() {
        let kill = KillSwitch::new();
        assert!(!kill.wait_timeout(Duration::from_millis(10)));
        assert!(!kill.is_tripped());
    }

    #[tokio::test]
    async fn test_context_exits_when_idle() {
        let host = IsolationHost::new(ContextLimits::default());
        let run_id = RunId::new();
        let (sink, mut subscription) = channel::open(run_id, 8);

        let handle = host
            .start(
                run_id,
                "<script>parent.postMessage({type:'ready'}, '*')</script>".into(),
                sink,
                KillSwitch::new(),
            )
            .await
            .unwrap();

        let envelope = subscription.recv().await.unwrap();
        assert_eq!(envelope.payload, r#"{"type":"ready"}"#);

        handle.closed().await;
        assert!(handle.is_closed());
        assert_eq!(host.live_contexts(), 0);
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_terminates_busy_context() {
        let host = IsolationHost::new(ContextLimits::default());
        let run_id = RunId::new();
        let (sink, _subscription) = channel::open(run_id, 8);

        let handle = host
            .start(run_id, "<script>for (;;) {}</script>".into(), sink, KillSwitch::new())
            .await
            .unwrap();
        assert_eq!(handle.run_id(), run_id);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(host.live_contexts(), 1);

        handle.stop();
        tokio::time::timeout(Duration::from_secs(5), handle.closed())
            .await
            .unwrap();
        assert_eq!(host.live_contexts(), 0);
    }

    #[tokio::test]
    async fn test_start_failure_leaves_no_live_context() {
        let host = IsolationHost::new(ContextLimits {
            memory_limit_bytes: 16 * 1024,
            max_stack_bytes: 256 * 1024,
        });
        let run_id = RunId::new();
        let (sink, _subscription) = channel::open(run_id, 8);

        let err = host
            .start(run_id, "<script></script>".into(), sink, KillSwitch::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::ContextCreation(_)));
        assert!(err.to_string().starts_with("Failed to create isolated context"));
        assert_eq!(host.live_contexts(), 0);
    }

    #[test]
    fn test_thread_stack_covers_js_stack() {
        let limits = ContextLimits {
            memory_limit_bytes: 1,
            max_stack_bytes: 8 * 1024 * 1024,
        };
        assert_eq!(limits.thread_stack_size(), 32 * 1024 * 1024);
        assert_eq!(ContextLimits::default().thread_stack_size(), MIN_THREAD_STACK);
    }
}

//! Run coordination.
//!
//! A run goes through these steps:
//!
//! ```text
//! allocate id → assemble → arm watchdog → start context
//!     → await settlement (listener | watchdog | stop | start failure)
//!     → stop context → disarm watchdog → flush console → result
//! ```
//!
//! Every run owns its channel, so concurrent runs never see each other's
//! messages. A semaphore caps how many contexts exist at once; runs beyond
//! the cap wait for a slot before their budget starts.

use std::sync::Arc;
use std::time::Duration;

use codeyard_config::SandboxSection;
use codeyard_types::{ExecutionError, ExecutionResult, RunId, SourceBundle};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::assembler::{self, AssemblyOptions};
use crate::channel;
use crate::config::SandboxConfig;
use crate::error::SandboxError;
use crate::host::{ContextLimits, IsolationHost, KillSwitch};
use crate::listener::{ConsoleSubscriber, MessageListener};
use crate::run::ExecutionRun;
use crate::settlement::{Outcome, Settlement};
use crate::syntax;
use crate::watchdog::Watchdog;

/// Message of the runtime error reported for a stopped run.
pub const STOPPED_MESSAGE: &str = "execution stopped";

/// Message used when a context goes away without settling its run.
pub const EXITED_MESSAGE: &str = "isolated context exited before signalling completion";

/// How long to wait for a context thread after it was told to stop.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Runs learner snippets in isolated contexts.
///
/// Cheap to clone; clones share the concurrency limit and the live
/// context count.
#[derive(Debug, Clone)]
pub struct RunCoordinator {
    config: SandboxConfig,
    host: IsolationHost,
    watchdog: Watchdog,
    permits: Arc<Semaphore>,
}

impl Default for RunCoordinator {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

impl RunCoordinator {
    /// Create a coordinator.
    ///
    /// A ready delay that is not shorter than the budget would turn every
    /// run into a timeout, so it is lowered to half the budget.
    pub fn new(mut config: SandboxConfig) -> Self {
        if config.ready_delay >= config.budget {
            let clamped = config.budget / 2;
            warn!(
                ready_delay_ms = config.ready_delay.as_millis() as u64,
                budget_ms = config.budget_ms() as u64,
                clamped_ms = clamped.as_millis() as u64,
                "Ready delay must be shorter than the budget, clamping"
            );
            config.ready_delay = clamped;
        }
        let host = IsolationHost::new(ContextLimits::from(&config));
        let watchdog = Watchdog::new(config.budget);
        let permits = Arc::new(Semaphore::new(config.max_concurrent_runs.max(1)));
        Self {
            config,
            host,
            watchdog,
            permits,
        }
    }

    /// Create a coordinator from the `[sandbox]` config section.
    pub fn from_section(section: &SandboxSection) -> Self {
        Self::new(SandboxConfig::from(section))
    }

    /// The active configuration.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Stop accepting runs. Runs still waiting for a slot, and any run
    /// submitted later, resolve as runtime errors; runs already executing
    /// finish normally. Affects every clone of this coordinator.
    pub fn close(&self) {
        if !self.permits.is_closed() {
            info!("Run coordinator closed");
            self.permits.close();
        }
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Isolated contexts currently alive.
    pub fn live_contexts(&self) -> usize {
        self.host.live_contexts()
    }

    /// Static syntax pre-check. Never starts an isolated context.
    pub fn detect_syntax_errors(&self, script: &str) -> Option<ExecutionError> {
        syntax::detect_syntax_errors(script)
    }

    /// Execute `bundle` and wait for its result.
    ///
    /// Always resolves, exactly once, within roughly the configured budget
    /// once a slot is free. Failures of the snippet and of the sandbox
    /// itself both come back as a failed [`ExecutionResult`].
    pub async fn run(
        &self,
        bundle: SourceBundle,
        on_console: Option<ConsoleSubscriber>,
    ) -> ExecutionResult {
        self.spawn(bundle, on_console).wait().await
    }

    /// Start executing `bundle` in the background.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn spawn(&self, bundle: SourceBundle, on_console: Option<ConsoleSubscriber>) -> RunTicket {
        let run = ExecutionRun::new(bundle);
        let run_id = run.id;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.clone().drive(run, on_console, cancel.clone()));

        RunTicket {
            run_id,
            cancel,
            task,
        }
    }

    async fn drive(
        self,
        run: ExecutionRun,
        on_console: Option<ConsoleSubscriber>,
        cancel: CancellationToken,
    ) -> ExecutionResult {
        let run_id = run.id;

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(run_id = %run_id, "Run stopped while waiting for a slot");
                return run.into_result(Outcome::Failed(ExecutionError::runtime(STOPPED_MESSAGE)));
            }
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    debug!(run_id = %run_id, "Run rejected by closed coordinator");
                    let message = SandboxError::Closed.to_string();
                    return run.into_result(Outcome::Failed(ExecutionError::runtime(message)));
                }
            },
        };

        let document = assembler::assemble_with(
            &run.bundle,
            &AssemblyOptions {
                ready_delay: self.config.ready_delay,
            },
        );

        let (settlement, mut settled) = Settlement::new();
        let kill = KillSwitch::new();
        let (sink, mut subscription) = channel::open(run_id, self.config.channel_capacity);
        let mut listener = MessageListener::new(run, settlement.clone(), self.config.max_console_events)
            .with_subscriber(on_console);

        let mut watchdog = self.watchdog.arm(run_id, settlement.clone(), kill.clone());
        info!(
            run_id = %run_id,
            budget_ms = self.config.budget_ms() as u64,
            document_bytes = document.len(),
            "Run started"
        );

        let handle = match self.host.start(run_id, document, sink, kill.clone()).await {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "Isolated context failed to start");
                settlement.settle(Outcome::Failed(ExecutionError::runtime(err.to_string())));
                None
            }
        };

        let outcome = loop {
            tokio::select! {
                biased;
                outcome = &mut settled => {
                    break outcome.unwrap_or_else(|_| {
                        Outcome::Failed(ExecutionError::runtime("run settled without an outcome"))
                    });
                }
                _ = cancel.cancelled() => {
                    if settlement.settle(Outcome::Failed(ExecutionError::runtime(STOPPED_MESSAGE))) {
                        debug!(run_id = %run_id, "Run stopped by caller");
                    }
                }
                envelope = subscription.recv() => match envelope {
                    Some(envelope) => listener.handle(envelope),
                    None => {
                        settlement.settle(Outcome::Failed(ExecutionError::runtime(EXITED_MESSAGE)));
                    }
                },
            }
        };

        debug!(run_id = %run_id, success = outcome.is_success(), "Run settled");
        kill.trip();
        watchdog.disarm();
        listener.flush(&mut subscription);

        if let Some(handle) = handle
            && tokio::time::timeout(CLOSE_GRACE, handle.closed()).await.is_err()
        {
            warn!(run_id = %run_id, "Isolated context still running after stop");
        }

        let timed_out = watchdog.fired();
        let result = listener.into_result(outcome);
        info!(
            run_id = %run_id,
            success = result.success,
            error_kind = ?result.error_kind(),
            timed_out,
            console_events = result.console_events.len(),
            dropped = result.dropped_console_events,
            "Run finished"
        );
        result
    }
}

/// Handle to a run started with [`RunCoordinator::spawn`].
#[derive(Debug)]
pub struct RunTicket {
    run_id: RunId,
    cancel: CancellationToken,
    task: JoinHandle<ExecutionResult>,
}

impl RunTicket {
    /// Identifier of the run.
    pub fn id(&self) -> RunId {
        self.run_id
    }

    /// Terminate the run early. It settles as a runtime error unless it
    /// already settled. Safe to call more than once.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the result is available.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the result.
    pub async fn wait(self) -> ExecutionResult {
        match self.task.await {
            Ok(result) => result,
            Err(err) => {
                error!(run_id = %self.run_id, error = %err, "Run task failed");
                ExecutionResult::failed(
                    ExecutionError::runtime(format!("run task failed: {err}")),
                    Vec::new(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeyard_types::ErrorKind;

    fn quick_config() -> SandboxConfig {
        SandboxConfig::new()
            .with_budget(Duration::from_millis(1500))
            .with_ready_delay(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_quiet_script_succeeds() {
        let coordinator = RunCoordinator::new(quick_config());
        let result = coordinator
            .run(SourceBundle::script_only("var x = 1 + 1;"), None)
            .await;

        assert!(result.success, "{:?}", result.error);
        assert!(result.console_events.is_empty());
        assert_eq!(coordinator.live_contexts(), 0);
    }

    #[tokio::test]
    async fn test_stop_before_settlement() {
        let coordinator = RunCoordinator::new(quick_config());
        let ticket = coordinator.spawn(SourceBundle::script_only("while (true) {}"), None);

        tokio::time::sleep(Duration::from_millis(100)).await;
        ticket.stop();
        ticket.stop();
        let result = ticket.wait().await;

        assert!(!result.success);
        assert_eq!(result.error_kind(), Some(ErrorKind::Runtime));
        assert_eq!(result.error.unwrap().message, STOPPED_MESSAGE);
        assert_eq!(coordinator.live_contexts(), 0);
    }

    #[tokio::test]
    async fn test_syntax_check_does_not_start_context() {
        let coordinator = RunCoordinator::default();
        assert!(coordinator.detect_syntax_errors("function(").is_some());
        assert_eq!(coordinator.live_contexts(), 0);
    }

    #[tokio::test]
    async fn test_closed_coordinator_rejects_runs() {
        let coordinator = RunCoordinator::new(quick_config());
        let other = coordinator.clone();
        coordinator.close();
        coordinator.close();
        assert!(other.is_closed());

        let result = other.run(SourceBundle::script_only("console.log(1)"), None).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::Runtime));
        assert_eq!(result.error.unwrap().message, SandboxError::Closed.to_string());
        assert!(result.console_events.is_empty());
        assert_eq!(coordinator.live_contexts(), 0);
    }

    #[tokio::test]
    async fn test_close_releases_queued_run() {
        let coordinator = RunCoordinator::new(
            quick_config()
                .with_budget(Duration::from_millis(400))
                .with_max_concurrent_runs(1),
        );
        let busy = coordinator.spawn(SourceBundle::script_only("while (true) {}"), None);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let queued = coordinator.spawn(SourceBundle::script_only("console.log(1)"), None);
        tokio::time::sleep(Duration::from_millis(20)).await;

        coordinator.close();
        let queued = queued.wait().await;
        assert_eq!(queued.error.unwrap().message, SandboxError::Closed.to_string());

        let busy = busy.wait().await;
        assert_eq!(busy.error_kind(), Some(ErrorKind::Timeout));
    }

    #[test]
    fn test_ready_delay_clamped_below_budget() {
        let coordinator = RunCoordinator::new(
            SandboxConfig::new()
                .with_budget(Duration::from_millis(200))
                .with_ready_delay(Duration::from_millis(500)),
        );
        assert_eq!(coordinator.config().ready_delay, Duration::from_millis(100));

        let untouched = RunCoordinator::new(quick_config());
        assert_eq!(untouched.config().ready_delay, Duration::from_millis(20));
    }

    #[test]
    fn test_from_section() {
        let section = SandboxSection {
            budget_ms: 900,
            max_concurrent_runs: 2,
            ..Default::default()
        };
        let coordinator = RunCoordinator::from_section(&section);
        assert_eq!(coordinator.config().budget_ms(), 900);
        assert_eq!(coordinator.permits.available_permits(), 2);
    }
}

//! Sandbox configuration.

use std::time::Duration;

use codeyard_config::SandboxSection;

/// Default capacity of the per-run message channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for snippet execution.
///
/// # Resource Model
///
/// - **Budget**: wall-clock limit per run, enforced by the watchdog.
/// - **Ready delay**: how long after instrumentation installs the guest
///   reports that it ran without a synchronous failure. Must be shorter
///   than the budget; [`RunCoordinator::new`](crate::RunCoordinator::new)
///   clamps it to half the budget otherwise.
/// - **Memory / stack**: hard limits inside each isolated context.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Maximum wall-clock time before a run is reported as a timeout.
    pub budget: Duration,

    /// Delay before the instrumentation posts its ready signal.
    pub ready_delay: Duration,

    /// Heap limit for one isolated context.
    pub memory_limit_bytes: usize,

    /// Native stack limit for one isolated context.
    pub max_stack_bytes: usize,

    /// Console events buffered per run.
    pub max_console_events: usize,

    /// Runs executing at once.
    pub max_concurrent_runs: usize,

    /// Capacity of the per-run message channel. A full channel makes the
    /// guest wait, which keeps a console flood from growing host memory.
    pub channel_capacity: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::from(&SandboxSection::default())
    }
}

impl From<&SandboxSection> for SandboxConfig {
    fn from(section: &SandboxSection) -> Self {
        Self {
            budget: Duration::from_millis(section.budget_ms),
            ready_delay: Duration::from_millis(section.ready_delay_ms),
            memory_limit_bytes: section.memory_limit_bytes,
            max_stack_bytes: section.max_stack_bytes,
            max_console_events: section.max_console_events,
            max_concurrent_runs: section.max_concurrent_runs.max(1),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl SandboxConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the execution budget.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Set the ready-signal delay.
    pub fn with_ready_delay(mut self, delay: Duration) -> Self {
        self.ready_delay = delay;
        self
    }

    /// Set the heap limit per context.
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    /// Set the stack limit per context.
    pub fn with_max_stack(mut self, bytes: usize) -> Self {
        self.max_stack_bytes = bytes;
        self
    }

    /// Set how many console events are kept per run.
    pub fn with_max_console_events(mut self, max: usize) -> Self {
        self.max_console_events = max;
        self
    }

    /// Set how many runs may execute at once.
    pub fn with_max_concurrent_runs(mut self, max: usize) -> Self {
        self.max_concurrent_runs = max.max(1);
        self
    }

    /// Set the per-run message channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Budget in whole milliseconds, as reported in timeout errors.
    pub fn budget_ms(&self) -> u128 {
        self.budget.as_millis()
    }
}

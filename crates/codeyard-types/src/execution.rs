//! Terminal values of a run.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConsoleEvent;

/// Identity of one execution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(uuid::Uuid);

impl RunId {
    /// Allocate a new, never-before-used run id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// First eight hex digits, handy for thread names and log lines.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Failure category reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Detected by static parsing before anything runs.
    Syntax,
    /// Thrown or rejected while running, or the context failed to start.
    Runtime,
    /// The watchdog budget ran out.
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Syntax => "syntax",
            Self::Runtime => "runtime",
            Self::Timeout => "timeout",
        })
    }
}

/// Error attached to a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub line: Option<u32>,
}

impl ExecutionError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: None,
            line: None,
        }
    }

    /// A static parse failure.
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    /// An execution failure.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, message)
    }

    /// The watchdog fired after `budget`.
    pub fn timeout(budget: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("execution exceeded {}ms", budget.as_millis()),
        )
    }

    /// Attach a stack trace.
    pub fn with_stack(mut self, stack: Option<String>) -> Self {
        self.stack = stack.filter(|s| !s.is_empty());
        self
    }

    /// Attach a source line number.
    pub fn with_line(mut self, line: Option<u32>) -> Self {
        self.line = line;
        self
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} error (line {line}): {}", self.kind, self.message),
            None => write!(f, "{} error: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ExecutionError {}

/// Terminal value of a run, produced exactly once.
///
/// `success` is true exactly when `error` is `None`; use the
/// constructors to keep the two in step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<ExecutionError>,
    pub console_events: Vec<ConsoleEvent>,
    /// Console events that arrived after the per-run buffer was full.
    #[serde(skip_serializing_if = "is_zero", default)]
    pub dropped_console_events: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl ExecutionResult {
    /// The run completed without an error.
    pub fn succeeded(console_events: Vec<ConsoleEvent>) -> Self {
        Self {
            success: true,
            error: None,
            console_events,
            dropped_console_events: 0,
        }
    }

    /// The run failed; console output seen so far is kept.
    pub fn failed(error: ExecutionError, console_events: Vec<ConsoleEvent>) -> Self {
        Self {
            success: false,
            error: Some(error),
            console_events,
            dropped_console_events: 0,
        }
    }

    /// Record how many console events were not buffered.
    pub fn with_dropped(mut self, dropped: usize) -> Self {
        self.dropped_console_events = dropped;
        self
    }

    /// Kind of the failure, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Console messages in arrival order.
    pub fn messages(&self) -> Vec<&str> {
        self.console_events
            .iter()
            .map(|e| e.message.as_str())
            .collect()
    }
}

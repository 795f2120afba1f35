//! Isolated execution of learner HTML/CSS/JS snippets.
//!
//! A snippet is assembled into a standalone document, loaded into a fresh
//! QuickJS context on its own thread, and observed only through the
//! messages its instrumentation posts. Each run ends in exactly one
//! [`ExecutionResult`](codeyard_types::ExecutionResult): success, a
//! runtime error, or a timeout. Console output captured before a failure
//! is kept.
//!
//! # Isolation Model
//!
//! - **Fresh context per run**: no globals, timers or storage survive a run
//! - **No host capabilities**: the guest can post messages and nothing else
//! - **Hard limits**: wall-clock budget, heap and stack limits per context
//!
//! # Example
//!
//! ```no_run
//! use codeyard_sandbox::{RunCoordinator, SandboxConfig};
//! use codeyard_types::SourceBundle;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let coordinator = RunCoordinator::new(
//!         SandboxConfig::default().with_budget(Duration::from_secs(2)),
//!     );
//!
//!     let script = "console.log('hello', { a: 1 });";
//!     if let Some(error) = coordinator.detect_syntax_errors(script) {
//!         eprintln!("{error}");
//!         return;
//!     }
//!
//!     let result = coordinator.run(SourceBundle::script_only(script), None).await;
//!     for event in &result.console_events {
//!         println!("[{}] {}", event.level, event.message);
//!     }
//! }
//! ```

pub mod assembler;
pub mod channel;
mod config;
mod coordinator;
mod error;
pub mod host;
mod listener;
mod run;
mod settlement;
mod syntax;
mod watchdog;

pub use assembler::{AssemblyOptions, DocumentBuilder, assemble, assemble_with};
pub use config::{DEFAULT_CHANNEL_CAPACITY, SandboxConfig};
pub use coordinator::{EXITED_MESSAGE, RunCoordinator, RunTicket, STOPPED_MESSAGE};
pub use error::{SandboxError, SandboxResult};
pub use host::{ContextHandle, ContextLimits, IsolationHost, KillSwitch};
pub use listener::{ConsoleSubscriber, MessageListener};
pub use run::ExecutionRun;
pub use settlement::{Outcome, Settlement};
pub use syntax::detect_syntax_errors;
pub use watchdog::{Watchdog, WatchdogGuard};

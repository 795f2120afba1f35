//! Shared types for the Codeyard snippet sandbox.
//!
//! These types describe one execution of a learner's snippet: the
//! [`SourceBundle`] going in, the [`ConsoleEvent`]s captured while it runs,
//! and the [`ExecutionResult`] coming out. [`GuestMessage`] is the wire
//! schema spoken by instrumented code inside the isolated context.

pub mod bundle;
pub mod console;
pub mod execution;
pub mod message;

pub use bundle::SourceBundle;
pub use console::{ConsoleEvent, ConsoleLevel};
pub use execution::{ErrorKind, ExecutionError, ExecutionResult, RunId};
pub use message::GuestMessage;

/// Identifier for captured records (console events).
pub type Id = uuid::Uuid;

/// Wall-clock timestamp, always UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh random identifier.
pub fn new_id() -> Id {
    uuid::Uuid::new_v4()
}

/// Current UTC time.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}

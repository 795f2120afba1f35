//! Messages posted by instrumented code inside the isolated context.
//!
//! One JSON object per message, discriminated by `type`:
//!
//! | type      | fields                                   |
//! |-----------|------------------------------------------|
//! | `console` | `level`, `args: string[]`                |
//! | `error`   | `message`, `stack?`, `lineNumber?`       |
//! | `ready`   | none                                     |
//!
//! Anything else is not a [`GuestMessage`] and must be dropped by the
//! receiver.
//!
//! Field values come from untrusted guest code, so they are read leniently:
//! non-string console arguments are rendered as JSON text, and a stack or
//! line number of the wrong shape becomes `None` rather than rejecting the
//! whole message.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::ConsoleLevel;

/// A structured message from the guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GuestMessage {
    /// One console call; arguments are already stringified by the guest.
    Console {
        level: ConsoleLevel,
        #[serde(default, deserialize_with = "lenient_args")]
        args: Vec<String>,
    },
    /// Uncaught exception or unhandled rejection.
    Error {
        #[serde(default, deserialize_with = "lenient_text")]
        message: String,
        #[serde(
            default,
            deserialize_with = "lenient_stack",
            skip_serializing_if = "Option::is_none"
        )]
        stack: Option<String>,
        #[serde(
            default,
            rename = "lineNumber",
            deserialize_with = "lenient_line",
            skip_serializing_if = "Option::is_none"
        )]
        line_number: Option<u32>,
    },
    /// Instrumentation is installed and no synchronous failure happened.
    Ready,
}

impl GuestMessage {
    /// Parse a raw payload, returning `None` for anything that does not
    /// match one of the known variants.
    pub fn parse(payload: &str) -> Option<Self> {
        serde_json::from_str(payload).ok()
    }

    /// Parse an already-decoded JSON value.
    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }

    /// Short name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Console { .. } => "console",
            Self::Error { .. } => "error",
            Self::Ready => "ready",
        }
    }
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn lenient_args<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let values = Vec::<Value>::deserialize(deserializer)?;
    Ok(values.into_iter().map(value_text).collect())
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Value::deserialize(deserializer).map(value_text)
}

fn lenient_stack<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(stack) => Some(stack),
        _ => None,
    })
}

/// Whole line numbers from 1 to `u32::MAX`; anything else is dropped.
fn lenient_line<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let line = Value::deserialize(deserializer)?
        .as_f64()
        .filter(|n| n.fract() == 0.0 && *n >= 1.0 && *n <= f64::from(u32::MAX))
        .map(|n| n as u32);
    Ok(line)
}

//! Console output captured from guest code.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Id, Timestamp, new_id, now};

/// Console method that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Warn,
    Error,
    Info,
}

impl ConsoleLevel {
    /// All intercepted levels, in the order the instrumentation wraps them.
    pub const ALL: [ConsoleLevel; 4] = [Self::Log, Self::Warn, Self::Error, Self::Info];

    /// Name of the console method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One intercepted console call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleEvent {
    pub id: Id,
    pub level: ConsoleLevel,
    pub message: String,
    pub timestamp: Timestamp,
}

impl ConsoleEvent {
    /// Create an event stamped with the current time.
    pub fn new(level: ConsoleLevel, message: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            level,
            message: message.into(),
            timestamp: now(),
        }
    }

    /// Create an event from already-stringified console arguments.
    ///
    /// Arguments are joined with a single space, matching how browsers
    /// print multiple console arguments.
    pub fn from_args(level: ConsoleLevel, args: &[String]) -> Self {
        Self::new(level, args.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_args_joins_with_space() {
        let args = vec!["a".to_string(), "1".to_string(), "{\"k\":2}".to_string()];
        let event = ConsoleEvent::from_args(ConsoleLevel::Warn, &args);
        assert_eq!(event.message, r#"a 1 {"k":2}"#);
        assert_eq!(event.level, ConsoleLevel::Warn);
    }

    #[test]
    fn test_level_wire_names() {
        for level in ConsoleLevel::ALL {
            let json = serde_json::to_string(&level).unwrap();
            assert_eq!(json, format!("\"{}\"", level.as_str()));
        }
    }

    #[test]
    fn test_events_get_distinct_ids() {
        let a = ConsoleEvent::new(ConsoleLevel::Log, "x");
        let b = ConsoleEvent::new(ConsoleLevel::Log, "x");
        assert_ne!(a.id, b.id);
    }
}

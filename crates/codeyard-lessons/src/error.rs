//! Error types for lesson loading.

use thiserror::Error;

/// Errors that can occur while loading a lesson definition.
///
/// Checking a bundle against a loaded lesson never fails; only malformed
/// definitions do.
#[derive(Debug, Error)]
pub enum LessonError {
    /// Failed to read a lesson file.
    #[error("Failed to read lesson file {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Lesson JSON is malformed.
    #[error("Failed to parse lesson: {0}")]
    Parse(#[from] serde_json::Error),

    /// A task kind that compares against a target has none.
    #[error("task '{kind}' requires a non-empty target")]
    MissingTarget {
        /// Task kind as written in the lesson.
        kind: String,
    },

    /// A required field is empty.
    #[error("invalid lesson '{id}': {message}")]
    Invalid {
        /// Lesson identifier, possibly empty.
        id: String,
        /// What is wrong.
        message: String,
    },
}

/// Result type for lesson operations.
pub type Result<T> = std::result::Result<T, LessonError>;

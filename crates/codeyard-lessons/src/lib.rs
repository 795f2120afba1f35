//! Lessons and static task checks for Codeyard.
//!
//! A [`Lesson`] carries starter code and a list of [`LessonTask`]s. Each
//! task is a text or pattern check on the learner's [`SourceBundle`](codeyard_types::SourceBundle);
//! [`validate`] runs all of them without executing anything.

pub mod error;
pub mod lesson;
pub mod task;
pub mod validate;

pub use error::{LessonError, Result};
pub use lesson::{Difficulty, Lesson};
pub use task::{LessonTask, TaskCheck};
pub use validate::{TaskReport, validate};

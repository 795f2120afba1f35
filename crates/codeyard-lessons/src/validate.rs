//! Checking a learner's code against a lesson.

use codeyard_types::SourceBundle;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Lesson;

/// Per-task outcome of a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    /// One entry per lesson task, in lesson order.
    pub completed: Vec<bool>,
    /// True when every task passed, or the lesson has none.
    pub all_complete: bool,
}

impl TaskReport {
    /// Number of tasks that passed.
    pub fn completed_count(&self) -> usize {
        self.completed.iter().filter(|done| **done).count()
    }

    /// Number of tasks checked.
    pub fn total(&self) -> usize {
        self.completed.len()
    }

    /// Fraction of tasks done, `1.0` for a lesson without tasks.
    pub fn progress(&self) -> f32 {
        if self.completed.is_empty() {
            1.0
        } else {
            self.completed_count() as f32 / self.total() as f32
        }
    }
}

/// Check `code` against every task of `lesson`.
pub fn validate(code: &SourceBundle, lesson: &Lesson) -> TaskReport {
    let completed: Vec<bool> = lesson
        .tasks
        .iter()
        .map(|task| task.check.is_satisfied(code, &lesson.starter_code))
        .collect();
    let all_complete = completed.iter().all(|done| *done);

    debug!(
        lesson = %lesson.id,
        done = completed.iter().filter(|d| **d).count(),
        total = completed.len(),
        all_complete,
        "Checked lesson tasks"
    );

    TaskReport {
        completed,
        all_complete,
    }
}

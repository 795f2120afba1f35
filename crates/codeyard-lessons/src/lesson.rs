//! Lesson definitions.

use std::path::Path;

use codeyard_types::SourceBundle;
use serde::{Deserialize, Serialize};

use crate::task::LessonTask;
use crate::{LessonError, Result};

/// How hard a lesson is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

/// One lesson: instructions, starter code, and the tasks that mark it done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub hints: Vec<String>,
    /// Code the editor starts with.
    #[serde(default)]
    pub starter_code: SourceBundle,
    #[serde(default)]
    pub tasks: Vec<LessonTask>,
}

impl Lesson {
    /// Create a lesson with no tasks.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            instructions: String::new(),
            difficulty: Difficulty::default(),
            tags: Vec::new(),
            hints: Vec::new(),
            starter_code: SourceBundle::default(),
            tasks: Vec::new(),
        }
    }

    /// Set the starter code.
    pub fn with_starter_code(mut self, starter: SourceBundle) -> Self {
        self.starter_code = starter;
        self
    }

    /// Add a task.
    pub fn with_task(mut self, task: LessonTask) -> Self {
        self.tasks.push(task);
        self
    }

    /// Parse and check a lesson from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let lesson: Self = serde_json::from_str(json)?;
        lesson.check()?;
        Ok(lesson)
    }

    /// Load a lesson from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| LessonError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    /// Reject definitions that cannot be shown to a learner.
    pub fn check(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(LessonError::Invalid {
                id: self.id.clone(),
                message: "id must not be empty".to_string(),
            });
        }
        if self.title.trim().is_empty() {
            return Err(LessonError::Invalid {
                id: self.id.clone(),
                message: "title must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Whether completion is gated on tasks.
    pub fn has_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskCheck;

    const LESSON: &str = r#"{
        "id": "dom-basics",
        "title": "DOM Basics",
        "difficulty": "intermediate",
        "tags": ["dom", "javascript"],
        "starterCode": { "html": "<div id=\"app\"></div>", "css": "", "javascript": "// start here" },
        "tasks": [
            { "type": "function-exists", "target": "render", "description": "Write render()" },
            { "type": "no-starter", "description": "Change something" }
        ]
    }"#;

    #[test]
    fn test_parse_lesson() {
        let lesson = Lesson::from_json(LESSON).unwrap();
        assert_eq!(lesson.id, "dom-basics");
        assert_eq!(lesson.difficulty, Difficulty::Intermediate);
        assert_eq!(lesson.starter_code.script, "// start here");
        assert_eq!(lesson.tasks.len(), 2);
        assert_eq!(lesson.tasks[0].check, TaskCheck::FunctionExists("render".into()));
        assert!(lesson.hints.is_empty());
    }

    #[test]
    fn test_minimal_lesson() {
        let lesson = Lesson::from_json(r#"{"id":"intro","title":"Intro"}"#).unwrap();
        assert!(!lesson.has_tasks());
        assert_eq!(lesson.difficulty, Difficulty::Beginner);
        assert!(lesson.starter_code.is_empty());
    }

    #[test]
    fn test_rejects_empty_title() {
        let err = Lesson::from_json(r#"{"id":"x","title":"  "}"#).unwrap_err();
        assert!(matches!(err, LessonError::Invalid { .. }));
    }

    #[test]
    fn test_rejects_bad_task() {
        let err = Lesson::from_json(
            r#"{"id":"x","title":"X","tasks":[{"type":"tag-exists","target":""}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, LessonError::Parse(_)));
        assert!(err.to_string().contains("tag-exists"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lesson.json");
        std::fs::write(&path, LESSON).unwrap();

        let lesson = Lesson::from_file(&path).unwrap();
        assert_eq!(lesson.title, "DOM Basics");

        let err = Lesson::from_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, LessonError::ReadFile { .. }));
    }
}

//! Lesson tasks and the static checks behind them.
//!
//! Tasks are written in lesson JSON as:
//!
//! ```json
//! { "type": "function-exists", "target": "greet", "description": "Write greet()" }
//! ```
//!
//! Checks look at source text only; nothing is executed.

use codeyard_types::SourceBundle;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::LessonError;

/// What a task checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskCheck {
    /// HTML contains the target text.
    HtmlContains(String),
    /// CSS contains the target text.
    CssContains(String),
    /// Script contains the target text.
    JsContains(String),
    /// Any of the three fragments differs from the starter code.
    NoStarter,
    /// Script calls or declares `target(`.
    FunctionExists(String),
    /// HTML has an opening `<target ...>` tag.
    TagExists(String),
    /// CSS has a `.target` selector.
    ClassExists(String),
    /// A kind this version does not know. Never satisfied.
    Custom {
        kind: String,
        target: Option<String>,
    },
}

impl TaskCheck {
    /// Kind name as written in lesson JSON.
    pub fn kind(&self) -> &str {
        match self {
            Self::HtmlContains(_) => "html-contains",
            Self::CssContains(_) => "css-contains",
            Self::JsContains(_) => "js-contains",
            Self::NoStarter => "no-starter",
            Self::FunctionExists(_) => "function-exists",
            Self::TagExists(_) => "tag-exists",
            Self::ClassExists(_) => "class-exists",
            Self::Custom { kind, .. } => kind,
        }
    }

    /// Target text, if the kind has one.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::HtmlContains(t)
            | Self::CssContains(t)
            | Self::JsContains(t)
            | Self::FunctionExists(t)
            | Self::TagExists(t)
            | Self::ClassExists(t) => Some(t),
            Self::NoStarter => None,
            Self::Custom { target, .. } => target.as_deref(),
        }
    }

    /// Whether `code` satisfies this check. `starter` is the lesson's
    /// starter code.
    pub fn is_satisfied(&self, code: &SourceBundle, starter: &SourceBundle) -> bool {
        match self {
            Self::HtmlContains(target) => code.html.contains(target.as_str()),
            Self::CssContains(target) => code.css.contains(target.as_str()),
            Self::JsContains(target) => code.script.contains(target.as_str()),
            Self::NoStarter => {
                code.html != starter.html || code.css != starter.css || code.script != starter.script
            }
            Self::FunctionExists(name) => {
                matches_pattern(&format!(r"\b{}\s*\(", regex::escape(name)), &code.script)
            }
            Self::TagExists(tag) => {
                matches_pattern(&format!(r"<{}[^>]*>", regex::escape(tag)), &code.html)
            }
            Self::ClassExists(class) => {
                matches_pattern(&format!(r"\.{}\b", regex::escape(class)), &code.css)
            }
            Self::Custom { kind, .. } => {
                trace!(kind = %kind, "Unknown task kind is never satisfied");
                false
            }
        }
    }
}

fn matches_pattern(pattern: &str, haystack: &str) -> bool {
    match Regex::new(pattern) {
        Ok(re) => re.is_match(haystack),
        Err(err) => {
            warn!(pattern = %pattern, error = %err, "Task pattern failed to compile");
            false
        }
    }
}

/// One task in a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTask", into = "RawTask")]
pub struct LessonTask {
    pub check: TaskCheck,
    /// Text shown to the learner.
    pub description: String,
}

impl LessonTask {
    /// Create a task.
    pub fn new(check: TaskCheck, description: impl Into<String>) -> Self {
        Self {
            check,
            description: description.into(),
        }
    }
}

/// Wire form of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawTask {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default)]
    description: String,
}

impl TryFrom<RawTask> for LessonTask {
    type Error = LessonError;

    fn try_from(raw: RawTask) -> Result<Self, Self::Error> {
        let RawTask {
            kind,
            target,
            description,
        } = raw;

        let required = |target: Option<String>| -> Result<String, LessonError> {
            target
                .filter(|t| !t.is_empty())
                .ok_or_else(|| LessonError::MissingTarget { kind: kind.clone() })
        };

        let check = match kind.as_str() {
            "html-contains" => TaskCheck::HtmlContains(required(target)?),
            "css-contains" => TaskCheck::CssContains(required(target)?),
            "js-contains" => TaskCheck::JsContains(required(target)?),
            "no-starter" => TaskCheck::NoStarter,
            "function-exists" => TaskCheck::FunctionExists(required(target)?),
            "tag-exists" => TaskCheck::TagExists(required(target)?),
            "class-exists" => TaskCheck::ClassExists(required(target)?),
            _ => TaskCheck::Custom {
                kind: kind.clone(),
                target,
            },
        };

        Ok(Self { check, description })
    }
}

impl From<LessonTask> for RawTask {
    fn from(task: LessonTask) -> Self {
        Self {
            kind: task.check.kind().to_string(),
            target: task.check.target().map(str::to_string),
            description: task.description,
        }
    }
}

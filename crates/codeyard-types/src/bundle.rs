//! Learner source fragments.

use serde::{Deserialize, Serialize};

/// The three source fragments submitted for one run.
///
/// Field names follow the persisted snippet format, where the script
/// fragment is stored under `javascript`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceBundle {
    pub html: String,
    pub css: String,
    #[serde(alias = "javascript")]
    pub script: String,
}

impl SourceBundle {
    /// Create a bundle from all three fragments.
    pub fn new(html: impl Into<String>, css: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            css: css.into(),
            script: script.into(),
        }
    }

    /// Create a bundle that only carries a script fragment.
    pub fn script_only(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            ..Self::default()
        }
    }

    /// Replace the HTML fragment.
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    /// Replace the CSS fragment.
    pub fn with_css(mut self, css: impl Into<String>) -> Self {
        self.css = css.into();
        self
    }

    /// Replace the script fragment.
    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = script.into();
        self
    }

    /// True when all three fragments are empty.
    pub fn is_empty(&self) -> bool {
        self.html.is_empty() && self.css.is_empty() && self.script.is_empty()
    }
}

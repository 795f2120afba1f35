//! Typed form of `codeyard.toml`.
//!
//! Top-level config:
//! ```toml
//! [sandbox]
//! budget_ms = 5000
//! ready_delay_ms = 100
//! ```

use serde::{Deserialize, Serialize};

use crate::ConfigError;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a Codeyard config file can hold.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeyardConfig {
    /// Snippet execution settings.
    pub sandbox: Option<SandboxSection>,
}

impl CodeyardConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text and validate the sections present.
    pub fn from_toml(text: &str) -> crate::Result<Self> {
        let config: Self = toml::from_str(text)?;
        if let Some(ref sandbox) = config.sandbox {
            sandbox.validate()?;
        }
        Ok(config)
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Overlay `other`: any section it sets replaces ours.
    pub fn merge(&mut self, other: CodeyardConfig) {
        if other.sandbox.is_some() {
            self.sandbox = other.sandbox;
        }
    }

    /// The sandbox section, or defaults when absent.
    pub fn sandbox(&self) -> SandboxSection {
        self.sandbox.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sandbox Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default wall-clock budget for one run.
pub const DEFAULT_BUDGET_MS: u64 = 5_000;

/// Default delay before the guest reports that it is ready.
pub const DEFAULT_READY_DELAY_MS: u64 = 100;

/// Snippet execution configuration.
///
/// ```toml
/// [sandbox]
/// budget_ms = 5000
/// ready_delay_ms = 100
/// memory_limit_bytes = 67108864
/// max_stack_bytes = 1048576
/// max_console_events = 1000
/// max_concurrent_runs = 4
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    /// Maximum wall-clock time before a run is terminated as a timeout.
    pub budget_ms: u64,
    /// Delay after instrumentation installs before the ready signal.
    pub ready_delay_ms: u64,
    /// Heap limit for one isolated context.
    pub memory_limit_bytes: usize,
    /// Native stack limit for one isolated context.
    pub max_stack_bytes: usize,
    /// Console events kept per run; later events are only counted.
    pub max_console_events: usize,
    /// Runs executing at once; further runs wait for a slot.
    pub max_concurrent_runs: usize,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            budget_ms: DEFAULT_BUDGET_MS,
            ready_delay_ms: DEFAULT_READY_DELAY_MS,
            memory_limit_bytes: 64 * 1024 * 1024,
            max_stack_bytes: 1024 * 1024,
            max_console_events: 1_000,
            max_concurrent_runs: 4,
        }
    }
}

impl SandboxSection {
    /// Reject values the sandbox cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.budget_ms == 0 {
            return Err(invalid("sandbox.budget_ms", "must be greater than zero"));
        }
        if self.ready_delay_ms >= self.budget_ms {
            return Err(invalid(
                "sandbox.ready_delay_ms",
                format!("must be shorter than budget_ms ({})", self.budget_ms),
            ));
        }
        if self.max_concurrent_runs == 0 {
            return Err(invalid(
                "sandbox.max_concurrent_runs",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config() {
        let config = CodeyardConfig::from_toml("").unwrap();
        assert!(config.sandbox.is_none());
        assert_eq!(config.sandbox(), SandboxSection::default());
    }

    #[test]
    fn test_partial_sandbox_section() {
        let config = CodeyardConfig::from_toml(
            r#"
            [sandbox]
            budget_ms = 2000
            "#,
        )
        .unwrap();
        let sandbox = config.sandbox.unwrap();
        assert_eq!(sandbox.budget_ms, 2000);
        assert_eq!(sandbox.ready_delay_ms, DEFAULT_READY_DELAY_MS);
        assert_eq!(sandbox.max_console_events, 1_000);
    }

    #[test]
    fn test_rejects_zero_budget() {
        let err = CodeyardConfig::from_toml("[sandbox]\nbudget_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("budget_ms"));
    }

    #[test]
    fn test_rejects_ready_delay_past_budget() {
        let err =
            CodeyardConfig::from_toml("[sandbox]\nbudget_ms = 50\nready_delay_ms = 100\n")
                .unwrap_err();
        assert!(err.to_string().contains("ready_delay_ms"));
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut base = CodeyardConfig::from_toml("[sandbox]\nbudget_ms = 1000\n").unwrap();
        base.merge(CodeyardConfig::new());
        assert_eq!(base.sandbox().budget_ms, 1000);

        base.merge(CodeyardConfig::from_toml("[sandbox]\nbudget_ms = 3000\n").unwrap());
        assert_eq!(base.sandbox().budget_ms, 3000);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = CodeyardConfig {
            sandbox: Some(SandboxSection {
                budget_ms: 750,
                ..Default::default()
            }),
        };
        let text = config.to_toml().unwrap();
        assert!(text.contains("budget_ms = 750"));
        assert_eq!(CodeyardConfig::from_toml(&text).unwrap(), config);
    }
}

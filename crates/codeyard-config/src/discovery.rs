//! Layered config discovery.
//!
//! Two layers are consulted, lowest precedence first:
//! 1. the user layer, `<config dir>/codeyard/config.toml`, where the directory
//!    can be replaced through `CODEYARD_CONFIG_DIR`;
//! 2. the project layer, `codeyard.toml` in the project directory.
//!
//! A layer that is missing is skipped. A layer that fails to read or validate
//! is reported on [`LoadedConfig`] and does not abort the load.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{CodeyardConfig, ConfigError, Result};

const PROJECT_FILE: &str = "codeyard.toml";
const USER_FILE: &str = "config.toml";
const CONFIG_DIR_ENV: &str = "CODEYARD_CONFIG_DIR";

/// Where a layer comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayer {
    User,
    Project,
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Project => f.write_str("project"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerStatus {
    Missing,
    Applied,
    /// The file exists but was ignored; holds the reason.
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct LayerReport {
    pub layer: ConfigLayer,
    pub path: PathBuf,
    pub status: LayerStatus,
}

/// Merged config plus a report for every layer that was looked at.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: CodeyardConfig,
    pub layers: Vec<LayerReport>,
}

impl LoadedConfig {
    /// Paths of the layers that contributed to `config`.
    pub fn applied(&self) -> impl Iterator<Item = &Path> {
        self.layers
            .iter()
            .filter(|report| report.status == LayerStatus::Applied)
            .map(|report| report.path.as_path())
    }

    /// One line per rejected layer, suitable for showing to a user.
    pub fn warnings(&self) -> Vec<String> {
        self.layers
            .iter()
            .filter_map(|report| match &report.status {
                LayerStatus::Rejected(reason) => Some(format!(
                    "ignored {} config {}: {reason}",
                    report.layer,
                    report.path.display()
                )),
                _ => None,
            })
            .collect()
    }
}

/// Discover and merge config for `project_dir` (the working directory when `None`).
pub fn load_config(project_dir: Option<&Path>) -> LoadedConfig {
    load_config_with_options(project_dir, user_config_dir().as_deref())
}

/// Like [`load_config`], with the user config directory given explicitly.
/// `None` skips the user layer.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    user_dir: Option<&Path>,
) -> LoadedConfig {
    let project_path = match project_dir {
        Some(dir) => dir.join(PROJECT_FILE),
        None => PathBuf::from(PROJECT_FILE),
    };

    let candidates = user_dir
        .map(|dir| (ConfigLayer::User, dir.join(USER_FILE)))
        .into_iter()
        .chain([(ConfigLayer::Project, project_path)]);

    let mut config = CodeyardConfig::new();
    let layers = candidates
        .map(|(layer, path)| {
            let status = apply_layer(&mut config, &path);
            LayerReport {
                layer,
                path,
                status,
            }
        })
        .collect();

    LoadedConfig { config, layers }
}

/// Read and validate a single config file.
pub fn load_config_file(path: &Path) -> Result<CodeyardConfig> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    CodeyardConfig::from_toml(&text)
}

/// Write `config` to `path`, creating missing parent directories.
pub fn save_config(config: &CodeyardConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(write_err(parent))?;
    }
    fs::write(path, config.to_toml()?).map_err(write_err(path))
}

/// The user config directory: `CODEYARD_CONFIG_DIR` when set and non-empty,
/// else `codeyard` under the platform config directory.
pub fn user_config_dir() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|base| base.join("codeyard")),
    }
}

pub fn user_config_path() -> Option<PathBuf> {
    user_config_dir().map(|dir| dir.join(USER_FILE))
}

fn write_err(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError {
    let path = path.to_path_buf();
    move |source| ConfigError::Write { path, source }
}

fn apply_layer(config: &mut CodeyardConfig, path: &Path) -> LayerStatus {
    if !path.is_file() {
        return LayerStatus::Missing;
    }
    match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            LayerStatus::Applied
        }
        Err(err) => LayerStatus::Rejected(err.to_string()),
    }
}

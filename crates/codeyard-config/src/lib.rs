//! Configuration for the Codeyard snippet sandbox.
//!
//! Config is TOML with a single `[sandbox]` section today. Files are layered
//! (user, then project) by [`load_config`]; a broken layer is reported on the
//! returned [`LoadedConfig`] instead of failing the load.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigLayer, LayerReport, LayerStatus, LoadedConfig, load_config, load_config_file,
    load_config_with_options, save_config, user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;

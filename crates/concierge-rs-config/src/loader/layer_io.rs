//! IO helpers for reading config layers from disk.

use super::{APP_DIR, ConfigLayerSource, DEFAULT_CONFIG_FILE, schema, utils};
use crate::ConfigError;
use directories::BaseDirs;
use log::debug;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Read, parse and schema-check one layer.
pub(super) fn load_layer(source: ConfigLayerSource, path: &Path) -> Result<Value, ConfigError> {
    debug!(
        "loading config layer (source={:?}, path={})",
        source,
        path.display()
    );
    let contents = utils::read_file(path)?;
    let value: Value = json5::from_str(&contents)?;
    let label = format!("{}({})", source.label(), path.display());
    schema::validate_layer_schema(&value, &label)?;
    Ok(value)
}

/// Default system config path on Unix; None elsewhere.
pub(super) fn default_system_config_path() -> Option<PathBuf> {
    #[cfg(unix)]
    {
        Some(PathBuf::from(super::SYSTEM_CONFIG_PATH))
    }
    #[cfg(not(unix))]
    {
        None
    }
}

/// Default user config path under the platform config directory.
pub(super) fn default_user_config_path() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.config_dir().join(APP_DIR).join(DEFAULT_CONFIG_FILE))
}

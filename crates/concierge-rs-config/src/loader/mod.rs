//! Layered configuration loader.
//!
//! Discovers configuration layers (system/user/project/cwd/runtime), validates
//! each against the schema, deep-merges them, and produces a final
//! `ConciergeConfig`.

mod layer_io;
mod merge;
mod schema;
mod utils;

#[cfg(test)]
mod tests;

use crate::{ConciergeConfig, ConfigError};
use log::{debug, info};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default config filename in local layers.
const DEFAULT_CONFIG_FILE: &str = "concierge.json5";
/// Application directory name under the platform config dir.
const APP_DIR: &str = "concierge";
/// Marker files/dirs that identify a project root.
const DEFAULT_PROJECT_ROOT_MARKERS: &[&str] = &[".git"];

#[cfg(unix)]
/// Default system config path on Unix.
const SYSTEM_CONFIG_PATH: &str = "/etc/concierge/concierge.json5";

/// Effective config plus metadata about which layers were loaded.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    /// The merged, validated config.
    pub config: ConciergeConfig,
    /// Layers that contributed to the config, lowest precedence first.
    pub layers: Vec<ConfigLayer>,
}

/// Origin for a single config layer in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    /// System-wide configuration.
    System,
    /// User-specific configuration.
    User,
    /// Project root configuration.
    Project,
    /// Current working directory configuration.
    Cwd,
    /// Explicit overrides (highest precedence).
    Runtime,
}

impl ConfigLayerSource {
    fn label(self) -> &'static str {
        match self {
            ConfigLayerSource::System => "system",
            ConfigLayerSource::User => "user",
            ConfigLayerSource::Project => "project",
            ConfigLayerSource::Cwd => "cwd",
            ConfigLayerSource::Runtime => "runtime",
        }
    }
}

/// Metadata about a loaded config layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayer {
    pub source: ConfigLayerSource,
    pub path: PathBuf,
}

/// Options controlling layered config discovery and overrides.
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    /// Working directory used to resolve local layers.
    pub cwd: PathBuf,
    /// Optional system config path (defaults to `/etc/concierge/concierge.json5` on Unix).
    pub system_config_path: Option<PathBuf>,
    /// Optional user config path (defaults to the platform config dir).
    pub user_config_path: Option<PathBuf>,
    /// Runtime override config paths applied last.
    pub runtime_paths: Vec<PathBuf>,
    /// Marker files/dirs used to detect the project root.
    pub project_root_markers: Vec<String>,
}

impl LayeredConfigOptions {
    /// Create options with default layer locations for the provided cwd.
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            system_config_path: layer_io::default_system_config_path(),
            user_config_path: layer_io::default_user_config_path(),
            runtime_paths: Vec::new(),
            project_root_markers: DEFAULT_PROJECT_ROOT_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
        }
    }

    /// Add a runtime override config path that is applied last.
    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }
}

impl ConciergeConfig {
    /// Load a single config from a path (no layering).
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("loading config from path: {}", path.display());
        let contents = utils::read_file(path)?;
        let value: Value = json5::from_str(&contents)?;
        config_from_value(value, "config")
    }

    /// Load a single config from JSON5 contents (no layering).
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        debug!("loading config from raw contents (len={})", contents.len());
        let value: Value = json5::from_str(contents)?;
        config_from_value(value, "config")
    }

    /// Load a layered config stack using the default layer locations.
    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        Self::load_layered_with_options(LayeredConfigOptions::new(cwd))
    }

    /// Load a layered config stack using explicit layer locations.
    ///
    /// Layer precedence (low -> high): system, user, project, cwd, runtime.
    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let cwd = utils::normalize_path(&options.cwd)?;
        debug!("normalized cwd for config load: {}", cwd.display());

        let mut candidates: Vec<(ConfigLayerSource, PathBuf, bool)> = Vec::new();
        if let Some(path) = options.system_config_path {
            candidates.push((ConfigLayerSource::System, path, false));
        }
        if let Some(path) = options.user_config_path {
            candidates.push((ConfigLayerSource::User, path, false));
        }
        match utils::find_project_root(&cwd, &options.project_root_markers) {
            Some(root) => {
                debug!("resolved project root: {}", root.display());
                candidates.push((ConfigLayerSource::Project, root.join(DEFAULT_CONFIG_FILE), false));
            }
            None => debug!("project root not found; skipping project layer"),
        }
        candidates.push((ConfigLayerSource::Cwd, cwd.join(DEFAULT_CONFIG_FILE), false));
        for path in options.runtime_paths {
            candidates.push((ConfigLayerSource::Runtime, path, true));
        }

        let mut layers = Vec::new();
        let mut seen = HashSet::new();
        let mut merged = Value::Object(serde_json::Map::new());
        for (source, path, required) in candidates {
            if !required && !path.exists() {
                debug!(
                    "skipping missing layer (source={:?}, path={})",
                    source,
                    path.display()
                );
                continue;
            }
            if !seen.insert(utils::normalize_path(&path)?) {
                debug!(
                    "skipping duplicate layer (source={:?}, path={})",
                    source,
                    path.display()
                );
                continue;
            }
            let value = layer_io::load_layer(source, &path)?;
            merge::merge_json_values(&mut merged, &value);
            layers.push(ConfigLayer { source, path });
        }

        let config = config_from_value(merged, "effective")?;
        info!("layered config loaded (layers={})", layers.len());
        Ok(LayeredConfig { config, layers })
    }

    /// Validate invariants that cannot be expressed in serde.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let model = &self.model.default;
        if model.split_once(':').is_none_or(|(provider, name)| provider.is_empty() || name.is_empty()) {
            return Err(ConfigError::invalid(
                "model.default",
                "expected `provider:model`",
            ));
        }
        ensure_unit_interval("memory.recall_threshold", self.memory.recall_threshold)?;
        ensure_unit_interval("retrieval.threshold", self.retrieval.threshold)?;
        ensure_positive("window.max_messages", self.window.max_messages)?;
        ensure_positive("memory.recall_limit", self.memory.recall_limit)?;
        ensure_positive("retrieval.top_k", self.retrieval.top_k)?;
        ensure_positive(
            "orchestrator.max_tool_iterations",
            self.orchestrator.max_tool_iterations,
        )?;
        ensure_positive("orchestrator.stream_buffer", self.orchestrator.stream_buffer)?;
        ensure_positive("retry.max_attempts", self.retry.max_attempts as usize)?;

        let mut names = HashSet::new();
        for (idx, form) in self.forms.iter().enumerate() {
            let path = format!("forms[{idx}]");
            if form.name.trim().is_empty() {
                return Err(ConfigError::invalid(path, "form name cannot be empty"));
            }
            if !names.insert(form.name.as_str()) {
                return Err(ConfigError::invalid(
                    path,
                    format!("duplicate form name `{}`", form.name),
                ));
            }
            if form.fields.is_empty() {
                return Err(ConfigError::invalid(path, "form requires at least one field"));
            }
            let mut fields = HashSet::new();
            for field in &form.fields {
                if field == "user_id" || field == "form_name" {
                    return Err(ConfigError::invalid(
                        format!("{path}.fields"),
                        format!("`{field}` is reserved"),
                    ));
                }
                if field.trim().is_empty() || !fields.insert(field.as_str()) {
                    return Err(ConfigError::invalid(
                        format!("{path}.fields"),
                        "fields must be unique and non-empty",
                    ));
                }
            }
        }
        Ok(())
    }
}

fn ensure_unit_interval(path: &str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(path, "expected a value between 0 and 1"))
    }
}

fn ensure_positive(path: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(path, "must be at least 1"));
    }
    Ok(())
}

fn config_from_value(value: Value, label: &str) -> Result<ConciergeConfig, ConfigError> {
    schema::validate_layer_schema(&value, label)?;
    let config: ConciergeConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}

//! Layered configuration
//!
//! Built-in defaults, then the user config file, then `.olt/config.yaml`
//! of the project. Later layers override earlier ones key by key; command
//! line flags and `OLT_DIVISION` / `OLT_TENANT` are applied by the CLI on
//! top of the result.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::scope::{DivisionSelector, Scope};
use crate::store::DataFormat;
use crate::yaml::{parse_yaml, YamlError};

/// One configuration file; unset keys fall through to the layer below
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigLayer {
    /// Data directory, relative to the project root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Encoding of collection files (yaml or json)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<DataFormat>,

    /// Division used when no --division is given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_division: Option<String>,

    /// Tenant used when no --tenant is given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_tenant: Option<String>,

    /// Log filter used when OLT_LOG is unset (e.g. "warn", "olt=debug")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl ConfigLayer {
    /// Read a layer from a YAML file; a missing or empty file is an empty layer
    pub fn from_file(path: &Path) -> Result<Self, YamlError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(YamlError::Io(e)),
        };
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        parse_yaml(&content, &path.display().to_string())
    }
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub format: DataFormat,
    pub default_division: Option<String>,
    pub default_tenant: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            format: DataFormat::Yaml,
            default_division: None,
            default_tenant: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load defaults, the user config and (if given) the project config
    pub fn load(project_config: Option<&Path>) -> Result<Self, YamlError> {
        let mut layers = Vec::new();
        if let Some(path) = Self::user_config_path() {
            layers.push(ConfigLayer::from_file(&path)?);
        }
        if let Some(path) = project_config {
            layers.push(ConfigLayer::from_file(path)?);
        }
        Ok(Self::from_layers(layers))
    }

    /// Fold layers over the defaults, lowest priority first
    pub fn from_layers(layers: impl IntoIterator<Item = ConfigLayer>) -> Self {
        let mut config = Self::default();
        for layer in layers {
            if let Some(dir) = layer.data_dir {
                config.data_dir = PathBuf::from(dir);
            }
            if let Some(format) = layer.format {
                config.format = format;
            }
            if layer.default_division.is_some() {
                config.default_division = layer.default_division;
            }
            if layer.default_tenant.is_some() {
                config.default_tenant = layer.default_tenant;
            }
            if let Some(level) = layer.log_level {
                config.log_level = level;
            }
        }
        config
    }

    /// `~/.config/olt/config.yaml` or the platform equivalent
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "olt").map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Scope from explicit selections, falling back to the configured defaults
    pub fn scope(&self, division: Option<&str>, tenant: Option<&str>) -> Scope {
        let division = match division.or(self.default_division.as_deref()) {
            Some(d) => d.parse().unwrap_or_default(),
            None => DivisionSelector::All,
        };
        let mut scope = Scope {
            division,
            tenant: None,
        };
        if let Some(tenant) = tenant.or(self.default_tenant.as_deref()) {
            scope = scope.with_tenant(tenant);
        }
        scope
    }
}

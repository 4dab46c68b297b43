//! CRUD service configuration
//!
//! Every field has a default, so an empty YAML document (or no file at
//! all) yields a usable configuration.

use crate::record::Namespace;
use crate::schema::DEFAULT_MAX_DEPTH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrudConfig {
    /// Role the CRUD commands are registered under
    pub role: String,
    pub zone: Option<String>,
    pub base: Option<String>,
    pub name: Option<String>,
    /// Stamp `last_update` (epoch millis) on create and update
    pub last_update: bool,
    /// Error message when `create` receives no entity
    pub msg_no_entity: String,
    /// Deepest nesting accepted in joins, appends and relationships
    pub max_schema_depth: usize,
}

impl Default for CrudConfig {
    fn default() -> Self {
        Self {
            role: "entity".to_string(),
            zone: None,
            base: None,
            name: Some("entity".to_string()),
            last_update: false,
            msg_no_entity: "no entity".to_string(),
            max_schema_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl CrudConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// `<config_dir>/entwine/config.yaml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("entwine").join("config.yaml"))
    }

    /// Namespace used when an action names none.
    pub fn default_namespace(&self) -> Namespace {
        Namespace::new(self.zone.clone(), self.base.clone(), self.name.clone())
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_last_update(mut self, last_update: bool) -> Self {
        self.last_update = last_update;
        self
    }
}

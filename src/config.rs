//! YAML configuration: data file, exposed commands and permission grants

use crate::error::SearchError;
use crate::permissions::{AllowAll, GrantTable, PermissionPolicy};
use crate::pipeline::registry::CommandRegistry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// JSON Lines event file backing the store
    pub data: Option<PathBuf>,
    /// Exposed command name to builtin implementation; every builtin when absent
    pub commands: Option<IndexMap<String, String>>,
    /// Grant table; everything is allowed when absent
    pub permissions: Option<PermissionsConfig>,
    pub default_user: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PermissionsConfig {
    pub superusers: Vec<String>,
    /// Username (or `*`) to permission codenames such as `add_event`
    pub grants: IndexMap<String, Vec<String>>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, SearchError> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&text)
            .map_err(|e| SearchError::Config(format!("{}: {}", path.display(), e)))?;

        // Relative data paths are relative to the config file
        if let (Some(data), Some(dir)) = (config.data.as_ref(), path.parent()) {
            if data.is_relative() {
                config.data = Some(dir.join(data));
            }
        }
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, SearchError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| SearchError::Config(e.to_string()))
    }

    pub fn registry(&self) -> Result<CommandRegistry, SearchError> {
        match &self.commands {
            Some(commands) => CommandRegistry::from_config(commands),
            None => Ok(CommandRegistry::builtin()),
        }
    }

    pub fn permission_policy(&self) -> Arc<dyn PermissionPolicy> {
        match &self.permissions {
            None => Arc::new(AllowAll),
            Some(permissions) => {
                let mut table = GrantTable::new();
                for user in &permissions.superusers {
                    table = table.superuser(user.as_str());
                }
                for (user, codenames) in &permissions.grants {
                    for codename in codenames {
                        table = table.grant(user.as_str(), codename.as_str());
                    }
                }
                Arc::new(table)
            }
        }
    }
}

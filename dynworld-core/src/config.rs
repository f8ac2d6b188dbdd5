use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Lifecycle settings, passed to the server at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Whether `create`/`load` are accepted at all.
    pub allow_creation: bool,
    /// Move deleted instance data under `deleted/` instead of removing it.
    pub archive_deleted_data: bool,
    /// Whether removal may proceed while the instance has occupants.
    pub evict_occupants: bool,
    pub enable_commands: bool,
    pub command_permission_level: u8,
    /// Seed for random identifiers; entropy when unset.
    pub id_seed: Option<u64>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            allow_creation: true,
            archive_deleted_data: false,
            evict_occupants: true,
            enable_commands: false,
            command_permission_level: 2,
            id_seed: None,
        }
    }
}

impl LifecycleConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }
}

use serde::Deserialize;
use std::path::Path;

use crate::arena::DEFAULT_ARENA_CAPACITY;
use crate::registry::DEFAULT_MAX_MODELS;
use crate::result::AllocationTracker;

/// Engine settings, usually read from a `corm.toml` file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Registry capacity.
    pub max_models: usize,
    /// Initial bytes reserved by the SQL arena.
    pub arena_capacity: usize,
    /// Initial ledger capacity of every result.
    pub result_capacity: usize,
    /// Enforce foreign keys after connecting and after a Drop sync.
    pub foreign_keys: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_models: DEFAULT_MAX_MODELS,
            arena_capacity: DEFAULT_ARENA_CAPACITY,
            result_capacity: AllocationTracker::DEFAULT_CAPACITY,
            foreign_keys: true,
        }
    }
}

impl Config {
    /// Read and parse a config file.
    pub fn from_file(path: &Path) -> Result<Config, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::from_str(&content)
    }

    /// Parse a config from TOML text. Missing keys keep their defaults.
    pub fn from_str(content: &str) -> Result<Config, String> {
        let config: Config =
            toml::from_str(content).map_err(|e| format!("Failed to parse config: {}", e))?;
        if config.max_models == 0 {
            return Err("max_models must be at least 1".to_string());
        }
        Ok(config)
    }
}

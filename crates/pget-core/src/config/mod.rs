pub mod types;

pub use types::*;

use crate::types::PgetError;
use std::path::{Path, PathBuf};

/// Loads and persists the TOML configuration file.
#[derive(Debug)]
pub struct ConfigManager {
    path: PathBuf,
    config: AppConfig,
}

impl ConfigManager {
    /// Load the config at `path`, writing a default file there first if
    /// none exists yet.
    pub fn load(path: &Path) -> Result<Self, PgetError> {
        let mut manager = Self {
            path: path.to_path_buf(),
            config: AppConfig::default(),
        };
        if path.exists() {
            manager.config = read_config(path)?;
        } else {
            manager.save()?;
        }
        Ok(manager)
    }

    /// Write the current config to the file path, creating its directory
    /// as needed.
    pub fn save(&self) -> Result<(), PgetError> {
        let rendered = toml::to_string_pretty(&self.config)
            .map_err(|e| PgetError::Config(format!("cannot serialize config: {e}")))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| config_err("create", parent, e))?;
        }
        std::fs::write(&self.path, rendered).map_err(|e| config_err("write", &self.path, e))
    }

    /// Returns a reference to the current configuration.
    pub fn get(&self) -> &AppConfig {
        &self.config
    }

    /// Validate the loaded config in place; returns clamp warnings.
    pub fn validate(&mut self) -> Vec<String> {
        self.config.validate()
    }

    /// Returns the config file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_config(path: &Path) -> Result<AppConfig, PgetError> {
    let contents = std::fs::read_to_string(path).map_err(|e| config_err("read", path, e))?;
    toml::from_str(&contents).map_err(|e| config_err("parse", path, e))
}

fn config_err(action: &str, path: &Path, err: impl std::fmt::Display) -> PgetError {
    PgetError::Config(format!("cannot {action} {}: {err}", path.display()))
}

//! JSON file configuration adapter.
//!
//! Implements [`ConfigPort`] on a single JSON document.  A missing file
//! loads as [`SessionConfig::default()`]; `save` validates first and writes
//! through a temporary file so a crash never leaves half a config behind.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::info;

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::SessionConfig;

pub struct JsonFileConfig {
    path: PathBuf,
}

impl JsonFileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigPort for JsonFileConfig {
    fn load(&self) -> Result<SessionConfig, ConfigError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Config: {} not found, using defaults", self.path.display());
                return Ok(SessionConfig::default());
            }
            Err(e) => return Err(ConfigError::IoError(e.to_string())),
        };
        let config: SessionConfig =
            serde_json::from_str(&text).map_err(|e| ConfigError::Corrupted(e.to_string()))?;
        config.validate()?;
        info!("Config: loaded {}", self.path.display());
        Ok(config)
    }

    fn save(&self, config: &SessionConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let text = serde_json::to_string_pretty(config)
            .map_err(|e| ConfigError::Corrupted(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text).map_err(|e| ConfigError::IoError(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }
}

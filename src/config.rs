//! Persistent settings
//!
//! Stored as pretty JSON under the user data directory. A missing or corrupt
//! file falls back to defaults so a bad config never keeps the app from
//! starting.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Slider step of the volume controls
pub const DEFAULT_VOLUME_STEP: f32 = 0.1;
/// Hardware events buffered between two drains of the registry
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 256;

const MIN_VOLUME_STEP: f32 = 0.01;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Amount one `step_volume` step moves the level
    pub volume_step: f32,
    pub event_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            volume_step: DEFAULT_VOLUME_STEP,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
        }
    }
}

impl Config {
    /// Read and sanitize a config file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config.sanitized())
    }

    /// Write with owner-only permissions
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        save_file_secure(path, &content)
    }

    /// Clamp out-of-range values to something usable
    pub fn sanitized(mut self) -> Self {
        self.volume_step = if self.volume_step.is_finite() {
            self.volume_step.clamp(MIN_VOLUME_STEP, 1.0)
        } else {
            DEFAULT_VOLUME_STEP
        };
        self.event_queue_capacity = self.event_queue_capacity.max(1);
        self
    }
}

// === FILE PATHS ===
pub fn get_data_dir() -> PathBuf {
    let home = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join("soundy-control")
}

pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.json")
}

/// Load the user config, falling back to defaults
pub fn load_config() -> Config {
    let config_path = get_config_path();
    if !config_path.exists() {
        return Config::default();
    }
    match Config::load_from(&config_path) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Ignoring config file: {}", e);
            Config::default()
        }
    }
}

pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    config.save_to(&get_config_path())
}

/// Write file with restricted permissions (0600 on Unix)
fn save_file_secure(path: &Path, content: &str) -> Result<(), ConfigError> {
    let io_err = |source: std::io::Error| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, content).map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path).map_err(io_err)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms).map_err(io_err)?;
    }

    Ok(())
}

//! Configuration system for the output bridge.
//!
//! Loads configuration from TOML file at `~/.config/porthole/config.toml`.
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::proto::{MAX_WINDOW_HEIGHT, MAX_WINDOW_WIDTH};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub output: OutputConfig,
    pub redraw: RedrawConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content)
            .context("Failed to parse config file")?;

        info!("Configuration loaded from {:?}", config_path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("porthole");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let default_config = Self::default();
        let toml_string = toml::to_string_pretty(&default_config)
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string)
            .context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// Virtual output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Custom mode declared before the first real commit, in pixels
    pub initial_width: u32,
    pub initial_height: u32,
    /// Declared refresh rate in millihertz
    pub refresh_mhz: u32,
    /// Largest geometry accepted from clients, in pixels
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            initial_width: 1280,
            initial_height: 720,
            refresh_mhz: 60_000,
            max_width: MAX_WINDOW_WIDTH,
            max_height: MAX_WINDOW_HEIGHT,
        }
    }
}

/// Redraw timer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedrawConfig {
    /// Delay before the deferred redraw pass, in milliseconds
    pub timer_ms: u64,
}

impl Default for RedrawConfig {
    fn default() -> Self {
        Self { timer_ms: 16 }
    }
}

impl RedrawConfig {
    pub fn timer_interval(&self) -> Duration {
        Duration::from_millis(self.timer_ms)
    }
}

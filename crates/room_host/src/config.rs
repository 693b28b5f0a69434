//! Configuration management for the room host.
//!
//! The configuration is a TOML file with four sections:
//!
//! ```toml
//! [room]
//! local_id = "host"
//! peer_count = 3
//!
//! [plugins]
//! directory = "plugins"
//! auto_load = false
//! whitelist = []
//! disabled = []
//!
//! [runtime]
//! slow_hook_warning_ms = 250
//!
//! [logging]
//! level = "info"
//! json_format = false
//! ```

use anyhow::{Context, Result};
use room_plugins::BUILTIN_PLUGIN_NAMES;
use room_runtime::RuntimeConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Largest mesh the demo will build.
pub const MAX_PEER_COUNT: usize = 32;

fn default_local_id() -> String {
    "host".to_string()
}

fn default_peer_count() -> usize {
    3
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub room: RoomSettings,
    pub plugins: PluginSettings,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    pub logging: LoggingSettings,
}

/// The rooms the host runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSettings {
    /// Id of the first room; the others get `-1`, `-2`... appended.
    /// Left empty, a random id is generated for every run.
    #[serde(default = "default_local_id")]
    pub local_id: String,
    /// Number of rooms in the demo mesh
    #[serde(default = "default_peer_count")]
    pub peer_count: usize,
}

/// Plugin loading configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Directory scanned for external plugin libraries
    pub directory: String,
    /// Whether to load external libraries at all
    pub auto_load: bool,
    /// If non-empty, only these external libraries are loaded
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// Built-in plugins that are not loaded
    #[serde(default)]
    pub disabled: Vec<String>,
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            room: RoomSettings {
                local_id: default_local_id(),
                peer_count: default_peer_count(),
            },
            plugins: PluginSettings {
                directory: "plugins".to_string(),
                auto_load: false,
                whitelist: vec![],
                disabled: vec![],
            },
            runtime: RuntimeConfig::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration there and
    /// returns it.
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        if !self.room.local_id.is_empty() && self.room.local_id.trim().is_empty() {
            return Err("Room local_id cannot be blank".to_string());
        }
        if self.room.peer_count == 0 || self.room.peer_count > MAX_PEER_COUNT {
            return Err(format!(
                "Room peer_count must be between 1 and {}, got {}",
                MAX_PEER_COUNT, self.room.peer_count
            ));
        }

        if self.plugins.auto_load && self.plugins.directory.is_empty() {
            return Err("Plugin directory cannot be empty".to_string());
        }
        if let Some(unknown) = self
            .plugins
            .disabled
            .iter()
            .find(|name| !BUILTIN_PLUGIN_NAMES.contains(&name.as_str()))
        {
            return Err(format!(
                "Cannot disable unknown built-in plugin: {}. Must be one of: {BUILTIN_PLUGIN_NAMES:?}",
                unknown
            ));
        }

        self.runtime.validate()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }
        Ok(())
    }
}

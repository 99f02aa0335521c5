//! # Configuration Management Module
//!
//! Configuration for the Pigeonbot process, loaded from a TOML file.
//!
//! ## Configuration Structure
//!
//! - [`BotConfig`] - bot identity and command prefix
//! - [`StorageConfig`] - data directory, pigeon database and optional country atlas
//! - [`LoggingConfig`] - log level and optional log file
//! - [`PigeonSettings`] - every tunable of the game engine (`[pigeon]`)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pigeonbot::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("config.toml").await?;
//!     let config = Config::load("config.toml").await?;
//!     println!("Pigeon price: {}", config.pigeon.pigeon_price);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [bot]
//! name = "Pigeonbot"
//! command_prefix = "!"
//!
//! [storage]
//! data_dir = "./data"
//!
//! [logging]
//! level = "info"
//! file = "pigeonbot.log"
//!
//! [pigeon]
//! stat_floor = 10
//! fight_delay_minutes = 5
//! ```
//!
//! Any section (and any key inside `[pigeon]`) may be omitted and falls back to
//! its default.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

use crate::pigeon::PigeonSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub name: String,
    /// Prefix in front of chat commands, e.g. `!pigeon explore`.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

fn default_command_prefix() -> String {
    "!".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Override for the pigeon Sled database; defaults to `<data_dir>/pigeons`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pigeon_db_path: Option<String>,
    /// JSON country table replacing the built-in atlas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atlas_file: Option<String>,
}

impl StorageConfig {
    pub fn pigeon_db_path(&self) -> PathBuf {
        match &self.pigeon_db_path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(&self.data_dir).join("pigeons"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl LoggingConfig {
    /// Configured level, falling back to `Info` for unknown names.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_bot")]
    pub bot: BotConfig,
    #[serde(default = "default_storage")]
    pub storage: StorageConfig,
    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub pigeon: PigeonSettings,
}

fn default_bot() -> BotConfig {
    BotConfig {
        name: "Pigeonbot".to_string(),
        command_prefix: default_command_prefix(),
    }
}

fn default_storage() -> StorageConfig {
    StorageConfig {
        data_dir: "./data".to_string(),
        pigeon_db_path: None,
        atlas_file: None,
    }
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: "info".to_string(),
        file: Some("pigeonbot.log".to_string()),
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config
            .pigeon
            .validate()
            .map_err(|e| anyhow!("Invalid [pigeon] section in {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bot: default_bot(),
            storage: default_storage(),
            logging: default_logging(),
            pigeon: PigeonSettings::default(),
        }
    }
}

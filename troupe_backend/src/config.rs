use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::activation::DEFAULT_TALKATIVENESS;
use crate::completion::DeliveryFlags;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Display name for messages the engine posts on the user's behalf.
    #[serde(default = "default_user_name")]
    pub user_name: String,

    // Auto mode
    #[serde(default)]
    pub auto_mode_enabled: bool,
    #[serde(default = "default_auto_mode_interval_secs")]
    pub auto_mode_interval_secs: u64,

    // Delivery modes of the generation backend
    #[serde(default)]
    pub streaming_enabled: bool,
    #[serde(default)]
    pub multigen_enabled: bool,

    // Activation
    #[serde(default = "default_talkativeness")]
    pub default_talkativeness: f32,
}

fn default_user_name() -> String {
    "You".to_string()
}

fn default_auto_mode_interval_secs() -> u64 {
    5
}

fn default_talkativeness() -> f32 {
    DEFAULT_TALKATIVENESS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_name: default_user_name(),
            auto_mode_enabled: false,
            auto_mode_interval_secs: default_auto_mode_interval_secs(),
            streaming_enabled: false,
            multigen_enabled: false,
            default_talkativeness: default_talkativeness(),
        }
    }
}

impl EngineConfig {
    /// Get the directory containing the executable
    fn get_base_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    /// Get the path to the config file (relative to executable)
    pub fn config_path() -> PathBuf {
        Self::get_base_dir().join("troupe_config.toml")
    }

    /// Load config from troupe_config.toml (next to executable), falling back to env vars
    pub fn load() -> Self {
        let path = Self::config_path();
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{:#}; using defaults + env vars", e);
                Self::from_env()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        let config = toml::from_str::<EngineConfig>(&contents)
            .with_context(|| format!("Failed to parse {:?}", path))?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save config to file (next to executable)
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, toml_string)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Load from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = env::var("TROUPE_USER_NAME") {
            if !name.trim().is_empty() {
                config.user_name = name;
            }
        }

        if let Ok(enabled) = env::var("TROUPE_AUTO_MODE") {
            config.auto_mode_enabled = parse_flag(&enabled);
        }

        if let Ok(interval) = env::var("TROUPE_AUTO_MODE_INTERVAL_SECS") {
            if let Ok(seconds) = interval.parse::<u64>() {
                if seconds > 0 {
                    config.auto_mode_interval_secs = seconds;
                }
            }
        }

        if let Ok(enabled) = env::var("TROUPE_STREAMING") {
            config.streaming_enabled = parse_flag(&enabled);
        }

        if let Ok(enabled) = env::var("TROUPE_MULTIGEN") {
            config.multigen_enabled = parse_flag(&enabled);
        }

        if let Ok(value) = env::var("TROUPE_DEFAULT_TALKATIVENESS") {
            if let Ok(talkativeness) = value.parse::<f32>() {
                if talkativeness.is_finite() {
                    config.default_talkativeness = talkativeness.clamp(0.0, 1.0);
                }
            }
        }

        config
    }

    pub fn delivery(&self) -> DeliveryFlags {
        DeliveryFlags {
            streaming: self.streaming_enabled,
            multigen: self.multigen_enabled,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("1")
        || value.eq_ignore_ascii_case("true")
        || value.eq_ignore_ascii_case("yes")
}

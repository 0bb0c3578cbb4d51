use crate::highlight::TargetSet;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A configuration value that passed parsing but cannot be used
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid flash color {0:?}: expected #RGB or #RRGGBB")]
    InvalidColor(String),

    #[error("invalid log level {0:?}: expected trace, debug, info, warn or error")]
    InvalidLogLevel(String),

    #[error("{field} = {value} is too large (maximum {max})")]
    OutOfRange {
        field: &'static str,
        value: u64,
        max: u64,
    },
}

/// Longest accepted idle timeout: one week
pub const MAX_IDLE_TIME_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Longest accepted flash on or off phase: one hour
pub const MAX_FLASH_PHASE_MS: u64 = 60 * 60 * 1000;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Flash appearance and cadence
    #[serde(default)]
    pub flash: FlashConfig,

    /// Inactivity detection
    #[serde(default)]
    pub idle: IdleConfig,

    /// Regions to highlight while flashing
    #[serde(default)]
    pub targets: TargetSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashConfig {
    /// Highlight color as a hex string
    #[serde(default = "default_color")]
    pub color: String,

    /// How long the highlight stays on (in milliseconds)
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,

    /// How long the highlight stays off between flashes (in milliseconds)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Number of flashes, 0 to flash until activity
    #[serde(default)]
    pub cycles: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdleConfig {
    /// Seconds without activity before flashing starts
    #[serde(default = "default_idle_time_seconds")]
    pub idle_time_seconds: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_color() -> String {
    "#FF0000".to_string()
}

fn default_duration_ms() -> u64 {
    500
}

fn default_interval_ms() -> u64 {
    500
}

fn default_idle_time_seconds() -> u64 {
    30
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            color: default_color(),
            duration_ms: default_duration_ms(),
            interval_ms: default_interval_ms(),
            cycles: 0,
        }
    }
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            idle_time_seconds: default_idle_time_seconds(),
        }
    }
}

/// Runtime view of the configuration read by the idle watcher and flash
/// controller
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Cosmetic only, never consulted by the state machine
    pub highlight_color: String,
    pub flash_duration: Duration,
    pub flash_interval: Duration,
    /// 0 means flash until cancelled
    pub max_cycles: u32,
    pub idle_timeout: Duration,
    pub targets: TargetSet,
}

impl Default for Settings {
    fn default() -> Self {
        Config::default().settings()
    }
}

fn is_valid_color(color: &str) -> bool {
    match color.strip_prefix('#') {
        Some(hex) => {
            matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

impl Config {
    /// Load configuration from file, or create default if not found
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(Self::default_config_path);

        let config: Config = if let Some(ref path) = config_path {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {:?}", path))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config from {:?}", path))?
            } else {
                Config::default()
            }
        } else {
            Config::default()
        };

        config
            .validate()
            .with_context(|| format!("Invalid config in {:?}", config_path))?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = path
            .map(PathBuf::from)
            .or_else(Self::default_config_path)
            .context("No config path available")?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config to {:?}", config_path))?;

        Ok(())
    }

    /// Check values that parse fine but cannot be used
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !is_valid_color(&self.flash.color) {
            return Err(ConfigError::InvalidColor(self.flash.color.clone()));
        }
        let level = self.general.log_level.to_ascii_lowercase();
        if !matches!(
            level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(ConfigError::InvalidLogLevel(self.general.log_level.clone()));
        }

        let limits = [
            ("flash.duration_ms", self.flash.duration_ms, MAX_FLASH_PHASE_MS),
            ("flash.interval_ms", self.flash.interval_ms, MAX_FLASH_PHASE_MS),
            (
                "idle.idle_time_seconds",
                self.idle.idle_time_seconds,
                MAX_IDLE_TIME_SECONDS,
            ),
        ];
        for (field, value, max) in limits {
            if value > max {
                return Err(ConfigError::OutOfRange { field, value, max });
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "heywake", "heywake")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Snapshot the values the idle watcher works from
    pub fn settings(&self) -> Settings {
        Settings {
            highlight_color: self.flash.color.clone(),
            flash_duration: Duration::from_millis(self.flash.duration_ms),
            flash_interval: Duration::from_millis(self.flash.interval_ms),
            max_cycles: self.flash.cycles,
            idle_timeout: Duration::from_secs(self.idle.idle_time_seconds),
            targets: self.targets,
        }
    }
}

//! Configuration file loading for game review.
//!
//! Settings come from a TOML file, `review.toml` in the current directory by
//! default. A missing file yields the defaults.

use chess_analysis::Band;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading or parsing configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Analysis engine settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EngineConfig {
    /// Engine executable. Defaults to "stockfish" (assumes it's in PATH).
    #[serde(default = "default_engine_path")]
    pub path: String,
    /// Think time per position in milliseconds. Defaults to 250.
    #[serde(default = "default_think_time_ms")]
    pub think_time_ms: u64,
    /// Extra time before a silent engine counts as hung. Defaults to 5000.
    #[serde(default = "default_timeout_grace_ms")]
    pub timeout_grace_ms: u64,
    /// Engine instances run in parallel, one game each. Defaults to 1.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// UCI options sent with `setoption` after start-up.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

fn default_engine_path() -> String {
    "stockfish".to_string()
}

fn default_think_time_ms() -> u64 {
    250
}

fn default_timeout_grace_ms() -> u64 {
    5000
}

fn default_workers() -> usize {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: default_engine_path(),
            think_time_ms: default_think_time_ms(),
            timeout_grace_ms: default_timeout_grace_ms(),
            workers: default_workers(),
            options: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn think_time(&self) -> Duration {
        Duration::from_millis(self.think_time_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.timeout_grace_ms)
    }
}

/// Which source records are kept.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    /// Accepted variants. Defaults to `["standard"]`.
    #[serde(default = "default_variants")]
    pub variants: Vec<String>,
    #[serde(default = "default_true")]
    pub rated_only: bool,
    #[serde(default = "default_true")]
    pub skip_anonymous: bool,
    #[serde(default = "default_true")]
    pub skip_ai: bool,
}

fn default_variants() -> Vec<String> {
    vec!["standard".to_string()]
}

fn default_true() -> bool {
    true
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            variants: default_variants(),
            rated_only: true,
            skip_anonymous: true,
            skip_ai: true,
        }
    }
}

/// Neutral band for first-bad-move detection, in centipawns.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct BlunderConfig {
    #[serde(default = "default_min_acceptable")]
    pub min_acceptable: f64,
    #[serde(default = "default_max_acceptable")]
    pub max_acceptable: f64,
}

fn default_min_acceptable() -> f64 {
    f64::NEG_INFINITY
}

fn default_max_acceptable() -> f64 {
    f64::INFINITY
}

impl BlunderConfig {
    pub fn band(&self) -> Band {
        Band::new(self.min_acceptable, self.max_acceptable)
    }
}

impl Default for BlunderConfig {
    fn default() -> Self {
        Self {
            min_acceptable: default_min_acceptable(),
            max_acceptable: default_max_acceptable(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ReviewConfig {
    /// Directory for the database and exports. Defaults to `data`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// SQLite database file. Defaults to `<data_dir>/review.db`.
    #[serde(default)]
    pub database: Option<PathBuf>,
    /// Plain-text log file written next to the console output.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub blunder: BlunderConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database: None,
            log_file: None,
            engine: EngineConfig::default(),
            filter: FilterConfig::default(),
            blunder: BlunderConfig::default(),
        }
    }
}

impl ReviewConfig {
    /// Loads the configuration from [`Self::config_path()`].
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path())
    }

    /// Loads the configuration at `path`, or the defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] if the file exists but cannot be read,
    /// [`ConfigError::ParseError`] for invalid TOML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config: Self = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Returns the default configuration file path.
    pub fn config_path() -> PathBuf {
        PathBuf::from("review.toml")
    }

    /// Resolved database location.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.data_dir.join("review.db"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.workers == 0 {
            return Err(ConfigError::Invalid("engine.workers must be at least 1".into()));
        }
        if self.engine.think_time_ms == 0 {
            return Err(ConfigError::Invalid(
                "engine.think_time_ms must be positive".into(),
            ));
        }
        if self.blunder.min_acceptable.is_nan()
            || self.blunder.max_acceptable.is_nan()
            || self.blunder.min_acceptable >= self.blunder.max_acceptable
        {
            return Err(ConfigError::Invalid(
                "blunder.min_acceptable must be below blunder.max_acceptable".into(),
            ));
        }
        Ok(())
    }
}

//! Service configuration loaded from YAML.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub classifier: ClassifierConfig,
    pub users: UsersConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_body_bytes: 64 * 1024,
        }
    }
}

/// `path: None` keeps every collection in memory only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
}

/// Which clinical entries of a patient the classifier looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierScope {
    #[default]
    Latest,
    Any,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub scope: ClassifierScope,
    pub thresholds: Thresholds,
}

/// Inclusive normal band; a reading outside it is a breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub min: i32,
    pub max: i32,
}

impl Band {
    pub const fn new(min: i32, max: i32) -> Self {
        Band { min, max }
    }

    pub fn contains(&self, value: i32) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub blood_pressure_high: Band,
    pub blood_pressure_low: Band,
    pub respiration_rate: Band,
    pub blood_oxygen_level: Band,
    pub heart_beat_rate: Band,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            blood_pressure_high: Band::new(90, 180),
            blood_pressure_low: Band::new(50, 120),
            respiration_rate: Band::new(8, 30),
            blood_oxygen_level: Band::new(92, 100),
            heart_beat_rate: Band::new(50, 120),
        }
    }
}

impl Thresholds {
    fn bands(&self) -> [(&'static str, Band); 5] {
        [
            ("blood_pressure_high", self.blood_pressure_high),
            ("blood_pressure_low", self.blood_pressure_low),
            ("respiration_rate", self.respiration_rate),
            ("blood_oxygen_level", self.blood_oxygen_level),
            ("heart_beat_rate", self.heart_beat_rate),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsersConfig {
    pub min_password_length: usize,
}

impl Default for UsersConfig {
    fn default() -> Self {
        UsersConfig { min_password_length: 8 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, band) in self.classifier.thresholds.bands() {
            if band.min > band.max {
                return Err(ConfigError::Invalid(format!(
                    "threshold {} has min {} above max {}",
                    name, band.min, band.max
                )));
            }
        }
        if self.api.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("api.max_body_bytes must be positive".to_string()));
        }
        Ok(())
    }
}

pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    match fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

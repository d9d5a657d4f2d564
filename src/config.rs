use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::archive::{WriterOptions, DEFAULT_MAX_CONCURRENT_WRITES};
use crate::browser::{
    CaptureOptions, DEFAULT_NAVIGATION_TIMEOUT, DEFAULT_NETWORK_IDLE_TIMEOUT,
    DEFAULT_PROCESS_TIMEOUT, DEFAULT_QUIET_PERIOD,
};
use crate::types::Viewport;

/// Environment variable overriding `output_root`.
pub const OUTPUT_DIR_ENV: &str = "OUTPUT_DIR";
pub const DEFAULT_OUTPUT_ROOT: &str = "./test-archives";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output_root: PathBuf,
    pub viewport: Viewport,
    pub node_command: String,
    pub headless: bool,
    pub max_concurrent_writes: usize,
    pub timeouts: Timeouts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    #[serde(with = "humantime_serde")]
    pub navigation: Duration,
    #[serde(with = "humantime_serde")]
    pub network_idle: Duration,
    #[serde(with = "humantime_serde")]
    pub process: Duration,
    /// Network silence required before a page counts as settled.
    #[serde(with = "humantime_serde")]
    pub quiet_period: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation: DEFAULT_NAVIGATION_TIMEOUT,
            network_idle: DEFAULT_NETWORK_IDLE_TIMEOUT,
            process: DEFAULT_PROCESS_TIMEOUT,
            quiet_period: DEFAULT_QUIET_PERIOD,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            viewport: Viewport::default(),
            node_command: "node".to_string(),
            headless: true,
            max_concurrent_writes: DEFAULT_MAX_CONCURRENT_WRITES,
            timeouts: Timeouts::default(),
        }
    }
}

impl Config {
    /// Load from an explicit path, else the central config file, else
    /// defaults. `OUTPUT_DIR` overrides `output_root` in every case.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::central_config_path().filter(|p| p.is_file()) {
                Some(central) => Self::from_file(&central)?,
                None => Self::default(),
            },
        };
        Ok(config.with_output_dir_override(std::env::var_os(OUTPUT_DIR_ENV).map(PathBuf::from)))
    }

    /// `~/.config/snaparc/config.toml`
    pub fn central_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config").join("snaparc").join("config.toml"))
    }

    /// Parse by extension: `.yaml`/`.yml` as YAML, anything else as TOML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        if is_yaml {
            Self::from_yaml(&contents)
        } else {
            Self::from_toml(&contents)
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn with_output_dir_override(mut self, output_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = output_dir.filter(|dir| !dir.as_os_str().is_empty()) {
            self.output_root = dir;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "viewport must be positive, got {}",
                self.viewport
            )));
        }
        if self.max_concurrent_writes == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_writes must be at least 1".to_string(),
            ));
        }
        if self.output_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("output_root must not be empty".to_string()));
        }
        let timeouts = [
            ("navigation", self.timeouts.navigation),
            ("network_idle", self.timeouts.network_idle),
            ("process", self.timeouts.process),
            ("quiet_period", self.timeouts.quiet_period),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, value)| value.is_zero()) {
            return Err(ConfigError::Invalid(format!(
                "timeouts.{name} must be greater than zero"
            )));
        }
        Ok(())
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            node_command: self.node_command.clone(),
            viewport: self.viewport,
            headless: self.headless,
            navigation_timeout: self.timeouts.navigation,
            network_idle_timeout: self.timeouts.network_idle,
            process_timeout: self.timeouts.process,
            quiet_period: self.timeouts.quiet_period,
            progress: None,
        }
    }

    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            max_concurrent_writes: self.max_concurrent_writes,
        }
    }
}

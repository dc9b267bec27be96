//! Capture configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via BLUEWIRE_CONFIG or --config)
//! 3. Environment variables

use bluewire_protocol::{DeviceAddress, FollowFilter};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Capture configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Serial transport configuration.
    pub transport: TransportConfig,
    /// Frame-level timing configuration.
    pub framing: FramingConfig,
    /// Target device to follow once seen, if any.
    pub follow: Option<FollowConfig>,
}

impl CaptureConfig {
    /// Loads configuration from file, then applies environment variable
    /// overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("BLUEWIRE_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: CaptureConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.transport.apply_env_overrides();
        self.framing.apply_env_overrides();

        if let Ok(addr) = std::env::var("BLUEWIRE_FOLLOW") {
            if let Ok(address) = addr.parse::<DeviceAddress>() {
                let follow = self.follow.get_or_insert_with(|| FollowConfig {
                    address,
                    filter: FollowFilter::default(),
                });
                follow.address = address;
            }
        }
        if let Some(ref mut follow) = self.follow {
            if let Ok(v) = std::env::var("BLUEWIRE_ADV_ONLY") {
                follow.filter.advertisements_only = is_truthy(&v);
            }
            if let Ok(v) = std::env::var("BLUEWIRE_LEGACY_ONLY") {
                follow.filter.legacy_only = is_truthy(&v);
            }
            if let Ok(v) = std::env::var("BLUEWIRE_CODED_ONLY") {
                follow.filter.coded_only = is_truthy(&v);
            }
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.device.is_empty() {
            return Err(ConfigError::ValidationError(
                "transport.device must not be empty".to_string(),
            ));
        }
        if self.transport.baud == 0 {
            return Err(ConfigError::ValidationError(
                "transport.baud must be non-zero".to_string(),
            ));
        }
        if self.framing.frame_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "framing.frame_timeout_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Serial transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Serial device path.
    pub device: String,
    /// Baud rate.
    pub baud: u32,
    /// Per-read timeout in milliseconds.
    pub read_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyACM0".to_string(),
            baud: 1_000_000,
            read_timeout_ms: 1000,
        }
    }
}

impl TransportConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(device) = std::env::var("BLUEWIRE_DEVICE") {
            self.device = device;
        }
        if let Ok(baud) = std::env::var("BLUEWIRE_BAUD") {
            if let Ok(b) = baud.parse() {
                self.baud = b;
            }
        }
        if let Ok(timeout) = std::env::var("BLUEWIRE_READ_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.read_timeout_ms = ms;
            }
        }
    }

    /// Returns the per-read timeout as Duration.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Frame-level timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingConfig {
    /// Per-frame deadline in milliseconds, covering both delimiter waits.
    pub frame_timeout_ms: u64,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            frame_timeout_ms: 5000,
        }
    }
}

impl FramingConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(timeout) = std::env::var("BLUEWIRE_FRAME_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.frame_timeout_ms = ms;
            }
        }
    }

    /// Returns the per-frame deadline as Duration.
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}

/// Follow target configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowConfig {
    /// Target device address, `XX:XX:XX:XX:XX:XX`.
    pub address: DeviceAddress,
    /// Capture filters sent with the follow request.
    #[serde(flatten)]
    pub filter: FollowFilter,
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

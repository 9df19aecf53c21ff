//! Application configuration
//!
//! Loaded from TOML. Every section has defaults matching the reference
//! peripheral, so a partial file (or none at all) is valid.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::audio::AmplitudeExtractor;
use crate::constants::*;
use crate::error::{Error, Result};

/// Wire protocol settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Largest frame the link accepts
    pub mtu: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            mtu: MAX_FRAME_SIZE,
        }
    }
}

/// Audio and brightness settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub window_ms: u32,
    pub brightness_scale: f64,
    /// Input device id; system default when unset
    pub input_device: Option<String>,
}

impl AudioConfig {
    /// Samples per brightness window
    pub fn window_size(&self) -> usize {
        (self.sample_rate as usize * self.window_ms as usize) / 1000
    }

    /// Track extractor for these settings
    pub fn extractor(&self) -> AmplitudeExtractor {
        AmplitudeExtractor::new(self.window_size()).with_scale(self.brightness_scale)
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            window_ms: WINDOW_MS,
            brightness_scale: BRIGHTNESS_SCALE,
            input_device: None,
        }
    }
}

/// Peripheral discovery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub timeout_secs: u64,
    pub beacon_port: u16,
}

impl ScanConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
            beacon_port: DEFAULT_BEACON_PORT,
        }
    }
}

/// Link endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub bind_address: SocketAddr,
    /// Peripheral to connect to; found by scanning when unset
    pub peripheral: Option<SocketAddr>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 0)),
            peripheral: None,
        }
    }
}

/// Transmission defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub motor_fast: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { motor_fast: true }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub protocol: ProtocolConfig,
    pub audio: AudioConfig,
    pub scan: ScanConfig,
    pub transport: TransportConfig,
    pub stream: StreamConfig,
}

impl AppConfig {
    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `config.toml` from the platform config directory, or defaults if absent
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "pulse-link").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.protocol.mtu <= HEADER_SIZE {
            return Err(Error::Config(format!(
                "mtu {} must exceed the {}-byte header",
                self.protocol.mtu, HEADER_SIZE
            )));
        }
        if self.audio.sample_rate != SAMPLE_RATE {
            return Err(Error::Config(format!(
                "sample rate must be {} Hz, got {}",
                SAMPLE_RATE, self.audio.sample_rate
            )));
        }
        if self.audio.window_size() == 0 {
            return Err(Error::Config("brightness window must be non-zero".into()));
        }
        if self.audio.brightness_scale.is_nan() || self.audio.brightness_scale <= 0.0 {
            return Err(Error::Config("brightness scale must be positive".into()));
        }
        Ok(())
    }
}

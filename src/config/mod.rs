//! Configuration for the territory editor service

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::heat::{ColorRamp, HeatSurfaceRenderer, InterpolationSettings, RampMode};
use crate::sampling::FetchSettings;

/// Main configuration, usually read from `fieldscope.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub heat: HeatConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatConfig {
    #[serde(default = "default_grid_size")]
    pub grid_size: u32,
    #[serde(default = "default_fallback_radius")]
    pub fallback_radius: u32,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default = "default_fallback_epsilon")]
    pub fallback_epsilon: f64,
    #[serde(default = "default_alpha")]
    pub alpha: u8,
    #[serde(default)]
    pub ramp: RampMode,
}

fn default_grid_size() -> u32 {
    50
}

fn default_fallback_radius() -> u32 {
    3
}

fn default_epsilon() -> f64 {
    0.01
}

fn default_fallback_epsilon() -> f64 {
    0.1
}

fn default_alpha() -> u8 {
    crate::heat::DEFAULT_ALPHA
}

impl Default for HeatConfig {
    fn default() -> Self {
        Self {
            grid_size: default_grid_size(),
            fallback_radius: default_fallback_radius(),
            epsilon: default_epsilon(),
            fallback_epsilon: default_fallback_epsilon(),
            alpha: default_alpha(),
            ramp: RampMode::default(),
        }
    }
}

impl HeatConfig {
    pub fn interpolation(&self) -> InterpolationSettings {
        InterpolationSettings {
            grid_size: self.grid_size,
            fallback_radius: self.fallback_radius,
            epsilon: self.epsilon,
            fallback_epsilon: self.fallback_epsilon,
        }
    }

    pub fn renderer(&self) -> HeatSurfaceRenderer {
        HeatSurfaceRenderer::new(ColorRamp::temperature(self.ramp), self.alpha)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_batch_size() -> usize {
    15
}

fn default_batch_pause_ms() -> u64 {
    50
}

fn default_debounce_ms() -> u64 {
    250
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl SamplingConfig {
    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            batch_size: self.batch_size,
            batch_pause: Duration::from_millis(self.batch_pause_ms),
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_store_key")]
    pub key: String,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_store_key() -> String {
    "territories".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            key: default_store_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Falls back to defaults when the file does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_yaml(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_yaml(&self, path: impl AsRef<Path>) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;
        Ok(())
    }
}

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{elog_debug, Error, Result};

/// How nested per-direction transactions of an exchange task are seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeOrdering {
    /// Each direction is seeded by the previous direction's event.
    #[default]
    Serialized,
    /// Every direction is seeded by the transaction event captured at init.
    Concurrent,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TransportConfig {
    /// Artificial delivery delay of the loopback transport, in microseconds.
    #[serde(default)]
    pub latency_us: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    #[serde(default = "default_device_lanes")]
    pub device_lanes: usize,
    /// Fill values at least this many bytes wide are staged through memory.
    #[serde(default = "default_small_value_threshold")]
    pub small_value_threshold: usize,
    /// Elements along x handled by one execution group of a fill kernel.
    #[serde(default = "default_fill_chunk_size")]
    pub fill_chunk_size: usize,
    #[serde(default)]
    pub exchange_ordering: ExchangeOrdering,
    /// Sleep between idle ticks while waiting on an event.
    #[serde(default = "default_idle_backoff_us")]
    pub idle_backoff_us: u64,
    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_device_lanes() -> usize {
    4
}

fn default_small_value_threshold() -> usize {
    256
}

fn default_fill_chunk_size() -> usize {
    256
}

fn default_idle_backoff_us() -> u64 {
    20
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            device_lanes: default_device_lanes(),
            small_value_threshold: default_small_value_threshold(),
            fill_chunk_size: default_fill_chunk_size(),
            exchange_ordering: ExchangeOrdering::default(),
            idle_backoff_us: default_idle_backoff_us(),
            transport: TransportConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn eventsys_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".eventsys"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::eventsys_dir()?.join("eventsys.toml"))
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_micros(self.idle_backoff_us)
    }

    pub fn transport_latency(&self) -> Duration {
        Duration::from_micros(self.transport.latency_us)
    }

    /// Load from the default location, falling back to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        elog_debug!("SchedulerConfig::load path={}", path.display());
        if !path.exists() {
            elog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        elog_debug!(
            "Config loaded: device_lanes={}, small_value_threshold={}, fill_chunk_size={}, ordering={:?}",
            config.device_lanes,
            config.small_value_threshold,
            config.fill_chunk_size,
            config.exchange_ordering
        );
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        elog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.device_lanes == 0 {
            return Err(Error::Validation(
                "device_lanes must be at least 1".to_string(),
            ));
        }
        if self.fill_chunk_size == 0 {
            return Err(Error::Validation(
                "fill_chunk_size must be at least 1".to_string(),
            ));
        }
        if self.small_value_threshold == 0 {
            return Err(Error::Validation(
                "small_value_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

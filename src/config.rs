use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use log::LevelFilter;
use serde::Deserialize;

use crate::reading::RowLayout;

pub const CONFIG_FILE: &str = "./sheet-logger.toml";

pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD_RATE: u32 = 115200;
pub const DEFAULT_CREDENTIALS: &str = "credentials.json";
pub const DEFAULT_SHEET_NAME: &str = "Temperature and Humidity Log";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub serial: SerialConfig,
    pub sheet: SheetConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialConfig {
    pub port: PathBuf,
    pub baud_rate: u32,
    /// Delay after opening the port while the device resets.
    pub settle_ms: u64,
    /// Sleep between polls when no bytes are waiting.
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SheetConfig {
    pub credentials: PathBuf,
    pub name: String,
    pub layout: RowLayout,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub level: LevelFilter,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: PathBuf::from(DEFAULT_PORT),
            baud_rate: DEFAULT_BAUD_RATE,
            settle_ms: 2000,
            poll_interval_ms: 10,
        }
    }
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            credentials: PathBuf::from(DEFAULT_CREDENTIALS),
            name: DEFAULT_SHEET_NAME.to_string(),
            layout: RowLayout::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
        }
    }
}

impl SerialConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, anyhow::Error> {
        toml::from_str(content).context("Failed to parse config")
    }

    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Loads `path` if given, otherwise the default config file when it
    /// exists. Without either, every setting takes its default.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, anyhow::Error> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(CONFIG_FILE).exists() => Self::load(Path::new(CONFIG_FILE)),
            None => Ok(Self::default()),
        }
    }
}

//! Configuration parsing for the futures bot.
//!
//! The runner reads a single JSON config file. This module defines the
//! sections shared by every crate (engine tunables and logging) plus a generic
//! loader; the exchange section is owned by the trading client crate.
//!
//! # Example config
//!
//! ```json
//! {
//!   "binance": { "api_key": "...", "secret_key": "...", "testnet": true },
//!   "engine": { "poll_interval_ms": 1000, "quantity_precision": 3 },
//!   "log": { "level": "info", "dir": "/tmp/log", "module_name": "fbot" }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Strategy engine tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Status poll interval while confirming a TWAP slice.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on how long a TWAP slice is awaited before moving on.
    #[serde(default = "default_fill_timeout_secs")]
    pub fill_timeout_secs: u64,

    /// Fill-detection poll interval for grid runs.
    #[serde(default = "default_grid_poll_interval_ms")]
    pub grid_poll_interval_ms: u64,

    /// Status poll interval for OCO supervision.
    #[serde(default = "default_oco_poll_interval_ms")]
    pub oco_poll_interval_ms: u64,

    /// Decimal places quantities are rounded down to.
    #[serde(default = "default_quantity_precision")]
    pub quantity_precision: u32,

    /// Decimal places grid level prices are rounded to.
    #[serde(default = "default_price_precision")]
    pub price_precision: u32,
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn fill_timeout(&self) -> Duration {
        Duration::from_secs(self.fill_timeout_secs)
    }

    pub fn grid_poll_interval(&self) -> Duration {
        Duration::from_millis(self.grid_poll_interval_ms)
    }

    pub fn oco_poll_interval(&self) -> Duration {
        Duration::from_millis(self.oco_poll_interval_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            fill_timeout_secs: default_fill_timeout_secs(),
            grid_poll_interval_ms: default_grid_poll_interval_ms(),
            oco_poll_interval_ms: default_oco_poll_interval_ms(),
            quantity_precision: default_quantity_precision(),
            price_precision: default_price_precision(),
        }
    }
}

/// Logging section.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily-rotating log files (console only when absent).
    #[serde(default)]
    pub dir: Option<String>,

    /// Log file prefix.
    #[serde(default = "default_module_name")]
    pub module_name: String,

    /// Write the file layer as JSON lines.
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            module_name: default_module_name(),
            json: false,
        }
    }
}

/// Load and parse a JSON config file into any deserializable config type.
pub fn load_config<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: T = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Defaults (used by serde)
// ---------------------------------------------------------------------------

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_fill_timeout_secs() -> u64 {
    60
}

fn default_grid_poll_interval_ms() -> u64 {
    5000 // the grid fill check runs every 5 s
}

fn default_oco_poll_interval_ms() -> u64 {
    2000
}

fn default_quantity_precision() -> u32 {
    3 // BTCUSDT perpetual step size is 0.001
}

fn default_price_precision() -> u32 {
    2
}

fn default_log_level() -> String {
    "info".into()
}

fn default_module_name() -> String {
    "fbot".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_engine_section_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
        assert_eq!(cfg.grid_poll_interval(), Duration::from_secs(5));
        assert_eq!(cfg.quantity_precision, 3);
    }

    #[test]
    fn partial_log_section_keeps_module_name() {
        let cfg: LogConfig = serde_json::from_str(r#"{"level":"debug","json":true}"#).unwrap();
        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.module_name, "fbot");
        assert!(cfg.json);
        assert!(cfg.dir.is_none());
    }
}

//! Configuration types for binance-collector

use crate::collector::RetryPolicy;
use crate::data::Codec;
use crate::feed::{BinanceConfig, BINANCE_API_URL, MAX_TRADES_LIMIT};
use crate::orderbook::check_settings;
use crate::schema::DEFAULT_MAX_REJECT_RATIO;
use crate::telemetry::LogFormat;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub trades: TradesConfig,
    #[serde(default)]
    pub orderbook: OrderBookConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            source: SourceConfig::default(),
            retry: RetryConfig::default(),
            trades: TradesConfig::default(),
            orderbook: OrderBookConfig::default(),
            validation: ValidationConfig::default(),
            storage: StorageConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Exchange REST source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Trades per `aggTrades` page (at most 1000)
    #[serde(default = "default_trades_page_limit")]
    pub trades_page_limit: usize,
    #[serde(default = "default_max_pages_per_cycle")]
    pub max_pages_per_cycle: usize,
    /// Raw levels requested per depth snapshot
    #[serde(default = "default_depth_limit")]
    pub depth_limit: usize,
    /// How far back to start when no trades are stored yet
    #[serde(default = "default_initial_lookback_hours")]
    pub initial_lookback_hours: u64,
}

fn default_base_url() -> String {
    BINANCE_API_URL.to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_trades_page_limit() -> usize {
    MAX_TRADES_LIMIT
}
fn default_max_pages_per_cycle() -> usize {
    100
}
fn default_depth_limit() -> usize {
    1000
}
fn default_initial_lookback_hours() -> u64 {
    24
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            trades_page_limit: default_trades_page_limit(),
            max_pages_per_cycle: default_max_pages_per_cycle(),
            depth_limit: default_depth_limit(),
            initial_lookback_hours: default_initial_lookback_hours(),
        }
    }
}

impl SourceConfig {
    pub fn binance_config(&self) -> BinanceConfig {
        BinanceConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Retry policy for transient fetch failures
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// Trade collection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TradesConfig {
    #[serde(default = "default_trades_interval_secs")]
    pub interval_secs: u64,
    /// Rows kept in the hot file
    #[serde(default = "default_trades_hot_window")]
    pub hot_window: usize,
}

fn default_trades_interval_secs() -> u64 {
    60
}
fn default_trades_hot_window() -> usize {
    1024
}

impl Default for TradesConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_trades_interval_secs(),
            hot_window: default_trades_hot_window(),
        }
    }
}

/// Order book collection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookConfig {
    #[serde(default = "default_orderbook_interval_secs")]
    pub interval_secs: u64,
    /// Minimum time between two stored snapshots of a symbol
    #[serde(default = "default_min_spacing_secs")]
    pub min_spacing_secs: u64,
    /// Bucketed levels kept per side
    #[serde(default = "default_num_levels")]
    pub num_levels: usize,
    /// Snapshots kept in the hot file (times the number of tick sizes)
    #[serde(default = "default_hot_snapshots")]
    pub hot_snapshots: usize,
    #[serde(default = "default_tick_sizes")]
    pub tick_sizes: BTreeMap<String, Vec<f64>>,
}

fn default_orderbook_interval_secs() -> u64 {
    30
}
fn default_min_spacing_secs() -> u64 {
    10
}
fn default_num_levels() -> usize {
    15
}
fn default_hot_snapshots() -> usize {
    200
}

/// Fallback tick size for symbols without an entry
pub const FALLBACK_TICK_SIZE: f64 = 1.0;

fn default_tick_sizes() -> BTreeMap<String, Vec<f64>> {
    [
        ("BTCUSDT", vec![10.0, 50.0, 100.0, 1000.0]),
        ("ETHUSDT", vec![1.0, 10.0]),
        ("BNBUSDT", vec![0.1, 1.0]),
        ("SOLUSDT", vec![0.01, 0.1, 1.0]),
        ("ADAUSDT", vec![0.0001, 0.001]),
        ("XRPUSDT", vec![0.001, 0.01]),
    ]
    .into_iter()
    .map(|(symbol, ticks)| (symbol.to_string(), ticks))
    .collect()
}

impl Default for OrderBookConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_orderbook_interval_secs(),
            min_spacing_secs: default_min_spacing_secs(),
            num_levels: default_num_levels(),
            hot_snapshots: default_hot_snapshots(),
            tick_sizes: default_tick_sizes(),
        }
    }
}

impl OrderBookConfig {
    /// Tick sizes for `symbol`, falling back to a single unit tick
    pub fn tick_sizes_for(&self, symbol: &str) -> Vec<f64> {
        match self.tick_sizes.get(symbol) {
            Some(ticks) => ticks.clone(),
            None => {
                tracing::warn!(
                    symbol,
                    tick_size = FALLBACK_TICK_SIZE,
                    "No tick sizes configured, using fallback"
                );
                vec![FALLBACK_TICK_SIZE]
            }
        }
    }
}

/// Row validation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    /// Largest share of rejected rows a batch may have before it fails
    #[serde(default = "default_max_reject_ratio")]
    pub max_reject_ratio: f64,
}

fn default_max_reject_ratio() -> f64 {
    DEFAULT_MAX_REJECT_RATIO
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_reject_ratio: default_max_reject_ratio(),
        }
    }
}

/// Dataset storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
    #[serde(default)]
    pub compression: Codec,
}

fn default_base_path() -> PathBuf {
    PathBuf::from("data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            compression: Codec::default(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus exporter port; disabled when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Apply `BINANCE_BASE_URL`, `STORAGE_BASE_PATH` and `STORAGE_COMPRESSION`
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = var("BINANCE_BASE_URL") {
            self.source.base_url = url;
        }
        if let Some(path) = var("STORAGE_BASE_PATH") {
            self.storage.base_path = PathBuf::from(path);
        }
        if let Some(codec) = var("STORAGE_COMPRESSION") {
            self.storage.compression = codec.parse().map_err(ConfigError::Invalid)?;
        }
        Ok(())
    }

    /// Check cross-field constraints
    /// Uppercase symbols and tick size keys, the form the exchange reports
    pub fn normalize(&mut self) {
        let mut seen = Vec::with_capacity(self.symbols.len());
        for symbol in self.symbols.drain(..) {
            let symbol = symbol.to_ascii_uppercase();
            if !seen.contains(&symbol) {
                seen.push(symbol);
            }
        }
        self.symbols = seen;

        self.orderbook.tick_sizes = std::mem::take(&mut self.orderbook.tick_sizes)
            .into_iter()
            .map(|(symbol, ticks)| (symbol.to_ascii_uppercase(), ticks))
            .collect();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::Invalid("no symbols configured".into()));
        }
        for symbol in &self.symbols {
            if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(ConfigError::Invalid(format!("invalid symbol {symbol:?}")));
            }
        }
        if !(1..=MAX_TRADES_LIMIT).contains(&self.source.trades_page_limit) {
            return Err(ConfigError::Invalid(format!(
                "trades_page_limit must be between 1 and {MAX_TRADES_LIMIT}"
            )));
        }
        if self.source.max_pages_per_cycle == 0 {
            return Err(ConfigError::Invalid("max_pages_per_cycle must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.validation.max_reject_ratio) {
            return Err(ConfigError::Invalid(
                "validation.max_reject_ratio must be within [0, 1]".into(),
            ));
        }
        for (symbol, ticks) in &self.orderbook.tick_sizes {
            check_settings(symbol, ticks, self.orderbook.num_levels)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        if self.orderbook.num_levels == 0 {
            return Err(ConfigError::Invalid("orderbook.num_levels must be positive".into()));
        }
        if self.trades.interval_secs == 0 {
            return Err(ConfigError::Invalid("trades.interval_secs must be positive".into()));
        }
        if self.orderbook.interval_secs == 0 {
            return Err(ConfigError::Invalid("orderbook.interval_secs must be positive".into()));
        }
        Ok(())
    }
}

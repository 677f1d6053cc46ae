//! Configuration loading

use binance_collector::config::{Config, ConfigError};
use binance_collector::data::Codec;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_example_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml.example");
    let config = Config::load(path).unwrap();

    assert_eq!(config.symbols, vec!["BTCUSDT", "ETHUSDT"]);
    assert_eq!(config.orderbook.tick_sizes_for("BTCUSDT"), vec![10.0, 50.0, 100.0, 1000.0]);
    assert_eq!(config.source.trades_page_limit, 1000);
}

#[test]
fn test_partial_config_uses_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "symbols = [\"SOLUSDT\"]\n\n[storage]\ncompression = \"zstd\"").unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.symbols, vec!["SOLUSDT"]);
    assert_eq!(config.storage.compression, Codec::Zstd);
    assert_eq!(config.orderbook.tick_sizes_for("SOLUSDT"), vec![0.01, 0.1, 1.0]);
    assert_eq!(config.retry.max_attempts, 3);
}

#[test]
fn test_invalid_config_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "symbols = []").unwrap();
    assert!(matches!(Config::load(file.path()), Err(ConfigError::Invalid(_))));

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[trades]\ninterval_secs = 0").unwrap();
    assert!(matches!(Config::load(file.path()), Err(ConfigError::Invalid(_))));

    assert!(matches!(
        Config::load("/nonexistent/collector.toml"),
        Err(ConfigError::Io { .. })
    ));
}

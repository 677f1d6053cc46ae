//! Collector cycles against a replayed market

use crate::raw_trade;
use binance_collector::collector::{
    Collector, CycleOutcome, OrderBookCollector, OrderBookSettings, TradeCollector, TradeSettings,
};
use binance_collector::config::Config;
use binance_collector::data::{Codec, DataQuery, DatasetStore};
use binance_collector::feed::{RawDepth, ReplaySource};
use binance_collector::schema::{BookRow, TradeRow};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

fn trade_collector(source: Arc<ReplaySource>, store: DatasetStore) -> TradeCollector {
    let mut settings = TradeSettings::from_config(&Config::default());
    settings.page_limit = 40;
    settings.page_pause = Duration::ZERO;
    TradeCollector::new(source, store, settings)
}

fn depth() -> RawDepth {
    let level = |p: &str, q: &str| [p.to_string(), q.to_string()];
    RawDepth {
        last_update_id: 77,
        bids: vec![level("42005.10", "0.4"), level("41990.00", "1.1"), level("41870.00", "3.0")],
        asks: vec![level("42006.00", "0.2"), level("42049.90", "0.9"), level("42300.00", "2.5")],
    }
}

#[tokio::test]
async fn test_overlapping_cycles_store_each_trade_once() {
    let temp_dir = TempDir::new().unwrap();
    let store = DatasetStore::new(temp_dir.path(), Codec::Snappy);
    let source = Arc::new(ReplaySource::new());
    let collector = trade_collector(source.clone(), store.clone());

    source.push_trades("BTCUSDT", (1..=100).map(raw_trade));
    let first = collector.update().await;
    assert_eq!(first["BTCUSDT"].rows_written, 100);
    assert_eq!(first["ETHUSDT"].outcome, CycleOutcome::Completed);
    assert_eq!(first["ETHUSDT"].rows_written, 0);

    // the exchange resends part of the history alongside new trades
    source.push_trades("BTCUSDT", (50..=150).map(raw_trade));
    let second = collector.update().await;
    assert_eq!(second["BTCUSDT"].rows_fetched, 50);
    assert_eq!(second["BTCUSDT"].rows_written, 50);

    let rows: Vec<TradeRow> = store.read("BTCUSDT", &DataQuery::all()).unwrap();
    let ids: Vec<i64> = rows.iter().map(|t| t.trade_id).collect();
    assert_eq!(ids, (1..=150).collect::<Vec<_>>());

    let state = collector.states().get("BTCUSDT").await.unwrap();
    assert_eq!(state.consecutive_failures, 0);
    assert_eq!(state.last_report.unwrap().rows_written, 50);
}

#[tokio::test]
async fn test_orderbook_snapshot_from_default_config() {
    let temp_dir = TempDir::new().unwrap();
    let store = DatasetStore::new(temp_dir.path(), Codec::Snappy);
    let source = Arc::new(ReplaySource::new());
    source.push_depth("BTCUSDT", depth());
    source.push_depth("ETHUSDT", depth());

    let config = Config::default();
    let settings = OrderBookSettings::from_config(&config);
    let collector = OrderBookCollector::new(source.clone(), store.clone(), settings);

    let reports = collector.update().await;
    // BTCUSDT has four default tick sizes, ETHUSDT two
    assert_eq!(reports["BTCUSDT"].rows_written, 4);
    assert_eq!(reports["ETHUSDT"].rows_written, 2);

    let ticks = config.orderbook.tick_sizes_for("BTCUSDT");
    let rows: Vec<BookRow> = store
        .read_book("BTCUSDT", &DataQuery::all().with_tick_size(100.0), &ticks)
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].num_levels(), 15);
    assert_eq!(rows[0].timestamp.timestamp_subsec_nanos() % 1_000_000, 0);
    assert_eq!(rows[0].best_bid, Some(42000.0));
    assert_eq!(rows[0].best_ask, Some(42100.0));

    // within the minimum spacing nothing new is taken
    let again = collector.update().await;
    assert_eq!(again["BTCUSDT"].outcome, CycleOutcome::Skipped);
    assert_eq!(source.requests(), 2);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let temp_dir = TempDir::new().unwrap();
    let store = DatasetStore::new(temp_dir.path(), Codec::Snappy);
    let source = Arc::new(ReplaySource::new());
    source.push_trades("BTCUSDT", (1..=10).map(raw_trade));

    let collector: Arc<dyn Collector> = Arc::new(trade_collector(source, store.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn({
        let collector = collector.clone();
        async move { collector.run(shutdown_rx).await }
    });

    // first tick fires immediately
    let mut stored = 0;
    for _ in 0..100 {
        stored = store.read::<TradeRow>("BTCUSDT", &DataQuery::all()).unwrap().len();
        if stored == 10 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(stored, 10);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

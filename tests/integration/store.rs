//! Dataset store behaviour across handles and threads

use crate::trade;
use binance_collector::data::{Codec, DataQuery, DatasetStore};
use binance_collector::schema::{DataKind, TradeRow};
use std::thread;
use tempfile::TempDir;

fn ids(rows: &[TradeRow]) -> Vec<i64> {
    rows.iter().map(|t| t.trade_id).collect()
}

#[test]
fn test_overlapping_appends_store_each_trade_once() {
    let temp_dir = TempDir::new().unwrap();
    let store = DatasetStore::new(temp_dir.path(), Codec::Snappy);

    let first = store.append("BTCUSDT", (1..=100).map(trade).collect()).unwrap();
    assert_eq!(first.rows_written, 100);

    let second = store.append("BTCUSDT", (50..=150).map(trade).collect()).unwrap();
    assert_eq!(second.rows_written, 50);
    assert_eq!(second.rows_skipped, 51);

    let rows: Vec<TradeRow> = store.read("BTCUSDT", &DataQuery::all()).unwrap();
    assert_eq!(ids(&rows), (1..=150).collect::<Vec<_>>());
}

#[test]
fn test_second_handle_sees_committed_rows() {
    let temp_dir = TempDir::new().unwrap();
    let writer = DatasetStore::new(temp_dir.path(), Codec::Zstd);
    let reader = DatasetStore::new(temp_dir.path(), Codec::Snappy);

    writer.append("ETHUSDT", (1..=20).map(trade).collect()).unwrap();

    let rows: Vec<TradeRow> = reader.read("ETHUSDT", &DataQuery::all()).unwrap();
    assert_eq!(rows.len(), 20);
    assert_eq!(reader.last_row::<TradeRow>("ETHUSDT").unwrap().unwrap().trade_id, 20);
}

#[test]
fn test_concurrent_writers_lose_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let store = DatasetStore::new(temp_dir.path(), Codec::Snappy);

    // every worker opens its own handle on the same directory
    let handles: Vec<_> = (0..4i64)
        .map(|worker| {
            let base = temp_dir.path().to_path_buf();
            thread::spawn(move || {
                let store = DatasetStore::new(base, Codec::Snappy);
                for batch in 0..5i64 {
                    let start = worker * 100 + batch * 20 + 1;
                    store
                        .append("BTCUSDT", (start..start + 20).map(trade).collect())
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let rows: Vec<TradeRow> = store.read("BTCUSDT", &DataQuery::all()).unwrap();
    assert_eq!(rows.len(), 400);
    assert!(rows.windows(2).all(|w| w[0].trade_id < w[1].trade_id));
}

#[test]
fn test_time_range_query() {
    let temp_dir = TempDir::new().unwrap();
    let store = DatasetStore::new(temp_dir.path(), Codec::Snappy);
    store.append("BTCUSDT", (1..=40).map(trade).collect()).unwrap();

    let query = DataQuery::between(trade(10).timestamp, trade(19).timestamp).with_limit(5);
    let rows: Vec<TradeRow> = store.read("BTCUSDT", &query).unwrap();
    // the limit keeps the newest matches
    assert_eq!(ids(&rows), vec![15, 16, 17, 18, 19]);
}

#[test]
fn test_listing_ignores_hot_and_staging_files() {
    let temp_dir = TempDir::new().unwrap();
    let store = DatasetStore::new(temp_dir.path(), Codec::Snappy);

    store.append("BTCUSDT", (1..=5).map(trade).collect()).unwrap();
    store.append("ETHUSDT", (1..=5).map(trade).collect()).unwrap();
    store.maintain_hot::<TradeRow>("BTCUSDT", 3).unwrap();
    std::fs::write(
        temp_dir.path().join("trades").join(".staging-abc.parquet"),
        b"partial",
    )
    .unwrap();

    assert_eq!(store.symbols(DataKind::Trades).unwrap(), vec!["BTCUSDT", "ETHUSDT"]);

    let info = store.file_info(DataKind::Trades, "BTCUSDT").unwrap().unwrap();
    assert_eq!(info.rows, 5);
    assert_eq!(info.hot_rows, 3);
    assert!(store.file_info(DataKind::OrderBook, "BTCUSDT").unwrap().is_none());
}

//! Store-to-store sync

use crate::trade;
use binance_collector::data::{Codec, DataQuery, DatasetStore};
use binance_collector::schema::{DataKind, TradeRow};
use binance_collector::sync::{HotWindows, SyncEngine};
use tempfile::TempDir;
use tokio_test::assert_ok;

#[tokio::test]
async fn test_sync_resumes_after_partial_copy() {
    let temp_dir = TempDir::new().unwrap();
    let remote = DatasetStore::new(temp_dir.path().join("primary"), Codec::Zstd);
    let local = DatasetStore::new(temp_dir.path().join("replica"), Codec::Snappy);

    remote.append("BTCUSDT", (1..=300).map(trade).collect()).unwrap();
    // an earlier sync stopped part way
    local.append("BTCUSDT", (1..=120).map(trade).collect()).unwrap();

    let hot = HotWindows {
        trades: 25,
        ..HotWindows::default()
    };
    let engine = SyncEngine::new(remote.clone(), local.clone(), hot);
    let written = assert_ok!(engine.sync_dataset(DataKind::Trades, "BTCUSDT", false).await);
    assert_eq!(written, 180);

    let copied: Vec<TradeRow> = local.read("BTCUSDT", &DataQuery::all()).unwrap();
    let source: Vec<TradeRow> = remote.read("BTCUSDT", &DataQuery::all()).unwrap();
    assert_eq!(copied, source);
    assert_eq!(local.read_hot::<TradeRow>("BTCUSDT").unwrap().len(), 25);

    // nothing new upstream
    assert_eq!(engine.sync_dataset(DataKind::Trades, "BTCUSDT", false).await.unwrap(), 0);
}

#[tokio::test]
async fn test_hot_sync_leaves_main_dataset_alone() {
    let temp_dir = TempDir::new().unwrap();
    let remote = DatasetStore::new(temp_dir.path().join("primary"), Codec::Snappy);
    let local = DatasetStore::new(temp_dir.path().join("replica"), Codec::Snappy);

    remote.append("ETHUSDT", (1..=60).map(trade).collect()).unwrap();
    remote.maintain_hot::<TradeRow>("ETHUSDT", 10).unwrap();

    let engine = SyncEngine::new(remote, local.clone(), HotWindows::default());
    assert_eq!(engine.sync_dataset(DataKind::Trades, "ETHUSDT", true).await.unwrap(), 10);

    assert!(local.read::<TradeRow>("ETHUSDT", &DataQuery::all()).unwrap().is_empty());
    let hot: Vec<TradeRow> = local.read_hot("ETHUSDT").unwrap();
    assert_eq!(hot.first().map(|t| t.trade_id), Some(51));
}

//! Row types the dataset store knows how to persist

use super::parquet::{books_from_batch, books_to_batch, trades_from_batch, trades_to_batch};
use super::{Cursor, StoreError};
use crate::schema::{BookRow, DataKind, TradeRow};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// A storable row with a natural deduplication key.
///
/// Datasets are kept sorted ascending by `key()` and hold at most one row
/// per key.
pub trait Record: Clone + Debug + Send + Sync + Sized + 'static {
    /// Dataset family this row belongs to
    const KIND: DataKind;

    /// Deduplication and ordering key
    type Key: Ord + Copy + Debug + Send;

    fn key(&self) -> Self::Key;

    fn timestamp(&self) -> DateTime<Utc>;

    fn symbol(&self) -> &str;

    /// Cursor that admits only rows strictly after this one
    fn cursor(&self) -> Cursor;

    /// Tick size for rows that carry one
    fn tick_size(&self) -> Option<f64> {
        None
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch, StoreError>;

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, StoreError>;
}

impl Record for TradeRow {
    const KIND: DataKind = DataKind::Trades;
    type Key = i64;

    fn key(&self) -> i64 {
        self.trade_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn cursor(&self) -> Cursor {
        Cursor::TradeId(self.trade_id)
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch, StoreError> {
        trades_to_batch(rows)
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, StoreError> {
        trades_from_batch(batch)
    }
}

impl Record for BookRow {
    const KIND: DataKind = DataKind::OrderBook;
    /// (timestamp micros, tick size bits). Positive doubles order the same
    /// as their bit patterns.
    type Key = (i64, u64);

    fn key(&self) -> (i64, u64) {
        (self.timestamp.timestamp_micros(), self.tick_size.to_bits())
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn cursor(&self) -> Cursor {
        Cursor::Timestamp(self.timestamp)
    }

    fn tick_size(&self) -> Option<f64> {
        Some(self.tick_size)
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch, StoreError> {
        books_to_batch(rows)
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, StoreError> {
        books_from_batch(batch)
    }
}

//! Fetch cursors derived from stored data

use super::{DatasetStore, Record, StoreError};
use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Position of the newest stored row for a dataset.
///
/// Never persisted; always recomputed from the dataset itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// Nothing stored yet
    Start,
    /// Highest stored aggregate trade id
    TradeId(i64),
    /// Newest stored snapshot time
    Timestamp(DateTime<Utc>),
}

impl Cursor {
    /// True if `row` lies strictly after this cursor
    pub fn admits<R: Record>(&self, row: &R) -> bool {
        match (self, row.cursor()) {
            (Cursor::Start, _) => true,
            (Cursor::TradeId(last), Cursor::TradeId(id)) => id > *last,
            (Cursor::Timestamp(last), Cursor::Timestamp(ts)) => ts > *last,
            // mismatched kinds never come from the same dataset
            _ => true,
        }
    }

    /// Trade id to resume pagination from
    pub fn next_trade_id(&self) -> Option<i64> {
        match self {
            Cursor::TradeId(id) => Some(id + 1),
            _ => None,
        }
    }

    /// True if enough time has passed since the last stored snapshot
    pub fn ready_after(&self, min_spacing: Duration, now: DateTime<Utc>) -> bool {
        match self {
            Cursor::Timestamp(last) => now - *last >= min_spacing,
            _ => true,
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::Start => write!(f, "start"),
            Cursor::TradeId(id) => write!(f, "trade_id={id}"),
            Cursor::Timestamp(ts) => write!(f, "timestamp={}", ts.to_rfc3339()),
        }
    }
}

/// Derives cursors from a dataset store by reading the file tail
#[derive(Debug, Clone)]
pub struct CursorTracker {
    store: DatasetStore,
}

impl CursorTracker {
    pub fn new(store: DatasetStore) -> Self {
        Self { store }
    }

    /// Cursor for the next fetch of `symbol`
    pub fn next_cursor<R: Record>(&self, symbol: &str) -> Result<Cursor, StoreError> {
        Ok(self
            .store
            .last_row::<R>(symbol)?
            .map(|row| row.cursor())
            .unwrap_or(Cursor::Start))
    }
}

//! Dataset replication
//!
//! Brings a local store up to date with another copy of the same datasets.
//! Only rows after the local cursor are transferred, and appends deduplicate,
//! so a sync can be interrupted and repeated safely.

mod http;
mod source;

pub use http::HttpSource;
pub use source::DatasetSource;

use crate::config::Config;
use crate::data::{CursorTracker, DatasetStore, Record, StoreError};
use crate::schema::{BookRow, DataKind, TradeRow};
use reqwest::StatusCode;
use std::collections::HashMap;
use thiserror::Error;
use tokio::task::spawn_blocking;

/// Sync errors
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: StatusCode },
    #[error("Blocking task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(e: tokio::task::JoinError) -> Self {
        SyncError::Task(e.to_string())
    }
}

/// Hot file sizes for the local copy
#[derive(Debug, Clone)]
pub struct HotWindows {
    pub trades: usize,
    pub orderbook_snapshots: usize,
    /// Tick sizes per symbol; symbols not listed count as one
    pub tick_counts: HashMap<String, usize>,
}

impl Default for HotWindows {
    fn default() -> Self {
        Self {
            trades: 1024,
            orderbook_snapshots: 200,
            tick_counts: HashMap::new(),
        }
    }
}

impl HotWindows {
    pub fn from_config(config: &Config) -> Self {
        Self {
            trades: config.trades.hot_window,
            orderbook_snapshots: config.orderbook.hot_snapshots,
            tick_counts: config
                .orderbook
                .tick_sizes
                .iter()
                .map(|(symbol, ticks)| (symbol.clone(), ticks.len()))
                .collect(),
        }
    }

    pub fn window(&self, kind: DataKind, symbol: &str) -> usize {
        match kind {
            DataKind::Trades => self.trades,
            DataKind::OrderBook => {
                self.orderbook_snapshots * self.tick_counts.get(symbol).copied().unwrap_or(1)
            }
        }
    }
}

/// Copies new rows from `remote` into a local store
pub struct SyncEngine<S: DatasetSource> {
    remote: S,
    local: DatasetStore,
    cursors: CursorTracker,
    hot: HotWindows,
}

impl<S: DatasetSource> SyncEngine<S> {
    pub fn new(remote: S, local: DatasetStore, hot: HotWindows) -> Self {
        Self {
            remote,
            cursors: CursorTracker::new(local.clone()),
            local,
            hot,
        }
    }

    /// Transfer rows newer than the local cursor. Returns rows written.
    pub async fn sync_incremental<R: Record>(&self, symbol: &str) -> Result<usize, SyncError> {
        let cursors = self.cursors.clone();
        let owned = symbol.to_string();
        let cursor = spawn_blocking(move || cursors.next_cursor::<R>(&owned)).await??;

        let rows: Vec<R> = self.remote.read_after(symbol, &cursor).await?;
        if rows.is_empty() {
            tracing::debug!(kind = %R::KIND, symbol, cursor = %cursor, "Already up to date");
            return Ok(0);
        }
        let received = rows.len();

        let local = self.local.clone();
        let owned = symbol.to_string();
        let window = self.hot.window(R::KIND, symbol);
        let outcome = spawn_blocking(move || {
            let outcome = local.append(&owned, rows)?;
            if outcome.rows_written > 0 {
                local.maintain_hot::<R>(&owned, window)?;
            }
            Ok::<_, StoreError>(outcome)
        })
        .await??;

        tracing::info!(
            kind = %R::KIND,
            symbol,
            from = %self.remote.location(),
            received,
            written = outcome.rows_written,
            skipped = outcome.rows_skipped,
            "Synced rows"
        );
        Ok(outcome.rows_written)
    }

    /// Replace the local hot file with the remote one. Returns its row count.
    pub async fn sync_hot<R: Record>(&self, symbol: &str) -> Result<usize, SyncError> {
        let rows: Vec<R> = self.remote.read_hot(symbol).await?;

        let local = self.local.clone();
        let owned = symbol.to_string();
        let count = spawn_blocking(move || local.replace_hot(&owned, rows)).await??;

        tracing::info!(kind = %R::KIND, symbol, rows = count, "Synced hot file");
        Ok(count)
    }

    /// Repeat incremental syncs until a round transfers nothing
    pub async fn sync_until_caught_up<R: Record>(
        &self,
        symbol: &str,
        max_rounds: usize,
    ) -> Result<usize, SyncError> {
        let mut total = 0;
        for round in 1..=max_rounds {
            let written = self.sync_incremental::<R>(symbol).await?;
            total += written;
            if written == 0 {
                tracing::debug!(kind = %R::KIND, symbol, round, total, "Caught up");
                break;
            }
        }
        Ok(total)
    }

    /// Sync one dataset of either kind
    pub async fn sync_dataset(&self, kind: DataKind, symbol: &str, hot: bool) -> Result<usize, SyncError> {
        match (kind, hot) {
            (DataKind::Trades, false) => self.sync_until_caught_up::<TradeRow>(symbol, 3).await,
            (DataKind::Trades, true) => self.sync_hot::<TradeRow>(symbol).await,
            (DataKind::OrderBook, false) => self.sync_until_caught_up::<BookRow>(symbol, 3).await,
            (DataKind::OrderBook, true) => self.sync_hot::<BookRow>(symbol).await,
        }
    }
}

//! Aggregate trade collector

use super::{store_rows, CollectError, Collector, CycleCounts, CycleReport, CycleState, RetryPolicy, SymbolStates};
use crate::config::Config;
use crate::data::{CursorTracker, DatasetStore};
use crate::feed::{MarketSource, RawAggTrade, TradeQuery};
use crate::schema::{validate_batch, validate_trade, DataKind, TradeRow};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::spawn_blocking;

/// Trade collector settings
#[derive(Debug, Clone)]
pub struct TradeSettings {
    pub symbols: Vec<String>,
    pub page_limit: usize,
    pub max_pages_per_cycle: usize,
    /// Backfill window used when nothing is stored yet
    pub initial_lookback: chrono::Duration,
    pub hot_window: usize,
    pub max_reject_ratio: f64,
    pub interval: Duration,
    /// Pause between pages of the same cycle
    pub page_pause: Duration,
    pub retry: RetryPolicy,
}

impl TradeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            symbols: config.symbols.clone(),
            page_limit: config.source.trades_page_limit,
            max_pages_per_cycle: config.source.max_pages_per_cycle,
            initial_lookback: chrono::Duration::hours(config.source.initial_lookback_hours as i64),
            hot_window: config.trades.hot_window,
            max_reject_ratio: config.validation.max_reject_ratio,
            interval: Duration::from_secs(config.trades.interval_secs),
            page_pause: Duration::from_millis(100),
            retry: config.retry.policy(),
        }
    }
}

/// Pulls new aggregate trades for every symbol and appends them to the store
pub struct TradeCollector {
    source: Arc<dyn MarketSource>,
    store: DatasetStore,
    cursors: CursorTracker,
    settings: TradeSettings,
    states: SymbolStates,
}

impl TradeCollector {
    pub fn new(source: Arc<dyn MarketSource>, store: DatasetStore, settings: TradeSettings) -> Self {
        Self {
            source,
            cursors: CursorTracker::new(store.clone()),
            store,
            settings,
            states: SymbolStates::default(),
        }
    }

    pub fn states(&self) -> &SymbolStates {
        &self.states
    }

    async fn collect_symbol(&self, symbol: &str, shutdown: &watch::Receiver<bool>) -> CycleReport {
        let start_time = Utc::now();
        let result = self.cycle(symbol, shutdown).await;
        self.states
            .finish(DataKind::Trades, symbol, start_time, result)
            .await
    }

    async fn cycle(&self, symbol: &str, shutdown: &watch::Receiver<bool>) -> Result<CycleCounts, CollectError> {
        self.states
            .transition(symbol, CycleState::Fetching, shutdown)
            .await?;

        let cursors = self.cursors.clone();
        let owned = symbol.to_string();
        let cursor = spawn_blocking(move || cursors.next_cursor::<TradeRow>(&owned)).await??;

        let mut query = match cursor.next_trade_id() {
            Some(id) => TradeQuery::FromId(id),
            None => TradeQuery::Since(Utc::now() - self.settings.initial_lookback),
        };
        tracing::debug!(symbol, cursor = %cursor, "Resuming trades");

        let raw = self.fetch_pages(symbol, &mut query, shutdown).await?;

        self.states
            .transition(symbol, CycleState::Validating, shutdown)
            .await?;
        let batch = validate_batch(&raw, self.settings.max_reject_ratio, |t| {
            validate_trade(symbol, t)
        })?;
        let rows: Vec<TradeRow> = batch
            .rows
            .into_iter()
            .filter(|row| cursor.admits(row))
            .collect();

        let mut counts = CycleCounts {
            fetched: raw.len(),
            rejected: batch.rejected,
            ..CycleCounts::default()
        };
        if rows.is_empty() {
            return Ok(counts);
        }

        self.states
            .transition(symbol, CycleState::Appending, shutdown)
            .await?;
        let outcome = store_rows(&self.store, symbol, rows, self.settings.hot_window).await?;

        counts.written = outcome.rows_written;
        counts.skipped = outcome.rows_skipped;
        Ok(counts)
    }

    /// Page forward from `query` until a short page or the page budget is
    /// spent. Pages are only returned once all of them arrived.
    async fn fetch_pages(
        &self,
        symbol: &str,
        query: &mut TradeQuery,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<Vec<RawAggTrade>, CollectError> {
        let limit = self.settings.page_limit;
        let mut trades = Vec::new();

        for page in 1..=self.settings.max_pages_per_cycle {
            if *shutdown.borrow() {
                return Err(CollectError::Shutdown);
            }

            let q = *query;
            let batch = self
                .settings
                .retry
                .run(DataKind::Trades, symbol, || self.source.fetch_trades(symbol, q, limit))
                .await?;

            let received = batch.len();
            let last_id = batch.last().map(|t| t.agg_trade_id);
            trades.extend(batch);

            tracing::debug!(symbol, page, rows = received, total = trades.len(), "Fetched trades page");

            match last_id {
                Some(id) if received >= limit => *query = TradeQuery::FromId(id + 1),
                _ => break,
            }
            if page < self.settings.max_pages_per_cycle {
                tokio::time::sleep(self.settings.page_pause).await;
            }
        }

        Ok(trades)
    }
}

#[async_trait]
impl Collector for TradeCollector {
    fn kind(&self) -> DataKind {
        DataKind::Trades
    }

    fn interval(&self) -> Duration {
        self.settings.interval
    }

    async fn update_until(&self, shutdown: &watch::Receiver<bool>) -> BTreeMap<String, CycleReport> {
        let cycles = self
            .settings
            .symbols
            .iter()
            .map(|symbol| self.collect_symbol(symbol, shutdown));

        join_all(cycles)
            .await
            .into_iter()
            .map(|report| (report.symbol.clone(), report))
            .collect()
    }
}

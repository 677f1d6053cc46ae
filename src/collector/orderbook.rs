//! Order book snapshot collector

use super::{store_rows, CollectError, Collector, CycleCounts, CycleReport, CycleState, RetryPolicy, SymbolStates};
use crate::config::Config;
use crate::data::{CursorTracker, DatasetStore};
use crate::feed::MarketSource;
use crate::orderbook::{aggregate, check_settings};
use crate::schema::{validate_book_row, validate_depth, BookRow, DataKind};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::spawn_blocking;

/// Order book collector settings
#[derive(Debug, Clone)]
pub struct OrderBookSettings {
    pub symbols: Vec<String>,
    /// Raw levels requested per side
    pub depth_limit: usize,
    pub num_levels: usize,
    /// Tick sizes per symbol
    pub tick_sizes: HashMap<String, Vec<f64>>,
    /// Snapshots kept in the hot file, per tick size
    pub hot_snapshots: usize,
    /// Minimum age of the newest stored snapshot before another is taken
    pub min_spacing: chrono::Duration,
    pub max_reject_ratio: f64,
    pub interval: Duration,
    pub retry: RetryPolicy,
}

impl OrderBookSettings {
    pub fn from_config(config: &Config) -> Self {
        let tick_sizes = config
            .symbols
            .iter()
            .map(|symbol| (symbol.clone(), config.orderbook.tick_sizes_for(symbol)))
            .collect();

        Self {
            symbols: config.symbols.clone(),
            depth_limit: config.source.depth_limit,
            num_levels: config.orderbook.num_levels,
            tick_sizes,
            hot_snapshots: config.orderbook.hot_snapshots,
            min_spacing: chrono::Duration::seconds(config.orderbook.min_spacing_secs as i64),
            max_reject_ratio: config.validation.max_reject_ratio,
            interval: Duration::from_secs(config.orderbook.interval_secs),
            retry: config.retry.policy(),
        }
    }

    fn ticks(&self, symbol: &str) -> &[f64] {
        self.tick_sizes.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Takes depth snapshots, buckets them at every tick size and appends the rows
pub struct OrderBookCollector {
    source: Arc<dyn MarketSource>,
    store: DatasetStore,
    cursors: CursorTracker,
    settings: OrderBookSettings,
    states: SymbolStates,
}

impl OrderBookCollector {
    pub fn new(source: Arc<dyn MarketSource>, store: DatasetStore, settings: OrderBookSettings) -> Self {
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
            .finish(DataKind::OrderBook, symbol, start_time, result)
            .await
    }

    async fn cycle(&self, symbol: &str, shutdown: &watch::Receiver<bool>) -> Result<CycleCounts, CollectError> {
        let ticks = self.settings.ticks(symbol);
        check_settings(symbol, ticks, self.settings.num_levels)?;

        self.states
            .transition(symbol, CycleState::Fetching, shutdown)
            .await?;

        let cursors = self.cursors.clone();
        let owned = symbol.to_string();
        let cursor = spawn_blocking(move || cursors.next_cursor::<BookRow>(&owned)).await??;
        if !cursor.ready_after(self.settings.min_spacing, Utc::now()) {
            tracing::debug!(symbol, cursor = %cursor, "Last snapshot too recent");
            return Ok(CycleCounts {
                skipped_cycle: true,
                ..CycleCounts::default()
            });
        }

        let depth_limit = self.settings.depth_limit;
        let raw = self
            .settings
            .retry
            .run(DataKind::OrderBook, symbol, || {
                self.source.fetch_depth(symbol, depth_limit)
            })
            .await?;

        self.states
            .transition(symbol, CycleState::Validating, shutdown)
            .await?;
        let (snapshot, rejected) = validate_depth(&raw, self.settings.max_reject_ratio)?;
        if snapshot.is_one_sided() {
            tracing::warn!(
                symbol,
                best_bid = ?snapshot.best_bid(),
                best_ask = ?snapshot.best_ask(),
                "One-sided book"
            );
        }

        self.states
            .transition(symbol, CycleState::Aggregating, shutdown)
            .await?;
        let rows = aggregate(&snapshot, ticks, self.settings.num_levels)?;
        for row in &rows {
            validate_book_row(row, ticks)?;
        }
        let rows: Vec<BookRow> = rows.into_iter().filter(|row| cursor.admits(row)).collect();

        let mut counts = CycleCounts {
            fetched: rows.len(),
            rejected,
            ..CycleCounts::default()
        };
        if rows.is_empty() {
            return Ok(counts);
        }

        self.states
            .transition(symbol, CycleState::Appending, shutdown)
            .await?;
        let hot_window = self.settings.hot_snapshots * ticks.len();
        let outcome = store_rows(&self.store, symbol, rows, hot_window).await?;

        counts.written = outcome.rows_written;
        counts.skipped = outcome.rows_skipped;
        Ok(counts)
    }
}

#[async_trait]
impl Collector for OrderBookCollector {
    fn kind(&self) -> DataKind {
        DataKind::OrderBook
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

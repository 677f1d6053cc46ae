//! Incremental collectors
//!
//! One collector per data kind. Each cycle runs a per-symbol state machine:
//!
//! ```text
//! Idle -> Fetching -> Validating -> (Aggregating) -> Appending -> Idle
//!            \___________\______________\_______________\-> Failed(reason)
//! ```
//!
//! A failed symbol goes back to `Idle` when its next cycle starts.

mod orderbook;
mod retry;
mod trades;

pub use orderbook::{OrderBookCollector, OrderBookSettings};
pub use retry::RetryPolicy;
pub use trades::{TradeCollector, TradeSettings};

use crate::data::{AppendOutcome, DatasetStore, Record, StoreError};
use crate::feed::FetchError;
use crate::orderbook::ConfigurationError;
use crate::schema::{DataKind, ValidationError};
use crate::telemetry::{increment, CounterMetric};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::task::spawn_blocking;
use tokio::time::{interval, MissedTickBehavior};

/// Errors that abandon a collection cycle
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Blocking task failed: {0}")]
    Task(String),
    #[error("Shutdown requested")]
    Shutdown,
}

impl From<tokio::task::JoinError> for CollectError {
    fn from(e: tokio::task::JoinError) -> Self {
        CollectError::Task(e.to_string())
    }
}

/// Where a symbol's cycle currently is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum CycleState {
    #[default]
    Idle,
    Fetching,
    Validating,
    Aggregating,
    Appending,
    Failed(String),
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleState::Idle => write!(f, "idle"),
            CycleState::Fetching => write!(f, "fetching"),
            CycleState::Validating => write!(f, "validating"),
            CycleState::Aggregating => write!(f, "aggregating"),
            CycleState::Appending => write!(f, "appending"),
            CycleState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Ran to completion, possibly with zero new rows
    Completed,
    /// Deliberately not run (order book spacing not reached)
    Skipped,
    /// Abandoned; nothing was written
    Failed(String),
    /// Stopped by a shutdown request before anything was written
    Interrupted,
}

/// Per-symbol result of one cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub kind: DataKind,
    pub symbol: String,
    pub rows_fetched: usize,
    pub rows_written: usize,
    pub rows_skipped: usize,
    pub rows_rejected: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Failed(_))
    }
}

/// Row counts gathered while a cycle runs
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CycleCounts {
    pub fetched: usize,
    pub written: usize,
    pub skipped: usize,
    pub rejected: usize,
    pub skipped_cycle: bool,
}

/// Mutable per-symbol state
#[derive(Debug, Clone, Default, Serialize)]
pub struct SymbolState {
    pub state: CycleState,
    pub consecutive_failures: u32,
    pub last_report: Option<CycleReport>,
}

/// Per-symbol states shared between cycles
#[derive(Debug, Clone, Default)]
pub struct SymbolStates {
    inner: Arc<RwLock<HashMap<String, SymbolState>>>,
}

impl SymbolStates {
    pub async fn get(&self, symbol: &str) -> Option<SymbolState> {
        self.inner.read().await.get(symbol).cloned()
    }

    /// Move `symbol` to `state`, unless shutdown was requested
    pub(crate) async fn transition(
        &self,
        symbol: &str,
        state: CycleState,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<(), CollectError> {
        if *shutdown.borrow() {
            return Err(CollectError::Shutdown);
        }
        tracing::trace!(symbol, state = %state, "Cycle transition");
        self.inner
            .write()
            .await
            .entry(symbol.to_string())
            .or_default()
            .state = state;
        Ok(())
    }

    /// Close a cycle: build its report, log it, count it, and settle the state
    pub(crate) async fn finish(
        &self,
        kind: DataKind,
        symbol: &str,
        start_time: DateTime<Utc>,
        result: Result<CycleCounts, CollectError>,
    ) -> CycleReport {
        let (counts, outcome) = match result {
            Ok(counts) if counts.skipped_cycle => (counts, CycleOutcome::Skipped),
            Ok(counts) => (counts, CycleOutcome::Completed),
            Err(CollectError::Shutdown) => (CycleCounts::default(), CycleOutcome::Interrupted),
            Err(e) => (CycleCounts::default(), CycleOutcome::Failed(e.to_string())),
        };

        let report = CycleReport {
            kind,
            symbol: symbol.to_string(),
            rows_fetched: counts.fetched,
            rows_written: counts.written,
            rows_skipped: counts.skipped,
            rows_rejected: counts.rejected,
            start_time,
            end_time: Utc::now(),
            outcome,
        };

        match &report.outcome {
            CycleOutcome::Failed(reason) => {
                tracing::error!(kind = %kind, symbol, error = %reason, "Cycle failed");
                increment(CounterMetric::CyclesFailed, kind, symbol, 1);
            }
            CycleOutcome::Skipped => {
                tracing::debug!(kind = %kind, symbol, "Cycle skipped");
            }
            CycleOutcome::Interrupted => {
                tracing::info!(kind = %kind, symbol, "Cycle interrupted by shutdown");
            }
            CycleOutcome::Completed => {
                tracing::info!(
                    kind = %kind,
                    symbol,
                    fetched = report.rows_fetched,
                    written = report.rows_written,
                    skipped = report.rows_skipped,
                    rejected = report.rows_rejected,
                    "Cycle complete"
                );
            }
        }
        increment(CounterMetric::RowsWritten, kind, symbol, report.rows_written as u64);
        increment(CounterMetric::RowsSkipped, kind, symbol, report.rows_skipped as u64);
        increment(CounterMetric::RowsRejected, kind, symbol, report.rows_rejected as u64);

        let mut states = self.inner.write().await;
        let entry = states.entry(symbol.to_string()).or_default();
        match &report.outcome {
            CycleOutcome::Failed(reason) => {
                entry.state = CycleState::Failed(reason.clone());
                entry.consecutive_failures += 1;
            }
            CycleOutcome::Interrupted => entry.state = CycleState::Idle,
            _ => {
                entry.state = CycleState::Idle;
                entry.consecutive_failures = 0;
            }
        }
        entry.last_report = Some(report.clone());

        report
    }
}

/// Append `rows` for `symbol` and refresh its hot file with the newest
/// `hot_window` rows, off the async runtime.
pub(crate) async fn store_rows<R: Record>(
    store: &DatasetStore,
    symbol: &str,
    rows: Vec<R>,
    hot_window: usize,
) -> Result<AppendOutcome, CollectError> {
    let store = store.clone();
    let symbol = symbol.to_string();
    let outcome = spawn_blocking(move || {
        let outcome = retry_once(&symbol, || store.append(&symbol, rows.clone()))?;
        if outcome.rows_written > 0 {
            retry_once(&symbol, || store.maintain_hot::<R>(&symbol, hot_window))?;
        }
        Ok::<_, StoreError>(outcome)
    })
    .await??;
    Ok(outcome)
}

/// Run `write`, repeating it once if the first error is retryable
fn retry_once<T>(
    symbol: &str,
    mut write: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    match write() {
        Err(e) if e.is_retryable() => {
            tracing::warn!(symbol, error = %e, "Store write failed, retrying once");
            write()
        }
        result => result,
    }
}

/// A periodic collector for one data kind
#[async_trait]
pub trait Collector: Send + Sync {
    fn kind(&self) -> DataKind;

    /// Time between cycle starts
    fn interval(&self) -> Duration;

    /// Run one cycle for every symbol, stopping early if `shutdown` fires
    async fn update_until(&self, shutdown: &watch::Receiver<bool>) -> BTreeMap<String, CycleReport>;

    /// Run one cycle for every symbol
    async fn update(&self) -> BTreeMap<String, CycleReport> {
        let (_tx, rx) = watch::channel(false);
        self.update_until(&rx).await
    }

    /// Run cycles on a fixed interval until `shutdown` becomes true
    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let kind = self.kind();
        let mut ticker = interval(self.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(kind = %kind, interval_secs = self.interval().as_secs(), "Collector started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reports = self.update_until(&shutdown).await;
                    let failed = reports.values().filter(|r| r.is_failed()).count();
                    tracing::debug!(kind = %kind, symbols = reports.len(), failed, "Update finished");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }
        }

        tracing::info!(kind = %kind, "Collector stopped");
    }
}

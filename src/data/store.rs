//! Deduplicated, atomically replaced Parquet datasets
//!
//! Layout on disk:
//!
//! ```text
//! {base}/trades/BTCUSDT.parquet
//! {base}/trades/BTCUSDT_hot.parquet
//! {base}/orderbook/BTCUSDT.parquet
//! {base}/orderbook/BTCUSDT_hot.parquet
//! ```
//!
//! Every write stages a complete file next to its target and renames it into
//! place, so readers only ever see the previous or the new version.

use super::parquet::{read_row_group, read_rows, row_count, write_rows, Codec, RowGroupEnd};
use super::{Record, StoreError};
use crate::orderbook::ConfigurationError;
use crate::schema::{same_tick_size, BookRow, DataKind, TradeRow};
use crate::telemetry::{record_latency, LatencyMetric};
use chrono::{DateTime, Utc};
use fd_lock::RwLock as FileLock;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::debug;

const STAGING_PREFIX: &str = ".staging-";
const HOT_SUFFIX: &str = "_hot";
const EXTENSION: &str = "parquet";
const LOCK_EXTENSION: &str = "lock";

/// Writer locks for every dataset opened in this process, keyed by the
/// canonical kind directory and symbol. Shared by all store handles.
static DATASET_LOCKS: LazyLock<Mutex<HashMap<(PathBuf, String), Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Result of merging rows into a dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AppendOutcome {
    /// Rows newly persisted
    pub rows_written: usize,
    /// Rows dropped as duplicates of stored rows or of each other
    pub rows_skipped: usize,
}

/// Read filter. All bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Only rows at this tick size (order book)
    pub tick_size: Option<f64>,
    /// Keep only the newest `limit` matching rows
    pub limit: Option<usize>,
}

impl DataQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Self::default()
        }
    }

    pub fn with_tick_size(mut self, tick_size: f64) -> Self {
        self.tick_size = Some(tick_size);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches<R: Record>(&self, row: &R) -> bool {
        let ts = row.timestamp();
        if self.start.is_some_and(|start| ts < start) || self.end.is_some_and(|end| ts > end) {
            return false;
        }
        match (self.tick_size, row.tick_size()) {
            (Some(wanted), Some(actual)) => same_tick_size(wanted, actual),
            _ => true,
        }
    }
}

/// Summary of a stored dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    pub kind: DataKind,
    pub symbol: String,
    pub rows: u64,
    pub bytes: u64,
    pub hot_rows: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// A fully written file waiting to be renamed over its target.
///
/// Dropping it without calling [`StagedWrite::commit`] discards the file and
/// leaves the target untouched.
#[derive(Debug)]
pub(crate) struct StagedWrite {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    pub(crate) fn commit(self) -> Result<(), StoreError> {
        let target = self.target;
        self.file
            .persist(&target)
            .map_err(|e| StoreError::WriteConflict {
                path: target.clone(),
                source: e.error,
            })?;
        Ok(())
    }
}

/// Filesystem dataset store
#[derive(Debug, Clone)]
pub struct DatasetStore {
    base_path: PathBuf,
    codec: Codec,
}

impl DatasetStore {
    /// Create a store rooted at `base_path`. Directories are created lazily.
    pub fn new(base_path: impl Into<PathBuf>, codec: Codec) -> Self {
        Self {
            base_path: base_path.into(),
            codec,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn dataset_path(&self, kind: DataKind, symbol: &str) -> PathBuf {
        self.kind_dir(kind).join(format!("{symbol}.{EXTENSION}"))
    }

    pub fn hot_path(&self, kind: DataKind, symbol: &str) -> PathBuf {
        self.kind_dir(kind)
            .join(format!("{symbol}{HOT_SUFFIX}.{EXTENSION}"))
    }

    fn kind_dir(&self, kind: DataKind) -> PathBuf {
        self.base_path.join(kind.as_str())
    }

    /// Run `write` while holding the dataset's writer locks.
    ///
    /// Threads of this process queue on a shared mutex; other processes are
    /// held off by an advisory lock on `{symbol}.lock` beside the dataset.
    fn locked<T>(
        &self,
        kind: DataKind,
        symbol: &str,
        write: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let dir = self.kind_dir(kind);
        fs::create_dir_all(&dir)?;
        let dir = fs::canonicalize(&dir)?;

        let mutex = DATASET_LOCKS
            .lock()
            .entry((dir.clone(), symbol.to_string()))
            .or_default()
            .clone();
        let _guard = mutex.lock();

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(format!("{symbol}.{LOCK_EXTENSION}")))?;
        let mut file_lock = FileLock::new(lock_file);
        let _file_guard = file_lock.write()?;

        write()
    }

    /// Merge `rows` into the dataset for `symbol`.
    ///
    /// Rows whose key is already stored, or repeated within `rows`, are
    /// skipped. The file is only rewritten if at least one row is new.
    pub fn append<R: Record>(&self, symbol: &str, rows: Vec<R>) -> Result<AppendOutcome, StoreError> {
        check_symbol(symbol)?;
        if rows.is_empty() {
            return Ok(AppendOutcome::default());
        }

        let started = Instant::now();
        self.locked(R::KIND, symbol, || {
            let path = self.dataset_path(R::KIND, symbol);
            let existing: Vec<R> = read_file(&path)?;
            let (merged, outcome) = merge(existing, rows);

            if outcome.rows_written == 0 {
                debug!(kind = %R::KIND, symbol, skipped = outcome.rows_skipped, "Nothing new to append");
                return Ok(outcome);
            }

            self.stage(&path, &merged)?.commit()?;
            record_latency(LatencyMetric::Append, R::KIND, symbol, started.elapsed());

            debug!(
                kind = %R::KIND,
                symbol,
                written = outcome.rows_written,
                skipped = outcome.rows_skipped,
                total = merged.len(),
                "Appended rows"
            );
            Ok(outcome)
        })
    }

    /// Rows matching `query`, in key order. A missing dataset reads as empty.
    pub fn read<R: Record>(&self, symbol: &str, query: &DataQuery) -> Result<Vec<R>, StoreError> {
        check_symbol(symbol)?;
        let rows: Vec<R> = read_file(&self.dataset_path(R::KIND, symbol))?;

        let mut rows: Vec<R> = rows.into_iter().filter(|r| query.matches(r)).collect();
        if let Some(limit) = query.limit {
            let excess = rows.len().saturating_sub(limit);
            rows.drain(..excess);
        }
        Ok(rows)
    }

    /// Order book rows matching `query`. A tick size filter outside
    /// `tick_sizes`, the symbol's configured set, is a configuration error.
    pub fn read_book(
        &self,
        symbol: &str,
        query: &DataQuery,
        tick_sizes: &[f64],
    ) -> Result<Vec<BookRow>, StoreError> {
        if let Some(tick_size) = query.tick_size {
            if !tick_sizes.iter().any(|&t| same_tick_size(t, tick_size)) {
                return Err(ConfigurationError::UnknownTickSize {
                    symbol: symbol.to_string(),
                    tick_size,
                }
                .into());
            }
        }
        self.read(symbol, query)
    }

    /// Newest stored row, read from the last row group only
    pub fn last_row<R: Record>(&self, symbol: &str) -> Result<Option<R>, StoreError> {
        check_symbol(symbol)?;
        let Some(file) = open_existing(&self.dataset_path(R::KIND, symbol))? else {
            return Ok(None);
        };
        Ok(read_row_group::<R, _>(file, RowGroupEnd::Last)?.pop())
    }

    /// Rewrite the hot file with the last `window` rows of the dataset.
    /// Returns the number of rows in the hot file.
    pub fn maintain_hot<R: Record>(&self, symbol: &str, window: usize) -> Result<usize, StoreError> {
        check_symbol(symbol)?;
        self.locked(R::KIND, symbol, || {
            let mut rows: Vec<R> = read_file(&self.dataset_path(R::KIND, symbol))?;
            let excess = rows.len().saturating_sub(window);
            rows.drain(..excess);

            self.install_hot(symbol, &rows)?;
            Ok(rows.len())
        })
    }

    /// Rows of the hot file only
    pub fn read_hot<R: Record>(&self, symbol: &str) -> Result<Vec<R>, StoreError> {
        check_symbol(symbol)?;
        read_file(&self.hot_path(R::KIND, symbol))
    }

    /// Install `rows` as the hot file, replacing whatever was there
    pub fn replace_hot<R: Record>(&self, symbol: &str, rows: Vec<R>) -> Result<usize, StoreError> {
        check_symbol(symbol)?;
        self.locked(R::KIND, symbol, || {
            let (rows, _) = merge(Vec::new(), rows);
            self.install_hot(symbol, &rows)?;
            Ok(rows.len())
        })
    }

    fn install_hot<R: Record>(&self, symbol: &str, rows: &[R]) -> Result<(), StoreError> {
        let path = self.hot_path(R::KIND, symbol);
        if rows.is_empty() {
            return match fs::remove_file(&path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }
        self.stage(&path, rows)?.commit()
    }

    /// Write `rows` to a temporary file beside `target` and fsync it
    pub(crate) fn stage<R: Record>(&self, target: &Path, rows: &[R]) -> Result<StagedWrite, StoreError> {
        let dir = target.parent().unwrap_or(self.base_path.as_path());
        fs::create_dir_all(dir)?;

        let mut file = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(&format!(".{EXTENSION}"))
            .tempfile_in(dir)?;
        write_rows(file.as_file_mut(), rows, self.codec)?;
        file.as_file().sync_all()?;

        Ok(StagedWrite {
            file,
            target: target.to_path_buf(),
        })
    }

    /// Summary of a dataset, or `None` if it does not exist
    pub fn file_info(&self, kind: DataKind, symbol: &str) -> Result<Option<FileInfo>, StoreError> {
        match kind {
            DataKind::Trades => self.file_info_for::<TradeRow>(symbol),
            DataKind::OrderBook => self.file_info_for::<BookRow>(symbol),
        }
    }

    fn file_info_for<R: Record>(&self, symbol: &str) -> Result<Option<FileInfo>, StoreError> {
        check_symbol(symbol)?;
        let path = self.dataset_path(R::KIND, symbol);
        let Some(file) = open_existing(&path)? else {
            return Ok(None);
        };

        let bytes = file.metadata()?.len();
        let rows = row_count(file.try_clone()?)?;
        let first = read_row_group::<R, _>(file.try_clone()?, RowGroupEnd::First)?;
        let last = read_row_group::<R, _>(file, RowGroupEnd::Last)?;

        let hot_rows = match open_existing(&self.hot_path(R::KIND, symbol))? {
            Some(hot) => row_count(hot)?,
            None => 0,
        };

        Ok(Some(FileInfo {
            kind: R::KIND,
            symbol: symbol.to_string(),
            rows,
            bytes,
            hot_rows,
            start_time: first.first().map(Record::timestamp),
            end_time: last.last().map(Record::timestamp),
        }))
    }

    /// Symbols with a dataset of `kind`, sorted
    pub fn symbols(&self, kind: DataKind) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(self.kind_dir(kind)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut symbols = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if let Some(symbol) = name.strip_suffix(&format!(".{EXTENSION}")) {
                if !symbol.ends_with(HOT_SUFFIX) && check_symbol(symbol).is_ok() {
                    symbols.push(symbol.to_string());
                }
            }
        }
        symbols.sort();

        debug!(kind = %kind, count = symbols.len(), "Listed datasets");
        Ok(symbols)
    }
}

/// Symbols become file names, so only plain identifiers are accepted. A
/// `_hot` suffix would name another symbol's hot file.
fn check_symbol(symbol: &str) -> Result<(), StoreError> {
    let valid = !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && !symbol.to_ascii_lowercase().ends_with(HOT_SUFFIX);
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidSymbol(symbol.to_string()))
    }
}

fn open_existing(path: &Path) -> Result<Option<File>, StoreError> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_file<R: Record>(path: &Path) -> Result<Vec<R>, StoreError> {
    match open_existing(path)? {
        Some(file) => read_rows(file),
        None => Ok(vec![]),
    }
}

/// Merge sorted `existing` rows with unsorted `incoming` rows.
///
/// Stored rows win over incoming rows with the same key; within `incoming`
/// the first occurrence wins.
fn merge<R: Record>(existing: Vec<R>, mut incoming: Vec<R>) -> (Vec<R>, AppendOutcome) {
    incoming.sort_by_key(|r| r.key());
    let received = incoming.len();
    incoming.dedup_by_key(|r| r.key());

    let mut outcome = AppendOutcome {
        rows_written: 0,
        rows_skipped: received - incoming.len(),
    };

    let mut merged = Vec::with_capacity(existing.len() + incoming.len());
    let mut existing = existing.into_iter().peekable();

    for row in incoming {
        let key = row.key();
        while let Some(stored) = existing.next_if(|stored| stored.key() < key) {
            merged.push(stored);
        }
        if existing.peek().is_some_and(|stored| stored.key() == key) {
            outcome.rows_skipped += 1;
            continue;
        }
        merged.push(row);
        outcome.rows_written += 1;
    }
    merged.extend(existing);

    (merged, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::BookLevel;
    use chrono::TimeZone;
    use std::thread;
    use tempfile::TempDir;

    fn trade(id: i64) -> TradeRow {
        TradeRow {
            trade_id: id,
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_000 + id * 1_000).unwrap(),
            symbol: "BTCUSDT".to_string(),
            price: 42000.0 + id as f64,
            quantity: 0.25,
            first_trade_id: id * 10,
            last_trade_id: id * 10 + 2,
            is_buyer_maker: id % 3 == 0,
            is_best_match: true,
        }
    }

    fn trades(ids: impl IntoIterator<Item = i64>) -> Vec<TradeRow> {
        ids.into_iter().map(trade).collect()
    }

    fn book(secs: i64, tick_size: f64) -> BookRow {
        let level = BookLevel {
            price: 42000.0,
            qty: 1.0,
            cum_qty: 1.0,
            cum_usd: 42000.0,
        };
        BookRow {
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            symbol: "BTCUSDT".to_string(),
            tick_size,
            best_bid: Some(42000.0),
            best_ask: None,
            spread: None,
            spread_pct: None,
            imbalance: Some(1.0),
            depth_ratio: None,
            bid_levels: vec![Some(level), None],
            ask_levels: vec![None, None],
        }
    }

    fn ids(rows: &[TradeRow]) -> Vec<i64> {
        rows.iter().map(|r| r.trade_id).collect()
    }

    fn setup() -> (TempDir, DatasetStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = DatasetStore::new(temp_dir.path(), Codec::Snappy);
        (temp_dir, store)
    }

    #[test]
    fn test_append_creates_dataset() {
        let (_dir, store) = setup();

        let outcome = store.append("BTCUSDT", trades(1..=10)).unwrap();
        assert_eq!(outcome.rows_written, 10);
        assert_eq!(outcome.rows_skipped, 0);
        assert!(store.dataset_path(DataKind::Trades, "BTCUSDT").exists());

        let rows: Vec<TradeRow> = store.read("BTCUSDT", &DataQuery::all()).unwrap();
        assert_eq!(rows, trades(1..=10));
    }

    #[test]
    fn test_append_is_idempotent() {
        let (_dir, store) = setup();
        store.append("BTCUSDT", trades(1..=20)).unwrap();
        let path = store.dataset_path(DataKind::Trades, "BTCUSDT");
        let modified = fs::metadata(&path).unwrap().modified().unwrap();

        let outcome = store.append("BTCUSDT", trades(1..=20)).unwrap();
        assert_eq!(outcome.rows_written, 0);
        assert_eq!(outcome.rows_skipped, 20);
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), modified);

        let rows: Vec<TradeRow> = store.read("BTCUSDT", &DataQuery::all()).unwrap();
        assert_eq!(rows.len(), 20);
    }

    #[test]
    fn test_append_keeps_key_order() {
        let (_dir, store) = setup();
        store.append("BTCUSDT", trades([5, 1, 9])).unwrap();
        store.append("BTCUSDT", trades([7, 3, 11, 1])).unwrap();

        let rows: Vec<TradeRow> = store.read("BTCUSDT", &DataQuery::all()).unwrap();
        assert_eq!(ids(&rows), vec![1, 3, 5, 7, 9, 11]);
    }

    #[test]
    fn test_append_dedups_within_batch() {
        let (_dir, store) = setup();
        let mut first = trade(4);
        first.price = 1.0;
        let mut batch = vec![first, trade(2)];
        batch.push(trade(4));

        let outcome = store.append("BTCUSDT", batch).unwrap();
        assert_eq!(outcome.rows_written, 2);
        assert_eq!(outcome.rows_skipped, 1);

        let rows: Vec<TradeRow> = store.read("BTCUSDT", &DataQuery::all()).unwrap();
        assert_eq!(ids(&rows), vec![2, 4]);
        assert_eq!(rows[1].price, 1.0);
    }

    #[test]
    fn test_stored_row_wins_over_incoming() {
        let (_dir, store) = setup();
        store.append("BTCUSDT", trades([1])).unwrap();

        let mut replacement = trade(1);
        replacement.quantity = 99.0;
        store.append("BTCUSDT", vec![replacement]).unwrap();

        let rows: Vec<TradeRow> = store.read("BTCUSDT", &DataQuery::all()).unwrap();
        assert_eq!(rows[0].quantity, 0.25);
    }

    #[test]
    fn test_book_dedup_by_timestamp_and_tick() {
        let (_dir, store) = setup();
        store
            .append("BTCUSDT", vec![book(1, 10.0), book(1, 100.0), book(2, 10.0)])
            .unwrap();
        let outcome = store
            .append("BTCUSDT", vec![book(2, 10.0), book(2, 100.0), book(1, 10.0)])
            .unwrap();

        assert_eq!(outcome.rows_written, 1);
        assert_eq!(outcome.rows_skipped, 2);

        let rows: Vec<BookRow> = store.read("BTCUSDT", &DataQuery::all()).unwrap();
        let keys: Vec<(i64, f64)> = rows
            .iter()
            .map(|r| (r.timestamp.timestamp() - 1_700_000_000, r.tick_size))
            .collect();
        assert_eq!(keys, vec![(1, 10.0), (1, 100.0), (2, 10.0), (2, 100.0)]);
    }

    #[test]
    fn test_read_missing_dataset_is_empty() {
        let (_dir, store) = setup();
        let rows: Vec<TradeRow> = store.read("ETHUSDT", &DataQuery::all()).unwrap();
        assert!(rows.is_empty());
        assert!(store.last_row::<TradeRow>("ETHUSDT").unwrap().is_none());
        assert!(store.file_info(DataKind::Trades, "ETHUSDT").unwrap().is_none());
    }

    #[test]
    fn test_read_filters() {
        let (_dir, store) = setup();
        store.append("BTCUSDT", trades(1..=10)).unwrap();

        let query = DataQuery::between(trade(3).timestamp, trade(6).timestamp);
        let rows: Vec<TradeRow> = store.read("BTCUSDT", &query).unwrap();
        assert_eq!(ids(&rows), vec![3, 4, 5, 6]);

        let rows: Vec<TradeRow> = store
            .read("BTCUSDT", &DataQuery::all().with_limit(3))
            .unwrap();
        assert_eq!(ids(&rows), vec![8, 9, 10]);

        store
            .append("BTCUSDT", vec![book(1, 10.0), book(1, 100.0), book(2, 10.0)])
            .unwrap();
        let rows: Vec<BookRow> = store
            .read("BTCUSDT", &DataQuery::all().with_tick_size(10.0))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.tick_size == 10.0));
    }

    #[test]
    fn test_hot_window_bound() {
        let (_dir, store) = setup();
        store.append("BTCUSDT", trades(1..=50)).unwrap();

        assert_eq!(store.maintain_hot::<TradeRow>("BTCUSDT", 10).unwrap(), 10);
        let hot: Vec<TradeRow> = store.read_hot("BTCUSDT").unwrap();
        assert_eq!(ids(&hot), (41..=50).collect::<Vec<_>>());

        // window larger than the dataset keeps everything
        assert_eq!(store.maintain_hot::<TradeRow>("BTCUSDT", 100).unwrap(), 50);

        // hot file is not part of the main dataset
        let rows: Vec<TradeRow> = store.read("BTCUSDT", &DataQuery::all()).unwrap();
        assert_eq!(rows.len(), 50);
    }

    #[test]
    fn test_replace_hot() {
        let (_dir, store) = setup();
        store.replace_hot("BTCUSDT", trades([3, 1, 2])).unwrap();
        let hot: Vec<TradeRow> = store.read_hot("BTCUSDT").unwrap();
        assert_eq!(ids(&hot), vec![1, 2, 3]);

        store.replace_hot::<TradeRow>("BTCUSDT", vec![]).unwrap();
        assert!(!store.hot_path(DataKind::Trades, "BTCUSDT").exists());
        assert!(store.read_hot::<TradeRow>("BTCUSDT").unwrap().is_empty());
    }

    #[test]
    fn test_uncommitted_stage_leaves_dataset_intact() {
        let (_dir, store) = setup();
        store.append("BTCUSDT", trades(1..=5)).unwrap();
        let path = store.dataset_path(DataKind::Trades, "BTCUSDT");

        let staged = store.stage(&path, &trades(1..=500)).unwrap();
        let rows: Vec<TradeRow> = store.read("BTCUSDT", &DataQuery::all()).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(store.symbols(DataKind::Trades).unwrap(), vec!["BTCUSDT"]);
        drop(staged);

        let rows: Vec<TradeRow> = store.read("BTCUSDT", &DataQuery::all()).unwrap();
        assert_eq!(ids(&rows), vec![1, 2, 3, 4, 5]);

        let leftovers = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(STAGING_PREFIX))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_committed_stage_replaces_dataset() {
        let (_dir, store) = setup();
        store.append("BTCUSDT", trades(1..=5)).unwrap();
        let path = store.dataset_path(DataKind::Trades, "BTCUSDT");

        store.stage(&path, &trades(6..=8)).unwrap().commit().unwrap();

        let rows: Vec<TradeRow> = store.read("BTCUSDT", &DataQuery::all()).unwrap();
        assert_eq!(ids(&rows), vec![6, 7, 8]);
    }

    #[test]
    fn test_file_info() {
        let (_dir, store) = setup();
        store.append("BTCUSDT", trades(1..=25)).unwrap();
        store.maintain_hot::<TradeRow>("BTCUSDT", 5).unwrap();

        let info = store.file_info(DataKind::Trades, "BTCUSDT").unwrap().unwrap();
        assert_eq!(info.rows, 25);
        assert_eq!(info.hot_rows, 5);
        assert!(info.bytes > 0);
        assert_eq!(info.start_time, Some(trade(1).timestamp));
        assert_eq!(info.end_time, Some(trade(25).timestamp));
    }

    #[test]
    fn test_symbols() {
        let (_dir, store) = setup();
        store.append("SOLUSDT", trades([1])).unwrap();
        store.append("BTCUSDT", trades([1])).unwrap();
        store.maintain_hot::<TradeRow>("BTCUSDT", 10).unwrap();

        assert_eq!(
            store.symbols(DataKind::Trades).unwrap(),
            vec!["BTCUSDT", "SOLUSDT"]
        );
        assert!(store.symbols(DataKind::OrderBook).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_symbol_rejected() {
        let (_dir, store) = setup();
        let err = store.append("../etc", trades([1])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidSymbol(_)));
        assert!(store.read::<TradeRow>("", &DataQuery::all()).is_err());
    }

    #[test]
    fn test_concurrent_appends_serialize() {
        let (_dir, store) = setup();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    let start = i * 25 + 1;
                    store.append("BTCUSDT", trades(start..start + 25)).unwrap()
                })
            })
            .collect();

        let written: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap().rows_written)
            .sum();
        assert_eq!(written, 100);

        let rows: Vec<TradeRow> = store.read("BTCUSDT", &DataQuery::all()).unwrap();
        assert_eq!(ids(&rows), (1..=100).collect::<Vec<_>>());
    }

    #[test]
    fn test_independent_handles_serialize() {
        let (dir, _) = setup();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let base = dir.path().to_path_buf();
                thread::spawn(move || {
                    let store = DatasetStore::new(base, Codec::Snappy);
                    for batch in 0..10 {
                        let start = i * 100 + batch * 10 + 1;
                        store.append("BTCUSDT", trades(start..start + 10)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let store = DatasetStore::new(dir.path(), Codec::Snappy);
        let rows: Vec<TradeRow> = store.read("BTCUSDT", &DataQuery::all()).unwrap();
        assert_eq!(ids(&rows), (1..=400).collect::<Vec<_>>());
        assert!(dir.path().join("trades/BTCUSDT.lock").exists());
        assert_eq!(store.symbols(DataKind::Trades).unwrap(), vec!["BTCUSDT"]);
    }

    #[test]
    fn test_hot_suffix_symbol_rejected() {
        let (_dir, store) = setup();
        store.append("BTCUSDT", trades(1..=10)).unwrap();
        store.maintain_hot::<TradeRow>("BTCUSDT", 2).unwrap();

        let err = store.append("BTCUSDT_hot", trades(1..=11)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidSymbol(_)));
        assert!(matches!(
            store.read::<TradeRow>("ethusdt_HOT", &DataQuery::all()),
            Err(StoreError::InvalidSymbol(_))
        ));

        let hot: Vec<TradeRow> = store.read_hot("BTCUSDT").unwrap();
        assert_eq!(ids(&hot), vec![9, 10]);
    }

    #[test]
    fn test_read_book_unknown_tick_size() {
        let (_dir, store) = setup();
        store
            .append("BTCUSDT", vec![book(1, 10.0), book(1, 100.0), book(2, 10.0)])
            .unwrap();
        let ticks = [10.0, 100.0];

        let err = store
            .read_book("BTCUSDT", &DataQuery::all().with_tick_size(25.0), &ticks)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Configuration(ConfigurationError::UnknownTickSize { tick_size, .. })
                if tick_size == 25.0
        ));

        let rows = store
            .read_book("BTCUSDT", &DataQuery::all().with_tick_size(10.0), &ticks)
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(store.read_book("BTCUSDT", &DataQuery::all(), &ticks).unwrap().len(), 3);
    }

    #[test]
    fn test_failed_swap_keeps_previous_file() {
        let (_dir, store) = setup();
        store.append("BTCUSDT", trades(1..=5)).unwrap();

        // a non-empty directory cannot be renamed over
        let hot = store.hot_path(DataKind::Trades, "BTCUSDT");
        fs::create_dir_all(&hot).unwrap();
        fs::write(hot.join("keep"), b"x").unwrap();

        let err = store.maintain_hot::<TradeRow>("BTCUSDT", 3).unwrap_err();
        assert!(matches!(err, StoreError::WriteConflict { ref path, .. } if *path == hot));
        assert!(err.is_retryable());

        let target = store.dataset_path(DataKind::Trades, "BTCUSDT");
        let err = store
            .stage(&hot, &trades(6..=9))
            .unwrap()
            .commit()
            .unwrap_err();
        assert!(matches!(err, StoreError::WriteConflict { .. }));

        let rows: Vec<TradeRow> = store.read("BTCUSDT", &DataQuery::all()).unwrap();
        assert_eq!(ids(&rows), vec![1, 2, 3, 4, 5]);
        assert!(hot.join("keep").exists());

        let leftovers = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(STAGING_PREFIX))
            .count();
        assert_eq!(leftovers, 0);
    }
}

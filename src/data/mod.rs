//! Dataset storage
//!
//! One Parquet file per (kind, symbol) plus a bounded hot tail file, with
//! deduplicating atomic appends and the cursor derived from what is on disk

mod cursor;
mod parquet;
mod record;
mod store;

pub use self::parquet::{read_rows, Codec, ROW_GROUP_SIZE};
pub use cursor::{Cursor, CursorTracker};
pub use record::Record;
pub use store::{AppendOutcome, DataQuery, DatasetStore, FileInfo};

use crate::orderbook::ConfigurationError;
use std::path::PathBuf;
use thiserror::Error;

/// Dataset store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parquet error: {0}")]
    Parquet(#[from] ::parquet::errors::ParquetError),
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("Column {0} is missing or has an unexpected type")]
    Column(String),
    #[error("Stored timestamp out of range: {0}")]
    Timestamp(i64),
    #[error("Invalid symbol for a dataset name: {0:?}")]
    InvalidSymbol(String),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// The staged file could not be swapped into place. The previous file is
    /// still authoritative and the append can be retried.
    #[error("Could not swap new data into {path}: {source}")]
    WriteConflict {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// True when retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::WriteConflict { .. } | StoreError::Io(_))
    }
}

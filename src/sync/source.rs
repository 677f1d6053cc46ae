//! Places a dataset can be synced from

use super::SyncError;
use crate::data::{Cursor, DataQuery, DatasetStore, Record};
use async_trait::async_trait;
use tokio::task::spawn_blocking;

/// Read access to another copy of the datasets
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Rows strictly after `cursor`, in key order
    async fn read_after<R: Record>(&self, symbol: &str, cursor: &Cursor) -> Result<Vec<R>, SyncError>;

    /// Rows of the hot file
    async fn read_hot<R: Record>(&self, symbol: &str) -> Result<Vec<R>, SyncError>;

    /// Human-readable location, for logs
    fn location(&self) -> String;
}

/// A store on the local filesystem, including mounted remote directories
#[async_trait]
impl DatasetSource for DatasetStore {
    async fn read_after<R: Record>(&self, symbol: &str, cursor: &Cursor) -> Result<Vec<R>, SyncError> {
        let store = self.clone();
        let symbol = symbol.to_string();
        let cursor = *cursor;

        let rows = spawn_blocking(move || store.read::<R>(&symbol, &DataQuery::all())).await??;
        Ok(rows.into_iter().filter(|row| cursor.admits(row)).collect())
    }

    async fn read_hot<R: Record>(&self, symbol: &str) -> Result<Vec<R>, SyncError> {
        let store = self.clone();
        let symbol = symbol.to_string();
        Ok(spawn_blocking(move || DatasetStore::read_hot::<R>(&store, &symbol)).await??)
    }

    fn location(&self) -> String {
        self.base_path().display().to_string()
    }
}

//! Datasets served by a static file server
//!
//! Expects the store layout under a base URL, e.g.
//! `https://host/data/trades/BTCUSDT.parquet`.

use super::{DatasetSource, SyncError};
use crate::data::{read_rows, Cursor, Record};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::task::spawn_blocking;

/// Downloads whole dataset files over HTTP
#[derive(Debug, Clone)]
pub struct HttpSource {
    base_url: String,
    client: Client,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn file_url<R: Record>(&self, symbol: &str, hot: bool) -> String {
        let suffix = if hot { "_hot" } else { "" };
        format!(
            "{}/{}/{}{}.parquet",
            self.base_url,
            R::KIND.as_str(),
            symbol,
            suffix
        )
    }

    /// Download and decode one file. A missing file reads as empty.
    async fn fetch<R: Record>(&self, url: String) -> Result<Vec<R>, SyncError> {
        tracing::debug!(url = %url, "Downloading dataset");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(vec![]);
        }
        if !status.is_success() {
            return Err(SyncError::Status { url, status });
        }

        let body = response.bytes().await?;
        tracing::debug!(url = %url, bytes = body.len(), "Downloaded dataset");

        Ok(spawn_blocking(move || read_rows::<R, _>(body)).await??)
    }
}

#[async_trait]
impl DatasetSource for HttpSource {
    async fn read_after<R: Record>(&self, symbol: &str, cursor: &Cursor) -> Result<Vec<R>, SyncError> {
        let rows: Vec<R> = self.fetch(self.file_url::<R>(symbol, false)).await?;
        Ok(rows.into_iter().filter(|row| cursor.admits(row)).collect())
    }

    async fn read_hot<R: Record>(&self, symbol: &str) -> Result<Vec<R>, SyncError> {
        self.fetch(self.file_url::<R>(symbol, true)).await
    }

    fn location(&self) -> String {
        self.base_url.clone()
    }
}

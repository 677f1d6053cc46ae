//! Market data source
//!
//! Pulls aggregate trades and depth snapshots from the Binance REST API, or
//! replays them from memory

mod binance;
mod replay;
mod types;

pub use binance::{BinanceConfig, BinanceRestClient, BINANCE_API_URL, MAX_DEPTH_LIMIT, MAX_TRADES_LIMIT};
pub use replay::ReplaySource;
pub use types::{RawAggTrade, RawDepth, RawDepthSnapshot, TradeQuery};

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors from a market data source
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("Request timed out")]
    Timeout,
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl FetchError {
    /// True for failures worth retrying: network trouble, rate limiting
    /// (429, 418) and server errors
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(_) | FetchError::Timeout => true,
            FetchError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS
                    || status.as_u16() == 418
                    || status.is_server_error()
            }
            FetchError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Trait for market data sources
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Fetch up to `limit` aggregate trades starting at `query`, oldest first
    async fn fetch_trades(
        &self,
        symbol: &str,
        query: TradeQuery,
        limit: usize,
    ) -> Result<Vec<RawAggTrade>, FetchError>;

    /// Fetch a depth snapshot with up to `limit` levels per side
    async fn fetch_depth(&self, symbol: &str, limit: usize) -> Result<RawDepthSnapshot, FetchError>;
}

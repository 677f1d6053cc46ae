//! Binance REST client

use super::{FetchError, MarketSource, RawAggTrade, RawDepth, RawDepthSnapshot, TradeQuery};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};

/// Binance spot REST base URL
pub const BINANCE_API_URL: &str = "https://api.binance.com";

/// Largest page `aggTrades` accepts
pub const MAX_TRADES_LIMIT: usize = 1000;

/// Largest snapshot `depth` accepts
pub const MAX_DEPTH_LIMIT: usize = 5000;

/// Configuration for the Binance client
#[derive(Debug, Clone)]
pub struct BinanceConfig {
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: BINANCE_API_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Client for the public Binance market data endpoints
#[derive(Debug, Clone)]
pub struct BinanceRestClient {
    config: BinanceConfig,
    client: Client,
}

impl BinanceRestClient {
    /// Create a client with custom configuration
    pub fn with_config(config: BinanceConfig) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = self.url(path);
        let started = Instant::now();

        let response = self.client.get(&url).query(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        let body = response.bytes().await?;
        tracing::debug!(
            url = %url,
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Binance response"
        );

        serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

/// Query parameters for `GET /api/v3/aggTrades`
fn trades_params(symbol: &str, query: TradeQuery, limit: usize) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("symbol", symbol.to_uppercase()),
        ("limit", limit.clamp(1, MAX_TRADES_LIMIT).to_string()),
    ];
    match query {
        TradeQuery::FromId(id) => params.push(("fromId", id.to_string())),
        TradeQuery::Since(start) => params.push(("startTime", start.timestamp_millis().to_string())),
    }
    params
}

#[async_trait]
impl MarketSource for BinanceRestClient {
    async fn fetch_trades(
        &self,
        symbol: &str,
        query: TradeQuery,
        limit: usize,
    ) -> Result<Vec<RawAggTrade>, FetchError> {
        self.get("/api/v3/aggTrades", &trades_params(symbol, query, limit))
            .await
    }

    async fn fetch_depth(&self, symbol: &str, limit: usize) -> Result<RawDepthSnapshot, FetchError> {
        let params = [
            ("symbol", symbol.to_uppercase()),
            ("limit", limit.clamp(1, MAX_DEPTH_LIMIT).to_string()),
        ];
        let depth: RawDepth = self.get("/api/v3/depth", &params).await?;

        Ok(RawDepthSnapshot::received_now(symbol.to_uppercase(), depth))
    }
}

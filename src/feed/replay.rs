//! In-memory market source
//!
//! Serves recorded trades and depth snapshots with the same paging rules as
//! the exchange. Failures can be queued to exercise retry paths.

use super::{FetchError, MarketSource, RawAggTrade, RawDepth, RawDepthSnapshot, TradeQuery};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
struct ReplayState {
    trades: HashMap<String, Vec<RawAggTrade>>,
    depth: HashMap<String, VecDeque<RawDepth>>,
    failures: VecDeque<FetchError>,
    requests: usize,
}

/// Market source backed by in-memory data
#[derive(Debug, Default)]
pub struct ReplaySource {
    state: Mutex<ReplayState>,
}

impl ReplaySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add trades for `symbol`. Trades are kept sorted by id; a repeated id
    /// replaces the earlier one.
    pub fn push_trades(&self, symbol: &str, trades: impl IntoIterator<Item = RawAggTrade>) {
        let mut state = self.state.lock();
        let stored = state.trades.entry(symbol.to_uppercase()).or_default();
        for trade in trades {
            match stored.binary_search_by_key(&trade.agg_trade_id, |t| t.agg_trade_id) {
                Ok(i) => stored[i] = trade,
                Err(i) => stored.insert(i, trade),
            }
        }
    }

    /// Queue a depth response for `symbol`. The last queued response is
    /// served repeatedly once the others are consumed.
    pub fn push_depth(&self, symbol: &str, depth: RawDepth) {
        self.state
            .lock()
            .depth
            .entry(symbol.to_uppercase())
            .or_default()
            .push_back(depth);
    }

    /// Fail the next request with `error`. Queued failures are served in order
    /// before any data.
    pub fn fail_next(&self, error: FetchError) {
        self.state.lock().failures.push_back(error);
    }

    /// Requests served so far, including failed ones
    pub fn requests(&self) -> usize {
        self.state.lock().requests
    }
}

#[async_trait]
impl MarketSource for ReplaySource {
    async fn fetch_trades(
        &self,
        symbol: &str,
        query: TradeQuery,
        limit: usize,
    ) -> Result<Vec<RawAggTrade>, FetchError> {
        let mut state = self.state.lock();
        state.requests += 1;
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }

        let Some(trades) = state.trades.get(&symbol.to_uppercase()) else {
            return Ok(vec![]);
        };

        let start = match query {
            TradeQuery::FromId(id) => trades.partition_point(|t| t.agg_trade_id < id),
            TradeQuery::Since(since) => {
                let since = since.timestamp_millis();
                trades
                    .iter()
                    .position(|t| t.trade_time >= since)
                    .unwrap_or(trades.len())
            }
        };

        Ok(trades[start..].iter().take(limit).cloned().collect())
    }

    async fn fetch_depth(&self, symbol: &str, limit: usize) -> Result<RawDepthSnapshot, FetchError> {
        let mut state = self.state.lock();
        state.requests += 1;
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }

        let symbol = symbol.to_uppercase();
        let queue = state.depth.get_mut(&symbol);
        let depth = match queue {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        let Some(mut depth) = depth else {
            return Err(FetchError::Status {
                status: StatusCode::BAD_REQUEST,
                body: format!("Invalid symbol {symbol}"),
            });
        };
        depth.bids.truncate(limit);
        depth.asks.truncate(limit);

        Ok(RawDepthSnapshot::received_now(symbol, depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn raw(id: i64) -> RawAggTrade {
        RawAggTrade {
            agg_trade_id: id,
            price: "100.0".to_string(),
            quantity: "1.0".to_string(),
            first_trade_id: id,
            last_trade_id: id,
            trade_time: 1_700_000_000_000 + id,
            is_buyer_maker: false,
            is_best_match: true,
        }
    }

    #[tokio::test]
    async fn test_trades_from_id_pages() {
        let source = ReplaySource::new();
        source.push_trades("BTCUSDT", (1..=10).map(raw));

        let page = source
            .fetch_trades("BTCUSDT", TradeQuery::FromId(4), 3)
            .await
            .unwrap();
        let ids: Vec<i64> = page.iter().map(|t| t.agg_trade_id).collect();
        assert_eq!(ids, vec![4, 5, 6]);

        let page = source
            .fetch_trades("btcusdt", TradeQuery::FromId(11), 3)
            .await
            .unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_trades_since() {
        let source = ReplaySource::new();
        source.push_trades("BTCUSDT", (1..=10).map(raw));

        let since = Utc.timestamp_millis_opt(1_700_000_000_008).unwrap();
        let page = source
            .fetch_trades("BTCUSDT", TradeQuery::Since(since), 100)
            .await
            .unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].agg_trade_id, 8);
    }

    #[tokio::test]
    async fn test_failures_served_first() {
        let source = ReplaySource::new();
        source.push_trades("BTCUSDT", (1..=2).map(raw));
        source.fail_next(FetchError::Timeout);

        assert!(source
            .fetch_trades("BTCUSDT", TradeQuery::FromId(1), 10)
            .await
            .is_err());
        assert_eq!(
            source
                .fetch_trades("BTCUSDT", TradeQuery::FromId(1), 10)
                .await
                .unwrap()
                .len(),
            2
        );
        assert_eq!(source.requests(), 2);
    }

    #[tokio::test]
    async fn test_depth_repeats_last() {
        let source = ReplaySource::new();
        source.push_depth(
            "BTCUSDT",
            RawDepth {
                last_update_id: 7,
                bids: vec![["100.0".into(), "1.0".into()]],
                asks: vec![["101.0".into(), "1.0".into()]],
            },
        );

        for _ in 0..2 {
            let snapshot = source.fetch_depth("BTCUSDT", 100).await.unwrap();
            assert_eq!(snapshot.depth.last_update_id, 7);
            assert_eq!(snapshot.received_at.timestamp_subsec_nanos() % 1_000_000, 0);
        }
        assert!(source.fetch_depth("ETHUSDT", 100).await.is_err());
    }
}

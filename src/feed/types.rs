//! Binance REST wire types

use chrono::{DateTime, SubsecRound, Utc};
use serde::Deserialize;

/// Aggregate trade as returned by `GET /api/v3/aggTrades`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawAggTrade {
    /// Aggregate trade ID
    #[serde(rename = "a")]
    pub agg_trade_id: i64,
    /// Price
    #[serde(rename = "p")]
    pub price: String,
    /// Quantity
    #[serde(rename = "q")]
    pub quantity: String,
    /// First underlying trade ID
    #[serde(rename = "f")]
    pub first_trade_id: i64,
    /// Last underlying trade ID
    #[serde(rename = "l")]
    pub last_trade_id: i64,
    /// Trade time (milliseconds)
    #[serde(rename = "T")]
    pub trade_time: i64,
    /// Was the buyer the maker?
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
    /// Was the trade the best price match?
    #[serde(rename = "M", default)]
    pub is_best_match: bool,
}

/// Order book depth as returned by `GET /api/v3/depth`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDepth {
    pub last_update_id: i64,
    /// `[price, qty]` pairs, best (highest) first
    pub bids: Vec<[String; 2]>,
    /// `[price, qty]` pairs, best (lowest) first
    pub asks: Vec<[String; 2]>,
}

/// Depth response stamped with the symbol and local receive time.
///
/// Binance does not timestamp depth responses, so the snapshot time is the
/// moment the response arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDepthSnapshot {
    pub symbol: String,
    pub received_at: DateTime<Utc>,
    pub depth: RawDepth,
}

impl RawDepthSnapshot {
    /// Stamp `depth` with the current time, truncated to the millisecond
    /// precision the exchange uses for trade times
    pub fn received_now(symbol: impl Into<String>, depth: RawDepth) -> Self {
        Self {
            symbol: symbol.into(),
            received_at: Utc::now().trunc_subsecs(3),
            depth,
        }
    }
}

/// Where a trades request starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeQuery {
    /// Trades with `agg_trade_id >= id`
    FromId(i64),
    /// Trades executed at or after the given time
    Since(DateTime<Utc>),
}

//! Aggregate trade row

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Taker side of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A validated aggregate trade, as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRow {
    /// Aggregate trade ID, strictly increasing per symbol
    pub trade_id: i64,
    /// Exchange execution time
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    /// First underlying trade ID covered by this aggregate
    pub first_trade_id: i64,
    /// Last underlying trade ID covered by this aggregate
    pub last_trade_id: i64,
    /// True when the seller was the aggressor
    pub is_buyer_maker: bool,
    pub is_best_match: bool,
}

impl TradeRow {
    /// Trade side from the taker's perspective
    pub fn side(&self) -> TradeSide {
        if self.is_buyer_maker {
            TradeSide::Sell
        } else {
            TradeSide::Buy
        }
    }

    /// Trade value in quote currency
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }
}

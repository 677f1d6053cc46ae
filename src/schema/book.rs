//! Bucketed order book row

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One aggregated price level with cumulative liquidity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    /// Bucket price
    pub price: f64,
    /// Quantity summed inside the bucket
    pub qty: f64,
    /// Quantity summed from the best level down to this one
    pub cum_qty: f64,
    /// Quote value summed from the best level down to this one
    pub cum_usd: f64,
}

/// Order book snapshot aggregated at a single tick size.
///
/// Level vectors always have `num_levels` entries; `None` marks a level the
/// book was too thin to fill. Derived metrics are `None` when undefined
/// (empty side, zero denominator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRow {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub tick_size: f64,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub spread: Option<f64>,
    /// Spread as a fraction of the mid price
    pub spread_pct: Option<f64>,
    pub imbalance: Option<f64>,
    pub depth_ratio: Option<f64>,
    pub bid_levels: Vec<Option<BookLevel>>,
    pub ask_levels: Vec<Option<BookLevel>>,
}

impl BookRow {
    /// Number of level slots per side
    pub fn num_levels(&self) -> usize {
        self.bid_levels.len().max(self.ask_levels.len())
    }

    /// Levels actually filled on the bid side
    pub fn filled_bids(&self) -> impl Iterator<Item = &BookLevel> {
        self.bid_levels.iter().flatten()
    }

    /// Levels actually filled on the ask side
    pub fn filled_asks(&self) -> impl Iterator<Item = &BookLevel> {
        self.ask_levels.iter().flatten()
    }
}

//! Depth snapshot state

use super::PriceLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Validated L2 depth snapshot for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    /// Trading symbol
    pub symbol: String,
    /// Time the snapshot was taken
    pub timestamp: DateTime<Utc>,
    /// Exchange book sequence number
    pub last_update_id: i64,
    /// Bid levels, sorted best (highest) to worst
    pub bids: Vec<PriceLevel>,
    /// Ask levels, sorted best (lowest) to worst
    pub asks: Vec<PriceLevel>,
}

impl DepthSnapshot {
    /// Create a new empty snapshot
    pub fn new(symbol: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            last_update_id: 0,
            bids: vec![],
            asks: vec![],
        }
    }

    /// Get best bid price
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    /// Get best ask price
    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    /// True when either side has no liquidity
    pub fn is_one_sided(&self) -> bool {
        self.bids.is_empty() || self.asks.is_empty()
    }
}

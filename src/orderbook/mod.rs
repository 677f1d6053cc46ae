//! Order book module
//!
//! Validated depth snapshots and their aggregation into fixed-width price
//! buckets

mod aggregator;
mod book;

pub use aggregator::{aggregate, check_settings, ConfigurationError};
pub use book::DepthSnapshot;

use serde::{Deserialize, Serialize};

/// A raw price level in the order book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Price at this level
    pub price: f64,
    /// Total quantity available
    pub qty: f64,
}

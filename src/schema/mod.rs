//! Row schemas and validation
//!
//! Typed rows for the two stored series and the validator that turns raw
//! Binance responses into them

mod book;
mod trade;
mod validate;

pub use book::{BookLevel, BookRow};
pub use trade::{TradeRow, TradeSide};
pub(crate) use validate::same_tick_size;
pub use validate::{
    validate_batch, validate_book_row, validate_depth, validate_trade, BatchOutcome,
    ValidationError, DEFAULT_MAX_REJECT_RATIO,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of series a dataset holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Trades,
    #[serde(rename = "orderbook")]
    OrderBook,
}

impl DataKind {
    pub const ALL: [DataKind; 2] = [DataKind::Trades, DataKind::OrderBook];

    /// Directory name used in the storage layout
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Trades => "trades",
            DataKind::OrderBook => "orderbook",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DataKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trades" => Ok(DataKind::Trades),
            "orderbook" | "order_book" | "depth" => Ok(DataKind::OrderBook),
            other => Err(format!("unknown data kind: {other}")),
        }
    }
}

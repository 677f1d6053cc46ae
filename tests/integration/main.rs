//! Integration tests

mod collector;
mod config;
mod store;
mod sync;

use binance_collector::feed::RawAggTrade;
use binance_collector::schema::TradeRow;
use chrono::{TimeZone, Utc};

pub fn trade(id: i64) -> TradeRow {
    TradeRow {
        trade_id: id,
        timestamp: Utc.timestamp_millis_opt(1_700_000_000_000 + id * 250).unwrap(),
        symbol: "BTCUSDT".to_string(),
        price: 42000.0 + id as f64,
        quantity: 0.01,
        first_trade_id: id,
        last_trade_id: id,
        is_buyer_maker: id % 3 == 0,
        is_best_match: true,
    }
}

pub fn raw_trade(id: i64) -> RawAggTrade {
    RawAggTrade {
        agg_trade_id: id,
        price: format!("{}.25", 42000 + id),
        quantity: "0.015".to_string(),
        first_trade_id: id * 2,
        last_trade_id: id * 2 + 1,
        trade_time: Utc::now().timestamp_millis() - 120_000 + id,
        is_buyer_maker: id % 2 == 1,
        is_best_match: true,
    }
}

//! Multi-tick order book aggregation
//!
//! A depth snapshot is bucketed independently at every configured tick size.
//! Bids round down into their bucket and asks round up, so a bucket never
//! advertises a better price than the liquidity inside it. Each bucketed side
//! keeps its best `num_levels` buckets with running quantity and quote value.

use super::DepthSnapshot;
use crate::schema::{BookLevel, BookRow};
use std::collections::BTreeMap;
use thiserror::Error;

/// Relative tolerance used when a price sits on a bucket boundary
const BOUNDARY_EPSILON: f64 = 1e-9;

/// Most decimals a tick size is assumed to carry
const MAX_TICK_DECIMALS: i32 = 12;

/// Errors from invalid aggregation or query settings
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("No tick sizes configured for {0}")]
    NoTickSizes(String),
    #[error("Tick size must be positive and finite, got {0}")]
    InvalidTickSize(f64),
    #[error("Tick size {0} is listed more than once")]
    DuplicateTickSize(f64),
    #[error("Tick size {tick_size} is not configured for {symbol}")]
    UnknownTickSize { symbol: String, tick_size: f64 },
    #[error("Number of levels must be at least 1")]
    ZeroLevels,
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Bid,
    Ask,
}

/// Aggregate a snapshot into one row per tick size, in the order given
pub fn aggregate(
    snapshot: &DepthSnapshot,
    tick_sizes: &[f64],
    num_levels: usize,
) -> Result<Vec<BookRow>, ConfigurationError> {
    check_settings(&snapshot.symbol, tick_sizes, num_levels)?;

    Ok(tick_sizes
        .iter()
        .map(|&tick| aggregate_at(snapshot, tick, num_levels))
        .collect())
}

/// Validate a tick size set and level count
pub fn check_settings(
    symbol: &str,
    tick_sizes: &[f64],
    num_levels: usize,
) -> Result<(), ConfigurationError> {
    if num_levels == 0 {
        return Err(ConfigurationError::ZeroLevels);
    }
    if tick_sizes.is_empty() {
        return Err(ConfigurationError::NoTickSizes(symbol.to_string()));
    }
    for (i, &tick) in tick_sizes.iter().enumerate() {
        if !(tick.is_finite() && tick > 0.0) {
            return Err(ConfigurationError::InvalidTickSize(tick));
        }
        if tick_sizes[..i]
            .iter()
            .any(|&t| crate::schema::same_tick_size(t, tick))
        {
            return Err(ConfigurationError::DuplicateTickSize(tick));
        }
    }
    Ok(())
}

fn aggregate_at(snapshot: &DepthSnapshot, tick: f64, num_levels: usize) -> BookRow {
    let decimals = tick_decimals(tick);

    let bids = bucketize(snapshot.bids.iter().map(|l| (l.price, l.qty)), tick, Side::Bid);
    let asks = bucketize(snapshot.asks.iter().map(|l| (l.price, l.qty)), tick, Side::Ask);

    let bid_levels = cumulate(bids.into_iter().rev(), tick, decimals, num_levels);
    let ask_levels = cumulate(asks.into_iter(), tick, decimals, num_levels);

    let best_bid = bid_levels.first().copied().flatten().map(|l| l.price);
    let best_ask = ask_levels.first().copied().flatten().map(|l| l.price);

    let spread = match (best_bid, best_ask) {
        (Some(bid), Some(ask)) => Some(ask - bid),
        _ => None,
    };
    let spread_pct = match (spread, best_bid, best_ask) {
        (Some(spread), Some(bid), Some(ask)) => ratio(spread, (bid + ask) / 2.0),
        _ => None,
    };

    let deepest_bid = deepest(&bid_levels);
    let deepest_ask = deepest(&ask_levels);
    let bid_qty = deepest_bid.map_or(0.0, |l| l.cum_qty);
    let ask_qty = deepest_ask.map_or(0.0, |l| l.cum_qty);
    let bid_usd = deepest_bid.map_or(0.0, |l| l.cum_usd);
    let ask_usd = deepest_ask.map_or(0.0, |l| l.cum_usd);

    BookRow {
        timestamp: snapshot.timestamp,
        symbol: snapshot.symbol.clone(),
        tick_size: tick,
        best_bid,
        best_ask,
        spread,
        spread_pct,
        imbalance: ratio(bid_qty - ask_qty, bid_qty + ask_qty),
        depth_ratio: ratio(bid_usd, ask_usd),
        bid_levels,
        ask_levels,
    }
}

/// Sum quantity per bucket index
fn bucketize(
    levels: impl Iterator<Item = (f64, f64)>,
    tick: f64,
    side: Side,
) -> BTreeMap<i64, f64> {
    let mut buckets = BTreeMap::new();
    for (price, qty) in levels {
        *buckets.entry(bucket_index(price, tick, side)).or_insert(0.0) += qty;
    }
    buckets
}

fn bucket_index(price: f64, tick: f64, side: Side) -> i64 {
    let q = price / tick;
    let nearest = q.round();
    // 0.3 / 0.1 == 2.9999999999999996
    if (q - nearest).abs() <= BOUNDARY_EPSILON * nearest.abs().max(1.0) {
        return nearest as i64;
    }
    match side {
        Side::Bid => q.floor() as i64,
        Side::Ask => q.ceil() as i64,
    }
}

fn cumulate(
    buckets: impl Iterator<Item = (i64, f64)>,
    tick: f64,
    decimals: i32,
    num_levels: usize,
) -> Vec<Option<BookLevel>> {
    let mut levels = Vec::with_capacity(num_levels);
    let mut cum_qty = 0.0;
    let mut cum_usd = 0.0;

    for (index, qty) in buckets.take(num_levels) {
        let price = bucket_price(index, tick, decimals);
        cum_qty += qty;
        cum_usd += price * qty;
        levels.push(Some(BookLevel {
            price,
            qty,
            cum_qty,
            cum_usd,
        }));
    }

    levels.resize(num_levels, None);
    levels
}

fn deepest(levels: &[Option<BookLevel>]) -> Option<&BookLevel> {
    levels.iter().rev().find_map(|l| l.as_ref())
}

fn bucket_price(index: i64, tick: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (index as f64 * tick * scale).round() / scale
}

fn tick_decimals(tick: f64) -> i32 {
    (0..MAX_TICK_DECIMALS)
        .find(|&d| {
            let scaled = tick * 10f64.powi(d);
            (scaled - scaled.round()).abs() < 1e-6
        })
        .unwrap_or(MAX_TICK_DECIMALS)
}

/// `num / den`, or `None` when the denominator is zero
fn ratio(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 {
        return None;
    }
    let r = num / den;
    r.is_finite().then_some(r)
}

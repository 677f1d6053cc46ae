//! Raw record validation
//!
//! Every function here is pure: it borrows the raw record and either returns
//! a typed row or a [`ValidationError`]. Whether a rejected row aborts the
//! whole fetch is decided by [`validate_batch`].

use super::{BookRow, TradeRow};
use crate::feed::{RawAggTrade, RawDepthSnapshot};
use crate::orderbook::{DepthSnapshot, PriceLevel};
use chrono::DateTime;
use thiserror::Error;

/// Default share of rejected rows above which a whole fetch is failed
pub const DEFAULT_MAX_REJECT_RATIO: f64 = 0.05;

/// Validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Symbol is empty")]
    EmptySymbol,
    #[error("Field {field} is not a number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("Field {field} must be positive and finite, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("Invalid timestamp: {0} ms")]
    InvalidTimestamp(i64),
    #[error("Invalid trade ids: id={id}, first={first}, last={last}")]
    InvalidTradeIds { id: i64, first: i64, last: i64 },
    #[error("Tick size {tick_size} is not configured for {symbol}")]
    TickSizeNotConfigured { symbol: String, tick_size: f64 },
    #[error("Bid and ask level counts differ: {bids} vs {asks}")]
    LevelCountMismatch { bids: usize, asks: usize },
    #[error("Rejected {rejected} of {total} rows, likely an upstream schema change")]
    RejectRatioExceeded { rejected: usize, total: usize },
}

/// Rows that passed validation plus the number that did not
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<T> {
    pub rows: Vec<T>,
    pub rejected: usize,
}

/// Validate a batch, skipping malformed rows.
///
/// Fails the whole batch when more than `max_reject_ratio` of it is rejected.
pub fn validate_batch<T, U, F>(
    items: &[T],
    max_reject_ratio: f64,
    validate: F,
) -> Result<BatchOutcome<U>, ValidationError>
where
    F: Fn(&T) -> Result<U, ValidationError>,
{
    let mut rows = Vec::with_capacity(items.len());
    let mut rejected = 0;

    for item in items {
        match validate(item) {
            Ok(row) => rows.push(row),
            Err(e) => {
                rejected += 1;
                tracing::warn!(error = %e, "Skipping malformed row");
            }
        }
    }

    check_ratio(rejected, items.len(), max_reject_ratio)?;

    Ok(BatchOutcome { rows, rejected })
}

fn check_ratio(rejected: usize, total: usize, max_reject_ratio: f64) -> Result<(), ValidationError> {
    if total > 0 && rejected as f64 / total as f64 > max_reject_ratio {
        return Err(ValidationError::RejectRatioExceeded { rejected, total });
    }
    Ok(())
}

/// Validate a raw aggregate trade
pub fn validate_trade(symbol: &str, raw: &RawAggTrade) -> Result<TradeRow, ValidationError> {
    check_symbol(symbol)?;

    let price = parse_positive("price", &raw.price)?;
    let quantity = parse_positive("quantity", &raw.quantity)?;

    if raw.agg_trade_id < 0
        || raw.first_trade_id < 0
        || raw.first_trade_id > raw.last_trade_id
    {
        return Err(ValidationError::InvalidTradeIds {
            id: raw.agg_trade_id,
            first: raw.first_trade_id,
            last: raw.last_trade_id,
        });
    }

    if raw.trade_time <= 0 {
        return Err(ValidationError::InvalidTimestamp(raw.trade_time));
    }
    let timestamp = DateTime::from_timestamp_millis(raw.trade_time)
        .ok_or(ValidationError::InvalidTimestamp(raw.trade_time))?;

    Ok(TradeRow {
        trade_id: raw.agg_trade_id,
        timestamp,
        symbol: symbol.to_string(),
        price,
        quantity,
        first_trade_id: raw.first_trade_id,
        last_trade_id: raw.last_trade_id,
        is_buyer_maker: raw.is_buyer_maker,
        is_best_match: raw.is_best_match,
    })
}

/// Validate and normalize a raw depth snapshot.
///
/// Malformed levels are skipped and counted against `max_reject_ratio`;
/// zero-quantity levels are dropped without counting. Sides are re-sorted
/// best first. Returns the snapshot and the number of rejected levels.
pub fn validate_depth(
    raw: &RawDepthSnapshot,
    max_reject_ratio: f64,
) -> Result<(DepthSnapshot, usize), ValidationError> {
    check_symbol(&raw.symbol)?;

    if raw.received_at.timestamp_millis() <= 0 {
        return Err(ValidationError::InvalidTimestamp(
            raw.received_at.timestamp_millis(),
        ));
    }

    let mut rejected = 0;
    let mut bids = parse_levels(&raw.depth.bids, &mut rejected);
    let mut asks = parse_levels(&raw.depth.asks, &mut rejected);

    check_ratio(
        rejected,
        raw.depth.bids.len() + raw.depth.asks.len(),
        max_reject_ratio,
    )?;

    bids.sort_by(|a, b| b.price.total_cmp(&a.price));
    asks.sort_by(|a, b| a.price.total_cmp(&b.price));

    Ok((
        DepthSnapshot {
            symbol: raw.symbol.clone(),
            timestamp: raw.received_at,
            last_update_id: raw.depth.last_update_id,
            bids,
            asks,
        },
        rejected,
    ))
}

/// Check a bucketed row against the symbol's configured tick sizes
pub fn validate_book_row(row: &BookRow, tick_sizes: &[f64]) -> Result<(), ValidationError> {
    check_symbol(&row.symbol)?;

    if !(row.tick_size.is_finite() && row.tick_size > 0.0) {
        return Err(ValidationError::NonPositive {
            field: "tick_size",
            value: row.tick_size,
        });
    }

    if !tick_sizes.iter().any(|t| same_tick_size(*t, row.tick_size)) {
        return Err(ValidationError::TickSizeNotConfigured {
            symbol: row.symbol.clone(),
            tick_size: row.tick_size,
        });
    }

    if row.bid_levels.len() != row.ask_levels.len() {
        return Err(ValidationError::LevelCountMismatch {
            bids: row.bid_levels.len(),
            asks: row.ask_levels.len(),
        });
    }

    Ok(())
}

/// Tick sizes compare equal when they differ only by float noise
pub(crate) fn same_tick_size(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1.0)
}

fn check_symbol(symbol: &str) -> Result<(), ValidationError> {
    if symbol.trim().is_empty() {
        return Err(ValidationError::EmptySymbol);
    }
    Ok(())
}

fn parse_number(field: &'static str, value: &str) -> Result<f64, ValidationError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValidationError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

fn parse_positive(field: &'static str, value: &str) -> Result<f64, ValidationError> {
    let v = parse_number(field, value)?;
    if v <= 0.0 {
        return Err(ValidationError::NonPositive { field, value: v });
    }
    Ok(v)
}

fn parse_levels(raw: &[[String; 2]], rejected: &mut usize) -> Vec<PriceLevel> {
    let mut levels = Vec::with_capacity(raw.len());

    for [price, qty] in raw {
        let level = parse_positive("level_price", price).and_then(|price| {
            let qty = parse_number("level_qty", qty)?;
            if qty < 0.0 {
                return Err(ValidationError::NonPositive {
                    field: "level_qty",
                    value: qty,
                });
            }
            Ok(PriceLevel { price, qty })
        });

        match level {
            Ok(level) if level.qty == 0.0 => {}
            Ok(level) => levels.push(level),
            Err(e) => {
                *rejected += 1;
                tracing::warn!(error = %e, "Skipping malformed depth level");
            }
        }
    }

    levels
}

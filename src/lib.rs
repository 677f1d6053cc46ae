//! binance-collector: incremental Binance market data collector
//!
//! This library provides the core components for:
//! - Paginated trade history and depth snapshots from the Binance REST API
//! - Order book bucketing at configurable tick sizes
//! - Row validation before anything is written
//! - Deduplicated, atomically written Parquet datasets with hot files
//! - Cursor-based resume and store-to-store sync
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod collector;
pub mod config;
pub mod data;
pub mod feed;
pub mod orderbook;
pub mod schema;
pub mod sync;
pub mod telemetry;

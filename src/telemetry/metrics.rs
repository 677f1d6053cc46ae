//! Prometheus metrics

use crate::schema::DataKind;
use metrics::{counter, histogram};
use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// One exchange request
    Fetch,
    /// One dataset append, including the file rewrite
    Append,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    RowsWritten,
    RowsSkipped,
    RowsRejected,
    FetchRetries,
    CyclesFailed,
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, kind: DataKind, symbol: &str, duration: Duration) {
    let metric_name = match metric {
        LatencyMetric::Fetch => "collector_fetch_latency_ms",
        LatencyMetric::Append => "store_append_latency_ms",
    };

    histogram!(metric_name, "kind" => kind.as_str(), "symbol" => symbol.to_string())
        .record(duration.as_secs_f64() * 1000.0);
}

/// Add `value` to a counter
pub fn increment(metric: CounterMetric, kind: DataKind, symbol: &str, value: u64) {
    if value == 0 {
        return;
    }

    let metric_name = match metric {
        CounterMetric::RowsWritten => "collector_rows_written_total",
        CounterMetric::RowsSkipped => "collector_rows_skipped_total",
        CounterMetric::RowsRejected => "collector_rows_rejected_total",
        CounterMetric::FetchRetries => "collector_fetch_retries_total",
        CounterMetric::CyclesFailed => "collector_cycles_failed_total",
    };

    counter!(metric_name, "kind" => kind.as_str(), "symbol" => symbol.to_string()).increment(value);
}

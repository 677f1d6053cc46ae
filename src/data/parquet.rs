//! Parquet encoding for stored rows

use super::StoreError;
use crate::schema::{BookLevel, BookRow, TradeRow};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::ChunkReader;
use serde::Deserialize;
use std::io::Write;
use std::sync::Arc;

use super::Record;

/// Rows per row group. Tail reads touch at most one group.
pub const ROW_GROUP_SIZE: usize = 8192;

/// Compression codec for dataset files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Snappy,
    Zstd,
    Gzip,
    Lz4,
    None,
}

impl Codec {
    fn compression(self) -> Compression {
        match self {
            Codec::Snappy => Compression::SNAPPY,
            Codec::Zstd => Compression::ZSTD(ZstdLevel::default()),
            Codec::Gzip => Compression::GZIP(GzipLevel::default()),
            Codec::Lz4 => Compression::LZ4_RAW,
            Codec::None => Compression::UNCOMPRESSED,
        }
    }
}

impl std::str::FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "snappy" => Ok(Codec::Snappy),
            "zstd" => Ok(Codec::Zstd),
            "gzip" => Ok(Codec::Gzip),
            "lz4" => Ok(Codec::Lz4),
            "none" | "uncompressed" => Ok(Codec::None),
            other => Err(format!("unsupported compression codec: {other}")),
        }
    }
}

fn timestamp_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        false,
    )
}

/// Trade schema fields
pub fn trade_schema() -> Schema {
    Schema::new(vec![
        Field::new("trade_id", DataType::Int64, false),
        timestamp_field("timestamp"),
        Field::new("symbol", DataType::Utf8, false),
        Field::new("price", DataType::Float64, false),
        Field::new("quantity", DataType::Float64, false),
        Field::new("first_trade_id", DataType::Int64, false),
        Field::new("last_trade_id", DataType::Int64, false),
        Field::new("is_buyer_maker", DataType::Boolean, false),
        Field::new("is_best_match", DataType::Boolean, false),
    ])
}

const BOOK_METRICS: [&str; 6] = [
    "best_bid",
    "best_ask",
    "spread",
    "spread_pct",
    "imbalance",
    "depth_ratio",
];

const LEVEL_FIELDS: [&str; 4] = ["price", "qty", "cum_qty", "cum_usd"];

/// Order book schema: fixed columns then `num_levels` bid and ask levels
pub fn book_schema(num_levels: usize) -> Schema {
    let mut fields = vec![
        timestamp_field("timestamp"),
        Field::new("symbol", DataType::Utf8, false),
        Field::new("tick_size", DataType::Float64, false),
    ];

    for name in BOOK_METRICS {
        fields.push(Field::new(name, DataType::Float64, true));
    }

    for side in ["bid", "ask"] {
        for i in 1..=num_levels {
            for field in LEVEL_FIELDS {
                fields.push(Field::new(
                    format!("{side}_{field}_{i}"),
                    DataType::Float64,
                    true,
                ));
            }
        }
    }

    Schema::new(fields)
}

fn timestamps(values: Vec<i64>) -> ArrayRef {
    Arc::new(TimestampMicrosecondArray::from(values).with_timezone("UTC"))
}

/// Encode trades as a record batch
pub fn trades_to_batch(rows: &[TradeRow]) -> Result<RecordBatch, StoreError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.trade_id))),
        timestamps(rows.iter().map(|r| r.timestamp.timestamp_micros()).collect()),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.symbol.as_str()))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.price))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.quantity))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.first_trade_id))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.last_trade_id))),
        Arc::new(BooleanArray::from(
            rows.iter().map(|r| r.is_buyer_maker).collect::<Vec<_>>(),
        )),
        Arc::new(BooleanArray::from(
            rows.iter().map(|r| r.is_best_match).collect::<Vec<_>>(),
        )),
    ];

    Ok(RecordBatch::try_new(Arc::new(trade_schema()), columns)?)
}

/// Decode trades from a record batch
pub fn trades_from_batch(batch: &RecordBatch) -> Result<Vec<TradeRow>, StoreError> {
    let trade_ids = column::<Int64Array>(batch, "trade_id")?;
    let times = column::<TimestampMicrosecondArray>(batch, "timestamp")?;
    let symbols = column::<StringArray>(batch, "symbol")?;
    let prices = column::<Float64Array>(batch, "price")?;
    let quantities = column::<Float64Array>(batch, "quantity")?;
    let first_ids = column::<Int64Array>(batch, "first_trade_id")?;
    let last_ids = column::<Int64Array>(batch, "last_trade_id")?;
    let buyer_maker = column::<BooleanArray>(batch, "is_buyer_maker")?;
    let best_match = column::<BooleanArray>(batch, "is_best_match")?;

    (0..batch.num_rows())
        .map(|i| {
            Ok(TradeRow {
                trade_id: trade_ids.value(i),
                timestamp: micros_to_datetime(times.value(i))?,
                symbol: symbols.value(i).to_string(),
                price: prices.value(i),
                quantity: quantities.value(i),
                first_trade_id: first_ids.value(i),
                last_trade_id: last_ids.value(i),
                is_buyer_maker: buyer_maker.value(i),
                is_best_match: best_match.value(i),
            })
        })
        .collect()
}

fn level_at(levels: &[Option<BookLevel>], i: usize) -> Option<BookLevel> {
    levels.get(i).copied().flatten()
}

/// Encode order book rows as a record batch.
///
/// The level count is the widest row in the batch; narrower rows are padded
/// with nulls.
pub fn books_to_batch(rows: &[BookRow]) -> Result<RecordBatch, StoreError> {
    let num_levels = rows.iter().map(BookRow::num_levels).max().unwrap_or(0);

    let metric = |f: fn(&BookRow) -> Option<f64>| -> ArrayRef {
        Arc::new(Float64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
    };

    let mut columns: Vec<ArrayRef> = vec![
        timestamps(rows.iter().map(|r| r.timestamp.timestamp_micros()).collect()),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.symbol.as_str()))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.tick_size))),
        metric(|r| r.best_bid),
        metric(|r| r.best_ask),
        metric(|r| r.spread),
        metric(|r| r.spread_pct),
        metric(|r| r.imbalance),
        metric(|r| r.depth_ratio),
    ];

    let sides: [fn(&BookRow) -> &[Option<BookLevel>]; 2] =
        [|r| r.bid_levels.as_slice(), |r| r.ask_levels.as_slice()];

    for side in sides {
        for i in 0..num_levels {
            let fields: [fn(&BookLevel) -> f64; 4] =
                [|l| l.price, |l| l.qty, |l| l.cum_qty, |l| l.cum_usd];
            for field in fields {
                let values: Vec<Option<f64>> = rows
                    .iter()
                    .map(|r| level_at(side(r), i).map(|l| field(&l)))
                    .collect();
                columns.push(Arc::new(Float64Array::from(values)));
            }
        }
    }

    Ok(RecordBatch::try_new(
        Arc::new(book_schema(num_levels)),
        columns,
    )?)
}

/// Decode order book rows from a record batch
pub fn books_from_batch(batch: &RecordBatch) -> Result<Vec<BookRow>, StoreError> {
    let num_levels = (1..)
        .take_while(|i| batch.column_by_name(&format!("bid_price_{i}")).is_some())
        .count();

    let times = column::<TimestampMicrosecondArray>(batch, "timestamp")?;
    let symbols = column::<StringArray>(batch, "symbol")?;
    let ticks = column::<Float64Array>(batch, "tick_size")?;
    let metrics = BOOK_METRICS
        .iter()
        .map(|name| column::<Float64Array>(batch, name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut sides = Vec::with_capacity(2);
    for side in ["bid", "ask"] {
        let mut levels = Vec::with_capacity(num_levels);
        for i in 1..=num_levels {
            let cols = LEVEL_FIELDS
                .iter()
                .map(|field| column::<Float64Array>(batch, &format!("{side}_{field}_{i}")))
                .collect::<Result<Vec<_>, _>>()?;
            levels.push(cols);
        }
        sides.push(levels);
    }

    let read_levels = |side: &[Vec<&Float64Array>], row: usize| -> Vec<Option<BookLevel>> {
        side.iter()
            .map(|cols| {
                optional(cols[0], row).map(|price| BookLevel {
                    price,
                    qty: optional(cols[1], row).unwrap_or_default(),
                    cum_qty: optional(cols[2], row).unwrap_or_default(),
                    cum_usd: optional(cols[3], row).unwrap_or_default(),
                })
            })
            .collect()
    };

    (0..batch.num_rows())
        .map(|i| {
            Ok(BookRow {
                timestamp: micros_to_datetime(times.value(i))?,
                symbol: symbols.value(i).to_string(),
                tick_size: ticks.value(i),
                best_bid: optional(metrics[0], i),
                best_ask: optional(metrics[1], i),
                spread: optional(metrics[2], i),
                spread_pct: optional(metrics[3], i),
                imbalance: optional(metrics[4], i),
                depth_ratio: optional(metrics[5], i),
                bid_levels: read_levels(&sides[0], i),
                ask_levels: read_levels(&sides[1], i),
            })
        })
        .collect()
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| StoreError::Column(name.to_string()))
}

fn optional(array: &Float64Array, i: usize) -> Option<f64> {
    (!array.is_null(i)).then(|| array.value(i))
}

fn micros_to_datetime(micros: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(micros).ok_or(StoreError::Timestamp(micros))
}

/// Write rows as a single Parquet file
pub fn write_rows<R: Record, W: Write + Send>(
    out: W,
    rows: &[R],
    codec: Codec,
) -> Result<(), StoreError> {
    let batch = R::to_batch(rows)?;

    let props = WriterProperties::builder()
        .set_compression(codec.compression())
        .set_max_row_group_size(ROW_GROUP_SIZE)
        .build();

    let mut writer = ArrowWriter::try_new(out, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

/// Read every row of a Parquet file
pub fn read_rows<R: Record, T: ChunkReader + 'static>(input: T) -> Result<Vec<R>, StoreError> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(input)?.build()?;

    let mut rows = Vec::new();
    for batch in reader {
        rows.extend(R::from_batch(&batch?)?);
    }
    Ok(rows)
}

/// Which end of a file to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowGroupEnd {
    First,
    Last,
}

/// Read the first or last row group only
pub fn read_row_group<R: Record, T: ChunkReader + 'static>(
    input: T,
    end: RowGroupEnd,
) -> Result<Vec<R>, StoreError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(input)?;
    let groups = builder.metadata().num_row_groups();
    if groups == 0 {
        return Ok(vec![]);
    }

    let index = match end {
        RowGroupEnd::First => 0,
        RowGroupEnd::Last => groups - 1,
    };

    let reader = builder.with_row_groups(vec![index]).build()?;
    let mut rows = Vec::new();
    for batch in reader {
        rows.extend(R::from_batch(&batch?)?);
    }
    Ok(rows)
}

/// Row count from the file footer
pub fn row_count<T: ChunkReader + 'static>(input: T) -> Result<u64, StoreError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(input)?;
    Ok(builder.metadata().file_metadata().num_rows().max(0) as u64)
}

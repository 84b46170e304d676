//! The pure part of the Batch Cleaner: a header-less raw frame in, deduplicated
//! weather and air-quality frames out.
//!
//! Everything runs as one polars lazy query. Cells are trimmed and missing
//! markers become null, timestamps and city names are normalized per column,
//! numbers are cast leniently, and duplicates collapse onto the most complete row.

use crate::cleaner::error::CleanError;
use crate::identity::normalize_location_name;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;

/// Schema assigned to the 14 positional fields of a raw record.
pub const RAW_COLUMNS: [&str; 14] = [
    "datetime",
    "city",
    "temp",
    "humidity",
    "weather",
    "wind_speed",
    "aqi",
    "co",
    "no",
    "no2",
    "o3",
    "so2",
    "pm2_5",
    "pm10",
];

pub const WEATHER_COLUMNS: [&str; 6] =
    ["datetime", "city", "temp", "humidity", "weather", "wind_speed"];

pub const AIR_QUALITY_COLUMNS: [&str; 10] = [
    "datetime", "city", "aqi", "co", "no", "no2", "o3", "so2", "pm2_5", "pm10",
];

/// Output layout of the `datetime` column. Fractional seconds only when present.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Cell values read as missing, in addition to blank cells.
const MISSING_TOKENS: [&str; 7] = ["N/A", "n/a", "NA", "#N/A", "NaN", "nan", "null"];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const TIME_UNIT: TimeUnit = TimeUnit::Microseconds;

const EMPTY_FLAG: &str = "__empty";
const COMPLETENESS: &str = "__completeness";

/// Parses a raw timestamp in any of the accepted layouts.
///
/// RFC 3339 values with an offset are converted to UTC; naive values are kept
/// as written.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.naive_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Counters of what the cleaner kept and dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanStats {
    pub input_rows: usize,
    pub empty_rows: usize,
    pub bad_timestamps: usize,
    pub missing_city: usize,
    pub duplicates: usize,
    pub output_rows: usize,
}

/// The two projections of the deduplicated frame, sorted by (datetime, city).
///
/// `datetime` is a `Datetime(μs)` column, `city` and `weather` are strings and
/// every other column is `Float64`.
#[derive(Debug, Clone)]
pub struct CleanOutput {
    pub weather: DataFrame,
    pub air_quality: DataFrame,
    pub stats: CleanStats,
}

/// An empty frame with the raw schema, every column as text.
pub fn empty_raw_frame() -> PolarsResult<DataFrame> {
    let columns = RAW_COLUMNS
        .iter()
        .map(|name| Column::new((*name).into(), Vec::<Option<String>>::new()))
        .collect();
    DataFrame::new(columns)
}

/// Trimmed text of `name`, with blank cells and missing markers as null.
fn text_cell(name: &str) -> Expr {
    let cell = col(name).cast(DataType::String).str().strip_chars(lit(NULL));
    let missing = MISSING_TOKENS
        .iter()
        .fold(cell.clone().eq(lit("")), |acc, token| {
            acc.or(cell.clone().eq(lit(*token)))
        });
    when(missing).then(lit(NULL)).otherwise(cell).alias(name)
}

/// `name` as a finite float; anything else becomes null.
fn number_cell(name: &str) -> Expr {
    let value = col(name).cast(DataType::Float64);
    when(value.clone().is_finite())
        .then(value)
        .otherwise(lit(NULL))
        .alias(name)
}

fn parse_datetimes(column: Column) -> PolarsResult<Option<Column>> {
    let micros: Int64Chunked = column
        .str()?
        .into_iter()
        .map(|cell| {
            cell.and_then(parse_timestamp)
                .map(|dt| dt.and_utc().timestamp_micros())
        })
        .collect();
    let parsed = micros
        .with_name(column.name().clone())
        .into_datetime(TIME_UNIT, None);
    Ok(Some(parsed.into_column()))
}

fn normalize_cities(column: Column) -> PolarsResult<Option<Column>> {
    let names: StringChunked = column
        .str()?
        .into_iter()
        .map(|cell| cell.map(normalize_location_name).filter(|n| !n.is_empty()))
        .collect();
    Ok(Some(names.with_name(column.name().clone()).into_column()))
}

fn count_rows(df: &DataFrame, predicate: Expr) -> PolarsResult<usize> {
    Ok(df.clone().lazy().filter(predicate).collect()?.height())
}

/// Cleans, deduplicates and splits a raw frame of 14 positional columns.
///
/// Rows are dropped when every cell is missing, when the timestamp does not
/// parse, or when the city is blank. For each (city, datetime) key the row
/// with the most present values wins; ties go to the smallest values, column
/// by column, with nulls last. Output is sorted by (datetime, city), so any
/// permutation of the same input yields the same frames.
///
/// # Errors
///
/// Returns [`CleanError::ColumnCount`] when `raw` is not 14 columns wide and
/// [`CleanError::DataFrameProcessing`] when the query fails.
pub fn clean_frame(mut raw: DataFrame) -> Result<CleanOutput, CleanError> {
    if raw.width() != RAW_COLUMNS.len() {
        return Err(CleanError::ColumnCount {
            expected: RAW_COLUMNS.len(),
            found: raw.width(),
        });
    }
    raw.set_column_names(RAW_COLUMNS)?;
    let input_rows = raw.height();

    let is_empty = RAW_COLUMNS
        .iter()
        .fold(lit(true), |acc, name| acc.and(col(*name).is_null()));
    let mut typed = vec![
        is_empty.alias(EMPTY_FLAG),
        col("datetime").map(
            parse_datetimes,
            GetOutput::from_type(DataType::Datetime(TIME_UNIT, None)),
        ),
        col("city").map(normalize_cities, GetOutput::from_type(DataType::String)),
    ];
    typed.extend(
        RAW_COLUMNS[2..]
            .iter()
            .filter(|name| **name != "weather")
            .map(|name| number_cell(name)),
    );

    let normalized = raw
        .lazy()
        .with_columns(RAW_COLUMNS.iter().map(|name| text_cell(name)).collect::<Vec<_>>())
        .with_columns(typed)
        .collect()?;

    let empty_rows = count_rows(&normalized, col(EMPTY_FLAG))?;
    let bad_timestamps = count_rows(
        &normalized,
        col(EMPTY_FLAG).not().and(col("datetime").is_null()),
    )?;
    let missing_city = count_rows(
        &normalized,
        col("datetime").is_not_null().and(col("city").is_null()),
    )?;
    let kept = input_rows - empty_rows - bad_timestamps - missing_city;

    let completeness = RAW_COLUMNS[2..].iter().fold(lit(0u32), |acc, name| {
        acc + col(*name).is_not_null().cast(DataType::UInt32)
    });
    let mut preference = vec![col(COMPLETENESS)];
    preference.extend(RAW_COLUMNS.iter().map(|name| col(*name)));
    let descending = std::iter::once(true).chain(RAW_COLUMNS.iter().map(|_| false));

    let deduped = normalized
        .lazy()
        .filter(col("datetime").is_not_null().and(col("city").is_not_null()))
        .with_column(completeness.alias(COMPLETENESS))
        .sort_by_exprs(
            preference,
            SortMultipleOptions::default()
                .with_order_descending_multi(descending)
                .with_nulls_last(true)
                .with_maintain_order(true),
        )
        .unique_stable(
            Some(vec!["datetime".into(), "city".into()]),
            UniqueKeepStrategy::First,
        )
        .sort_by_exprs(
            [col("datetime"), col("city")],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .select(RAW_COLUMNS.iter().map(|name| col(*name)).collect::<Vec<_>>())
        .collect()?;

    let stats = CleanStats {
        input_rows,
        empty_rows,
        bad_timestamps,
        missing_city,
        duplicates: kept - deduped.height(),
        output_rows: deduped.height(),
    };

    Ok(CleanOutput {
        weather: deduped.select(WEATHER_COLUMNS)?,
        air_quality: deduped.select(AIR_QUALITY_COLUMNS)?,
        stats,
    })
}

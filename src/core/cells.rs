//! Polars column helpers: typed views used by filtering, and row-wise access for export.

use chrono::{DateTime, Duration, NaiveDate};
use polars::prelude::*;

use crate::core::schema::{format_number, parse_date};

/// A single cell value lifted out of a polars column
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Missing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Text(String),
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

pub fn days_since_epoch(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

pub fn date_from_days(days: i32) -> Option<NaiveDate> {
    epoch().checked_add_signed(Duration::days(days as i64))
}

fn datetime_to_date(ts: i64, unit: TimeUnit) -> Option<NaiveDate> {
    let dt = match unit {
        TimeUnit::Nanoseconds => DateTime::from_timestamp_nanos(ts),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(ts)?,
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(ts)?,
    };
    Some(dt.date_naive())
}

/// Convert a polars value to a [`CellValue`]
pub fn cell_from_any(value: &AnyValue) -> CellValue {
    match value {
        AnyValue::Null => CellValue::Missing,
        AnyValue::Boolean(b) => CellValue::Bool(*b),
        AnyValue::Int8(n) => CellValue::Int(*n as i64),
        AnyValue::Int16(n) => CellValue::Int(*n as i64),
        AnyValue::Int32(n) => CellValue::Int(*n as i64),
        AnyValue::Int64(n) => CellValue::Int(*n),
        AnyValue::UInt8(n) => CellValue::Int(*n as i64),
        AnyValue::UInt16(n) => CellValue::Int(*n as i64),
        AnyValue::UInt32(n) => CellValue::Int(*n as i64),
        AnyValue::UInt64(n) => CellValue::Int(*n as i64),
        AnyValue::Float32(f) => float_cell(*f as f64),
        AnyValue::Float64(f) => float_cell(*f),
        AnyValue::Date(days) => date_from_days(*days).map(CellValue::Date).unwrap_or(CellValue::Missing),
        AnyValue::Datetime(ts, unit, _) | AnyValue::DatetimeOwned(ts, unit, _) => {
            datetime_to_date(*ts, *unit)
                .map(CellValue::Date)
                .unwrap_or(CellValue::Missing)
        }
        AnyValue::String(s) => text_cell(s),
        AnyValue::StringOwned(s) => text_cell(s.as_str()),
        other => text_cell(&other.to_string()),
    }
}

fn float_cell(f: f64) -> CellValue {
    if f.is_nan() { CellValue::Missing } else { CellValue::Float(f) }
}

fn text_cell(s: &str) -> CellValue {
    if s.is_empty() { CellValue::Missing } else { CellValue::Text(s.to_string()) }
}

/// All cells of a column, in row order
pub fn column_cells(column: &Column) -> PolarsResult<Vec<CellValue>> {
    let series = column.as_materialized_series();
    let mut out = Vec::with_capacity(series.len());
    for idx in 0..series.len() {
        out.push(cell_from_any(&series.get(idx)?));
    }
    Ok(out)
}

/// Display keys of a column. Nulls, NaN and empty text come back as null.
///
/// Floats use [`format_number`] so `2.0` keys as `"2"`, matching how the
/// workbook shows whole numbers.
pub fn key_column(column: &Column) -> PolarsResult<StringChunked> {
    let keys = match column.dtype() {
        DataType::String => column.str()?.into_iter().map(|s| s.filter(|s| !s.is_empty())).collect(),
        DataType::Float32 | DataType::Float64 => {
            let values = column.cast(&DataType::Float64)?;
            values
                .f64()?
                .into_iter()
                .map(|v| v.filter(|f| !f.is_nan()).map(format_number))
                .collect()
        }
        DataType::Datetime(_, _) => column.cast(&DataType::Date)?.cast(&DataType::String)?.str()?.clone(),
        _ => column.cast(&DataType::String)?.str()?.clone(),
    };
    Ok(keys)
}

fn parse_decimal(s: &str) -> Option<f64> {
    s.trim().replace(',', ".").parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Column as `f64`; text is parsed with either decimal separator, anything else is null
pub fn numeric_values(column: &Column) -> PolarsResult<Float64Chunked> {
    match column.dtype() {
        dtype if is_numeric_dtype(dtype) => Ok(column.cast(&DataType::Float64)?.f64()?.clone()),
        DataType::String => Ok(column.str()?.into_iter().map(|s| s.and_then(parse_decimal)).collect()),
        _ => Ok(Float64Chunked::full_null(PlSmallStr::EMPTY, column.len())),
    }
}

/// Column as days since 1970-01-01; text is parsed leniently, anything else is null
pub fn date_days(column: &Column) -> PolarsResult<Int32Chunked> {
    match column.dtype() {
        DataType::Date | DataType::Datetime(_, _) => {
            let days = column.cast(&DataType::Date)?.cast(&DataType::Int32)?;
            Ok(days.i32()?.clone())
        }
        DataType::String => Ok(column
            .str()?
            .into_iter()
            .map(|s| s.and_then(parse_date).map(days_since_epoch))
            .collect()),
        _ => Ok(Int32Chunked::full_null(PlSmallStr::EMPTY, column.len())),
    }
}

/// Whether the dtype holds numbers
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Whether the dtype holds dates or timestamps
pub fn is_temporal_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Date | DataType::Datetime(_, _))
}

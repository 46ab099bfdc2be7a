//! # Typed Literals
//!
//! A [`Literal`] is a single non-null value of one of the table's primitive
//! types. Literals appear in predicates, partition tuples and column bounds,
//! and can be converted to single-element Arrow arrays for vectorized
//! comparisons.

use std::cmp::Ordering;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, BooleanArray, Date32Array, Float32Array, Float64Array,
    Int32Array, Int64Array, Scalar, StringArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{
    DataType, Date32Type, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type,
    TimeUnit, TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType, UInt8Type, UInt16Type, UInt32Type,
};
use arrow::error::ArrowError;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat};
use serde::{Deserialize, Serialize};

use crate::schema::Type;

pub(crate) const MICROS_PER_HOUR: i64 = 3_600_000_000;
pub(crate) const MICROS_PER_DAY: i64 = 24 * MICROS_PER_HOUR;

/// Days from 0001-01-01 (CE) to 1970-01-01.
const UNIX_EPOCH_DAY_FROM_CE: i32 = 719_163;

/// A typed scalar value.
///
/// Dates are days since 1970-01-01 and timestamps are microseconds since the
/// Unix epoch (UTC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Literal {
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Date(i32),
    Timestamp(i64),
    String(String),
    Binary(Vec<u8>),
}

impl Literal {
    pub fn string(value: impl Into<String>) -> Self {
        Literal::String(value.into())
    }

    /// Creates a date literal from a calendar date.
    pub fn date_from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(|d| Literal::Date(days_since_epoch(d)))
    }

    /// Parses an ISO-8601 date (`YYYY-MM-DD`).
    pub fn date_from_str(value: &str) -> Option<Self> {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .map(|d| Literal::Date(days_since_epoch(d)))
    }

    /// Parses an RFC 3339 timestamp, or a naive ISO-8601 timestamp read as UTC.
    pub fn timestamp_from_str(value: &str) -> Option<Self> {
        parse_timestamp_micros(value).map(Literal::Timestamp)
    }

    /// Returns the name of this literal's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Boolean(_) => "boolean",
            Literal::Int(_) => "int",
            Literal::Long(_) => "long",
            Literal::Float(_) => "float",
            Literal::Double(_) => "double",
            Literal::Date(_) => "date",
            Literal::Timestamp(_) => "timestamp",
            Literal::String(_) => "string",
            Literal::Binary(_) => "binary",
        }
    }

    /// Returns true if this literal is a value of `field_type` without conversion.
    pub fn matches_type(&self, field_type: &Type) -> bool {
        matches!(
            (self, field_type),
            (Literal::Boolean(_), Type::Boolean)
                | (Literal::Int(_), Type::Int)
                | (Literal::Long(_), Type::Long)
                | (Literal::Float(_), Type::Float)
                | (Literal::Double(_), Type::Double)
                | (Literal::Date(_), Type::Date)
                | (Literal::Timestamp(_), Type::Timestamp { .. })
                | (Literal::String(_), Type::String)
                | (Literal::Binary(_), Type::Binary)
        )
    }

    pub fn is_nan(&self) -> bool {
        match self {
            Literal::Float(v) => v.is_nan(),
            Literal::Double(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Converts this literal to a value of the given column type.
    ///
    /// Allows numeric widening, in-range narrowing of longs, dates widened to
    /// midnight timestamps, and strings parsed as dates or timestamps. Returns
    /// `None` when the value cannot represent the target type.
    pub fn to_type(&self, target: &Type) -> Option<Literal> {
        match (self, target) {
            (Literal::Boolean(v), Type::Boolean) => Some(Literal::Boolean(*v)),
            (Literal::Int(v), Type::Int) => Some(Literal::Int(*v)),
            (Literal::Int(v), Type::Long) => Some(Literal::Long(*v as i64)),
            (Literal::Int(v), Type::Float) => Some(Literal::Float(*v as f32)),
            (Literal::Int(v), Type::Double) => Some(Literal::Double(*v as f64)),
            (Literal::Long(v), Type::Int) => i32::try_from(*v).ok().map(Literal::Int),
            (Literal::Long(v), Type::Long) => Some(Literal::Long(*v)),
            (Literal::Long(v), Type::Float) => Some(Literal::Float(*v as f32)),
            (Literal::Long(v), Type::Double) => Some(Literal::Double(*v as f64)),
            (Literal::Float(v), Type::Float) => Some(Literal::Float(*v)),
            (Literal::Float(v), Type::Double) => Some(Literal::Double(*v as f64)),
            (Literal::Double(v), Type::Float) => Some(Literal::Float(*v as f32)),
            (Literal::Double(v), Type::Double) => Some(Literal::Double(*v)),
            (Literal::Date(d), Type::Date) => Some(Literal::Date(*d)),
            (Literal::Date(d), Type::Timestamp { .. }) => {
                Some(Literal::Timestamp(*d as i64 * MICROS_PER_DAY))
            }
            (Literal::Timestamp(t), Type::Timestamp { .. }) => Some(Literal::Timestamp(*t)),
            (Literal::String(s), Type::String) => Some(Literal::String(s.clone())),
            (Literal::String(s), Type::Date) => Literal::date_from_str(s),
            (Literal::String(s), Type::Timestamp { .. }) => Literal::timestamp_from_str(s),
            (Literal::Binary(b), Type::Binary) => Some(Literal::Binary(b.clone())),
            _ => None,
        }
    }

    /// Reads the value at `row`, or `None` if the slot is null or the array
    /// type has no literal equivalent.
    pub fn from_array(array: &dyn Array, row: usize) -> Option<Literal> {
        if array.is_null(row) {
            return None;
        }
        let literal = match array.data_type() {
            DataType::Boolean => Literal::Boolean(array.as_boolean().value(row)),
            DataType::Int8 => Literal::Int(array.as_primitive::<Int8Type>().value(row) as i32),
            DataType::Int16 => Literal::Int(array.as_primitive::<Int16Type>().value(row) as i32),
            DataType::Int32 => Literal::Int(array.as_primitive::<Int32Type>().value(row)),
            DataType::UInt8 => Literal::Int(array.as_primitive::<UInt8Type>().value(row) as i32),
            DataType::UInt16 => {
                Literal::Int(array.as_primitive::<UInt16Type>().value(row) as i32)
            }
            DataType::Int64 => Literal::Long(array.as_primitive::<Int64Type>().value(row)),
            DataType::UInt32 => {
                Literal::Long(array.as_primitive::<UInt32Type>().value(row) as i64)
            }
            DataType::Float32 => Literal::Float(array.as_primitive::<Float32Type>().value(row)),
            DataType::Float64 => Literal::Double(array.as_primitive::<Float64Type>().value(row)),
            DataType::Date32 => Literal::Date(array.as_primitive::<Date32Type>().value(row)),
            DataType::Timestamp(TimeUnit::Second, _) => Literal::Timestamp(
                array.as_primitive::<TimestampSecondType>().value(row) * 1_000_000,
            ),
            DataType::Timestamp(TimeUnit::Millisecond, _) => Literal::Timestamp(
                array.as_primitive::<TimestampMillisecondType>().value(row) * 1_000,
            ),
            DataType::Timestamp(TimeUnit::Microsecond, _) => {
                Literal::Timestamp(array.as_primitive::<TimestampMicrosecondType>().value(row))
            }
            DataType::Timestamp(TimeUnit::Nanosecond, _) => Literal::Timestamp(
                array
                    .as_primitive::<TimestampNanosecondType>()
                    .value(row)
                    .div_euclid(1_000),
            ),
            DataType::Utf8 => Literal::String(array.as_string::<i32>().value(row).to_string()),
            DataType::LargeUtf8 => {
                Literal::String(array.as_string::<i64>().value(row).to_string())
            }
            DataType::Utf8View => Literal::String(array.as_string_view().value(row).to_string()),
            DataType::Binary => Literal::Binary(array.as_binary::<i32>().value(row).to_vec()),
            DataType::LargeBinary => {
                Literal::Binary(array.as_binary::<i64>().value(row).to_vec())
            }
            DataType::BinaryView => Literal::Binary(array.as_binary_view().value(row).to_vec()),
            _ => return None,
        };
        Some(literal)
    }

    /// Returns a single-element Arrow array holding this value in its natural type.
    pub fn to_arrow_array(&self) -> ArrayRef {
        match self {
            Literal::Boolean(v) => Arc::new(BooleanArray::from(vec![*v])),
            Literal::Int(v) => Arc::new(Int32Array::from(vec![*v])),
            Literal::Long(v) => Arc::new(Int64Array::from(vec![*v])),
            Literal::Float(v) => Arc::new(Float32Array::from(vec![*v])),
            Literal::Double(v) => Arc::new(Float64Array::from(vec![*v])),
            Literal::Date(v) => Arc::new(Date32Array::from(vec![*v])),
            Literal::Timestamp(v) => Arc::new(TimestampMicrosecondArray::from(vec![*v])),
            Literal::String(v) => Arc::new(StringArray::from(vec![v.as_str()])),
            Literal::Binary(v) => Arc::new(BinaryArray::from_vec(vec![v.as_slice()])),
        }
    }

    /// Returns this value as an Arrow scalar of exactly `data_type`, casting if needed.
    pub fn to_arrow_scalar(&self, data_type: &DataType) -> Result<Scalar<ArrayRef>, ArrowError> {
        let array = self.to_arrow_array();
        if array.data_type() == data_type {
            return Ok(Scalar::new(array));
        }
        let cast = arrow::compute::cast(&array, data_type)?;
        Ok(Scalar::new(cast))
    }

    /// Renders the value without quoting, for partition paths and tables.
    pub fn to_plain_string(&self) -> String {
        match self {
            Literal::Boolean(v) => v.to_string(),
            Literal::Int(v) => v.to_string(),
            Literal::Long(v) => v.to_string(),
            Literal::Float(v) => v.to_string(),
            Literal::Double(v) => v.to_string(),
            Literal::Date(d) => NaiveDate::from_num_days_from_ce_opt(d + UNIX_EPOCH_DAY_FROM_CE)
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| format!("date({})", d)),
            Literal::Timestamp(t) => DateTime::from_timestamp_micros(*t)
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Micros, true))
                .unwrap_or_else(|| format!("timestamp({})", t)),
            Literal::String(s) => s.clone(),
            Literal::Binary(b) => b.iter().map(|byte| format!("{:02x}", byte)).collect(),
        }
    }
}

impl PartialOrd for Literal {
    /// Orders values of the same type. Strings compare byte-lexicographically;
    /// values of different types and NaN are unordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Literal::Boolean(a), Literal::Boolean(b)) => a.partial_cmp(b),
            (Literal::Int(a), Literal::Int(b)) => a.partial_cmp(b),
            (Literal::Long(a), Literal::Long(b)) => a.partial_cmp(b),
            (Literal::Float(a), Literal::Float(b)) => a.partial_cmp(b),
            (Literal::Double(a), Literal::Double(b)) => a.partial_cmp(b),
            (Literal::Date(a), Literal::Date(b)) => a.partial_cmp(b),
            (Literal::Timestamp(a), Literal::Timestamp(b)) => a.partial_cmp(b),
            (Literal::String(a), Literal::String(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Literal::Binary(a), Literal::Binary(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::String(_) | Literal::Date(_) | Literal::Timestamp(_) => {
                write!(f, "'{}'", self.to_plain_string())
            }
            Literal::Binary(_) => write!(f, "X'{}'", self.to_plain_string()),
            _ => write!(f, "{}", self.to_plain_string()),
        }
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Boolean(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Int(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Long(value)
    }
}

impl From<f32> for Literal {
    fn from(value: f32) -> Self {
        Literal::Float(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Double(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::String(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::String(value)
    }
}

pub(crate) fn days_since_epoch(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAY_FROM_CE
}

/// Returns the calendar date of a day offset from the Unix epoch.
pub(crate) fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAY_FROM_CE)?)
}

fn parse_timestamp_micros(value: &str) -> Option<i64> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.timestamp_micros());
    }
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc().timestamp_micros());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_micros())
}

//! # Column Statistics
//!
//! Per-file column statistics, keyed by field ID in a [`DataFile`]'s
//! manifest entry. Every statistic is optional: a writer may omit any of
//! them, and the evaluator treats a missing value as "unknown".
//!
//! [`DataFile`]: crate::manifest::DataFile

use std::collections::HashMap;

use arrow::array::{Array, ArrayRef, AsArray, RecordBatch};
use arrow::compute;
use arrow::datatypes::{
    DataType, Date32Type, Float32Type, Float64Type, Int32Type, Int64Type, TimestampMicrosecondType,
};
use serde::{Deserialize, Serialize};

use crate::error::{ScanError, ScanResult};
use crate::literal::Literal;
use crate::schema::Schema;

/// Statistics for a single column of one data file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ColumnStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_count: Option<i64>,

    /// Number of NaN values; only meaningful for float columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nan_count: Option<i64>,

    /// Lower bound of the non-null, non-NaN values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<Literal>,

    /// Upper bound of the non-null, non-NaN values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<Literal>,
}

impl ColumnStats {
    pub fn with_bounds(min: impl Into<Literal>, max: impl Into<Literal>) -> Self {
        Self {
            min_value: Some(min.into()),
            max_value: Some(max.into()),
            ..Default::default()
        }
    }

    pub fn with_null_count(mut self, null_count: i64) -> Self {
        self.null_count = Some(null_count);
        self
    }

    pub fn with_nan_count(mut self, nan_count: i64) -> Self {
        self.nan_count = Some(nan_count);
        self
    }

    /// Returns true if the column is known to hold only nulls.
    pub fn is_all_null(&self, record_count: i64) -> bool {
        self.null_count == Some(record_count)
    }
}

/// Calculates column statistics for a batch about to be written.
///
/// Columns are matched to schema fields by name and cast to the field type
/// first, so bounds are expressed in the table's types. Float bounds ignore
/// NaN, which is counted separately.
///
/// # Errors
///
/// Returns `SchemaMismatch` if a column is not part of the schema.
pub fn calculate_stats(
    batch: &RecordBatch,
    schema: &Schema,
) -> ScanResult<HashMap<i32, ColumnStats>> {
    let mut stats = HashMap::new();
    let batch_schema = batch.schema();

    for (column, arrow_field) in batch.columns().iter().zip(batch_schema.fields()) {
        let field = schema.find_field_by_name(arrow_field.name()).ok_or_else(|| {
            ScanError::SchemaMismatch(format!(
                "column {} is not part of schema {}",
                arrow_field.name(),
                schema.schema_id
            ))
        })?;
        let target = field.field_type.to_arrow_datatype();
        let column = if column.data_type() == &target {
            column.clone()
        } else {
            compute::cast(column, &target)?
        };
        stats.insert(field.id, column_stats(&column));
    }

    Ok(stats)
}

fn column_stats(column: &ArrayRef) -> ColumnStats {
    let null_count = Some(column.null_count() as i64);
    let (min_value, max_value, nan_count) = match column.data_type() {
        DataType::Boolean => {
            let array = column.as_boolean();
            (
                compute::min_boolean(array).map(Literal::Boolean),
                compute::max_boolean(array).map(Literal::Boolean),
                None,
            )
        }
        DataType::Int32 => {
            let array = column.as_primitive::<Int32Type>();
            (
                compute::min(array).map(Literal::Int),
                compute::max(array).map(Literal::Int),
                None,
            )
        }
        DataType::Int64 => {
            let array = column.as_primitive::<Int64Type>();
            (
                compute::min(array).map(Literal::Long),
                compute::max(array).map(Literal::Long),
                None,
            )
        }
        DataType::Date32 => {
            let array = column.as_primitive::<Date32Type>();
            (
                compute::min(array).map(Literal::Date),
                compute::max(array).map(Literal::Date),
                None,
            )
        }
        DataType::Timestamp(_, _) => {
            let array = column.as_primitive::<TimestampMicrosecondType>();
            (
                compute::min(array).map(Literal::Timestamp),
                compute::max(array).map(Literal::Timestamp),
                None,
            )
        }
        DataType::Float32 => {
            let (min, max, nans) = float_bounds(
                column
                    .as_primitive::<Float32Type>()
                    .iter()
                    .flatten()
                    .map(|v| v as f64),
            );
            (
                min.map(|v| Literal::Float(v as f32)),
                max.map(|v| Literal::Float(v as f32)),
                Some(nans),
            )
        }
        DataType::Float64 => {
            let (min, max, nans) =
                float_bounds(column.as_primitive::<Float64Type>().iter().flatten());
            (
                min.map(Literal::Double),
                max.map(Literal::Double),
                Some(nans),
            )
        }
        DataType::Utf8 => {
            let array = column.as_string::<i32>();
            (
                compute::min_string(array).map(Literal::string),
                compute::max_string(array).map(Literal::string),
                None,
            )
        }
        DataType::Binary => {
            let array = column.as_binary::<i32>();
            (
                compute::min_binary(array).map(|b| Literal::Binary(b.to_vec())),
                compute::max_binary(array).map(|b| Literal::Binary(b.to_vec())),
                None,
            )
        }
        _ => (None, None, None),
    };

    ColumnStats {
        null_count,
        nan_count,
        min_value,
        max_value,
    }
}

/// Returns (min, max, nan count) over a stream of non-null floats.
fn float_bounds(values: impl Iterator<Item = f64>) -> (Option<f64>, Option<f64>, i64) {
    let mut min: Option<f64> = None;
    let mut max: Option<f64> = None;
    let mut nans = 0;
    for v in values {
        if v.is_nan() {
            nans += 1;
            continue;
        }
        min = Some(min.map_or(v, |m| m.min(v)));
        max = Some(max.map_or(v, |m| m.max(v)));
    }
    (min, max, nans)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int32Array, StringArray};
    use arrow::datatypes::Field;

    use super::*;
    use crate::schema::Type;

    fn sample_schema() -> Schema {
        Schema::builder(0)
            .with_field(1, "VendorID", Type::Long, false)
            .with_field(2, "fare_amount", Type::Double, false)
            .with_field(3, "store_and_fwd_flag", Type::String, false)
            .build()
    }

    #[test]
    fn test_calculate_stats() {
        let schema = sample_schema();
        let batch = RecordBatch::try_new(
            Arc::new(arrow::datatypes::Schema::new(vec![
                // Narrower than the table type; bounds are widened to long.
                Field::new("VendorID", DataType::Int32, true),
                Field::new("fare_amount", DataType::Float64, true),
                Field::new("store_and_fwd_flag", DataType::Utf8, true),
            ])),
            vec![
                Arc::new(Int32Array::from(vec![Some(2), None, Some(1)])),
                Arc::new(Float64Array::from(vec![Some(12.5), Some(f64::NAN), Some(-3.0)])),
                Arc::new(StringArray::from(vec![Some("N"), Some("Y"), None])),
            ],
        )
        .unwrap();

        let stats = calculate_stats(&batch, &schema).unwrap();

        let vendor = &stats[&1];
        assert_eq!(vendor.null_count, Some(1));
        assert_eq!(vendor.min_value, Some(Literal::Long(1)));
        assert_eq!(vendor.max_value, Some(Literal::Long(2)));
        assert_eq!(vendor.nan_count, None);

        let fare = &stats[&2];
        assert_eq!(fare.nan_count, Some(1));
        assert_eq!(fare.min_value, Some(Literal::Double(-3.0)));
        assert_eq!(fare.max_value, Some(Literal::Double(12.5)));

        let flag = &stats[&3];
        assert_eq!(flag.min_value, Some(Literal::string("N")));
        assert_eq!(flag.max_value, Some(Literal::string("Y")));
    }

    #[test]
    fn test_unknown_column() {
        let schema = sample_schema();
        let batch = RecordBatch::try_new(
            Arc::new(arrow::datatypes::Schema::new(vec![Field::new(
                "tip_amount",
                DataType::Float64,
                true,
            )])),
            vec![Arc::new(Float64Array::from(vec![1.0]))],
        )
        .unwrap();
        assert!(matches!(
            calculate_stats(&batch, &schema),
            Err(ScanError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_all_null_column() {
        let stats = ColumnStats::default().with_null_count(10);
        assert!(stats.is_all_null(10));
        assert!(!stats.is_all_null(11));
        assert!(!ColumnStats::default().is_all_null(0));
    }

    #[test]
    fn test_serialization_omits_missing() {
        let stats = ColumnStats::with_bounds(0.0, 200.0).with_null_count(0);
        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("nan-count").is_none());
        let back: ColumnStats = serde_json::from_value(json).unwrap();
        assert_eq!(back, stats);
    }
}

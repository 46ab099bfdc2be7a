//! # Residual Row Filter
//!
//! Evaluates a bound predicate over a record batch with Arrow's vectorized
//! kernels. Results follow SQL three-valued logic: a comparison against a
//! null value yields null, and rows whose result is false or null are
//! dropped by [`filter_batch`].
//!
//! Float comparisons follow IEEE semantics rather than Arrow's total order:
//! NaN never satisfies `=`, `<`, `<=`, `>`, `>=` or `in`, and always
//! satisfies `!=` and `not in`.

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, RecordBatch};
use arrow::compute::kernels::{boolean, cmp};
use arrow::compute::{cast, filter_record_batch, is_not_null, is_null};
use arrow::datatypes::{DataType, Float32Type, Float64Type};
use arrow::error::ArrowError;

use crate::expr::{BoundPredicate, BoundReference, ComparisonOp, SetOp, UnaryOp};
use crate::literal::Literal;

/// Keeps the rows of `batch` for which `predicate` is true.
pub fn filter_batch(
    predicate: &BoundPredicate,
    batch: &RecordBatch,
) -> Result<RecordBatch, ArrowError> {
    if predicate.is_always_true() {
        return Ok(batch.clone());
    }
    let mask = evaluate(predicate, batch)?;
    filter_record_batch(batch, &mask)
}

/// Evaluates `predicate` for every row of `batch`.
///
/// # Errors
///
/// Fails if a referenced column is missing from the batch or cannot be cast
/// to the column type the predicate was bound against.
pub fn evaluate(
    predicate: &BoundPredicate,
    batch: &RecordBatch,
) -> Result<BooleanArray, ArrowError> {
    let rows = batch.num_rows();
    match predicate {
        BoundPredicate::AlwaysTrue => Ok(BooleanArray::from(vec![true; rows])),
        BoundPredicate::AlwaysFalse => Ok(BooleanArray::from(vec![false; rows])),
        BoundPredicate::Comparison { term, op, literal } => {
            let column = column(batch, term)?;
            compare(&column, *op, literal)
        }
        BoundPredicate::Unary { term, op } => {
            let column = column(batch, term)?;
            match op {
                UnaryOp::IsNull => is_null(&column),
                UnaryOp::NotNull => is_not_null(&column),
            }
        }
        BoundPredicate::Set { term, op, literals } => {
            let column = column(batch, term)?;
            let matches = in_list(&column, literals)?;
            match op {
                SetOp::In => Ok(matches),
                SetOp::NotIn => boolean::not(&matches),
            }
        }
        BoundPredicate::And(left, right) => {
            boolean::and_kleene(&evaluate(left, batch)?, &evaluate(right, batch)?)
        }
        BoundPredicate::Or(left, right) => {
            boolean::or_kleene(&evaluate(left, batch)?, &evaluate(right, batch)?)
        }
    }
}

/// Looks up a column by name and casts it to the bound type.
fn column(batch: &RecordBatch, term: &BoundReference) -> Result<ArrayRef, ArrowError> {
    let column = batch.column_by_name(&term.name).ok_or_else(|| {
        ArrowError::SchemaError(format!("column {} is missing from the batch", term.name))
    })?;
    let target = term.field_type.to_arrow_datatype();
    if column.data_type() == &target {
        Ok(column.clone())
    } else {
        cast(column, &target)
    }
}

fn compare(
    column: &ArrayRef,
    op: ComparisonOp,
    literal: &Literal,
) -> Result<BooleanArray, ArrowError> {
    if literal.is_nan() {
        return Ok(match op {
            ComparisonOp::NotEq => is_not_null(column)?,
            _ => all_false_or_null(column),
        });
    }

    let scalar = literal.to_arrow_scalar(column.data_type())?;
    let result = match op {
        ComparisonOp::Eq => cmp::eq(column, &scalar)?,
        ComparisonOp::NotEq => cmp::neq(column, &scalar)?,
        ComparisonOp::Lt => cmp::lt(column, &scalar)?,
        ComparisonOp::LtEq => cmp::lt_eq(column, &scalar)?,
        ComparisonOp::Gt => cmp::gt(column, &scalar)?,
        ComparisonOp::GtEq => cmp::gt_eq(column, &scalar)?,
    };

    match nan_mask(column) {
        Some(nans) if op == ComparisonOp::NotEq => boolean::or_kleene(&result, &nans),
        Some(nans) => boolean::and_kleene(&result, &boolean::not(&nans)?),
        None => Ok(result),
    }
}

fn in_list(column: &ArrayRef, literals: &[Literal]) -> Result<BooleanArray, ArrowError> {
    let mut matches = all_false_or_null(column);
    for literal in literals.iter().filter(|l| !l.is_nan()) {
        let scalar = literal.to_arrow_scalar(column.data_type())?;
        matches = boolean::or_kleene(&matches, &cmp::eq(column, &scalar)?)?;
    }
    match nan_mask(column) {
        Some(nans) => boolean::and_kleene(&matches, &boolean::not(&nans)?),
        None => Ok(matches),
    }
}

/// False for every row, null where the column is null.
fn all_false_or_null(column: &ArrayRef) -> BooleanArray {
    BooleanArray::new(
        arrow::buffer::BooleanBuffer::new_unset(column.len()),
        column.logical_nulls(),
    )
}

/// Marks NaN values of float columns; `None` for other types.
fn nan_mask(column: &ArrayRef) -> Option<BooleanArray> {
    match column.data_type() {
        DataType::Float32 => Some(BooleanArray::from_unary(
            column.as_primitive::<Float32Type>(),
            |v| v.is_nan(),
        )),
        DataType::Float64 => Some(BooleanArray::from_unary(
            column.as_primitive::<Float64Type>(),
            |v| v.is_nan(),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int32Array, StringArray};
    use arrow::datatypes::{Field, Schema as ArrowSchema};

    use super::*;
    use crate::expr::col;
    use crate::schema::{Schema, Type};

    fn table_schema() -> Schema {
        Schema::builder(0)
            .with_field(1, "VendorID", Type::Long, true)
            .with_field(2, "fare_amount", Type::Double, true)
            .with_field(3, "store_and_fwd_flag", Type::String, true)
            .build()
    }

    /// The file stores VendorID as int32, narrower than the table type.
    fn sample_batch() -> RecordBatch {
        RecordBatch::try_new(
            Arc::new(ArrowSchema::new(vec![
                Field::new("VendorID", DataType::Int32, true),
                Field::new("fare_amount", DataType::Float64, true),
                Field::new("store_and_fwd_flag", DataType::Utf8, true),
            ])),
            vec![
                Arc::new(Int32Array::from(vec![Some(1), Some(2), None, Some(2)])),
                Arc::new(Float64Array::from(vec![
                    Some(10.0),
                    Some(f64::NAN),
                    Some(-5.0),
                    None,
                ])),
                Arc::new(StringArray::from(vec![Some("N"), Some("Y"), Some("N"), None])),
            ],
        )
        .unwrap()
    }

    fn keep(predicate: crate::expr::Predicate) -> Vec<bool> {
        let bound = predicate.bind(&table_schema()).unwrap();
        let mask = evaluate(&bound, &sample_batch()).unwrap();
        (0..mask.len())
            .map(|i| mask.is_valid(i) && mask.value(i))
            .collect()
    }

    #[test]
    fn test_comparison_with_cast() {
        assert_eq!(keep(col("VendorID").eq(2)), vec![false, true, false, true]);
        assert_eq!(keep(col("VendorID").not_eq(2)), vec![true, false, false, false]);
    }

    #[test]
    fn test_nan_semantics() {
        assert_eq!(keep(col("fare_amount").gt(0.0)), vec![true, false, false, false]);
        assert_eq!(keep(col("fare_amount").lt_eq(100.0)), vec![true, false, true, false]);
        assert_eq!(keep(col("fare_amount").not_eq(10.0)), vec![false, true, true, false]);
        assert_eq!(
            keep(col("fare_amount").is_in([10.0, -5.0])),
            vec![true, false, true, false]
        );
        assert_eq!(
            keep(col("fare_amount").not_in([10.0])),
            vec![false, true, true, false]
        );
        assert_eq!(keep(col("fare_amount").eq(f64::NAN)), vec![false; 4]);
        assert_eq!(
            keep(col("fare_amount").not_eq(f64::NAN)),
            vec![true, true, true, false]
        );
    }

    #[test]
    fn test_null_handling() {
        assert_eq!(keep(col("VendorID").is_null()), vec![false, false, true, false]);
        // not (flag = 'N') drops the null flag row as well.
        assert_eq!(
            keep(col("store_and_fwd_flag").eq("N").not()),
            vec![false, true, false, false]
        );
        assert_eq!(
            keep(col("VendorID").eq(1).or(col("store_and_fwd_flag").eq("N"))),
            vec![true, false, true, false]
        );
    }

    #[test]
    fn test_filter_batch() {
        let bound = col("fare_amount").gt(0.0).bind(&table_schema()).unwrap();
        let filtered = filter_batch(&bound, &sample_batch()).unwrap();
        assert_eq!(filtered.num_rows(), 1);

        let none = col("fare_amount").gt(1000.0).bind(&table_schema()).unwrap();
        let empty = filter_batch(&none, &sample_batch()).unwrap();
        assert_eq!(empty.num_rows(), 0);
        assert_eq!(empty.num_columns(), 3);
    }

    #[test]
    fn test_missing_column() {
        let bound = col("VendorID").eq(1).bind(&table_schema()).unwrap();
        let batch = sample_batch().project(&[1, 2]).unwrap();
        assert!(evaluate(&bound, &batch).is_err());
    }
}

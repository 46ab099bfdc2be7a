//! # Result Assembly
//!
//! Collects materialized batches into a [`Dataset`]. The assembler only
//! appends; ordering is decided by the executor that feeds it.

use arrow::array::{RecordBatch, RecordBatchOptions};
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use serde::{Deserialize, Serialize};

use crate::error::{ScanError, ScanResult};

/// A data file skipped by a best-effort scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWarning {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "skipped {}: {}", self.path, self.message)
    }
}

/// The in-memory result of a scan.
#[derive(Debug, Clone)]
pub struct Dataset {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    warnings: Vec<ScanWarning>,
}

impl Dataset {
    /// An empty dataset with the given schema.
    pub fn empty(schema: SchemaRef) -> Self {
        Self {
            schema,
            batches: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn into_batches(self) -> Vec<RecordBatch> {
        self.batches
    }

    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Concatenates every batch into one.
    pub fn to_record_batch(&self) -> ScanResult<RecordBatch> {
        Ok(concat_batches(&self.schema, &self.batches)?)
    }
}

/// Appends batches to a dataset, checking each against the projection schema.
#[derive(Debug)]
pub struct ResultAssembler {
    dataset: Dataset,
}

impl ResultAssembler {
    pub fn new(schema: SchemaRef) -> Self {
        Self {
            dataset: Dataset::empty(schema),
        }
    }

    /// Appends one batch.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` if the batch's column names or types differ
    /// from the dataset schema.
    pub fn push(&mut self, batch: RecordBatch) -> ScanResult<()> {
        let expected = &self.dataset.schema;
        let actual = batch.schema();
        let matches = expected.fields().len() == actual.fields().len()
            && expected
                .fields()
                .iter()
                .zip(actual.fields())
                .all(|(e, a)| e.name() == a.name() && e.data_type() == a.data_type());
        if !matches {
            return Err(ScanError::SchemaMismatch(format!(
                "batch columns [{}] do not match dataset columns [{}]",
                describe(&actual),
                describe(expected)
            )));
        }

        // Nullability may differ per file; the dataset schema wins.
        let batch = if actual == *expected {
            batch
        } else {
            let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
            RecordBatch::try_new_with_options(expected.clone(), batch.columns().to_vec(), &options)
                .map_err(|e| ScanError::SchemaMismatch(e.to_string()))?
        };
        self.dataset.batches.push(batch);
        Ok(())
    }

    /// Appends every batch in order.
    pub fn extend(&mut self, batches: impl IntoIterator<Item = RecordBatch>) -> ScanResult<()> {
        batches.into_iter().try_for_each(|batch| self.push(batch))
    }

    pub fn add_warning(&mut self, warning: ScanWarning) {
        self.dataset.warnings.push(warning);
    }

    pub fn finish(self) -> Dataset {
        self.dataset
    }
}

/// Assembles a dataset from batches already in their final order.
pub fn assemble(
    schema: SchemaRef,
    batches: impl IntoIterator<Item = RecordBatch>,
) -> ScanResult<Dataset> {
    let mut assembler = ResultAssembler::new(schema);
    assembler.extend(batches)?;
    Ok(assembler.finish())
}

fn describe(schema: &SchemaRef) -> String {
    schema
        .fields()
        .iter()
        .map(|f| format!("{}: {}", f.name(), f.data_type()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};

    use super::*;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("VendorID", DataType::Int64, true),
            Field::new("fare_amount", DataType::Float64, true),
        ]))
    }

    fn batch(vendors: Vec<i64>, fares: Vec<f64>) -> RecordBatch {
        RecordBatch::try_new(
            schema(),
            vec![
                Arc::new(Int64Array::from(vendors)),
                Arc::new(Float64Array::from(fares)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_assemble_keeps_arrival_order() {
        let dataset = assemble(
            schema(),
            vec![
                batch(vec![1, 2], vec![3.0, 4.0]),
                batch(vec![], vec![]),
                batch(vec![3], vec![5.0]),
            ],
        )
        .unwrap();

        assert_eq!(dataset.num_rows(), 3);
        assert_eq!(dataset.num_columns(), 2);
        assert_eq!(dataset.batches().len(), 3);
        assert_eq!(dataset.column_names(), vec!["VendorID", "fare_amount"]);

        let combined = dataset.to_record_batch().unwrap();
        let vendors = combined
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(vendors.values(), &[1, 2, 3]);
    }

    #[test]
    fn test_empty_dataset_keeps_schema() {
        let dataset = assemble(schema(), Vec::new()).unwrap();
        assert!(dataset.is_empty());
        assert_eq!(dataset.num_columns(), 2);
        let combined = dataset.to_record_batch().unwrap();
        assert_eq!(combined.num_rows(), 0);
        assert_eq!(combined.schema(), schema());
    }

    #[test]
    fn test_mismatched_batch() {
        let wrong = RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new("VendorID", DataType::Int64, true),
                Field::new("fare_amount", DataType::Utf8, true),
            ])),
            vec![
                Arc::new(Int64Array::from(vec![1])),
                Arc::new(StringArray::from(vec!["3.0"])),
            ],
        )
        .unwrap();
        let result = assemble(schema(), vec![wrong]);
        assert!(matches!(result, Err(ScanError::SchemaMismatch(_))));
    }

    #[test]
    fn test_nullability_is_normalized() {
        let strict = RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new("VendorID", DataType::Int64, false),
                Field::new("fare_amount", DataType::Float64, false),
            ])),
            vec![
                Arc::new(Int64Array::from(vec![1])),
                Arc::new(Float64Array::from(vec![2.0])),
            ],
        )
        .unwrap();
        let dataset = assemble(schema(), vec![strict]).unwrap();
        assert_eq!(dataset.batches()[0].schema(), schema());
    }

    #[test]
    fn test_warnings() {
        let mut assembler = ResultAssembler::new(schema());
        assembler.add_warning(ScanWarning {
            path: "data/b.parquet".into(),
            message: "file not found: data/b.parquet".into(),
        });
        let dataset = assembler.finish();
        assert_eq!(dataset.warnings().len(), 1);
        assert_eq!(
            dataset.warnings()[0].to_string(),
            "skipped data/b.parquet: file not found: data/b.parquet"
        );
    }
}

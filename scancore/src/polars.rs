//! # Polars Bridge
//!
//! Hands scan results to Polars for display and exploration. Batches are
//! exchanged through an in-memory Parquet buffer, which keeps this crate's
//! Arrow version independent of the one Polars is built against.

use std::io::Cursor;

use anyhow::Result;
use parquet::arrow::ArrowWriter;
use polars::prelude::{DataFrame, IntoLazy, LazyFrame, ParquetReader, SerReader};

use crate::assemble::Dataset;
use crate::table_scan::TableScanBuilder;

/// Converts a dataset into a Polars `DataFrame`, preserving row order.
pub fn to_dataframe(dataset: &Dataset) -> Result<DataFrame> {
    let mut buffer: Vec<u8> = Vec::new();
    {
        let mut writer = ArrowWriter::try_new(&mut buffer, dataset.schema(), None)?;
        for batch in dataset.batches() {
            writer.write(batch)?;
        }
        writer.close()?;
    }
    Ok(ParquetReader::new(Cursor::new(buffer)).finish()?)
}

/// Runs a configured scan and exposes the result as a Polars `LazyFrame`.
pub struct PolarsConnector {
    scan: TableScanBuilder,
}

impl PolarsConnector {
    pub fn new(scan: TableScanBuilder) -> Self {
        Self { scan }
    }

    pub async fn scan(self) -> Result<LazyFrame> {
        let dataset = self.scan.execute().await?;
        if !dataset.warnings().is_empty() {
            tracing::warn!(
                skipped = dataset.warnings().len(),
                "scan skipped unreadable files"
            );
        }
        Ok(to_dataframe(&dataset)?.lazy())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int64Array, RecordBatch};
    use arrow::datatypes::{DataType, Field, Schema};

    use super::*;
    use crate::assemble::assemble;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("VendorID", DataType::Int64, true),
            Field::new("fare_amount", DataType::Float64, true),
        ]))
    }

    #[test]
    fn test_to_dataframe() {
        let batches = vec![
            RecordBatch::try_new(
                schema(),
                vec![
                    Arc::new(Int64Array::from(vec![1, 2])),
                    Arc::new(Float64Array::from(vec![9.5, 11.0])),
                ],
            )
            .unwrap(),
            RecordBatch::try_new(
                schema(),
                vec![
                    Arc::new(Int64Array::from(vec![2])),
                    Arc::new(Float64Array::from(vec![30.0])),
                ],
            )
            .unwrap(),
        ];
        let dataset = assemble(schema(), batches).unwrap();

        let df = to_dataframe(&dataset).unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 2);
        let fares: Vec<Option<f64>> = df
            .column("fare_amount")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(fares, vec![Some(9.5), Some(11.0), Some(30.0)]);
    }

    #[test]
    fn test_empty_dataset() {
        let dataset = assemble(schema(), Vec::new()).unwrap();
        let df = to_dataframe(&dataset).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 2);
    }
}

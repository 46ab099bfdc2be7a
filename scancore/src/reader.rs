//! # Data File Reading
//!
//! [`FileReader`] is the seam between the scan pipeline and the file format:
//! given a data file and a set of column names it returns record batches.
//! [`TaskMaterializer`] drives a reader for one [`ScanTask`], applying the
//! residual filter and projecting the result onto the requested columns.

use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch, RecordBatchOptions};
use arrow::compute::cast;
use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::error::{ScanError, ScanResult};
use crate::manifest::DataFile;
use crate::row_filter::filter_batch;
use crate::scan::ScanTask;
use crate::schema::Schema;
use crate::storage::Storage;

/// Reads columns of a data file as Arrow record batches.
#[async_trait]
pub trait FileReader: Send + Sync {
    /// Reads `columns` from `file`. Batches may contain the columns in any order.
    ///
    /// # Errors
    ///
    /// Returns `FileNotFound` if the file does not exist and `FileRead` if it
    /// cannot be decoded or lacks a requested column.
    async fn read(&self, file: &DataFile, columns: &[String]) -> ScanResult<Vec<RecordBatch>>;
}

/// Reads Parquet files from storage.
#[derive(Debug, Clone)]
pub struct ParquetFileReader {
    storage: Storage,
    batch_size: Option<usize>,
}

impl ParquetFileReader {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            batch_size: None,
        }
    }

    /// Sets the maximum number of rows per decoded batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size.max(1));
        self
    }

    /// Returns the Arrow schema stored in a Parquet file.
    pub async fn read_schema(&self, path: &str) -> ScanResult<SchemaRef> {
        let data = self.fetch(path).await?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(data)
            .map_err(|e| ScanError::file_read(path, e))?;
        Ok(builder.schema().clone())
    }

    async fn fetch(&self, path: &str) -> ScanResult<bytes::Bytes> {
        match self.storage.read(path).await {
            Ok(data) => Ok(data),
            Err(object_store::Error::NotFound { .. }) => Err(ScanError::FileNotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(ScanError::file_read(path, e)),
        }
    }
}

#[async_trait]
impl FileReader for ParquetFileReader {
    async fn read(&self, file: &DataFile, columns: &[String]) -> ScanResult<Vec<RecordBatch>> {
        let path = file.file_path.as_str();
        let data = self.fetch(path).await?;

        // Bytes implements ChunkReader directly
        let mut builder = ParquetRecordBatchReaderBuilder::try_new(data)
            .map_err(|e| ScanError::file_read(path, e))?;

        let file_schema = builder.schema().clone();
        let indices = columns
            .iter()
            .map(|name| {
                file_schema.index_of(name).map_err(|_| {
                    ScanError::file_read(path, format!("column {} is missing from the file", name))
                })
            })
            .collect::<ScanResult<Vec<_>>>()?;
        let mask = ProjectionMask::roots(builder.parquet_schema(), indices);
        builder = builder.with_projection(mask);
        if let Some(batch_size) = self.batch_size {
            builder = builder.with_batch_size(batch_size);
        }

        let reader = builder.build().map_err(|e| ScanError::file_read(path, e))?;
        reader
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ScanError::file_read(path, e))
    }
}

/// Reads one scan task into batches of exactly the projected columns.
#[derive(Clone)]
pub struct TaskMaterializer {
    reader: Arc<dyn FileReader>,
    schema: Arc<Schema>,
}

impl TaskMaterializer {
    pub fn new(reader: Arc<dyn FileReader>, schema: Arc<Schema>) -> Self {
        Self { reader, schema }
    }

    /// Reads the task's file, drops rows failing the residual and projects.
    ///
    /// Every batch read from the file yields one output batch, possibly empty.
    pub async fn materialize(&self, task: &ScanTask) -> ScanResult<Vec<RecordBatch>> {
        let path = task.file_path();
        let output_schema = self.schema.project_arrow(&task.projection)?;
        let batches = self
            .reader
            .read(&task.data_file, &task.read_columns())
            .await?;

        batches
            .iter()
            .map(|batch| {
                let filtered = filter_batch(&task.residual, batch)
                    .map_err(|e| ScanError::file_read(path, e))?;
                project(&filtered, &output_schema).map_err(|e| ScanError::file_read(path, e))
            })
            .collect()
    }
}

/// Selects and casts the columns of `output_schema` by name, in its order.
fn project(
    batch: &RecordBatch,
    output_schema: &SchemaRef,
) -> Result<RecordBatch, arrow::error::ArrowError> {
    let columns = output_schema
        .fields()
        .iter()
        .map(|field| {
            let column = batch.column_by_name(field.name()).ok_or_else(|| {
                arrow::error::ArrowError::SchemaError(format!(
                    "column {} is missing from the batch",
                    field.name()
                ))
            })?;
            if column.data_type() == field.data_type() {
                Ok(column.clone())
            } else {
                cast(column, field.data_type())
            }
        })
        .collect::<Result<Vec<ArrayRef>, _>>()?;

    // Explicit row count keeps empty projections well-formed.
    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    RecordBatch::try_new_with_options(output_schema.clone(), columns, &options)
}

#[cfg(test)]
mod tests {
    use arrow::array::{Float64Array, Int64Array};
    use arrow::datatypes::{DataType, Field};
    use parquet::arrow::ArrowWriter;

    use super::*;
    use crate::expr::{BoundPredicate, col};
    use crate::manifest::FileFormat;
    use crate::schema::Type;

    fn table_schema() -> Schema {
        Schema::builder(0)
            .with_field(1, "VendorID", Type::Long, false)
            .with_field(2, "fare_amount", Type::Double, false)
            .build()
    }

    async fn write_fixture(storage: &Storage, path: &str) -> DataFile {
        let batch = RecordBatch::try_new(
            table_schema().to_arrow_schema_ref(),
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 1, 2])),
                Arc::new(Float64Array::from(vec![5.0, 12.5, 30.0, 7.0])),
            ],
        )
        .unwrap();
        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
        let size = buffer.len() as i64;
        storage.write(path, buffer.into()).await.unwrap();
        DataFile::new(path, FileFormat::Parquet, 4, size)
    }

    fn task(file: DataFile, residual: BoundPredicate, projection: &[&str]) -> ScanTask {
        ScanTask {
            data_file: Arc::new(file),
            residual,
            projection: projection.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_read_projection() {
        let storage = Storage::in_memory();
        let file = write_fixture(&storage, "data/a.parquet").await;
        let reader = ParquetFileReader::new(storage).with_batch_size(3);

        let batches = reader
            .read(&file, &["fare_amount".to_string()])
            .await
            .unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].num_columns(), 1);
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 4);
    }

    #[tokio::test]
    async fn test_read_errors() {
        let storage = Storage::in_memory();
        let reader = ParquetFileReader::new(storage.clone());
        let missing = DataFile::new("data/missing.parquet", FileFormat::Parquet, 1, 1);
        let result = reader.read(&missing, &[]).await;
        assert!(matches!(result, Err(ScanError::FileNotFound { .. })));

        storage
            .write("data/corrupt.parquet", bytes::Bytes::from_static(b"PAR1 nope"))
            .await
            .unwrap();
        let corrupt = DataFile::new("data/corrupt.parquet", FileFormat::Parquet, 1, 9);
        let result = reader.read(&corrupt, &[]).await;
        assert!(matches!(result, Err(ScanError::FileRead { .. })));

        let file = write_fixture(&storage, "data/a.parquet").await;
        let result = reader.read(&file, &["tip_amount".to_string()]).await;
        assert!(matches!(result, Err(ScanError::FileRead { .. })));
    }

    #[tokio::test]
    async fn test_materialize_filters_and_projects() {
        let storage = Storage::in_memory();
        let file = write_fixture(&storage, "data/a.parquet").await;
        let schema = Arc::new(table_schema());
        let materializer =
            TaskMaterializer::new(Arc::new(ParquetFileReader::new(storage)), schema.clone());

        // The residual column is read but not returned.
        let residual = col("fare_amount").gt(10.0).bind(&schema).unwrap();
        let batches = materializer
            .materialize(&task(file, residual, &["VendorID"]))
            .await
            .unwrap();

        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.schema().fields().len(), 1);
        assert_eq!(batch.schema().field(0), &Field::new("VendorID", DataType::Int64, true));
        let vendors = batch
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(vendors.values(), &[2, 1]);
    }

    #[tokio::test]
    async fn test_materialize_empty_result_keeps_schema() {
        let storage = Storage::in_memory();
        let file = write_fixture(&storage, "data/a.parquet").await;
        let schema = Arc::new(table_schema());
        let materializer =
            TaskMaterializer::new(Arc::new(ParquetFileReader::new(storage)), schema.clone());

        let residual = col("fare_amount").gt(1000.0).bind(&schema).unwrap();
        let batches = materializer
            .materialize(&task(file, residual, &["fare_amount", "VendorID"]))
            .await
            .unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_rows(), 0);
        assert_eq!(batches[0].schema().field(0).name(), "fare_amount");
    }
}

//! # Data File Writer
//!
//! Splits incoming Arrow batches by partition tuple and writes one Parquet
//! file per partition, returning manifest-ready [`DataFile`]s with column
//! statistics. Files land under
//! `<data dir>/<partition path>/<uuid>.parquet`.

use std::collections::HashMap;

use arrow::array::{ArrayRef, RecordBatch, UInt32Array, new_null_array};
use arrow::compute::{cast, take_record_batch};
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use uuid::Uuid;

use crate::error::{ScanError, ScanResult};
use crate::literal::Literal;
use crate::manifest::{DataFile, FileFormat};
use crate::metadata::TableMetadata;
use crate::partition::PartitionSpec;
use crate::schema::Schema;
use crate::statistics::calculate_stats;
use crate::storage::Storage;

/// Rows of one batch sharing a partition tuple.
struct PartitionGroup {
    partition: Vec<Option<Literal>>,
    rows: Vec<u32>,
}

/// Hashable form of one partition value. Floats compare by bit pattern, so a
/// null value, a NaN and the string `"null"` all land in different groups.
#[derive(PartialEq, Eq, Hash)]
enum GroupKey {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(u64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<&Option<Literal>> for GroupKey {
    fn from(value: &Option<Literal>) -> Self {
        match value {
            None => GroupKey::Null,
            Some(Literal::Boolean(b)) => GroupKey::Boolean(*b),
            Some(Literal::Int(v) | Literal::Date(v)) => GroupKey::Integer(i64::from(*v)),
            Some(Literal::Long(v) | Literal::Timestamp(v)) => GroupKey::Integer(*v),
            Some(Literal::Float(v)) => GroupKey::Float(f64::from(*v).to_bits()),
            Some(Literal::Double(v)) => GroupKey::Float(v.to_bits()),
            Some(Literal::String(s)) => GroupKey::Text(s.clone()),
            Some(Literal::Binary(b)) => GroupKey::Bytes(b.clone()),
        }
    }
}

/// Writes batches as partitioned Parquet data files.
pub struct DataWriter {
    storage: Storage,
    data_dir: String,
    schema: Schema,
    partition_spec: PartitionSpec,
    properties: WriterProperties,
}

impl DataWriter {
    pub fn new(
        storage: Storage,
        data_dir: impl Into<String>,
        schema: Schema,
        partition_spec: PartitionSpec,
    ) -> Self {
        Self {
            storage,
            data_dir: data_dir.into().trim_end_matches('/').to_string(),
            schema,
            partition_spec,
            properties: WriterProperties::builder().build(),
        }
    }

    /// A writer for the current schema and partition spec of a table.
    pub fn for_table(storage: Storage, metadata: &TableMetadata) -> ScanResult<Self> {
        Ok(Self::new(
            storage,
            metadata.data_dir(),
            metadata.current_schema()?.clone(),
            metadata.current_partition_spec()?.clone(),
        ))
    }

    pub fn with_properties(mut self, properties: WriterProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Writes `batch`, one file per distinct partition tuple.
    ///
    /// Columns are matched by name and cast to the table types; optional
    /// columns missing from the batch are written as nulls. An empty batch
    /// writes nothing.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` if the batch has a column the table does not,
    /// or lacks a required one.
    pub async fn write(&self, batch: &RecordBatch) -> ScanResult<Vec<DataFile>> {
        if batch.num_rows() == 0 {
            return Ok(Vec::new());
        }
        let batch = self.conform(batch)?;

        let mut data_files = Vec::new();
        for group in self.split(&batch) {
            let part = if group.rows.len() == batch.num_rows() {
                batch.clone()
            } else {
                take_record_batch(&batch, &UInt32Array::from(group.rows))?
            };
            data_files.push(self.write_file(&part, group.partition).await?);
        }
        Ok(data_files)
    }

    async fn write_file(
        &self,
        batch: &RecordBatch,
        partition: Vec<Option<Literal>>,
    ) -> ScanResult<DataFile> {
        let mut buffer = Vec::new();
        let mut writer =
            ArrowWriter::try_new(&mut buffer, batch.schema(), Some(self.properties.clone()))?;
        writer.write(batch)?;
        writer.close()?;

        let file_name = format!("{}.parquet", Uuid::new_v4());
        let path = if self.partition_spec.is_unpartitioned() {
            format!("{}/{}", self.data_dir, file_name)
        } else {
            format!(
                "{}/{}/{}",
                self.data_dir,
                self.partition_spec.partition_path(&partition),
                file_name
            )
        };

        let size = buffer.len() as i64;
        self.storage.write(&path, Bytes::from(buffer)).await?;
        tracing::debug!(file = %path, rows = batch.num_rows(), bytes = size, "wrote data file");

        Ok(
            DataFile::new(path, FileFormat::Parquet, batch.num_rows() as i64, size)
                .with_partition(partition)
                .with_statistics(calculate_stats(batch, &self.schema)?),
        )
    }

    /// Reorders, casts and null-fills the batch into the table schema.
    fn conform(&self, batch: &RecordBatch) -> ScanResult<RecordBatch> {
        let batch_schema = batch.schema();
        if let Some(extra) = batch_schema
            .fields()
            .iter()
            .find(|f| self.schema.find_field_by_name(f.name()).is_none())
        {
            return Err(ScanError::SchemaMismatch(format!(
                "column {} is not part of the table schema",
                extra.name()
            )));
        }

        let columns = self
            .schema
            .fields
            .iter()
            .map(|field| {
                let target = field.field_type.to_arrow_datatype();
                match batch.column_by_name(&field.name) {
                    Some(column) if column.data_type() == &target => Ok(column.clone()),
                    Some(column) => Ok(cast(column, &target)?),
                    None if field.required => Err(ScanError::SchemaMismatch(format!(
                        "required column {} is missing",
                        field.name
                    ))),
                    None => Ok(new_null_array(&target, batch.num_rows())),
                }
            })
            .collect::<ScanResult<Vec<ArrayRef>>>()?;

        RecordBatch::try_new(self.schema.to_arrow_schema_ref(), columns)
            .map_err(|e| ScanError::SchemaMismatch(e.to_string()))
    }

    /// Groups row indices by partition tuple, in order of first appearance.
    fn split(&self, batch: &RecordBatch) -> Vec<PartitionGroup> {
        if self.partition_spec.is_unpartitioned() {
            return vec![PartitionGroup {
                partition: Vec::new(),
                rows: (0..batch.num_rows() as u32).collect(),
            }];
        }

        let sources: HashMap<i32, &ArrayRef> = self
            .partition_spec
            .fields
            .iter()
            .filter_map(|pf| {
                let field = self.schema.find_field(pf.source_id)?;
                Some((pf.source_id, batch.column_by_name(&field.name)?))
            })
            .collect();

        let mut groups: Vec<PartitionGroup> = Vec::new();
        let mut index: HashMap<Vec<GroupKey>, usize> = HashMap::new();
        for row in 0..batch.num_rows() {
            let values: HashMap<i32, Literal> = sources
                .iter()
                .filter_map(|(id, column)| {
                    Some((*id, Literal::from_array(column.as_ref(), row)?))
                })
                .collect();
            let partition = self.partition_spec.partition_tuple(|id| values.get(&id));
            let key: Vec<GroupKey> = partition.iter().map(GroupKey::from).collect();

            let slot = *index.entry(key).or_insert_with(|| {
                groups.push(PartitionGroup {
                    partition,
                    rows: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].rows.push(row as u32);
        }
        groups
    }
}

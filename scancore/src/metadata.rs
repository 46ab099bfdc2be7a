//! # Table Metadata
//!
//! The root document of a table. Catalogs keep one `TableMetadata` per table
//! and replace it whole on every commit.
//!
//! `last_sequence_number` doubles as the table version: every snapshot bumps
//! it, and a catalog accepts a new document only while the stored one still
//! carries the version the writer started from.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::manifest::Snapshot;
use crate::partition::PartitionSpec;
use crate::schema::Schema;

/// Version of the metadata document layout.
pub const FORMAT_VERSION: i32 = 1;

/// The root metadata object for a table.
///
/// ```rust
/// use scancore::metadata::TableMetadata;
/// use scancore::schema::{Schema, Type};
///
/// let schema = Schema::builder(0)
///     .with_field(1, "VendorID", Type::Long, false)
///     .with_field(2, "fare_amount", Type::Double, false)
///     .build();
///
/// let metadata = TableMetadata::builder("nyc/taxis", schema)
///     .with_property("write.format.default", "parquet")
///     .build();
/// assert!(metadata.current_snapshot().is_none());
/// assert_eq!(metadata.total_records(), 0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TableMetadata {
    pub table_uuid: Uuid,
    pub format_version: i32,

    /// Prefix of every data and metadata file, e.g. `nyc/taxis`.
    pub location: String,

    pub last_sequence_number: i64,
    pub last_updated_ms: i64,
    pub last_column_id: i32,

    pub current_schema_id: i32,
    #[serde(default)]
    pub schemas: Vec<Schema>,

    #[serde(default)]
    pub default_spec_id: i32,
    #[serde(default)]
    pub partition_specs: Vec<PartitionSpec>,

    /// `None` until the first append.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_snapshot_id: Option<i64>,
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,

    #[serde(default)]
    pub properties: HashMap<String, String>,
}

pub struct TableMetadataBuilder {
    location: String,
    schema: Schema,
    spec: PartitionSpec,
    properties: HashMap<String, String>,
}

impl TableMetadataBuilder {
    /// Partitions the table by `spec`; tables are unpartitioned otherwise.
    pub fn with_partition_spec(mut self, spec: PartitionSpec) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> TableMetadata {
        TableMetadata {
            table_uuid: Uuid::new_v4(),
            format_version: FORMAT_VERSION,
            location: self.location.trim_end_matches('/').to_string(),
            last_sequence_number: 0,
            last_updated_ms: Utc::now().timestamp_millis(),
            last_column_id: self.schema.highest_field_id(),
            current_schema_id: self.schema.schema_id,
            schemas: vec![self.schema],
            default_spec_id: self.spec.spec_id,
            partition_specs: vec![self.spec],
            current_snapshot_id: None,
            snapshots: Vec::new(),
            properties: self.properties,
        }
    }
}

impl TableMetadata {
    pub fn builder(location: impl Into<String>, schema: Schema) -> TableMetadataBuilder {
        TableMetadataBuilder {
            location: location.into(),
            schema,
            spec: PartitionSpec::unpartitioned(),
            properties: HashMap::new(),
        }
    }

    /// # Errors
    ///
    /// Returns `SchemaNotFound` if the document references a schema it does not contain.
    pub fn current_schema(&self) -> Result<&Schema, MetadataError> {
        self.schema(self.current_schema_id)
            .ok_or(MetadataError::SchemaNotFound(self.current_schema_id))
    }

    pub fn schema(&self, schema_id: i32) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.schema_id == schema_id)
    }

    pub fn current_partition_spec(&self) -> Result<&PartitionSpec, MetadataError> {
        self.partition_specs
            .iter()
            .find(|s| s.spec_id == self.default_spec_id)
            .ok_or(MetadataError::PartitionSpecNotFound(self.default_spec_id))
    }

    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        self.snapshot(self.current_snapshot_id?)
    }

    pub fn snapshot(&self, snapshot_id: i64) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.snapshot_id == snapshot_id)
    }

    /// Advances the table version and the update timestamp.
    pub fn bump_sequence_number(&mut self) {
        self.last_sequence_number += 1;
        self.last_updated_ms = Utc::now().timestamp_millis();
    }

    /// Appends `snapshot`, makes it current and advances the version.
    pub fn add_snapshot(&mut self, snapshot: Snapshot) {
        self.current_snapshot_id = Some(snapshot.snapshot_id);
        self.snapshots.push(snapshot);
        self.bump_sequence_number();
    }

    pub fn next_snapshot_id(&self) -> i64 {
        self.snapshots
            .iter()
            .map(|s| s.snapshot_id + 1)
            .max()
            .unwrap_or(1)
    }

    /// Rows in the current snapshot.
    pub fn total_records(&self) -> i64 {
        self.current_snapshot()
            .map_or(0, |s| s.summary.total_records)
    }

    /// Data files in the current snapshot.
    pub fn total_data_files(&self) -> i64 {
        self.current_snapshot()
            .map_or(0, |s| s.summary.total_data_files)
    }

    /// Directory of manifests and manifest lists.
    pub fn metadata_dir(&self) -> String {
        format!("{}/metadata", self.location)
    }

    /// Directory of data files.
    pub fn data_dir(&self) -> String {
        format!("{}/data", self.location)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MetadataError {
    #[error("schema not found: {0}")]
    SchemaNotFound(i32),

    #[error("partition spec not found: {0}")]
    PartitionSpecNotFound(i32),
}

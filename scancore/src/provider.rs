//! # Metadata Providers
//!
//! A [`MetadataProvider`] resolves a table identifier to the schema,
//! partition spec and live data files the planner works from. Providers are
//! passed to the scan explicitly and must tolerate concurrent lookups.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::{Catalog, CatalogError, TableIdentifier};
use crate::error::ScanResult;
use crate::manifest::DataFile;
use crate::partition::PartitionSpec;
use crate::schema::Schema;
use crate::storage::Storage;

/// The planning input for one table: schema, partition spec and data files.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    pub schema: Schema,
    pub partition_spec: PartitionSpec,

    /// Live data files in manifest order.
    pub files: Vec<Arc<DataFile>>,

    /// The snapshot the files were read from; `None` for a table never written.
    pub snapshot_id: Option<i64>,
}

impl TableSnapshot {
    pub fn new(schema: Schema, partition_spec: PartitionSpec, files: Vec<DataFile>) -> Self {
        Self {
            schema,
            partition_spec,
            files: files.into_iter().map(Arc::new).collect(),
            snapshot_id: None,
        }
    }

    pub fn with_snapshot_id(mut self, snapshot_id: i64) -> Self {
        self.snapshot_id = Some(snapshot_id);
        self
    }

    pub fn total_records(&self) -> i64 {
        self.files.iter().map(|f| f.record_count).sum()
    }
}

/// Supplies table snapshots to the scan planner.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Resolves the current snapshot of a table.
    async fn get_snapshot(&self, identifier: &TableIdentifier) -> ScanResult<TableSnapshot>;
}

/// Resolves snapshots through a catalog, reading manifests from storage.
pub struct CatalogMetadataProvider {
    catalog: Arc<dyn Catalog>,
    storage: Storage,
}

impl CatalogMetadataProvider {
    pub fn new(catalog: Arc<dyn Catalog>, storage: Storage) -> Self {
        Self { catalog, storage }
    }
}

#[async_trait]
impl MetadataProvider for CatalogMetadataProvider {
    async fn get_snapshot(&self, identifier: &TableIdentifier) -> ScanResult<TableSnapshot> {
        let metadata = self.catalog.load_table(identifier).await?;
        let schema = metadata.current_schema()?.clone();
        let partition_spec = metadata.current_partition_spec()?.clone();

        let Some(snapshot) = metadata.current_snapshot() else {
            tracing::debug!(table = %identifier, "table has no snapshot");
            return Ok(TableSnapshot::new(schema, partition_spec, Vec::new()));
        };

        let files = snapshot.data_files(&self.storage).await?;
        tracing::debug!(
            table = %identifier,
            snapshot_id = snapshot.snapshot_id,
            files = files.len(),
            "resolved table snapshot"
        );
        Ok(TableSnapshot::new(schema, partition_spec, files).with_snapshot_id(snapshot.snapshot_id))
    }
}

/// A provider over fixed, in-memory snapshots.
#[derive(Debug, Default)]
pub struct StaticMetadataProvider {
    tables: HashMap<TableIdentifier, TableSnapshot>,
}

impl StaticMetadataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, identifier: TableIdentifier, snapshot: TableSnapshot) -> Self {
        self.tables.insert(identifier, snapshot);
        self
    }
}

#[async_trait]
impl MetadataProvider for StaticMetadataProvider {
    async fn get_snapshot(&self, identifier: &TableIdentifier) -> ScanResult<TableSnapshot> {
        self.tables
            .get(identifier)
            .cloned()
            .ok_or_else(|| CatalogError::TableNotFound(identifier.full_name()).into())
    }
}

//! # Tables
//!
//! [`Table`] ties a catalog entry to the storage holding its files. It is
//! the convenient way to write data ([`Table::append`]) and to start a scan
//! ([`Table::scan`]) without wiring providers and readers by hand.

use std::sync::Arc;

use uuid::Uuid;

use crate::catalog::{Catalog, TableIdentifier};
use crate::error::ScanResult;
use crate::manifest::{
    DataFile, ManifestFile, ManifestFileEntry, ManifestList, Snapshot, SnapshotSummary,
};
use crate::metadata::TableMetadata;
use crate::provider::CatalogMetadataProvider;
use crate::reader::ParquetFileReader;
use crate::schema::Schema;
use crate::storage::Storage;
use crate::table_scan::TableScanBuilder;
use crate::writer::DataWriter;

/// A table loaded from a catalog.
#[derive(Clone)]
pub struct Table {
    identifier: TableIdentifier,
    catalog: Arc<dyn Catalog>,
    metadata: TableMetadata,
    storage: Storage,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("identifier", &self.identifier)
            .field("catalog", &self.catalog.name())
            .field("location", &self.metadata.location)
            .field("current_snapshot_id", &self.metadata.current_snapshot_id)
            .finish()
    }
}

impl Table {
    /// Registers a new table with the catalog.
    pub async fn create(
        catalog: Arc<dyn Catalog>,
        storage: Storage,
        identifier: TableIdentifier,
        metadata: TableMetadata,
    ) -> ScanResult<Self> {
        let metadata = catalog.create_table(&identifier, metadata).await?;
        tracing::info!(table = %identifier, location = %metadata.location, "created table");
        Ok(Self {
            identifier,
            catalog,
            metadata,
            storage,
        })
    }

    pub async fn load(
        catalog: Arc<dyn Catalog>,
        storage: Storage,
        identifier: TableIdentifier,
    ) -> ScanResult<Self> {
        let metadata = catalog.load_table(&identifier).await?;
        Ok(Self {
            identifier,
            catalog,
            metadata,
            storage,
        })
    }

    pub fn identifier(&self) -> &TableIdentifier {
        &self.identifier
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn schema(&self) -> ScanResult<&Schema> {
        Ok(self.metadata.current_schema()?)
    }

    /// Reloads metadata from the catalog.
    pub async fn refresh(&mut self) -> ScanResult<()> {
        self.metadata = self.catalog.load_table(&self.identifier).await?;
        Ok(())
    }

    /// Starts a scan of the table's current snapshot, as seen by the catalog
    /// when the scan executes.
    pub fn scan(&self) -> TableScanBuilder {
        let provider = CatalogMetadataProvider::new(self.catalog.clone(), self.storage.clone());
        let reader = ParquetFileReader::new(self.storage.clone());
        TableScanBuilder::new(Arc::new(provider), Arc::new(reader), self.identifier.clone())
    }

    /// A writer producing data files for this table's current schema and spec.
    pub fn writer(&self) -> ScanResult<DataWriter> {
        DataWriter::for_table(self.storage.clone(), &self.metadata)
    }

    /// Commits `files` as a new snapshot.
    ///
    /// The new manifest list carries over every manifest of the current
    /// snapshot and adds one manifest for `files`, so new files follow the
    /// existing ones in manifest order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidManifest` if a file's partition tuple does not fit the
    /// table's spec, and `Catalog(CommitConflict)` if another writer committed
    /// since this table was loaded.
    pub async fn append(&mut self, files: Vec<DataFile>) -> ScanResult<Snapshot> {
        let schema = self.metadata.current_schema()?;
        let spec = self.metadata.current_partition_spec()?;
        for file in &files {
            spec.validate_partition(schema, &file.partition, &file.file_path)?;
        }
        let schema_id = schema.schema_id;
        let spec_id = spec.spec_id;

        let base_version = self.metadata.last_sequence_number;
        let snapshot_id = self.metadata.next_snapshot_id();
        let commit_id = Uuid::new_v4();
        let metadata_dir = self.metadata.metadata_dir();
        let manifest_path = format!("{}/{}-m0.json", metadata_dir, commit_id);
        let manifest_list_path =
            format!("{}/snap-{}-{}.json", metadata_dir, snapshot_id, commit_id);

        let parent = self.metadata.current_snapshot();
        let summary = SnapshotSummary::for_append(parent.map(|p| &p.summary), &files);
        let mut manifest_list = match parent {
            Some(current) => ManifestList::load(&current.manifest_list, &self.storage).await?,
            None => ManifestList::new(),
        };
        manifest_list.add_entry(ManifestFileEntry::for_added(
            manifest_path.as_str(),
            spec_id,
            snapshot_id,
            &files,
        ));

        ManifestFile::added(spec_id, snapshot_id, files)
            .save(&manifest_path, &self.storage)
            .await?;
        manifest_list.save(&manifest_list_path, &self.storage).await?;

        let snapshot = Snapshot::append(snapshot_id, base_version + 1, manifest_list_path, summary)
            .with_parent(self.metadata.current_snapshot_id)
            .with_schema_id(schema_id);
        let mut updated = self.metadata.clone();
        updated.add_snapshot(snapshot.clone());

        self.metadata = self
            .catalog
            .commit_table(&self.identifier, base_version, updated)
            .await?;
        tracing::info!(
            table = %self.identifier,
            snapshot_id,
            added_files = summary.added_data_files,
            added_records = summary.added_records,
            "committed append"
        );
        Ok(snapshot)
    }
}

//! # Manifests and Snapshots
//!
//! A table's files are tracked in three layers of JSON documents:
//!
//! ```text
//! Snapshot ──> ManifestList ──> ManifestFile* ──> DataFile*
//! ```
//!
//! A snapshot is immutable once committed. Appending writes one manifest for
//! the new files and a manifest list carrying over every manifest of the
//! parent snapshot, so older files keep their position ahead of newer ones.

use std::collections::HashMap;

use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ScanError, ScanResult};
use crate::literal::Literal;
use crate::statistics::ColumnStats;
use crate::storage::Storage;

/// What a snapshot changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Append,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Operation::Append => "append",
        })
    }
}

/// File and row counts recorded with each snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SnapshotSummary {
    pub added_data_files: i64,
    pub added_records: i64,
    pub added_files_size: i64,
    pub total_data_files: i64,
    pub total_records: i64,
}

impl SnapshotSummary {
    /// The summary of appending `files` on top of a snapshot summarized by `parent`.
    pub fn for_append(parent: Option<&SnapshotSummary>, files: &[DataFile]) -> Self {
        let base = parent.copied().unwrap_or_default();
        let added_data_files = files.len() as i64;
        let added_records = files.iter().map(|f| f.record_count).sum();
        Self {
            added_data_files,
            added_records,
            added_files_size: files.iter().map(|f| f.file_size_in_bytes).sum(),
            total_data_files: base.total_data_files + added_data_files,
            total_records: base.total_records + added_records,
        }
    }
}

/// The state of a table at one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Snapshot {
    pub snapshot_id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_snapshot_id: Option<i64>,

    /// The table version this snapshot was committed as.
    pub sequence_number: i64,

    /// Commit time, milliseconds since the epoch.
    pub timestamp_ms: i64,

    pub operation: Operation,

    pub manifest_list: String,

    #[serde(default)]
    pub summary: SnapshotSummary,

    pub schema_id: i32,
}

impl Snapshot {
    /// An append snapshot stamped with the current time.
    pub fn append(
        snapshot_id: i64,
        sequence_number: i64,
        manifest_list: impl Into<String>,
        summary: SnapshotSummary,
    ) -> Self {
        Self {
            snapshot_id,
            parent_snapshot_id: None,
            sequence_number,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            operation: Operation::Append,
            manifest_list: manifest_list.into(),
            summary,
            schema_id: 0,
        }
    }

    pub fn with_parent(mut self, parent: Option<i64>) -> Self {
        self.parent_snapshot_id = parent;
        self
    }

    pub fn with_schema_id(mut self, schema_id: i32) -> Self {
        self.schema_id = schema_id;
        self
    }

    /// Loads the live data files of this snapshot, in manifest order.
    ///
    /// Manifests are fetched concurrently; entries marked deleted are dropped.
    pub async fn data_files(&self, storage: &Storage) -> ScanResult<Vec<DataFile>> {
        let list = ManifestList::load(&self.manifest_list, storage).await?;
        let manifests = try_join_all(
            list.entries
                .iter()
                .map(|entry| ManifestFile::load(&entry.manifest_path, storage)),
        )
        .await?;

        Ok(manifests
            .into_iter()
            .flat_map(|manifest| manifest.entries)
            .filter(|entry| entry.status.is_live())
            .map(|entry| entry.data_file)
            .collect())
    }
}

/// The manifests making up one snapshot, in commit order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManifestList {
    pub entries: Vec<ManifestFileEntry>,
}

impl ManifestList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, entry: ManifestFileEntry) {
        self.entries.push(entry);
    }

    pub fn total_data_files(&self) -> i64 {
        self.entries
            .iter()
            .map(|e| e.added_files_count + e.existing_files_count)
            .sum()
    }

    pub async fn load(path: &str, storage: &Storage) -> ScanResult<Self> {
        read_document(path, storage).await
    }

    pub async fn save(&self, path: &str, storage: &Storage) -> ScanResult<()> {
        write_document(self, path, storage).await
    }
}

/// A manifest list's pointer to one manifest file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManifestFileEntry {
    pub manifest_path: String,
    pub partition_spec_id: i32,
    pub added_snapshot_id: i64,
    pub added_files_count: i64,
    #[serde(default)]
    pub existing_files_count: i64,
    pub added_rows_count: i64,
}

impl ManifestFileEntry {
    /// Describes a manifest holding `files`, all added by `snapshot_id`.
    pub fn for_added(
        manifest_path: impl Into<String>,
        partition_spec_id: i32,
        snapshot_id: i64,
        files: &[DataFile],
    ) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            partition_spec_id,
            added_snapshot_id: snapshot_id,
            added_files_count: files.len() as i64,
            existing_files_count: 0,
            added_rows_count: files.iter().map(|f| f.record_count).sum(),
        }
    }
}

/// Data file entries written under one partition spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManifestFile {
    pub partition_spec_id: i32,
    pub entries: Vec<ManifestEntry>,
}

impl ManifestFile {
    /// A manifest of files added by `snapshot_id`.
    pub fn added(partition_spec_id: i32, snapshot_id: i64, files: Vec<DataFile>) -> Self {
        let entries = files
            .into_iter()
            .map(|data_file| ManifestEntry {
                status: ManifestEntryStatus::Added,
                snapshot_id: Some(snapshot_id),
                data_file,
            })
            .collect();
        Self {
            partition_spec_id,
            entries,
        }
    }

    pub async fn load(path: &str, storage: &Storage) -> ScanResult<Self> {
        read_document(path, storage).await
    }

    pub async fn save(&self, path: &str, storage: &Storage) -> ScanResult<()> {
        write_document(self, path, storage).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManifestEntry {
    pub status: ManifestEntryStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<i64>,

    pub data_file: DataFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestEntryStatus {
    Existing,
    Added,
    Deleted,
}

impl ManifestEntryStatus {
    /// Whether the file is part of the snapshot's contents.
    pub fn is_live(self) -> bool {
        !matches!(self, ManifestEntryStatus::Deleted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Parquet,
}

/// The manifest entry of one data file.
///
/// `partition` holds one value per field of the table's partition spec, in
/// spec order; `None` means the source column was null for every row.
/// `statistics` is keyed by schema field ID and may omit any column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DataFile {
    pub file_path: String,
    pub file_format: FileFormat,
    #[serde(default)]
    pub partition: Vec<Option<Literal>>,
    pub record_count: i64,
    pub file_size_in_bytes: i64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub statistics: HashMap<i32, ColumnStats>,
}

impl DataFile {
    /// A file entry with no partition values and no statistics.
    pub fn new(
        path: impl Into<String>,
        format: FileFormat,
        record_count: i64,
        size_in_bytes: i64,
    ) -> Self {
        Self {
            file_path: path.into(),
            file_format: format,
            partition: Vec::new(),
            record_count,
            file_size_in_bytes: size_in_bytes,
            statistics: HashMap::new(),
        }
    }

    pub fn with_partition(mut self, values: Vec<Option<Literal>>) -> Self {
        self.partition = values;
        self
    }

    pub fn with_column_stats(mut self, field_id: i32, stats: ColumnStats) -> Self {
        self.statistics.insert(field_id, stats);
        self
    }

    pub fn with_statistics(mut self, statistics: HashMap<i32, ColumnStats>) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn column_stats(&self, field_id: i32) -> Option<&ColumnStats> {
        self.statistics.get(&field_id)
    }
}

/// Reads a manifest-layer document; undecodable JSON is an `InvalidManifest`.
async fn read_document<T: DeserializeOwned>(path: &str, storage: &Storage) -> ScanResult<T> {
    let raw = storage.read(path).await?;
    serde_json::from_slice(&raw).map_err(|e| ScanError::InvalidManifest {
        path: path.to_string(),
        message: e.to_string(),
    })
}

async fn write_document<T: Serialize>(doc: &T, path: &str, storage: &Storage) -> ScanResult<()> {
    storage
        .write(path, serde_json::to_vec_pretty(doc)?.into())
        .await?;
    Ok(())
}

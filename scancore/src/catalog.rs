//! # Catalog
//!
//! Maps table identifiers to their current [`TableMetadata`]. Commits are
//! compare-and-swap on the metadata's `last_sequence_number`: a writer names
//! the version it read, and the catalog refuses the new document if the table
//! has moved since.
//!
//! Two implementations ship with the crate. [`InMemoryCatalog`] keeps
//! documents in a map. [`StorageCatalog`] keeps one
//! `<namespace>/<table>/metadata.json` per table in an object store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::metadata::TableMetadata;
use crate::storage::Storage;

const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("table already exists: {0}")]
    TableAlreadyExists(String),

    /// Another writer committed after this one loaded the table.
    #[error("commit conflict: expected version {expected}, found {actual}")]
    CommitConflict { expected: i64, actual: i64 },

    #[error("storage error: {0}")]
    Storage(#[from] object_store::Error),

    #[error("invalid metadata document: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Serialization(err.to_string())
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// A table name qualified by a (possibly multi-level) namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableIdentifier {
    pub namespace: Vec<String>,
    pub name: String,
}

impl TableIdentifier {
    pub fn new(
        namespace: impl IntoIterator<Item = impl Into<String>>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into_iter().map(Into::into).collect(),
            name: name.into(),
        }
    }

    /// An identifier in a single-level namespace.
    pub fn of(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new([namespace.into()], name)
    }

    /// Parses `a.b.table`; the last component is the table name.
    pub fn parse(full_name: &str) -> Self {
        let mut parts: Vec<&str> = full_name.split('.').collect();
        let name = parts.pop().unwrap_or_default();
        Self::new(parts, name)
    }

    /// Dotted form, `namespace.table`.
    pub fn full_name(&self) -> String {
        self.parts().collect::<Vec<_>>().join(".")
    }

    /// Storage prefix of the table, `<namespace>/<table>`.
    pub fn to_path(&self) -> String {
        self.parts().collect::<Vec<_>>().join("/")
    }

    fn parts(&self) -> impl Iterator<Item = &str> {
        self.namespace
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.name.as_str()))
    }
}

impl std::fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full_name())
    }
}

#[async_trait]
pub trait Catalog: Send + Sync {
    fn name(&self) -> &str;

    /// Tables directly inside `namespace`, sorted by name.
    async fn list_tables(&self, namespace: &[String]) -> CatalogResult<Vec<TableIdentifier>>;

    async fn create_table(
        &self,
        identifier: &TableIdentifier,
        metadata: TableMetadata,
    ) -> CatalogResult<TableMetadata>;

    async fn load_table(&self, identifier: &TableIdentifier) -> CatalogResult<TableMetadata>;

    async fn table_exists(&self, identifier: &TableIdentifier) -> CatalogResult<bool>;

    /// Replaces the table's metadata if it is still at `base_version`.
    ///
    /// Returns the committed metadata.
    async fn commit_table(
        &self,
        identifier: &TableIdentifier,
        base_version: i64,
        metadata: TableMetadata,
    ) -> CatalogResult<TableMetadata>;
}

/// Fails with `CommitConflict` unless `current` is at `base_version`.
fn check_version(current: &TableMetadata, base_version: i64) -> CatalogResult<()> {
    if current.last_sequence_number == base_version {
        Ok(())
    } else {
        Err(CatalogError::CommitConflict {
            expected: base_version,
            actual: current.last_sequence_number,
        })
    }
}

/// A catalog held in process memory.
#[derive(Debug)]
pub struct InMemoryCatalog {
    name: String,
    tables: RwLock<BTreeMap<TableIdentifier, TableMetadata>>,
}

impl InMemoryCatalog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: RwLock::default(),
        }
    }

    pub fn shared(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tables(&self, namespace: &[String]) -> CatalogResult<Vec<TableIdentifier>> {
        Ok(self
            .tables
            .read()
            .await
            .keys()
            .filter(|id| id.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn create_table(
        &self,
        identifier: &TableIdentifier,
        metadata: TableMetadata,
    ) -> CatalogResult<TableMetadata> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(identifier) {
            return Err(CatalogError::TableAlreadyExists(identifier.full_name()));
        }
        tables.insert(identifier.clone(), metadata.clone());
        Ok(metadata)
    }

    async fn load_table(&self, identifier: &TableIdentifier) -> CatalogResult<TableMetadata> {
        self.tables
            .read()
            .await
            .get(identifier)
            .cloned()
            .ok_or_else(|| CatalogError::TableNotFound(identifier.full_name()))
    }

    async fn table_exists(&self, identifier: &TableIdentifier) -> CatalogResult<bool> {
        Ok(self.tables.read().await.contains_key(identifier))
    }

    async fn commit_table(
        &self,
        identifier: &TableIdentifier,
        base_version: i64,
        metadata: TableMetadata,
    ) -> CatalogResult<TableMetadata> {
        let mut tables = self.tables.write().await;
        let current = tables
            .get_mut(identifier)
            .ok_or_else(|| CatalogError::TableNotFound(identifier.full_name()))?;
        check_version(current, base_version)?;
        *current = metadata.clone();
        Ok(metadata)
    }
}

/// A catalog keeping each table's metadata as a JSON document in object storage.
///
/// Commits are serialized within one process; concurrent writers in other
/// processes are not detected between the version check and the write.
#[derive(Debug)]
pub struct StorageCatalog {
    name: String,
    storage: Storage,
    commit_lock: Mutex<()>,
}

impl StorageCatalog {
    pub fn new(name: impl Into<String>, storage: Storage) -> Self {
        Self {
            name: name.into(),
            storage,
            commit_lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    fn document_path(identifier: &TableIdentifier) -> String {
        format!("{}/{}", identifier.to_path(), METADATA_FILE)
    }

    async fn read(&self, identifier: &TableIdentifier) -> CatalogResult<TableMetadata> {
        match self.storage.read(&Self::document_path(identifier)).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(object_store::Error::NotFound { .. }) => {
                Err(CatalogError::TableNotFound(identifier.full_name()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(
        &self,
        identifier: &TableIdentifier,
        metadata: &TableMetadata,
    ) -> CatalogResult<()> {
        let raw = serde_json::to_vec_pretty(metadata)?;
        self.storage
            .write(&Self::document_path(identifier), raw.into())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Catalog for StorageCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tables(&self, namespace: &[String]) -> CatalogResult<Vec<TableIdentifier>> {
        let prefix = namespace.join("/");
        let suffix = format!("/{}", METADATA_FILE);
        let mut tables: Vec<TableIdentifier> = self
            .storage
            .list_files(&prefix)
            .await?
            .iter()
            .filter_map(|path| {
                let rest = match prefix.as_str() {
                    "" => path.as_str(),
                    prefix => path.strip_prefix(prefix)?.strip_prefix('/')?,
                };
                let table = rest.strip_suffix(&suffix)?;
                (!table.contains('/')).then(|| TableIdentifier::new(namespace.iter(), table))
            })
            .collect();
        tables.sort();
        Ok(tables)
    }

    async fn create_table(
        &self,
        identifier: &TableIdentifier,
        metadata: TableMetadata,
    ) -> CatalogResult<TableMetadata> {
        let _guard = self.commit_lock.lock().await;
        if self.table_exists(identifier).await? {
            return Err(CatalogError::TableAlreadyExists(identifier.full_name()));
        }
        self.write(identifier, &metadata).await?;
        Ok(metadata)
    }

    async fn load_table(&self, identifier: &TableIdentifier) -> CatalogResult<TableMetadata> {
        self.read(identifier).await
    }

    async fn table_exists(&self, identifier: &TableIdentifier) -> CatalogResult<bool> {
        match self.read(identifier).await {
            Ok(_) => Ok(true),
            Err(CatalogError::TableNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn commit_table(
        &self,
        identifier: &TableIdentifier,
        base_version: i64,
        metadata: TableMetadata,
    ) -> CatalogResult<TableMetadata> {
        let _guard = self.commit_lock.lock().await;
        check_version(&self.read(identifier).await?, base_version)?;
        self.write(identifier, &metadata).await?;
        Ok(metadata)
    }
}

use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, ObjectStoreExt};

/// A cloneable handle to the object store holding table metadata and data files.
///
/// Paths are relative to the store root, e.g. `nyc/taxis/data/part-0.parquet`.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("store", &self.inner.to_string())
            .finish()
    }
}

impl Storage {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }

    /// A storage backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// A storage rooted at a local directory, which must exist.
    pub fn local(root: impl AsRef<std::path::Path>) -> object_store::Result<Self> {
        let store = LocalFileSystem::new_with_prefix(root)?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Creates a Storage from a location URL (e.g., "s3://bucket/path" or "file:///data").
    pub fn from_location(location: &str) -> object_store::Result<Self> {
        let url = url::Url::parse(location).map_err(|e| object_store::Error::Generic {
            store: "url",
            source: Box::new(e),
        })?;
        let (store, _path) = object_store::parse_url(&url)?;
        Ok(Self::new(store.into()))
    }

    pub async fn read(&self, path: &str) -> object_store::Result<Bytes> {
        let path = Path::from(path);
        let result = self.inner.get(&path).await?;
        result.bytes().await
    }

    pub async fn write(&self, path: &str, content: Bytes) -> object_store::Result<()> {
        let path = Path::from(path);
        self.inner.put(&path, content.into()).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> object_store::Result<()> {
        let path = Path::from(path);
        self.inner.delete(&path).await
    }

    /// Lists every object below `prefix`, sorted by path.
    pub async fn list_files(&self, prefix: &str) -> object_store::Result<Vec<String>> {
        let prefix = Path::from(prefix);
        let mut files: Vec<String> = self
            .inner
            .list(Some(&prefix))
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await?;
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_write_list() {
        let storage = Storage::in_memory();
        storage
            .write("nyc/taxis/b.json", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        storage
            .write("nyc/taxis/a.json", Bytes::from_static(b"[]"))
            .await
            .unwrap();

        assert_eq!(storage.read("nyc/taxis/a.json").await.unwrap(), "[]");
        assert_eq!(
            storage.list_files("nyc").await.unwrap(),
            vec!["nyc/taxis/a.json", "nyc/taxis/b.json"]
        );

        storage.delete("nyc/taxis/a.json").await.unwrap();
        let missing = storage.read("nyc/taxis/a.json").await;
        assert!(matches!(missing, Err(object_store::Error::NotFound { .. })));
    }
}

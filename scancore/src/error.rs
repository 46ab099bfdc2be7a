//! # Scan Errors
//!
//! Planning-time errors (`InvalidPredicate`, `SchemaMismatch`,
//! `InvalidManifest`) are raised before any data file is opened. Per-file
//! errors (`FileNotFound`, `FileRead`) are raised by the materializer and are
//! subject to the scan's [`FailurePolicy`](crate::config::FailurePolicy).

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::metadata::MetadataError;

/// Errors that can occur while planning or executing a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The filter references an unknown column or an incompatible literal.
    #[error("invalid predicate: {0}")]
    InvalidPredicate(String),

    /// A projection or record batch does not match the table schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A data file manifest is inconsistent with the table's partition spec.
    #[error("invalid manifest for {path}: {message}")]
    InvalidManifest { path: String, message: String },

    /// A data file referenced by a scan task does not exist.
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// A data file exists but could not be read or decoded.
    #[error("failed to read {path}: {message}")]
    FileRead { path: String, message: String },

    /// The catalog rejected a lookup or commit.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Table metadata references a schema or partition spec it does not contain.
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// An object store error outside of data file reads (manifests, metadata).
    #[error("storage error: {0}")]
    Storage(#[from] object_store::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// An ad-hoc SQL query failed to plan or execute.
    #[error("query error: {0}")]
    Query(#[from] datafusion::error::DataFusionError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A spawned scan task panicked or was cancelled.
    #[error("scan task failed to complete: {0}")]
    TaskJoin(String),
}

impl ScanError {
    /// Returns true for errors scoped to a single data file.
    ///
    /// Only these errors may be downgraded to warnings in best-effort mode.
    pub fn is_file_error(&self) -> bool {
        matches!(
            self,
            ScanError::FileNotFound { .. } | ScanError::FileRead { .. }
        )
    }

    /// Returns the data file path for per-file errors.
    pub fn file_path(&self) -> Option<&str> {
        match self {
            ScanError::FileNotFound { path } | ScanError::FileRead { path, .. } => Some(path),
            _ => None,
        }
    }

    pub(crate) fn file_read(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ScanError::FileRead {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Result type for scan operations.
pub type ScanResult<T> = Result<T, ScanError>;

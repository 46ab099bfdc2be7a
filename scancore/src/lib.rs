//! Scan planning and materialization for partitioned, snapshot-based tables.
//!
//! A scan resolves a table's current snapshot through a [`MetadataProvider`],
//! prunes its data files by partition values and column statistics, reads the
//! surviving files concurrently and assembles the rows into a [`Dataset`].

// Table model
pub mod catalog;
pub mod manifest;
pub mod metadata;
pub mod partition;
pub mod schema;
pub mod statistics;
pub mod storage;
pub mod table;

// Predicates
pub mod evaluator;
pub mod expr;
pub mod literal;
pub mod row_filter;

// Scan pipeline
pub mod assemble;
pub mod config;
pub mod error;
pub mod executor;
pub mod provider;
pub mod reader;
pub mod scan;
pub mod table_scan;
pub mod writer;

// Integrations
pub mod analysis;
pub mod datafusion;
pub mod polars;

pub use assemble::{Dataset, ResultAssembler, ScanWarning};
pub use catalog::{
    Catalog, CatalogError, CatalogResult, InMemoryCatalog, StorageCatalog, TableIdentifier,
};
pub use config::{FailurePolicy, FileOrder, OutputOrdering, ScanOptions};
pub use error::{ScanError, ScanResult};
pub use evaluator::{Classification, classify};
pub use executor::ScanExecutor;
pub use expr::{Predicate, col};
pub use literal::Literal;
pub use manifest::{DataFile, FileFormat, ManifestList, Operation, Snapshot, SnapshotSummary};
pub use metadata::{FORMAT_VERSION, MetadataError, TableMetadata};
pub use partition::{PartitionSpec, Transform};
pub use provider::{
    CatalogMetadataProvider, MetadataProvider, StaticMetadataProvider, TableSnapshot,
};
pub use reader::{FileReader, ParquetFileReader, TaskMaterializer};
pub use scan::{ScanPlanner, ScanTask};
pub use schema::{Field, Schema, Type};
pub use storage::Storage;
pub use table::Table;
pub use table_scan::{TableScanBuilder, scan};
pub use writer::DataWriter;

/// Commonly used types.
///
/// `use scancore::prelude::*;`
pub mod prelude {
    pub use crate::assemble::{Dataset, ScanWarning};
    pub use crate::catalog::{Catalog, InMemoryCatalog, StorageCatalog, TableIdentifier};
    pub use crate::config::{FailurePolicy, OutputOrdering, ScanOptions};
    pub use crate::error::{ScanError, ScanResult};
    pub use crate::expr::{Predicate, col};
    pub use crate::literal::Literal;
    pub use crate::metadata::TableMetadata;
    pub use crate::partition::{PartitionSpec, Transform};
    pub use crate::schema::{Schema, Type};
    pub use crate::storage::Storage;
    pub use crate::table::Table;
    pub use crate::table_scan::TableScanBuilder;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let schema = Schema::builder(0)
            .with_field(1, "VendorID", Type::Long, false)
            .with_field(2, "fare_amount", Type::Double, false)
            .build();
        let spec = PartitionSpec::builder(&schema)
            .add_identity("VendorID")
            .unwrap()
            .build();
        let metadata = TableMetadata::builder("nyc/taxis", schema)
            .with_partition_spec(spec)
            .build();
        assert_eq!(metadata.format_version, crate::FORMAT_VERSION);

        let filter = col("fare_amount").gt(0.0).and(col("VendorID").eq(2i64));
        assert!(!matches!(filter, Predicate::AlwaysTrue));
        assert_eq!(ScanOptions::default().failure_policy, FailurePolicy::AbortOnFirstError);
    }
}

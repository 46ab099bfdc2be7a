//! # Table Scans
//!
//! The caller-facing entry point of the pipeline: resolve a snapshot through
//! a [`MetadataProvider`], plan tasks, materialize them concurrently and
//! assemble the result.
//!
//! ```no_run
//! # async fn example(
//! #     provider: std::sync::Arc<dyn scancore::provider::MetadataProvider>,
//! #     reader: std::sync::Arc<dyn scancore::reader::FileReader>,
//! # ) -> scancore::error::ScanResult<()> {
//! use scancore::expr::col;
//! use scancore::table_scan::TableScanBuilder;
//! use scancore::TableIdentifier;
//!
//! let dataset = TableScanBuilder::new(provider, reader, TableIdentifier::of("nyc", "taxis"))
//!     .with_filter(col("fare_amount").gt(0.0))
//!     .select(["VendorID", "fare_amount"])
//!     .execute()
//!     .await?;
//! println!("{} rows", dataset.num_rows());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::assemble::Dataset;
use crate::catalog::TableIdentifier;
use crate::config::ScanOptions;
use crate::error::ScanResult;
use crate::executor::ScanExecutor;
use crate::expr::Predicate;
use crate::provider::MetadataProvider;
use crate::reader::{FileReader, TaskMaterializer};
use crate::scan::{ScanPlanner, ScanTask};

/// Scans a table into memory.
///
/// `projection` of `None` selects every column. Filter and projection are
/// validated before any data file is read.
#[tracing::instrument(skip_all, fields(table = %identifier, filter = %filter))]
pub async fn scan(
    provider: &dyn MetadataProvider,
    reader: Arc<dyn FileReader>,
    identifier: &TableIdentifier,
    filter: &Predicate,
    projection: Option<&[String]>,
    options: &ScanOptions,
) -> ScanResult<Dataset> {
    let snapshot = provider.get_snapshot(identifier).await?;
    let planner =
        ScanPlanner::new(&snapshot, filter, projection)?.with_file_order(options.file_order);
    let tasks = planner.plan_all()?;
    let output_schema = snapshot.schema.project_arrow(planner.projection())?;

    let materializer = TaskMaterializer::new(reader, Arc::new(snapshot.schema.clone()));
    let dataset = ScanExecutor::new(materializer, options.clone())
        .execute(tasks, output_schema)
        .await?;

    tracing::info!(
        rows = dataset.num_rows(),
        warnings = dataset.warnings().len(),
        "scan complete"
    );
    Ok(dataset)
}

/// Builder-style access to [`scan`].
#[derive(Clone)]
pub struct TableScanBuilder {
    provider: Arc<dyn MetadataProvider>,
    reader: Arc<dyn FileReader>,
    identifier: TableIdentifier,
    filter: Predicate,
    projection: Option<Vec<String>>,
    options: ScanOptions,
}

impl TableScanBuilder {
    pub fn new(
        provider: Arc<dyn MetadataProvider>,
        reader: Arc<dyn FileReader>,
        identifier: TableIdentifier,
    ) -> Self {
        Self {
            provider,
            reader,
            identifier,
            filter: Predicate::AlwaysTrue,
            projection: None,
            options: ScanOptions::default(),
        }
    }

    /// Adds a row filter. Repeated calls are combined with AND.
    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filter = match self.filter {
            Predicate::AlwaysTrue => filter,
            existing => existing.and(filter),
        };
        self
    }

    /// Selects output columns, in order.
    pub fn select<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.projection = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn filter(&self) -> &Predicate {
        &self.filter
    }

    /// Plans the scan without reading any data file.
    pub async fn plan_files(&self) -> ScanResult<Vec<ScanTask>> {
        let snapshot = self.provider.get_snapshot(&self.identifier).await?;
        ScanPlanner::new(&snapshot, &self.filter, self.projection.as_deref())?
            .with_file_order(self.options.file_order)
            .plan_all()
    }

    pub async fn execute(self) -> ScanResult<Dataset> {
        scan(
            self.provider.as_ref(),
            self.reader,
            &self.identifier,
            &self.filter,
            self.projection.as_deref(),
            &self.options,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogError;
    use crate::error::ScanError;
    use crate::expr::col;
    use crate::manifest::{DataFile, FileFormat};
    use crate::partition::PartitionSpec;
    use crate::provider::{StaticMetadataProvider, TableSnapshot};
    use crate::reader::ParquetFileReader;
    use crate::schema::{Schema, Type};
    use crate::statistics::ColumnStats;
    use crate::storage::Storage;

    fn builder(files: Vec<DataFile>) -> TableScanBuilder {
        let schema = Schema::builder(0)
            .with_field(1, "VendorID", Type::Long, false)
            .with_field(2, "fare_amount", Type::Double, false)
            .build();
        let snapshot = TableSnapshot::new(schema, PartitionSpec::unpartitioned(), files);
        let identifier = TableIdentifier::of("nyc", "taxis");
        let provider = StaticMetadataProvider::new().with_table(identifier.clone(), snapshot);
        let reader = ParquetFileReader::new(Storage::in_memory());
        TableScanBuilder::new(Arc::new(provider), Arc::new(reader), identifier)
    }

    #[test]
    fn test_filters_accumulate() {
        let scan = builder(Vec::new())
            .with_filter(col("fare_amount").gt(0.0))
            .with_filter(col("VendorID").eq(2));
        assert_eq!(
            scan.filter().to_string(),
            "(fare_amount > 0 AND VendorID = 2)"
        );
    }

    #[tokio::test]
    async fn test_plan_files_prunes_without_io() {
        // Nothing exists in storage; planning must not touch it.
        let files = vec![
            DataFile::new("data/a.parquet", FileFormat::Parquet, 10, 100)
                .with_column_stats(2, ColumnStats::with_bounds(0.0, 200.0).with_null_count(0)),
            DataFile::new("data/b.parquet", FileFormat::Parquet, 10, 100),
        ];
        let tasks = builder(files)
            .with_filter(col("fare_amount").gt(500.0))
            .plan_files()
            .await
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].file_path(), "data/b.parquet");
    }

    #[tokio::test]
    async fn test_unknown_table_and_column() {
        let scan = builder(Vec::new());
        let missing = TableScanBuilder::new(
            scan.provider.clone(),
            scan.reader.clone(),
            TableIdentifier::of("nyc", "zones"),
        )
        .execute()
        .await;
        assert!(matches!(
            missing,
            Err(ScanError::Catalog(CatalogError::TableNotFound(_)))
        ));

        let bad_projection = scan.select(["tip_amount"]).execute().await;
        assert!(matches!(bad_projection, Err(ScanError::SchemaMismatch(_))));
    }

    #[tokio::test]
    async fn test_empty_table() {
        let dataset = builder(Vec::new())
            .select(["fare_amount"])
            .execute()
            .await
            .unwrap();
        assert_eq!(dataset.num_rows(), 0);
        assert_eq!(dataset.column_names(), vec!["fare_amount"]);
    }
}

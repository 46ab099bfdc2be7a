//! # Scan Planning
//!
//! Turns a table snapshot, a filter and a projection into the sequence of
//! [`ScanTask`]s that must be read. Binding and projection checks happen up
//! front, so a bad filter or column fails before any data file is touched.
//! Files are then classified lazily as the plan is iterated.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::FileOrder;
use crate::error::ScanResult;
use crate::evaluator::classify;
use crate::expr::{BoundPredicate, Predicate};
use crate::literal::Literal;
use crate::manifest::DataFile;
use crate::partition::PartitionSpec;
use crate::provider::TableSnapshot;
use crate::schema::Schema;

/// A single unit of work for reading a table.
#[derive(Debug, Clone)]
pub struct ScanTask {
    pub data_file: Arc<DataFile>,

    /// Row filter still to apply; `AlwaysTrue` when every row matches.
    pub residual: BoundPredicate,

    /// Output columns, in order.
    pub projection: Arc<[String]>,
}

impl ScanTask {
    pub fn file_path(&self) -> &str {
        &self.data_file.file_path
    }

    /// Columns to read from the file: the projection, then residual-only columns.
    pub fn read_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self.projection.to_vec();
        for column in self.residual.referenced_columns() {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        columns
    }
}

/// Plans scans over one table snapshot.
pub struct ScanPlanner<'a> {
    snapshot: &'a TableSnapshot,
    filter: BoundPredicate,
    projection: Arc<[String]>,
    file_order: FileOrder,
}

impl<'a> ScanPlanner<'a> {
    /// Binds the filter and validates the projection against the snapshot schema.
    ///
    /// `projection` of `None` selects every column in schema order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPredicate` if the filter cannot be bound and
    /// `SchemaMismatch` if a projected column is unknown or repeated.
    pub fn new(
        snapshot: &'a TableSnapshot,
        filter: &Predicate,
        projection: Option<&[String]>,
    ) -> ScanResult<Self> {
        let schema = &snapshot.schema;
        let filter = filter.bind(schema)?;
        let projection: Vec<String> = match projection {
            Some(columns) => {
                schema.select(columns)?;
                columns.to_vec()
            }
            None => schema.fields.iter().map(|f| f.name.clone()).collect(),
        };

        Ok(Self {
            snapshot,
            filter,
            projection: projection.into(),
            file_order: FileOrder::default(),
        })
    }

    pub fn with_file_order(mut self, file_order: FileOrder) -> Self {
        self.file_order = file_order;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.snapshot.schema
    }

    pub fn projection(&self) -> &[String] {
        &self.projection
    }

    pub fn filter(&self) -> &BoundPredicate {
        &self.filter
    }

    /// Returns the tasks of this scan, classifying files as the iterator advances.
    ///
    /// Skipped files produce no task. Iterating twice yields the same sequence.
    pub fn plan(&self) -> impl Iterator<Item = ScanResult<ScanTask>> + '_ {
        let mut files: Vec<&Arc<DataFile>> = self.snapshot.files.iter().collect();
        if self.file_order == FileOrder::PartitionValues {
            files.sort_by(|a, b| {
                compare_partitions(&a.partition, &b.partition)
                    .then_with(|| a.file_path.cmp(&b.file_path))
            });
        }

        files.into_iter().filter_map(move |file| {
            let classification = match classify(
                &self.filter,
                &self.snapshot.schema,
                &self.snapshot.partition_spec,
                file,
            ) {
                Ok(c) => c,
                Err(e) => return Some(Err(e)),
            };

            match classification.into_residual() {
                None => {
                    tracing::debug!(file = %file.file_path, "pruned data file");
                    None
                }
                Some(residual) => Some(Ok(ScanTask {
                    data_file: Arc::clone(file),
                    residual,
                    projection: Arc::clone(&self.projection),
                })),
            }
        })
    }

    /// Collects the whole plan, failing on the first invalid manifest.
    pub fn plan_all(&self) -> ScanResult<Vec<ScanTask>> {
        let tasks = self.plan().collect::<ScanResult<Vec<_>>>()?;
        tracing::info!(
            files = self.snapshot.files.len(),
            tasks = tasks.len(),
            pruned = self.snapshot.files.len() - tasks.len(),
            filter = %self.filter,
            "planned scan"
        );
        Ok(tasks)
    }

    pub fn partition_spec(&self) -> &PartitionSpec {
        &self.snapshot.partition_spec
    }
}

/// Orders partition tuples field by field; nulls sort first.
fn compare_partitions(a: &[Option<Literal>], b: &[Option<Literal>]) -> Ordering {
    for (left, right) in a.iter().zip(b) {
        let ordering = match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(l), Some(r)) => l.partial_cmp(r).unwrap_or(Ordering::Equal),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.len().cmp(&b.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use crate::expr::col;
    use crate::manifest::FileFormat;
    use crate::schema::Type;
    use crate::statistics::ColumnStats;

    fn taxi_snapshot() -> TableSnapshot {
        let schema = Schema::builder(0)
            .with_field(1, "VendorID", Type::Long, false)
            .with_field(
                2,
                "tpep_pickup_datetime",
                Type::Timestamp {
                    with_timezone: true,
                },
                false,
            )
            .with_field(3, "fare_amount", Type::Double, false)
            .build();
        let spec = PartitionSpec::builder(&schema)
            .add_day("tpep_pickup_datetime")
            .unwrap()
            .build();
        let files = vec![
            DataFile::new("data/day=2022-02-01/b.parquet", FileFormat::Parquet, 50, 512)
                .with_partition(vec![Literal::date_from_ymd(2022, 2, 1)])
                .with_column_stats(3, ColumnStats::with_bounds(2.5, 80.0).with_null_count(0)),
            DataFile::new("data/day=2022-01-01/a.parquet", FileFormat::Parquet, 100, 1024)
                .with_partition(vec![Literal::date_from_ymd(2022, 1, 1)]),
            DataFile::new("data/day=null/c.parquet", FileFormat::Parquet, 3, 64)
                .with_partition(vec![None]),
        ];
        TableSnapshot::new(schema, spec, files)
    }

    fn paths(tasks: &[ScanTask]) -> Vec<&str> {
        tasks.iter().map(|t| t.file_path()).collect()
    }

    #[test]
    fn test_plan_prunes_partitions() {
        let snapshot = taxi_snapshot();
        let filter = col("tpep_pickup_datetime").gt_eq("2022-02-01T00:00:00Z");
        let planner = ScanPlanner::new(&snapshot, &filter, None).unwrap();

        let tasks = planner.plan_all().unwrap();
        assert_eq!(paths(&tasks), vec!["data/day=2022-02-01/b.parquet"]);
        assert_eq!(
            tasks[0].projection.as_ref(),
            ["VendorID", "tpep_pickup_datetime", "fare_amount"]
        );
    }

    #[test]
    fn test_plan_is_idempotent() {
        let snapshot = taxi_snapshot();
        let filter = col("fare_amount").gt(10.0);
        let planner = ScanPlanner::new(&snapshot, &filter, None).unwrap();

        let first = paths(&planner.plan_all().unwrap())
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        let second = planner.plan_all().unwrap();
        assert_eq!(first, paths(&second));
    }

    #[test]
    fn test_always_true_keeps_every_file() {
        let snapshot = taxi_snapshot();
        let planner = ScanPlanner::new(&snapshot, &Predicate::AlwaysTrue, None).unwrap();
        let tasks = planner.plan_all().unwrap();
        assert_eq!(tasks.len(), 3);
        assert!(tasks.iter().all(|t| t.residual.is_always_true()));
    }

    #[test]
    fn test_partition_value_order() {
        let snapshot = taxi_snapshot();
        let planner = ScanPlanner::new(&snapshot, &Predicate::AlwaysTrue, None)
            .unwrap()
            .with_file_order(FileOrder::PartitionValues);
        let tasks = planner.plan_all().unwrap();
        assert_eq!(
            paths(&tasks),
            vec![
                "data/day=null/c.parquet",
                "data/day=2022-01-01/a.parquet",
                "data/day=2022-02-01/b.parquet",
            ]
        );
    }

    #[test]
    fn test_read_columns_include_residual() {
        let snapshot = taxi_snapshot();
        let filter = col("fare_amount").gt(10.0);
        let projection = vec!["VendorID".to_string()];
        let planner = ScanPlanner::new(&snapshot, &filter, Some(&projection)).unwrap();

        let tasks = planner.plan_all().unwrap();
        let residual_task = tasks
            .iter()
            .find(|t| !t.residual.is_always_true())
            .unwrap();
        assert_eq!(residual_task.read_columns(), vec!["VendorID", "fare_amount"]);
    }

    #[test]
    fn test_planning_errors_before_io() {
        let snapshot = taxi_snapshot();
        let bad_filter = ScanPlanner::new(&snapshot, &col("tip_amount").gt(1.0), None);
        assert!(matches!(bad_filter, Err(ScanError::InvalidPredicate(_))));

        let projection = vec!["tip_amount".to_string()];
        let bad_projection = ScanPlanner::new(&snapshot, &Predicate::AlwaysTrue, Some(&projection));
        assert!(matches!(bad_projection, Err(ScanError::SchemaMismatch(_))));
    }

    #[test]
    fn test_invalid_manifest_surfaces_from_plan() {
        let mut snapshot = taxi_snapshot();
        snapshot.files.push(Arc::new(
            DataFile::new("data/bad.parquet", FileFormat::Parquet, 1, 8)
                .with_partition(vec![Some(Literal::Int(7))]),
        ));
        let planner = ScanPlanner::new(&snapshot, &Predicate::AlwaysTrue, None).unwrap();
        assert!(matches!(
            planner.plan_all(),
            Err(ScanError::InvalidManifest { .. })
        ));
    }
}

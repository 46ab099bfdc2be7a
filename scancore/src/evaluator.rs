//! # Predicate Evaluator
//!
//! Decides, from metadata alone, whether a data file can contain rows that
//! match a bound predicate. Every leaf is evaluated to a three-valued outcome
//! over the whole file:
//!
//! - **True**: every row of the file matches
//! - **False**: no row of the file matches
//! - **Unknown**: the metadata cannot tell
//!
//! Two sources of evidence are consulted for each leaf: the file's partition
//! values for fields derived from the leaf's column, then the column's
//! min/max bounds and null/NaN counts. Leaves with a definite outcome are
//! folded away, and the remaining predicate is the residual that must still
//! be applied to rows.
//!
//! A leaf is only proven true when the bounds prove it and the file has no
//! nulls (and no NaN for float columns) in that column, because those rows
//! fail every comparison.

use std::cmp::Ordering;

use crate::error::ScanResult;
use crate::expr::{BoundPredicate, BoundReference, ComparisonOp, SetOp, UnaryOp};
use crate::literal::Literal;
use crate::manifest::DataFile;
use crate::partition::{PartitionSpec, Transform};
use crate::schema::Schema;
use crate::statistics::ColumnStats;

/// How a data file participates in a scan.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// No row can match; the file is not read.
    Skip,
    /// Every row matches; the file is read without a row filter.
    FullScan,
    /// Some rows may match; the residual is applied while reading.
    Residual(BoundPredicate),
}

impl Classification {
    /// The row filter to apply when reading, or `None` for skipped files.
    pub fn into_residual(self) -> Option<BoundPredicate> {
        match self {
            Classification::Skip => None,
            Classification::FullScan => Some(BoundPredicate::AlwaysTrue),
            Classification::Residual(residual) => Some(residual),
        }
    }
}

/// Three-valued outcome of a leaf over all rows of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    True,
    False,
    Unknown,
}

impl Outcome {
    fn from_bool(value: bool) -> Self {
        if value { Outcome::True } else { Outcome::False }
    }

    fn is_known(self) -> bool {
        self != Outcome::Unknown
    }
}

/// Classifies a data file against a bound predicate.
///
/// # Errors
///
/// Returns `InvalidManifest` if the file's partition tuple does not match
/// the partition spec.
pub fn classify(
    predicate: &BoundPredicate,
    schema: &Schema,
    spec: &PartitionSpec,
    file: &DataFile,
) -> ScanResult<Classification> {
    spec.validate_partition(schema, &file.partition, &file.file_path)?;

    let evaluator = FileEvaluator { spec, file };
    let classification = match evaluator.residual(predicate) {
        BoundPredicate::AlwaysFalse => Classification::Skip,
        BoundPredicate::AlwaysTrue => Classification::FullScan,
        residual => Classification::Residual(residual),
    };
    Ok(classification)
}

struct FileEvaluator<'a> {
    spec: &'a PartitionSpec,
    file: &'a DataFile,
}

impl FileEvaluator<'_> {
    fn residual(&self, predicate: &BoundPredicate) -> BoundPredicate {
        match predicate {
            BoundPredicate::AlwaysTrue => BoundPredicate::AlwaysTrue,
            BoundPredicate::AlwaysFalse => BoundPredicate::AlwaysFalse,
            BoundPredicate::And(left, right) => {
                BoundPredicate::and(self.residual(left), self.residual(right))
            }
            BoundPredicate::Or(left, right) => {
                BoundPredicate::or(self.residual(left), self.residual(right))
            }
            leaf => match self.leaf(leaf) {
                Outcome::True => BoundPredicate::AlwaysTrue,
                Outcome::False => BoundPredicate::AlwaysFalse,
                Outcome::Unknown => leaf.clone(),
            },
        }
    }

    fn leaf(&self, leaf: &BoundPredicate) -> Outcome {
        let term = match leaf {
            BoundPredicate::Comparison { term, .. }
            | BoundPredicate::Unary { term, .. }
            | BoundPredicate::Set { term, .. } => term,
            _ => return Outcome::Unknown,
        };

        for (idx, field) in self.spec.fields_for_source(term.field_id) {
            let value = self.file.partition.get(idx).and_then(|v| v.as_ref());
            let outcome = partition_outcome(field.transform, value, leaf);
            if outcome.is_known() {
                return outcome;
            }
        }

        match self.file.column_stats(term.field_id) {
            Some(stats) => StatsEvaluator::new(term, stats, self.file.record_count).leaf(leaf),
            None => Outcome::Unknown,
        }
    }
}

/// Evaluates a leaf against the partition value of a field derived from its column.
///
/// A null partition value means the source column is null on every row.
fn partition_outcome(
    transform: Transform,
    value: Option<&Literal>,
    leaf: &BoundPredicate,
) -> Outcome {
    let Some(value) = value else {
        return match leaf {
            BoundPredicate::Unary {
                op: UnaryOp::IsNull,
                ..
            } => Outcome::True,
            _ => Outcome::False,
        };
    };
    if value.is_nan() {
        return Outcome::Unknown;
    }

    match leaf {
        BoundPredicate::Unary { op, .. } => Outcome::from_bool(*op == UnaryOp::NotNull),
        BoundPredicate::Comparison { op, literal, .. } => {
            match transform.apply(literal) {
                Some(projected) if !projected.is_nan() => {
                    compare_projected(transform, *op, value, &projected)
                }
                _ => Outcome::Unknown,
            }
        }
        BoundPredicate::Set { op, literals, .. } => {
            let mut all_differ = true;
            for literal in literals {
                let Some(projected) = transform.apply(literal) else {
                    return Outcome::Unknown;
                };
                match value.partial_cmp(&projected) {
                    Some(Ordering::Equal) if transform == Transform::Identity => {
                        return Outcome::from_bool(*op == SetOp::In);
                    }
                    Some(Ordering::Equal) => all_differ = false,
                    Some(_) => {}
                    None => return Outcome::Unknown,
                }
            }
            if all_differ {
                Outcome::from_bool(*op == SetOp::NotIn)
            } else {
                Outcome::Unknown
            }
        }
        _ => Outcome::Unknown,
    }
}

/// Compares a partition value with the transformed literal.
///
/// Identity values are the column values themselves, so the comparison is
/// exact. For other transforms only a strict difference is conclusive.
fn compare_projected(
    transform: Transform,
    op: ComparisonOp,
    value: &Literal,
    projected: &Literal,
) -> Outcome {
    if transform == Transform::Identity {
        return match value.partial_cmp(projected) {
            Some(_) => Outcome::from_bool(op.test(value, projected)),
            None => Outcome::Unknown,
        };
    }

    let Some(ordering) = value.partial_cmp(projected) else {
        return Outcome::Unknown;
    };
    match (op, ordering) {
        (_, Ordering::Equal) => Outcome::Unknown,
        (ComparisonOp::Eq, _) => Outcome::False,
        (ComparisonOp::NotEq, _) => Outcome::True,
        (ComparisonOp::Lt | ComparisonOp::LtEq, Ordering::Less) => Outcome::True,
        (ComparisonOp::Lt | ComparisonOp::LtEq, Ordering::Greater) => Outcome::False,
        (ComparisonOp::Gt | ComparisonOp::GtEq, Ordering::Greater) => Outcome::True,
        (ComparisonOp::Gt | ComparisonOp::GtEq, Ordering::Less) => Outcome::False,
    }
}

/// Evaluates leaves against one column's statistics.
struct StatsEvaluator {
    min: Option<Literal>,
    max: Option<Literal>,
    all_null: bool,
    /// No nulls, and no NaN for float columns.
    no_nulls: bool,
    no_nans: bool,
    has_nulls: Option<bool>,
}

impl StatsEvaluator {
    fn new(term: &BoundReference, stats: &ColumnStats, record_count: i64) -> Self {
        // Bounds are re-typed to the column type; NaN bounds carry no ordering.
        let bound = |value: &Option<Literal>| {
            value
                .as_ref()
                .and_then(|v| v.to_type(&term.field_type))
                .filter(|v| !v.is_nan())
        };
        let no_nans = !term.field_type.is_floating_point() || stats.nan_count == Some(0);
        Self {
            min: bound(&stats.min_value),
            max: bound(&stats.max_value),
            all_null: record_count > 0 && stats.is_all_null(record_count),
            no_nulls: stats.null_count == Some(0) && no_nans,
            no_nans,
            has_nulls: stats.null_count.map(|n| n > 0),
        }
    }

    fn leaf(&self, leaf: &BoundPredicate) -> Outcome {
        match leaf {
            BoundPredicate::Unary { op, .. } => self.unary(*op),
            BoundPredicate::Comparison { op, literal, .. } => {
                if self.all_null {
                    Outcome::False
                } else if literal.is_nan() {
                    Outcome::Unknown
                } else {
                    self.comparison(*op, literal)
                }
            }
            BoundPredicate::Set { op, literals, .. } => {
                if self.all_null {
                    Outcome::False
                } else if literals.iter().any(Literal::is_nan) {
                    Outcome::Unknown
                } else {
                    self.set(*op, literals)
                }
            }
            _ => Outcome::Unknown,
        }
    }

    fn unary(&self, op: UnaryOp) -> Outcome {
        match (op, self.has_nulls) {
            (_, _) if self.all_null => Outcome::from_bool(op == UnaryOp::IsNull),
            (UnaryOp::IsNull, Some(false)) => Outcome::False,
            (UnaryOp::NotNull, Some(false)) => Outcome::True,
            _ => Outcome::Unknown,
        }
    }

    fn comparison(&self, op: ComparisonOp, literal: &Literal) -> Outcome {
        let lower = self.min.as_ref().and_then(|min| min.partial_cmp(literal));
        let upper = self.max.as_ref().and_then(|max| max.partial_cmp(literal));

        // Conclusions about every row need the null-free guarantee.
        let all_rows = |proven: bool| {
            if proven && self.no_nulls {
                Outcome::True
            } else {
                Outcome::Unknown
            }
        };

        match op {
            ComparisonOp::Lt => match (lower, upper) {
                (Some(Ordering::Greater | Ordering::Equal), _) => Outcome::False,
                (_, Some(Ordering::Less)) => all_rows(true),
                _ => Outcome::Unknown,
            },
            ComparisonOp::LtEq => match (lower, upper) {
                (Some(Ordering::Greater), _) => Outcome::False,
                (_, Some(Ordering::Less | Ordering::Equal)) => all_rows(true),
                _ => Outcome::Unknown,
            },
            ComparisonOp::Gt => match (lower, upper) {
                (_, Some(Ordering::Less | Ordering::Equal)) => Outcome::False,
                (Some(Ordering::Greater), _) => all_rows(true),
                _ => Outcome::Unknown,
            },
            ComparisonOp::GtEq => match (lower, upper) {
                (_, Some(Ordering::Less)) => Outcome::False,
                (Some(Ordering::Greater | Ordering::Equal), _) => all_rows(true),
                _ => Outcome::Unknown,
            },
            ComparisonOp::Eq => match (lower, upper) {
                (Some(Ordering::Greater), _) | (_, Some(Ordering::Less)) => Outcome::False,
                (Some(Ordering::Equal), Some(Ordering::Equal)) => all_rows(true),
                _ => Outcome::Unknown,
            },
            // NaN rows satisfy `!=`, so only nulls block the true outcome.
            ComparisonOp::NotEq => match (lower, upper) {
                (Some(Ordering::Greater), _) | (_, Some(Ordering::Less)) => {
                    if self.has_nulls == Some(false) {
                        Outcome::True
                    } else {
                        Outcome::Unknown
                    }
                }
                (Some(Ordering::Equal), Some(Ordering::Equal)) if self.no_nans => Outcome::False,
                _ => Outcome::Unknown,
            },
        }
    }

    fn set(&self, op: SetOp, literals: &[Literal]) -> Outcome {
        let outside = |literal: &Literal| {
            let below = self
                .min
                .as_ref()
                .and_then(|min| min.partial_cmp(literal))
                .is_some_and(Ordering::is_gt);
            let above = self
                .max
                .as_ref()
                .and_then(|max| max.partial_cmp(literal))
                .is_some_and(Ordering::is_lt);
            below || above
        };
        let single_value = match (&self.min, &self.max) {
            (Some(min), Some(max)) if min.partial_cmp(max) == Some(Ordering::Equal) => Some(min),
            _ => None,
        };
        let contains_single = single_value.is_some_and(|v| {
            literals
                .iter()
                .any(|l| v.partial_cmp(l) == Some(Ordering::Equal))
        });

        match op {
            SetOp::In if literals.iter().all(outside) => Outcome::False,
            SetOp::In if contains_single && self.no_nulls => Outcome::True,
            SetOp::NotIn if literals.iter().all(outside) => {
                if self.has_nulls == Some(false) {
                    Outcome::True
                } else {
                    Outcome::Unknown
                }
            }
            SetOp::NotIn if contains_single && self.no_nans => Outcome::False,
            _ => Outcome::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Predicate, col};
    use crate::manifest::FileFormat;
    use crate::schema::Type;

    fn taxi_schema() -> Schema {
        Schema::builder(0)
            .with_field(1, "VendorID", Type::Long, true)
            .with_field(
                2,
                "tpep_pickup_datetime",
                Type::Timestamp {
                    with_timezone: true,
                },
                false,
            )
            .with_field(3, "fare_amount", Type::Double, false)
            .with_field(4, "pickup_day", Type::Date, false)
            .build()
    }

    fn unpartitioned_file(stats: ColumnStats) -> DataFile {
        DataFile::new("a.parquet", FileFormat::Parquet, 100, 1024).with_column_stats(3, stats)
    }

    fn classify_unpartitioned(predicate: Predicate, file: &DataFile) -> Classification {
        let schema = taxi_schema();
        let bound = predicate.bind(&schema).unwrap();
        classify(&bound, &schema, &PartitionSpec::unpartitioned(), file).unwrap()
    }

    #[test]
    fn test_bounds_exclude_literal() {
        let file = unpartitioned_file(ColumnStats::with_bounds(0.0, 200.0).with_null_count(0));
        assert_eq!(
            classify_unpartitioned(col("fare_amount").gt(500.0), &file),
            Classification::Skip
        );
        assert_eq!(
            classify_unpartitioned(col("fare_amount").lt(0.0), &file),
            Classification::Skip
        );
        assert_eq!(
            classify_unpartitioned(col("fare_amount").eq(200.5), &file),
            Classification::Skip
        );
        assert_eq!(
            classify_unpartitioned(col("fare_amount").is_in([-1.0, 300.0]), &file),
            Classification::Skip
        );
    }

    #[test]
    fn test_bounds_prove_every_row() {
        let clean = unpartitioned_file(
            ColumnStats::with_bounds(1.0, 200.0)
                .with_null_count(0)
                .with_nan_count(0),
        );
        assert_eq!(
            classify_unpartitioned(col("fare_amount").gt(0.0), &clean),
            Classification::FullScan
        );

        // Nulls fail the comparison, so the file is not a full match.
        let with_nulls = unpartitioned_file(
            ColumnStats::with_bounds(1.0, 200.0)
                .with_null_count(3)
                .with_nan_count(0),
        );
        assert!(matches!(
            classify_unpartitioned(col("fare_amount").gt(0.0), &with_nulls),
            Classification::Residual(_)
        ));

        // NaN count unknown for a double column.
        let unknown_nans =
            unpartitioned_file(ColumnStats::with_bounds(1.0, 200.0).with_null_count(0));
        assert!(matches!(
            classify_unpartitioned(col("fare_amount").gt(0.0), &unknown_nans),
            Classification::Residual(_)
        ));
    }

    #[test]
    fn test_missing_statistics_never_skip() {
        let bare = DataFile::new("a.parquet", FileFormat::Parquet, 100, 1024);
        for predicate in [
            col("fare_amount").gt(500.0),
            col("fare_amount").eq(1.0),
            col("VendorID").is_null(),
            col("fare_amount").is_in([1.0]),
        ] {
            assert!(matches!(
                classify_unpartitioned(predicate, &bare),
                Classification::Residual(_)
            ));
        }

        let no_bounds = unpartitioned_file(ColumnStats::default().with_null_count(0));
        assert!(matches!(
            classify_unpartitioned(col("fare_amount").gt(500.0), &no_bounds),
            Classification::Residual(_)
        ));
    }

    #[test]
    fn test_nan_literal_is_unknown() {
        let file = unpartitioned_file(ColumnStats::with_bounds(0.0, 200.0).with_null_count(0));
        assert!(matches!(
            classify_unpartitioned(col("fare_amount").gt(f64::NAN), &file),
            Classification::Residual(_)
        ));
    }

    #[test]
    fn test_nan_bounds_are_ignored() {
        let file = unpartitioned_file(ColumnStats::with_bounds(f64::NAN, f64::NAN));
        assert!(matches!(
            classify_unpartitioned(col("fare_amount").gt(500.0), &file),
            Classification::Residual(_)
        ));
    }

    #[test]
    fn test_all_null_column() {
        let file = unpartitioned_file(ColumnStats::default().with_null_count(100));
        assert_eq!(
            classify_unpartitioned(col("fare_amount").gt(0.0), &file),
            Classification::Skip
        );
        assert_eq!(
            classify_unpartitioned(col("fare_amount").is_not_null(), &file),
            Classification::Skip
        );
        assert_eq!(
            classify_unpartitioned(col("fare_amount").is_null(), &file),
            Classification::FullScan
        );
    }

    #[test]
    fn test_and_or_combination() {
        let file = unpartitioned_file(ColumnStats::with_bounds(0.0, 200.0).with_null_count(0));

        let and = col("fare_amount").gt(500.0).and(col("VendorID").eq(1));
        assert_eq!(classify_unpartitioned(and, &file), Classification::Skip);

        let or = col("fare_amount").gt(500.0).or(col("VendorID").eq(1));
        match classify_unpartitioned(or, &file) {
            Classification::Residual(residual) => {
                assert_eq!(residual.to_string(), "VendorID = 1")
            }
            other => panic!("unexpected classification {other:?}"),
        }

        let both_false = col("fare_amount").gt(500.0).or(col("fare_amount").lt(-1.0));
        assert_eq!(classify_unpartitioned(both_false, &file), Classification::Skip);
    }

    #[test]
    fn test_negation_uses_negated_operator() {
        let file = unpartitioned_file(ColumnStats::with_bounds(0.0, 200.0).with_null_count(0));
        // not (fare <= 500) is fare > 500
        let predicate = col("fare_amount").lt_eq(500.0).not();
        assert_eq!(classify_unpartitioned(predicate, &file), Classification::Skip);
    }

    #[test]
    fn test_day_partition_projection() {
        let schema = taxi_schema();
        let spec = PartitionSpec::builder(&schema)
            .add_day("tpep_pickup_datetime")
            .unwrap()
            .build();
        let january = DataFile::new("jan.parquet", FileFormat::Parquet, 100, 1024)
            .with_partition(vec![Literal::date_from_ymd(2022, 1, 1)]);
        let february = DataFile::new("feb.parquet", FileFormat::Parquet, 50, 512)
            .with_partition(vec![Literal::date_from_ymd(2022, 2, 1)]);

        let predicate = col("tpep_pickup_datetime")
            .gt_eq("2022-02-01T00:00:00Z")
            .bind(&schema)
            .unwrap();

        assert_eq!(
            classify(&predicate, &schema, &spec, &january).unwrap(),
            Classification::Skip
        );
        // Same day as the literal: rows before midnight cannot be excluded.
        assert!(matches!(
            classify(&predicate, &schema, &spec, &february).unwrap(),
            Classification::Residual(_)
        ));

        let later = col("tpep_pickup_datetime")
            .gt_eq("2022-01-15T12:00:00Z")
            .bind(&schema)
            .unwrap();
        assert_eq!(
            classify(&later, &schema, &spec, &february).unwrap(),
            Classification::FullScan
        );
    }

    #[test]
    fn test_truncate_partition_projection() {
        let schema = taxi_schema();
        let spec = PartitionSpec::builder(&schema)
            .add_truncate("VendorID", 10)
            .unwrap()
            .build();
        // Rows with VendorID in [10, 19].
        let file = DataFile::new("v10.parquet", FileFormat::Parquet, 20, 256)
            .with_partition(vec![Some(Literal::Long(10))]);
        let classify_vendor = |predicate: Predicate| {
            let bound = predicate.bind(&schema).unwrap();
            classify(&bound, &schema, &spec, &file).unwrap()
        };

        assert_eq!(classify_vendor(col("VendorID").lt(5)), Classification::Skip);
        assert_eq!(classify_vendor(col("VendorID").gt(25)), Classification::Skip);
        assert_eq!(classify_vendor(col("VendorID").gt_eq(5)), Classification::FullScan);
        assert_eq!(classify_vendor(col("VendorID").lt(25)), Classification::FullScan);
        // Same truncated bucket as the literal.
        assert!(matches!(
            classify_vendor(col("VendorID").eq(15)),
            Classification::Residual(_)
        ));
        // The literal has no truncated value.
        assert!(matches!(
            classify_vendor(col("VendorID").gt(i64::MIN)),
            Classification::Residual(_)
        ));
    }

    #[test]
    fn test_month_partition_projection() {
        let schema = taxi_schema();
        let spec = PartitionSpec::builder(&schema)
            .add_month("tpep_pickup_datetime")
            .unwrap()
            .build();
        // 2022-01 is 624 months after the epoch.
        let january = DataFile::new("jan.parquet", FileFormat::Parquet, 100, 1024)
            .with_partition(vec![Some(Literal::Int(624))]);
        let classify_pickup = |predicate: Predicate| {
            let bound = predicate.bind(&schema).unwrap();
            classify(&bound, &schema, &spec, &january).unwrap()
        };

        assert_eq!(
            classify_pickup(col("tpep_pickup_datetime").gt_eq("2022-02-01T00:00:00Z")),
            Classification::Skip
        );
        assert_eq!(
            classify_pickup(col("tpep_pickup_datetime").lt("2022-03-01T00:00:00Z")),
            Classification::FullScan
        );
        assert!(matches!(
            classify_pickup(col("tpep_pickup_datetime").gt_eq("2022-01-15T00:00:00Z")),
            Classification::Residual(_)
        ));
    }

    #[test]
    fn test_hour_partition_projection() {
        let schema = taxi_schema();
        let spec = PartitionSpec::builder(&schema)
            .add_hour("tpep_pickup_datetime")
            .unwrap()
            .build();
        // 2022-01-01T06 is 18993 days and 6 hours after the epoch.
        let six_am = DataFile::new("h06.parquet", FileFormat::Parquet, 10, 128)
            .with_partition(vec![Some(Literal::Int(18_993 * 24 + 6))]);
        let classify_pickup = |predicate: Predicate| {
            let bound = predicate.bind(&schema).unwrap();
            classify(&bound, &schema, &spec, &six_am).unwrap()
        };

        assert_eq!(
            classify_pickup(col("tpep_pickup_datetime").eq("2022-01-01T07:00:00Z")),
            Classification::Skip
        );
        assert_eq!(
            classify_pickup(
                col("tpep_pickup_datetime").is_in(["2022-01-01T08:00:00Z", "2022-01-01T09:15:00Z"])
            ),
            Classification::Skip
        );
        assert_eq!(
            classify_pickup(col("tpep_pickup_datetime").not_eq("2022-01-01T05:59:59Z")),
            Classification::FullScan
        );
        assert!(matches!(
            classify_pickup(col("tpep_pickup_datetime").eq("2022-01-01T06:30:00Z")),
            Classification::Residual(_)
        ));
    }

    #[test]
    fn test_or_of_partition_and_statistics_leaves() {
        let schema = taxi_schema();
        let spec = PartitionSpec::builder(&schema)
            .add_day("tpep_pickup_datetime")
            .unwrap()
            .build();
        let file = DataFile::new("jan.parquet", FileFormat::Parquet, 100, 1024)
            .with_partition(vec![Literal::date_from_ymd(2022, 1, 1)])
            .with_column_stats(3, ColumnStats::with_bounds(0.0, 200.0).with_null_count(0));
        let classify_file = |predicate: Predicate| {
            let bound = predicate.bind(&schema).unwrap();
            classify(&bound, &schema, &spec, &file).unwrap()
        };
        let february = || col("tpep_pickup_datetime").gt_eq("2022-02-01T00:00:00Z");

        // Partition leaf is false, statistics leaf is unknown.
        match classify_file(february().or(col("fare_amount").gt(100.0))) {
            Classification::Residual(residual) => {
                assert_eq!(residual.to_string(), "fare_amount > 100")
            }
            other => panic!("unexpected classification {other:?}"),
        }

        // Both leaves false.
        assert_eq!(
            classify_file(february().or(col("fare_amount").gt(500.0))),
            Classification::Skip
        );

        // Partition leaf is true, which settles the disjunction.
        let january = col("tpep_pickup_datetime").lt("2022-02-01T00:00:00Z");
        assert_eq!(
            classify_file(january.or(col("fare_amount").gt(100.0))),
            Classification::FullScan
        );
    }

    #[test]
    fn test_identity_partition_is_exact() {
        let schema = taxi_schema();
        let spec = PartitionSpec::builder(&schema)
            .add_identity("pickup_day")
            .unwrap()
            .build();
        let file = DataFile::new("feb.parquet", FileFormat::Parquet, 50, 512)
            .with_partition(vec![Literal::date_from_ymd(2022, 2, 1)]);

        let matching = col("pickup_day").gt_eq("2022-02-01").bind(&schema).unwrap();
        assert_eq!(
            classify(&matching, &schema, &spec, &file).unwrap(),
            Classification::FullScan
        );

        let excluded = col("pickup_day")
            .is_in(["2022-01-01", "2022-01-02"])
            .bind(&schema)
            .unwrap();
        assert_eq!(
            classify(&excluded, &schema, &spec, &file).unwrap(),
            Classification::Skip
        );
    }

    #[test]
    fn test_null_partition_value() {
        let schema = taxi_schema();
        let spec = PartitionSpec::builder(&schema)
            .add_identity("VendorID")
            .unwrap()
            .build();
        let file = DataFile::new("null.parquet", FileFormat::Parquet, 10, 128)
            .with_partition(vec![None]);

        let eq = col("VendorID").eq(1).bind(&schema).unwrap();
        assert_eq!(classify(&eq, &schema, &spec, &file).unwrap(), Classification::Skip);

        let is_null = col("VendorID").is_null().bind(&schema).unwrap();
        assert_eq!(
            classify(&is_null, &schema, &spec, &file).unwrap(),
            Classification::FullScan
        );
    }

    #[test]
    fn test_invalid_partition_tuple() {
        let schema = taxi_schema();
        let spec = PartitionSpec::builder(&schema)
            .add_day("tpep_pickup_datetime")
            .unwrap()
            .build();
        let file = DataFile::new("bad.parquet", FileFormat::Parquet, 10, 128)
            .with_partition(vec![Some(Literal::string("2022-01-01"))]);
        let predicate = col("VendorID").eq(1).bind(&schema).unwrap();

        let result = classify(&predicate, &schema, &spec, &file);
        assert!(matches!(
            result,
            Err(crate::error::ScanError::InvalidManifest { .. })
        ));
    }
}

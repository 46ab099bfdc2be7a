//! # Partitioning
//!
//! Tables use hidden partitioning: a partition field is derived from a source
//! column through a transform, and readers filter on the source column
//! (`WHERE tpep_pickup_datetime >= ...`) rather than on the partition value.
//! Because every supported transform is order-preserving, the evaluator can
//! project a filter on the source column onto the partition values.
//!
//! ## Transforms
//!
//! - **Identity**: value is used as-is (e.g., `VendorID`)
//! - **Truncate(W)**: strings/binary cut to W characters/bytes, integers
//!   rounded down to a multiple of W
//! - **Year/Month/Hour**: years, months or hours since 1970 (int)
//! - **Day**: the calendar date (date)

use chrono::{DateTime, Datelike};
use serde::{Deserialize, Serialize};

use crate::error::{ScanError, ScanResult};
use crate::literal::{Literal, MICROS_PER_DAY, MICROS_PER_HOUR, date_from_epoch_days};
use crate::schema::{Schema, Type};

/// A partition spec defines how a table is partitioned.
///
/// Use `PartitionSpec::builder()` to create new specs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionSpec {
    pub spec_id: i32,

    /// The fields that make up the partition tuple, in tuple order.
    pub fields: Vec<PartitionField>,
}

/// A field in a partition spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionField {
    /// The source column ID from the table schema.
    pub source_id: i32,

    /// A unique ID for this partition field within the spec.
    pub field_id: i32,

    pub name: String,

    pub transform: Transform,
}

/// Supported partition transforms. All of them preserve ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    Identity,
    Truncate(u32),
    Year,
    Month,
    Day,
    Hour,
}

impl PartitionSpec {
    pub fn builder(schema: &Schema) -> PartitionSpecBuilder<'_> {
        PartitionSpecBuilder::new(schema)
    }

    /// The spec of a table without partition fields.
    pub fn unpartitioned() -> Self {
        Self {
            spec_id: 0,
            fields: Vec::new(),
        }
    }

    pub fn is_unpartitioned(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the partition fields derived from the given source column.
    pub fn fields_for_source(
        &self,
        source_id: i32,
    ) -> impl Iterator<Item = (usize, &PartitionField)> {
        self.fields
            .iter()
            .enumerate()
            .filter(move |(_, f)| f.source_id == source_id)
    }

    /// Computes the partition tuple for one row, given the source values by field ID.
    pub fn partition_tuple<'a>(
        &self,
        mut source_value: impl FnMut(i32) -> Option<&'a Literal>,
    ) -> Vec<Option<Literal>> {
        self.fields
            .iter()
            .map(|f| source_value(f.source_id).and_then(|v| f.transform.apply(v)))
            .collect()
    }

    /// Checks that a data file's partition tuple matches this spec.
    ///
    /// # Errors
    ///
    /// Returns `InvalidManifest` if the arity differs or a value does not have
    /// the transform's result type.
    pub fn validate_partition(
        &self,
        schema: &Schema,
        partition: &[Option<Literal>],
        file_path: &str,
    ) -> ScanResult<()> {
        let invalid = |message: String| ScanError::InvalidManifest {
            path: file_path.to_string(),
            message,
        };

        if partition.len() != self.fields.len() {
            return Err(invalid(format!(
                "partition tuple has {} values but spec {} has {} fields",
                partition.len(),
                self.spec_id,
                self.fields.len()
            )));
        }

        for (field, value) in self.fields.iter().zip(partition) {
            let source = schema.find_field(field.source_id).ok_or_else(|| {
                invalid(format!(
                    "partition field {} refers to unknown column {}",
                    field.name, field.source_id
                ))
            })?;
            let expected = field.transform.result_type(&source.field_type);
            if let Some(value) = value
                && !value.matches_type(&expected)
            {
                return Err(invalid(format!(
                    "partition field {} expects {} but found {} {}",
                    field.name,
                    expected,
                    value.type_name(),
                    value
                )));
            }
        }
        Ok(())
    }

    /// Renders a partition tuple as a `name=value/...` path fragment.
    pub fn partition_path(&self, partition: &[Option<Literal>]) -> String {
        self.fields
            .iter()
            .zip(partition)
            .map(|(field, value)| {
                let rendered = value
                    .as_ref()
                    .map(|v| field.transform.to_human_string(v))
                    .unwrap_or_else(|| "null".to_string());
                format!("{}={}", field.name, rendered)
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

pub struct PartitionSpecBuilder<'a> {
    schema: &'a Schema,
    spec_id: i32,
    fields: Vec<PartitionField>,
    next_field_id: i32,
}

impl<'a> PartitionSpecBuilder<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            spec_id: 0,
            fields: Vec::new(),
            next_field_id: 1000,
        }
    }

    pub fn with_spec_id(mut self, spec_id: i32) -> Self {
        self.spec_id = spec_id;
        self
    }

    pub fn add_identity(self, source_name: &str) -> ScanResult<Self> {
        self.add_field(source_name, Transform::Identity, None)
    }

    pub fn add_truncate(self, source_name: &str, width: u32) -> ScanResult<Self> {
        let name = format!("{}_trunc_{}", source_name, width);
        self.add_field(source_name, Transform::Truncate(width), Some(&name))
    }

    pub fn add_year(self, source_name: &str) -> ScanResult<Self> {
        let name = format!("{}_year", source_name);
        self.add_field(source_name, Transform::Year, Some(&name))
    }

    pub fn add_month(self, source_name: &str) -> ScanResult<Self> {
        let name = format!("{}_month", source_name);
        self.add_field(source_name, Transform::Month, Some(&name))
    }

    pub fn add_day(self, source_name: &str) -> ScanResult<Self> {
        let name = format!("{}_day", source_name);
        self.add_field(source_name, Transform::Day, Some(&name))
    }

    pub fn add_hour(self, source_name: &str) -> ScanResult<Self> {
        let name = format!("{}_hour", source_name);
        self.add_field(source_name, Transform::Hour, Some(&name))
    }

    /// Adds a field with an explicit transform, as parsed from `transform(column)` syntax.
    pub fn add_transform(self, source_name: &str, transform: Transform) -> ScanResult<Self> {
        match transform {
            Transform::Identity => self.add_identity(source_name),
            Transform::Truncate(width) => self.add_truncate(source_name, width),
            Transform::Year => self.add_year(source_name),
            Transform::Month => self.add_month(source_name),
            Transform::Day => self.add_day(source_name),
            Transform::Hour => self.add_hour(source_name),
        }
    }

    fn add_field(
        mut self,
        source_name: &str,
        transform: Transform,
        rename: Option<&str>,
    ) -> ScanResult<Self> {
        let source_field = self.schema.find_field_by_name(source_name).ok_or_else(|| {
            ScanError::SchemaMismatch(format!("partition source column {} not found", source_name))
        })?;

        if !transform.can_apply_to(&source_field.field_type) {
            return Err(ScanError::SchemaMismatch(format!(
                "cannot apply {} to column {} of type {}",
                transform, source_name, source_field.field_type
            )));
        }

        let name = rename.unwrap_or(&source_field.name).to_string();
        let field_id = self.next_field_id;
        self.next_field_id += 1;

        self.fields.push(PartitionField {
            source_id: source_field.id,
            field_id,
            name,
            transform,
        });

        Ok(self)
    }

    pub fn build(self) -> PartitionSpec {
        PartitionSpec {
            spec_id: self.spec_id,
            fields: self.fields,
        }
    }
}

impl Transform {
    /// Returns true if this transform can be applied to the given type.
    pub fn can_apply_to(&self, source_type: &Type) -> bool {
        match self {
            Transform::Identity => true,
            Transform::Truncate(width) => {
                *width > 0
                    && matches!(
                        source_type,
                        Type::String | Type::Binary | Type::Int | Type::Long
                    )
            }
            Transform::Year | Transform::Month | Transform::Day => {
                matches!(source_type, Type::Date | Type::Timestamp { .. })
            }
            Transform::Hour => matches!(source_type, Type::Timestamp { .. }),
        }
    }

    /// Returns the result type of the transform.
    pub fn result_type(&self, source_type: &Type) -> Type {
        match self {
            Transform::Identity | Transform::Truncate(_) => source_type.clone(),
            Transform::Day => Type::Date,
            Transform::Year | Transform::Month | Transform::Hour => Type::Int,
        }
    }

    /// Applies the transform to a source value.
    ///
    /// Returns `None` if the value's type is not supported by this transform,
    /// the truncate width is zero, or the truncated value does not fit the type.
    pub fn apply(&self, value: &Literal) -> Option<Literal> {
        if *self == Transform::Truncate(0) {
            return None;
        }
        match (self, value) {
            (Transform::Identity, v) => Some(v.clone()),
            (Transform::Truncate(w), Literal::String(s)) => {
                Some(Literal::String(s.chars().take(*w as usize).collect()))
            }
            (Transform::Truncate(w), Literal::Binary(b)) => {
                Some(Literal::Binary(b.iter().take(*w as usize).copied().collect()))
            }
            (Transform::Truncate(w), Literal::Int(v)) => {
                let w = i32::try_from(*w).ok()?;
                v.checked_sub(v.rem_euclid(w)).map(Literal::Int)
            }
            (Transform::Truncate(w), Literal::Long(v)) => {
                let w = i64::from(*w);
                v.checked_sub(v.rem_euclid(w)).map(Literal::Long)
            }
            (Transform::Year, Literal::Date(d)) => {
                date_from_epoch_days(*d).map(|date| Literal::Int(date.year() - 1970))
            }
            (Transform::Year, Literal::Timestamp(t)) => {
                DateTime::from_timestamp_micros(*t).map(|ts| Literal::Int(ts.year() - 1970))
            }
            (Transform::Month, Literal::Date(d)) => date_from_epoch_days(*d)
                .map(|date| Literal::Int(months_since_epoch(date.year(), date.month0()))),
            (Transform::Month, Literal::Timestamp(t)) => DateTime::from_timestamp_micros(*t)
                .map(|ts| Literal::Int(months_since_epoch(ts.year(), ts.month0()))),
            (Transform::Day, Literal::Date(d)) => Some(Literal::Date(*d)),
            (Transform::Day, Literal::Timestamp(t)) => {
                i32::try_from(t.div_euclid(MICROS_PER_DAY)).ok().map(Literal::Date)
            }
            (Transform::Hour, Literal::Timestamp(t)) => {
                i32::try_from(t.div_euclid(MICROS_PER_HOUR)).ok().map(Literal::Int)
            }
            _ => None,
        }
    }

    /// Renders a transformed value for partition paths (`2022-01`, `2022-01-01-06`).
    pub fn to_human_string(&self, value: &Literal) -> String {
        match (self, value) {
            (Transform::Year, Literal::Int(years)) => (1970 + years).to_string(),
            (Transform::Month, Literal::Int(months)) => {
                let year = 1970 + months.div_euclid(12);
                format!("{:04}-{:02}", year, months.rem_euclid(12) + 1)
            }
            (Transform::Hour, Literal::Int(hours)) => {
                DateTime::from_timestamp_micros(*hours as i64 * MICROS_PER_HOUR)
                    .map(|ts| ts.format("%Y-%m-%d-%H").to_string())
                    .unwrap_or_else(|| hours.to_string())
            }
            (_, v) => v.to_plain_string(),
        }
    }
}

impl std::fmt::Display for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transform::Identity => write!(f, "identity"),
            Transform::Truncate(w) => write!(f, "truncate[{}]", w),
            Transform::Year => write!(f, "year"),
            Transform::Month => write!(f, "month"),
            Transform::Day => write!(f, "day"),
            Transform::Hour => write!(f, "hour"),
        }
    }
}

impl std::str::FromStr for Transform {
    type Err = ScanError;

    /// Parses `identity`, `year`, `month`, `day`, `hour` or `truncate[W]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let transform = match s.as_str() {
            "identity" => Transform::Identity,
            "year" => Transform::Year,
            "month" => Transform::Month,
            "day" => Transform::Day,
            "hour" => Transform::Hour,
            other => other
                .strip_prefix("truncate[")
                .and_then(|rest| rest.strip_suffix(']'))
                .and_then(|width| width.parse::<u32>().ok())
                .filter(|width| *width > 0)
                .map(Transform::Truncate)
                .ok_or_else(|| {
                    ScanError::SchemaMismatch(format!("unknown partition transform {}", other))
                })?,
        };
        Ok(transform)
    }
}

fn months_since_epoch(year: i32, month0: u32) -> i32 {
    (year - 1970) * 12 + month0 as i32
}

//! # Table Schema
//!
//! Columns carry immutable integer IDs. Data file statistics and partition
//! fields refer to columns by ID, while predicates and projections refer to
//! them by name and are resolved against the schema before planning.

use std::sync::Arc;

use arrow::datatypes::{DataType, TimeUnit};
use serde::{Deserialize, Serialize};

use crate::error::{ScanError, ScanResult};

/// The structure of records in a table.
///
/// # Example
///
/// ```rust
/// use scancore::schema::{Schema, Type};
///
/// let schema = Schema::builder(0)
///     .with_field(1, "VendorID", Type::Long, false)
///     .with_field(2, "tpep_pickup_datetime", Type::Timestamp { with_timezone: true }, false)
///     .with_field(3, "fare_amount", Type::Double, false)
///     .build();
/// assert_eq!(schema.column_names(), vec!["VendorID", "tpep_pickup_datetime", "fare_amount"]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Schema {
    /// Referenced by snapshots and metadata as `current-schema-id`.
    pub schema_id: i32,

    /// Top-level fields in declaration order.
    #[serde(default)]
    pub fields: Vec<Field>,
}

/// A column in a schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Field {
    /// Never reused, even after the column is dropped.
    pub id: i32,

    pub name: String,

    /// Required columns map to non-nullable Arrow fields.
    pub required: bool,

    #[serde(rename = "type")]
    pub field_type: Type,
}

impl Field {
    pub fn to_arrow_field(&self) -> arrow::datatypes::Field {
        let nullable = !self.required;
        arrow::datatypes::Field::new(&self.name, self.field_type.to_arrow_datatype(), nullable)
    }
}

/// Primitive column types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Type {
    Boolean,

    Int,

    Long,

    Float,

    Double,

    /// Days since the Unix epoch.
    Date,

    /// Microseconds since the Unix epoch.
    #[serde(rename_all = "kebab-case")]
    Timestamp {
        /// Whether values are instants in UTC rather than local wall-clock time.
        with_timezone: bool,
    },

    /// An arbitrary-length UTF-8 string.
    String,

    Binary,
}

impl Type {
    pub fn to_arrow_datatype(&self) -> DataType {
        match self {
            Type::Boolean => DataType::Boolean,
            Type::Int => DataType::Int32,
            Type::Long => DataType::Int64,
            Type::Float => DataType::Float32,
            Type::Double => DataType::Float64,
            Type::Date => DataType::Date32,
            Type::Timestamp { with_timezone } => DataType::Timestamp(
                TimeUnit::Microsecond,
                with_timezone.then(|| "UTC".into()),
            ),
            Type::String => DataType::Utf8,
            Type::Binary => DataType::Binary,
        }
    }

    /// Maps an Arrow data type onto a table type.
    ///
    /// Narrow integers widen to `Int`, every timestamp unit maps to the
    /// microsecond `Timestamp`, and all string/binary layouts collapse to
    /// `String`/`Binary`. Returns `None` for nested and other unsupported types.
    pub fn from_arrow_datatype(data_type: &DataType) -> Option<Type> {
        match data_type {
            DataType::Boolean => Some(Type::Boolean),
            DataType::Int8 | DataType::Int16 | DataType::Int32 => Some(Type::Int),
            DataType::UInt8 | DataType::UInt16 => Some(Type::Int),
            DataType::Int64 | DataType::UInt32 => Some(Type::Long),
            DataType::Float16 | DataType::Float32 => Some(Type::Float),
            DataType::Float64 => Some(Type::Double),
            DataType::Date32 | DataType::Date64 => Some(Type::Date),
            DataType::Timestamp(_, tz) => Some(Type::Timestamp {
                with_timezone: tz.is_some(),
            }),
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => Some(Type::String),
            DataType::Binary | DataType::LargeBinary | DataType::BinaryView => Some(Type::Binary),
            _ => None,
        }
    }

    /// Returns true for floating point types, whose values may be NaN.
    pub fn is_floating_point(&self) -> bool {
        matches!(self, Type::Float | Type::Double)
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Boolean => write!(f, "boolean"),
            Type::Int => write!(f, "int"),
            Type::Long => write!(f, "long"),
            Type::Float => write!(f, "float"),
            Type::Double => write!(f, "double"),
            Type::Date => write!(f, "date"),
            Type::Timestamp {
                with_timezone: true,
            } => write!(f, "timestamptz"),
            Type::Timestamp {
                with_timezone: false,
            } => write!(f, "timestamp"),
            Type::String => write!(f, "string"),
            Type::Binary => write!(f, "binary"),
        }
    }
}

pub struct SchemaBuilder {
    schema_id: i32,
    fields: Vec<Field>,
}

impl SchemaBuilder {
    pub fn new(schema_id: i32) -> Self {
        Self {
            schema_id,
            fields: Vec::new(),
        }
    }

    /// Adds a field to the schema.
    pub fn with_field(
        mut self,
        id: i32,
        name: impl Into<String>,
        field_type: Type,
        required: bool,
    ) -> Self {
        self.fields.push(Field {
            id,
            name: name.into(),
            required,
            field_type,
        });
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            schema_id: self.schema_id,
            fields: self.fields,
        }
    }
}

impl Schema {
    pub fn builder(schema_id: i32) -> SchemaBuilder {
        SchemaBuilder::new(schema_id)
    }

    /// Derives a schema from an Arrow schema, assigning field IDs from 1.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` if a column has a type with no table equivalent.
    pub fn from_arrow(schema: &arrow::datatypes::Schema, schema_id: i32) -> ScanResult<Self> {
        let mut builder = Schema::builder(schema_id);
        for (idx, field) in schema.fields().iter().enumerate() {
            let field_type = Type::from_arrow_datatype(field.data_type()).ok_or_else(|| {
                ScanError::SchemaMismatch(format!(
                    "column {} has unsupported type {}",
                    field.name(),
                    field.data_type()
                ))
            })?;
            builder = builder.with_field(
                idx as i32 + 1,
                field.name().as_str(),
                field_type,
                !field.is_nullable(),
            );
        }
        Ok(builder.build())
    }

    pub fn to_arrow_schema(&self) -> arrow::datatypes::Schema {
        arrow::datatypes::Schema::new(
            self.fields
                .iter()
                .map(Field::to_arrow_field)
                .collect::<Vec<_>>(),
        )
    }

    pub fn to_arrow_schema_ref(&self) -> arrow::datatypes::SchemaRef {
        Arc::new(self.to_arrow_schema())
    }

    pub fn find_field(&self, field_id: i32) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == field_id)
    }

    /// Exact, case-sensitive lookup.
    pub fn find_field_by_name(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Zero for a schema with no fields.
    pub fn highest_field_id(&self) -> i32 {
        self.fields.iter().map(|f| f.id).max().unwrap_or(0)
    }

    /// Resolves a list of column names into fields, preserving the requested order.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` for unknown or repeated columns.
    pub fn select(&self, columns: &[String]) -> ScanResult<Vec<&Field>> {
        let mut selected: Vec<&Field> = Vec::with_capacity(columns.len());
        for name in columns {
            let field = self.find_field_by_name(name).ok_or_else(|| {
                ScanError::SchemaMismatch(format!(
                    "projected column {} does not exist in schema {}",
                    name, self.schema_id
                ))
            })?;
            if selected.iter().any(|f| f.id == field.id) {
                return Err(ScanError::SchemaMismatch(format!(
                    "column {} is projected more than once",
                    name
                )));
            }
            selected.push(field);
        }
        Ok(selected)
    }

    /// Returns the Arrow schema of a projection, in the requested column order.
    pub fn project_arrow(&self, columns: &[String]) -> ScanResult<arrow::datatypes::SchemaRef> {
        let fields: Vec<arrow::datatypes::Field> = self
            .select(columns)?
            .into_iter()
            .map(|f| f.to_arrow_field())
            .collect();
        Ok(Arc::new(arrow::datatypes::Schema::new(fields)))
    }
}

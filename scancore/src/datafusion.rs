//! # DataFusion Integration
//!
//! Two bridges to DataFusion:
//!
//! - [`parse_filter`] turns a SQL boolean expression such as
//!   `fare_amount > 0 AND store_and_fwd_flag = 'N'` into a [`Predicate`],
//!   so filters can be given as text on the command line.
//! - [`QuerySession`] registers scanned [`Dataset`]s as in-memory tables and
//!   runs ad-hoc SQL over them.
//!
//! Identifiers are case sensitive in both, matching column names as stored.

use std::sync::Arc;

use arrow::array::RecordBatch;
use datafusion::common::{DFSchema, ScalarValue};
use datafusion::datasource::MemTable;
use datafusion::logical_expr::expr::{Between, BinaryExpr, Cast, InList, TryCast};
use datafusion::logical_expr::{Expr, Operator};
use datafusion::prelude::{SessionConfig, SessionContext};

use crate::assemble::{Dataset, assemble};
use crate::error::{ScanError, ScanResult};
use crate::expr::{ComparisonOp, Predicate, SetOp, UnaryOp};
use crate::literal::Literal;
use crate::schema::Schema;

fn session_context() -> SessionContext {
    let mut config = SessionConfig::new();
    config.options_mut().sql_parser.enable_ident_normalization = false;
    SessionContext::new_with_config(config)
}

/// Parses a SQL boolean expression over the columns of `schema`.
///
/// Supports comparisons between a column and a literal, `IS [NOT] NULL`,
/// `[NOT] IN (...)`, `[NOT] BETWEEN`, `AND`, `OR`, `NOT` and the constants
/// `TRUE` and `FALSE`.
///
/// # Errors
///
/// Returns `InvalidPredicate` if the text does not parse, names an unknown
/// column or uses an unsupported construct.
pub fn parse_filter(sql: &str, schema: &Schema) -> ScanResult<Predicate> {
    let invalid = |e: &dyn std::fmt::Display| {
        ScanError::InvalidPredicate(format!("cannot parse filter {:?}: {}", sql, e))
    };
    let df_schema = DFSchema::try_from(schema.to_arrow_schema()).map_err(|e| invalid(&e))?;
    let expr = session_context()
        .parse_sql_expr(sql, &df_schema)
        .map_err(|e| invalid(&e))?;
    to_predicate(&expr)
}

fn to_predicate(expr: &Expr) -> ScanResult<Predicate> {
    match expr {
        Expr::Literal(ScalarValue::Boolean(Some(true)), _) => Ok(Predicate::AlwaysTrue),
        Expr::Literal(ScalarValue::Boolean(Some(false)), _) => Ok(Predicate::AlwaysFalse),
        Expr::BinaryExpr(BinaryExpr { left, op, right }) => match op {
            Operator::And => Ok(to_predicate(left)?.and(to_predicate(right)?)),
            Operator::Or => Ok(to_predicate(left)?.or(to_predicate(right)?)),
            _ => comparison(left, *op, right),
        },
        Expr::Not(inner) => Ok(to_predicate(inner)?.not()),
        Expr::IsNull(inner) => Ok(Predicate::Unary {
            column: column_name(inner)?,
            op: UnaryOp::IsNull,
        }),
        Expr::IsNotNull(inner) => Ok(Predicate::Unary {
            column: column_name(inner)?,
            op: UnaryOp::NotNull,
        }),
        Expr::InList(InList {
            expr,
            list,
            negated,
        }) => {
            let column = column_name(expr)?;
            let literals = list.iter().map(literal).collect::<ScanResult<Vec<_>>>()?;
            let op = if *negated {
                SetOp::NotIn
            } else {
                SetOp::In
            };
            Ok(Predicate::Set {
                column,
                op,
                literals,
            })
        }
        Expr::Between(Between {
            expr,
            negated,
            low,
            high,
        }) => {
            let column = column_name(expr)?;
            let range = Predicate::Comparison {
                column: column.clone(),
                op: ComparisonOp::GtEq,
                literal: literal(low)?,
            }
            .and(Predicate::Comparison {
                column,
                op: ComparisonOp::LtEq,
                literal: literal(high)?,
            });
            Ok(if *negated { range.not() } else { range })
        }
        other => Err(unsupported(other)),
    }
}

fn comparison(left: &Expr, op: Operator, right: &Expr) -> ScanResult<Predicate> {
    let op = match op {
        Operator::Eq => ComparisonOp::Eq,
        Operator::NotEq => ComparisonOp::NotEq,
        Operator::Lt => ComparisonOp::Lt,
        Operator::LtEq => ComparisonOp::LtEq,
        Operator::Gt => ComparisonOp::Gt,
        Operator::GtEq => ComparisonOp::GtEq,
        other => {
            return Err(ScanError::InvalidPredicate(format!(
                "unsupported operator {}",
                other
            )));
        }
    };

    // `500 < fare_amount` is rewritten as `fare_amount > 500`.
    let (column, op, value) = match (column_name(left), column_name(right)) {
        (Ok(column), Err(_)) => (column, op, literal(right)?),
        (Err(_), Ok(column)) => (column, flip(op), literal(left)?),
        _ => {
            return Err(ScanError::InvalidPredicate(format!(
                "comparison {} {} {} must relate one column to one literal",
                left,
                op.symbol(),
                right
            )));
        }
    };
    Ok(Predicate::Comparison {
        column,
        op,
        literal: value,
    })
}

fn flip(op: ComparisonOp) -> ComparisonOp {
    match op {
        ComparisonOp::Lt => ComparisonOp::Gt,
        ComparisonOp::LtEq => ComparisonOp::GtEq,
        ComparisonOp::Gt => ComparisonOp::Lt,
        ComparisonOp::GtEq => ComparisonOp::LtEq,
        symmetric => symmetric,
    }
}

fn column_name(expr: &Expr) -> ScanResult<String> {
    match expr {
        Expr::Column(column) => Ok(column.name.clone()),
        other => Err(ScanError::InvalidPredicate(format!(
            "expected a column, found {}",
            other
        ))),
    }
}

fn literal(expr: &Expr) -> ScanResult<Literal> {
    match expr {
        Expr::Literal(value, _) => scalar_to_literal(value),
        // TIMESTAMP '...' and DATE '...' arrive as casts of a string.
        Expr::Cast(Cast { expr, .. }) | Expr::TryCast(TryCast { expr, .. }) => literal(expr),
        Expr::Negative(inner) => match literal(inner)? {
            Literal::Int(v) => Ok(Literal::Int(-v)),
            Literal::Long(v) => Ok(Literal::Long(-v)),
            Literal::Float(v) => Ok(Literal::Float(-v)),
            Literal::Double(v) => Ok(Literal::Double(-v)),
            other => Err(ScanError::InvalidPredicate(format!("cannot negate {}", other))),
        },
        other => Err(ScanError::InvalidPredicate(format!(
            "expected a literal, found {}",
            other
        ))),
    }
}

fn scalar_to_literal(value: &ScalarValue) -> ScanResult<Literal> {
    let literal = match value {
        ScalarValue::Boolean(Some(v)) => Literal::Boolean(*v),
        ScalarValue::Int8(Some(v)) => Literal::Int(*v as i32),
        ScalarValue::Int16(Some(v)) => Literal::Int(*v as i32),
        ScalarValue::Int32(Some(v)) => Literal::Int(*v),
        ScalarValue::Int64(Some(v)) => Literal::Long(*v),
        ScalarValue::UInt8(Some(v)) => Literal::Int(*v as i32),
        ScalarValue::UInt16(Some(v)) => Literal::Int(*v as i32),
        ScalarValue::UInt32(Some(v)) => Literal::Long(*v as i64),
        ScalarValue::Float32(Some(v)) => Literal::Float(*v),
        ScalarValue::Float64(Some(v)) => Literal::Double(*v),
        ScalarValue::Utf8(Some(v))
        | ScalarValue::LargeUtf8(Some(v))
        | ScalarValue::Utf8View(Some(v)) => Literal::String(v.clone()),
        ScalarValue::Binary(Some(v)) | ScalarValue::LargeBinary(Some(v)) => {
            Literal::Binary(v.clone())
        }
        ScalarValue::Date32(Some(v)) => Literal::Date(*v),
        ScalarValue::TimestampSecond(Some(v), _) => Literal::Timestamp(v * 1_000_000),
        ScalarValue::TimestampMillisecond(Some(v), _) => Literal::Timestamp(v * 1_000),
        ScalarValue::TimestampMicrosecond(Some(v), _) => Literal::Timestamp(*v),
        ScalarValue::TimestampNanosecond(Some(v), _) => Literal::Timestamp(v.div_euclid(1_000)),
        other if other.is_null() => {
            return Err(ScanError::InvalidPredicate(
                "NULL literals never match; use IS NULL".to_string(),
            ));
        }
        other => {
            return Err(ScanError::InvalidPredicate(format!(
                "unsupported literal type {}",
                other.data_type()
            )));
        }
    };
    Ok(literal)
}

fn unsupported(expr: &Expr) -> ScanError {
    ScanError::InvalidPredicate(format!("unsupported filter expression {}", expr))
}

/// Runs SQL over datasets registered as in-memory tables.
pub struct QuerySession {
    ctx: SessionContext,
}

impl Default for QuerySession {
    fn default() -> Self {
        Self::new()
    }
}

impl QuerySession {
    pub fn new() -> Self {
        Self {
            ctx: session_context(),
        }
    }

    /// Makes `dataset` queryable as `name`, replacing any table of that name.
    pub fn register_dataset(&self, name: &str, dataset: &Dataset) -> ScanResult<()> {
        let table = MemTable::try_new(dataset.schema(), vec![dataset.batches().to_vec()])?;
        self.ctx.deregister_table(name)?;
        self.ctx.register_table(name, Arc::new(table))?;
        Ok(())
    }

    /// Executes one SQL statement and collects its result.
    pub async fn sql(&self, query: &str) -> ScanResult<Vec<RecordBatch>> {
        let frame = self.ctx.sql(query).await?;
        Ok(frame.collect().await?)
    }

    /// Executes a query and wraps the result as a [`Dataset`].
    pub async fn sql_dataset(&self, query: &str) -> ScanResult<Dataset> {
        let frame = self.ctx.sql(query).await?;
        let schema = Arc::new(frame.schema().as_arrow().clone());
        let batches = frame.collect().await?;
        assemble(schema, batches)
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};

    use super::*;
    use crate::expr::col;
    use crate::schema::Type;

    fn taxi_schema() -> Schema {
        Schema::builder(0)
            .with_field(1, "VendorID", Type::Long, true)
            .with_field(
                2,
                "tpep_pickup_datetime",
                Type::Timestamp {
                    with_timezone: false,
                },
                true,
            )
            .with_field(3, "fare_amount", Type::Double, true)
            .with_field(4, "store_and_fwd_flag", Type::String, true)
            .build()
    }

    fn bound(sql: &str) -> String {
        let schema = taxi_schema();
        parse_filter(sql, &schema)
            .unwrap()
            .bind(&schema)
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_parse_comparisons() {
        assert_eq!(bound("fare_amount > 500"), "fare_amount > 500");
        assert_eq!(bound("0 >= fare_amount"), "fare_amount <= 0");
        assert_eq!(
            bound("VendorID = 2 AND store_and_fwd_flag <> 'Y'"),
            "(VendorID = 2 AND store_and_fwd_flag != 'Y')"
        );
        assert_eq!(bound("fare_amount > -2.5"), "fare_amount > -2.5");
    }

    #[test]
    fn test_parse_negation_and_sets() {
        assert_eq!(
            bound("NOT (fare_amount > 0 AND store_and_fwd_flag IN ('Y'))"),
            "(fare_amount <= 0 OR store_and_fwd_flag NOT IN ('Y'))"
        );
        assert_eq!(bound("VendorID IS NOT NULL"), "VendorID IS NOT NULL");
        assert_eq!(
            bound("fare_amount BETWEEN 1 AND 10"),
            "(fare_amount >= 1 AND fare_amount <= 10)"
        );
    }

    #[test]
    fn test_parse_matches_builder() {
        let schema = taxi_schema();
        let parsed = parse_filter("tpep_pickup_datetime >= '2022-02-01'", &schema)
            .unwrap()
            .bind(&schema)
            .unwrap();
        let built = col("tpep_pickup_datetime")
            .gt_eq("2022-02-01T00:00:00")
            .bind(&schema)
            .unwrap();
        assert_eq!(parsed, built);
        assert_eq!(parse_filter("true", &schema).unwrap(), Predicate::AlwaysTrue);
    }

    #[test]
    fn test_parse_errors() {
        let schema = taxi_schema();
        for sql in [
            "tip_amount > 1",
            "fare_amount > VendorID",
            "fare_amount = NULL",
            "fare_amount >",
            "store_and_fwd_flag LIKE 'Y%'",
        ] {
            let result = parse_filter(sql, &schema).and_then(|p| p.bind(&schema));
            assert!(
                matches!(result, Err(ScanError::InvalidPredicate(_))),
                "{} should be rejected",
                sql
            );
        }
    }

    #[tokio::test]
    async fn test_query_session() {
        let schema = Arc::new(ArrowSchema::new(vec![
            Field::new("VendorID", DataType::Int64, true),
            Field::new("fare_amount", DataType::Float64, true),
            Field::new("store_and_fwd_flag", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 2])),
                Arc::new(Float64Array::from(vec![10.0, 20.0, 40.0])),
                Arc::new(StringArray::from(vec!["N", "N", "Y"])),
            ],
        )
        .unwrap();
        let dataset = assemble(schema, vec![batch]).unwrap();

        let session = QuerySession::new();
        session.register_dataset("trips", &dataset).unwrap();
        let result = session
            .sql_dataset(
                "SELECT VendorID, SUM(fare_amount) AS total FROM trips \
                 GROUP BY VendorID ORDER BY VendorID",
            )
            .await
            .unwrap();
        assert_eq!(result.num_rows(), 2);
        assert_eq!(result.column_names(), vec!["VendorID", "total"]);

        let totals = result.to_record_batch().unwrap();
        let totals = totals
            .column(1)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(totals.values(), &[10.0, 60.0]);

        // Re-registering replaces the table.
        session.register_dataset("trips", &dataset).unwrap();
        let count = session.sql("SELECT COUNT(*) FROM trips").await.unwrap();
        assert_eq!(count[0].num_rows(), 1);
    }
}

//! # Filter Expressions
//!
//! A [`Predicate`] is a tree of comparisons over column references and
//! literals composed with `and`, `or` and `not`. Callers build predicates by
//! column name; [`Predicate::bind`] resolves them against a table schema into
//! a [`BoundPredicate`], which is what the evaluator and the row filter
//! consume.
//!
//! ```rust
//! use scancore::expr::{Predicate, col};
//!
//! let filter = col("tpep_pickup_datetime")
//!     .gt_eq("2022-01-01T00:00:00.000000+00:00")
//!     .and(col("fare_amount").gt(0.0));
//! assert_eq!(
//!     filter.to_string(),
//!     "(tpep_pickup_datetime >= '2022-01-01T00:00:00.000000+00:00' AND fare_amount > 0)"
//! );
//! # let _ = Predicate::AlwaysTrue;
//! ```
//!
//! ## Negation
//!
//! Binding pushes `not` down to the leaves by negating operators
//! (`not (a > 5)` becomes `a <= 5`) and applying De Morgan's laws, so a
//! bound predicate never contains a negation node. For nulls the rewrite
//! agrees with SQL three-valued logic: a null row fails both `a > 5` and
//! `a <= 5`. It is not exact for NaN: `not (x < 1.0)` binds to `x >= 1.0`,
//! and the negated operator decides how a NaN row is treated.

use serde::{Deserialize, Serialize};

use crate::error::{ScanError, ScanResult};
use crate::literal::Literal;
use crate::schema::{Schema, Type};

/// Comparison operators for binary leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl ComparisonOp {
    /// Returns the complementary operator. The complement covers every
    /// non-null row this one rejects, except NaN, which is unordered.
    pub fn negate(self) -> Self {
        match self {
            ComparisonOp::Eq => ComparisonOp::NotEq,
            ComparisonOp::NotEq => ComparisonOp::Eq,
            ComparisonOp::Lt => ComparisonOp::GtEq,
            ComparisonOp::LtEq => ComparisonOp::Gt,
            ComparisonOp::Gt => ComparisonOp::LtEq,
            ComparisonOp::GtEq => ComparisonOp::Lt,
        }
    }

    /// Applies the operator to two values. Unordered values never match.
    pub fn test(self, left: &Literal, right: &Literal) -> bool {
        match left.partial_cmp(right) {
            Some(ordering) => match self {
                ComparisonOp::Eq => ordering.is_eq(),
                ComparisonOp::NotEq => ordering.is_ne(),
                ComparisonOp::Lt => ordering.is_lt(),
                ComparisonOp::LtEq => ordering.is_le(),
                ComparisonOp::Gt => ordering.is_gt(),
                ComparisonOp::GtEq => ordering.is_ge(),
            },
            None => false,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::NotEq => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::LtEq => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::GtEq => ">=",
        }
    }
}

/// Null-check operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnaryOp {
    IsNull,
    NotNull,
}

impl UnaryOp {
    pub fn negate(self) -> Self {
        match self {
            UnaryOp::IsNull => UnaryOp::NotNull,
            UnaryOp::NotNull => UnaryOp::IsNull,
        }
    }
}

/// Set-membership operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SetOp {
    In,
    NotIn,
}

impl SetOp {
    pub fn negate(self) -> Self {
        match self {
            SetOp::In => SetOp::NotIn,
            SetOp::NotIn => SetOp::In,
        }
    }
}

/// An unbound row filter, referring to columns by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Predicate {
    AlwaysTrue,
    AlwaysFalse,
    Comparison {
        column: String,
        op: ComparisonOp,
        literal: Literal,
    },
    Unary {
        column: String,
        op: UnaryOp,
    },
    Set {
        column: String,
        op: SetOp,
        literals: Vec<Literal>,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

/// Starts a predicate on the named column.
pub fn col(name: impl Into<String>) -> ColumnRef {
    ColumnRef(name.into())
}

/// A column name awaiting an operator; see [`col`].
#[derive(Debug, Clone)]
pub struct ColumnRef(String);

impl ColumnRef {
    fn compare(self, op: ComparisonOp, literal: impl Into<Literal>) -> Predicate {
        Predicate::Comparison {
            column: self.0,
            op,
            literal: literal.into(),
        }
    }

    pub fn eq(self, literal: impl Into<Literal>) -> Predicate {
        self.compare(ComparisonOp::Eq, literal)
    }

    pub fn not_eq(self, literal: impl Into<Literal>) -> Predicate {
        self.compare(ComparisonOp::NotEq, literal)
    }

    pub fn lt(self, literal: impl Into<Literal>) -> Predicate {
        self.compare(ComparisonOp::Lt, literal)
    }

    pub fn lt_eq(self, literal: impl Into<Literal>) -> Predicate {
        self.compare(ComparisonOp::LtEq, literal)
    }

    pub fn gt(self, literal: impl Into<Literal>) -> Predicate {
        self.compare(ComparisonOp::Gt, literal)
    }

    pub fn gt_eq(self, literal: impl Into<Literal>) -> Predicate {
        self.compare(ComparisonOp::GtEq, literal)
    }

    pub fn is_null(self) -> Predicate {
        Predicate::Unary {
            column: self.0,
            op: UnaryOp::IsNull,
        }
    }

    pub fn is_not_null(self) -> Predicate {
        Predicate::Unary {
            column: self.0,
            op: UnaryOp::NotNull,
        }
    }

    pub fn is_in<L: Into<Literal>>(self, literals: impl IntoIterator<Item = L>) -> Predicate {
        Predicate::Set {
            column: self.0,
            op: SetOp::In,
            literals: literals.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not_in<L: Into<Literal>>(self, literals: impl IntoIterator<Item = L>) -> Predicate {
        Predicate::Set {
            column: self.0,
            op: SetOp::NotIn,
            literals: literals.into_iter().map(Into::into).collect(),
        }
    }
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Predicate {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }

    /// Combines predicates with `and`; an empty input yields `AlwaysTrue`.
    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Predicate {
        predicates
            .into_iter()
            .reduce(Predicate::and)
            .unwrap_or(Predicate::AlwaysTrue)
    }

    /// Resolves column names and literal types against `schema`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPredicate` if a column does not exist in the schema or
    /// a literal cannot be represented in the column's type.
    pub fn bind(&self, schema: &Schema) -> ScanResult<BoundPredicate> {
        self.bind_with_polarity(schema, false)
    }

    fn bind_with_polarity(&self, schema: &Schema, negated: bool) -> ScanResult<BoundPredicate> {
        let bound = match self {
            Predicate::AlwaysTrue if negated => BoundPredicate::AlwaysFalse,
            Predicate::AlwaysTrue => BoundPredicate::AlwaysTrue,
            Predicate::AlwaysFalse if negated => BoundPredicate::AlwaysTrue,
            Predicate::AlwaysFalse => BoundPredicate::AlwaysFalse,
            Predicate::Comparison {
                column,
                op,
                literal,
            } => {
                let term = BoundReference::resolve(schema, column)?;
                let literal = term.coerce(literal)?;
                let op = if negated { op.negate() } else { *op };
                BoundPredicate::Comparison { term, op, literal }
            }
            Predicate::Unary { column, op } => {
                let term = BoundReference::resolve(schema, column)?;
                let op = if negated { op.negate() } else { *op };
                BoundPredicate::Unary { term, op }
            }
            Predicate::Set {
                column,
                op,
                literals,
            } => {
                let term = BoundReference::resolve(schema, column)?;
                let literals = literals
                    .iter()
                    .map(|l| term.coerce(l))
                    .collect::<ScanResult<Vec<_>>>()?;
                let op = if negated { op.negate() } else { *op };
                match (op, literals.is_empty()) {
                    (SetOp::In, true) => BoundPredicate::AlwaysFalse,
                    (SetOp::NotIn, true) => BoundPredicate::Unary {
                        term,
                        op: UnaryOp::NotNull,
                    },
                    _ => BoundPredicate::Set { term, op, literals },
                }
            }
            Predicate::And(left, right) => {
                let left = left.bind_with_polarity(schema, negated)?;
                let right = right.bind_with_polarity(schema, negated)?;
                if negated {
                    BoundPredicate::or(left, right)
                } else {
                    BoundPredicate::and(left, right)
                }
            }
            Predicate::Or(left, right) => {
                let left = left.bind_with_polarity(schema, negated)?;
                let right = right.bind_with_polarity(schema, negated)?;
                if negated {
                    BoundPredicate::and(left, right)
                } else {
                    BoundPredicate::or(left, right)
                }
            }
            Predicate::Not(inner) => inner.bind_with_polarity(schema, !negated)?,
        };
        Ok(bound)
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::AlwaysTrue => write!(f, "TRUE"),
            Predicate::AlwaysFalse => write!(f, "FALSE"),
            Predicate::Comparison {
                column,
                op,
                literal,
            } => write!(f, "{} {} {}", column, op.symbol(), literal),
            Predicate::Unary { column, op } => write_unary(f, column, *op),
            Predicate::Set {
                column,
                op,
                literals,
            } => write_set(f, column, *op, literals),
            Predicate::And(l, r) => write!(f, "({} AND {})", l, r),
            Predicate::Or(l, r) => write!(f, "({} OR {})", l, r),
            Predicate::Not(inner) => write!(f, "NOT {}", inner),
        }
    }
}

/// A column resolved against a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundReference {
    pub field_id: i32,
    pub name: String,
    pub field_type: Type,
}

impl BoundReference {
    fn resolve(schema: &Schema, column: &str) -> ScanResult<Self> {
        let field = schema.find_field_by_name(column).ok_or_else(|| {
            ScanError::InvalidPredicate(format!("column {} does not exist in the schema", column))
        })?;
        Ok(Self {
            field_id: field.id,
            name: field.name.clone(),
            field_type: field.field_type.clone(),
        })
    }

    fn coerce(&self, literal: &Literal) -> ScanResult<Literal> {
        literal.to_type(&self.field_type).ok_or_else(|| {
            ScanError::InvalidPredicate(format!(
                "cannot compare column {} of type {} with {} literal {}",
                self.name,
                self.field_type,
                literal.type_name(),
                literal
            ))
        })
    }
}

/// A predicate resolved against a schema, with negations pushed to the leaves.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundPredicate {
    AlwaysTrue,
    AlwaysFalse,
    Comparison {
        term: BoundReference,
        op: ComparisonOp,
        literal: Literal,
    },
    Unary {
        term: BoundReference,
        op: UnaryOp,
    },
    Set {
        term: BoundReference,
        op: SetOp,
        literals: Vec<Literal>,
    },
    And(Box<BoundPredicate>, Box<BoundPredicate>),
    Or(Box<BoundPredicate>, Box<BoundPredicate>),
}

impl BoundPredicate {
    /// Conjunction that folds constant operands.
    pub fn and(left: BoundPredicate, right: BoundPredicate) -> BoundPredicate {
        match (left, right) {
            (BoundPredicate::AlwaysFalse, _) | (_, BoundPredicate::AlwaysFalse) => {
                BoundPredicate::AlwaysFalse
            }
            (BoundPredicate::AlwaysTrue, other) | (other, BoundPredicate::AlwaysTrue) => other,
            (l, r) => BoundPredicate::And(Box::new(l), Box::new(r)),
        }
    }

    /// Disjunction that folds constant operands.
    pub fn or(left: BoundPredicate, right: BoundPredicate) -> BoundPredicate {
        match (left, right) {
            (BoundPredicate::AlwaysTrue, _) | (_, BoundPredicate::AlwaysTrue) => {
                BoundPredicate::AlwaysTrue
            }
            (BoundPredicate::AlwaysFalse, other) | (other, BoundPredicate::AlwaysFalse) => other,
            (l, r) => BoundPredicate::Or(Box::new(l), Box::new(r)),
        }
    }

    pub fn is_always_true(&self) -> bool {
        matches!(self, BoundPredicate::AlwaysTrue)
    }

    /// Returns the names of referenced columns, in first-reference order.
    pub fn referenced_columns(&self) -> Vec<String> {
        let mut columns = Vec::new();
        self.collect_columns(&mut columns);
        columns
    }

    fn collect_columns(&self, columns: &mut Vec<String>) {
        match self {
            BoundPredicate::AlwaysTrue | BoundPredicate::AlwaysFalse => {}
            BoundPredicate::Comparison { term, .. }
            | BoundPredicate::Unary { term, .. }
            | BoundPredicate::Set { term, .. } => {
                if !columns.contains(&term.name) {
                    columns.push(term.name.clone());
                }
            }
            BoundPredicate::And(l, r) | BoundPredicate::Or(l, r) => {
                l.collect_columns(columns);
                r.collect_columns(columns);
            }
        }
    }
}

impl std::fmt::Display for BoundPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundPredicate::AlwaysTrue => write!(f, "TRUE"),
            BoundPredicate::AlwaysFalse => write!(f, "FALSE"),
            BoundPredicate::Comparison { term, op, literal } => {
                write!(f, "{} {} {}", term.name, op.symbol(), literal)
            }
            BoundPredicate::Unary { term, op } => write_unary(f, &term.name, *op),
            BoundPredicate::Set { term, op, literals } => write_set(f, &term.name, *op, literals),
            BoundPredicate::And(l, r) => write!(f, "({} AND {})", l, r),
            BoundPredicate::Or(l, r) => write!(f, "({} OR {})", l, r),
        }
    }
}

fn write_unary(f: &mut std::fmt::Formatter<'_>, column: &str, op: UnaryOp) -> std::fmt::Result {
    match op {
        UnaryOp::IsNull => write!(f, "{} IS NULL", column),
        UnaryOp::NotNull => write!(f, "{} IS NOT NULL", column),
    }
}

fn write_set(
    f: &mut std::fmt::Formatter<'_>,
    column: &str,
    op: SetOp,
    literals: &[Literal],
) -> std::fmt::Result {
    let values: Vec<String> = literals.iter().map(|l| l.to_string()).collect();
    match op {
        SetOp::In => write!(f, "{} IN ({})", column, values.join(", ")),
        SetOp::NotIn => write!(f, "{} NOT IN ({})", column, values.join(", ")),
    }
}

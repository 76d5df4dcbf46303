//! Serializable query plans.

use super::expression::Expression;
use docsim_values::Value;

/// Result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Ascending by index key.
    #[default]
    Asc,
    /// Descending by index key.
    Desc,
}

/// Comparison used in one index range clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    /// Equal.
    Eq,
    /// Strictly greater.
    Gt,
    /// Greater or equal.
    Gte,
    /// Strictly less.
    Lt,
    /// Less or equal.
    Lte,
}

impl RangeOp {
    /// Returns true for lower-bound operators.
    #[must_use]
    pub const fn is_lower(self) -> bool {
        matches!(self, Self::Gt | Self::Gte)
    }

    /// Returns true for upper-bound operators.
    #[must_use]
    pub const fn is_upper(self) -> bool {
        matches!(self, Self::Lt | Self::Lte)
    }

    /// Operator name as written in a query.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
        }
    }
}

/// One clause of an index range.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeExpression {
    /// Indexed field the clause applies to.
    pub field_path: String,
    /// Comparison.
    pub op: RangeOp,
    /// Operand; `None` is undefined.
    pub value: Option<Value>,
}

/// One clause of a search filter.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchFilter {
    /// Full-text match on the index's search field.
    Search {
        /// Field searched.
        field_path: String,
        /// Whitespace-separated terms.
        query: String,
    },
    /// Equality on a filter field.
    Eq {
        /// Field compared.
        field_path: String,
        /// Operand; `None` is undefined.
        value: Option<Value>,
    },
}

/// Where candidate documents come from.
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySource {
    /// Every document, by creation time.
    FullTableScan {
        /// Table scanned.
        table: String,
        /// Result order.
        order: Order,
    },
    /// Documents in an index range, by index key.
    IndexRange {
        /// Table scanned.
        table: String,
        /// Index name.
        index: String,
        /// Range clauses, in chain order.
        range: Vec<RangeExpression>,
        /// Result order.
        order: Order,
    },
    /// Documents matching a search index query.
    Search {
        /// Table scanned.
        table: String,
        /// Search index name.
        index: String,
        /// Search clauses.
        filters: Vec<SearchFilter>,
    },
}

impl QuerySource {
    /// Returns the table the source reads.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::FullTableScan { table, .. }
            | Self::IndexRange { table, .. }
            | Self::Search { table, .. } => table,
        }
    }
}

/// Post-processing applied after the source.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperator {
    /// Keep documents for which the expression is truthy.
    Filter(Expression),
    /// Keep at most this many documents.
    Limit(usize),
}

/// A complete query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// Candidate source.
    pub source: QuerySource,
    /// Operators, in the order they were added.
    pub operators: Vec<QueryOperator>,
}

impl QueryPlan {
    /// A full scan of `table` in ascending order.
    #[must_use]
    pub fn full_table_scan(table: impl Into<String>) -> Self {
        Self {
            source: QuerySource::FullTableScan {
                table: table.into(),
                order: Order::Asc,
            },
            operators: Vec::new(),
        }
    }
}

//! Index range expressions: building, validating and matching.

use super::plan::{RangeExpression, RangeOp};
use crate::error::{CoreError, CoreResult};
use crate::types::Document;
use docsim_values::{compare_values, Value};
use std::cmp::Ordering;

/// Builder handed to `Query::with_index` closures.
#[derive(Debug, Clone, Default)]
pub struct IndexRangeBuilder {
    clauses: Vec<RangeExpression>,
}

impl IndexRangeBuilder {
    fn push(mut self, field: impl Into<String>, op: RangeOp, value: Option<Value>) -> Self {
        self.clauses.push(RangeExpression {
            field_path: field.into(),
            op,
            value,
        });
        self
    }

    /// `field == value`.
    #[must_use]
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field, RangeOp::Eq, Some(value.into()))
    }

    /// `field` is undefined.
    #[must_use]
    pub fn eq_undefined(self, field: impl Into<String>) -> Self {
        self.push(field, RangeOp::Eq, None)
    }

    /// `field > value`.
    #[must_use]
    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field, RangeOp::Gt, Some(value.into()))
    }

    /// `field >= value`.
    #[must_use]
    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field, RangeOp::Gte, Some(value.into()))
    }

    /// `field < value`.
    #[must_use]
    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field, RangeOp::Lt, Some(value.into()))
    }

    /// `field <= value`.
    #[must_use]
    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field, RangeOp::Lte, Some(value.into()))
    }

    pub(crate) fn into_clauses(self) -> Vec<RangeExpression> {
        self.clauses
    }
}

/// Checks that `clauses` form a valid chain over `index_fields`.
///
/// A valid chain is zero or more `eq` clauses on successive index fields,
/// then at most one lower bound and one upper bound, both on the field
/// right after the equality prefix.
pub fn validate_range(index: &str, index_fields: &[String], clauses: &[RangeExpression]) -> CoreResult<()> {
    let mut eq_count = 0;
    let mut lower: Option<RangeOp> = None;
    let mut upper: Option<RangeOp> = None;

    for clause in clauses {
        let op = clause.op;
        if let (Some(lo), Some(hi)) = (lower, upper) {
            return Err(CoreError::invalid_index_range(format!(
                "Cannot chain more operators after both .{} and .{} (found .{}(\"{}\") on index {index})",
                lo.as_str(),
                hi.as_str(),
                op.as_str(),
                clause.field_path
            )));
        }

        if op == RangeOp::Eq && (lower.is_some() || upper.is_some()) {
            return Err(CoreError::invalid_index_range(format!(
                ".eq(\"{}\") must come before any .gt/.gte/.lt/.lte on index {index}",
                clause.field_path
            )));
        }
        if (op.is_lower() && lower.is_some()) || (op.is_upper() && upper.is_some()) {
            return Err(CoreError::invalid_index_range(format!(
                "Cannot use .{}(\"{}\") twice on index {index}: a range takes one lower and one upper bound",
                op.as_str(),
                clause.field_path
            )));
        }

        let expected = index_fields.get(eq_count).ok_or_else(|| {
            CoreError::invalid_index_range(format!(
                ".{}(\"{}\") has no field left to apply to: index {index} has fields {:?}",
                op.as_str(),
                clause.field_path,
                index_fields
            ))
        })?;
        if &clause.field_path != expected {
            return Err(CoreError::invalid_index_range(format!(
                "Expected field \"{expected}\" for .{} on index {index}, but got \"{}\"",
                op.as_str(),
                clause.field_path
            )));
        }

        match op {
            RangeOp::Eq => eq_count += 1,
            RangeOp::Gt | RangeOp::Gte => lower = Some(op),
            RangeOp::Lt | RangeOp::Lte => upper = Some(op),
        }
    }
    Ok(())
}

/// Returns true if `doc` satisfies every clause.
#[must_use]
pub fn matches_range(doc: &Document, clauses: &[RangeExpression]) -> bool {
    clauses.iter().all(|clause| {
        let actual = doc.get(&clause.field_path);
        let ordering = compare_values(actual.as_ref(), clause.value.as_ref());
        match clause.op {
            RangeOp::Eq => ordering == Ordering::Equal,
            RangeOp::Gt => ordering == Ordering::Greater,
            RangeOp::Gte => ordering != Ordering::Less,
            RangeOp::Lt => ordering == Ordering::Less,
            RangeOp::Lte => ordering != Ordering::Greater,
        }
    })
}

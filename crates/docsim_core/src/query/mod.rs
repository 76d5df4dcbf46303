//! Query planning and execution.
//!
//! A query is a [`QueryPlan`]: one source (full table scan, index range or
//! search index) followed by filter and limit operators. [`Query`] builds
//! plans fluently from the database facades; [`execute`] and [`paginate`]
//! interpret them against a [`DocumentStore`](crate::store::DocumentStore).

mod builder;
mod executor;
mod expression;
mod plan;
mod range;
mod search;

pub use builder::Query;
pub use executor::{execute, paginate, PaginationOptions, PaginationResult, END_CURSOR};
pub use expression::{truthy, ArithmeticOp, Expression, FilterBuilder};
pub use plan::{
    Order, QueryOperator, QueryPlan, QuerySource, RangeExpression, RangeOp, SearchFilter,
};
pub use range::{matches_range, validate_range, IndexRangeBuilder};
pub use search::{matches_search, text_matches, validate_search, SearchFilterBuilder};

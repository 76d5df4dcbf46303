//! Fluent query builder.

use super::executor::{execute, paginate, PaginationOptions, PaginationResult};
use super::expression::{Expression, FilterBuilder};
use super::plan::{Order, QueryOperator, QueryPlan, QuerySource};
use super::range::IndexRangeBuilder;
use super::search::SearchFilterBuilder;
use crate::error::{CoreError, CoreResult};
use crate::store::DocumentStore;
use crate::types::Document;
use std::sync::Arc;

/// A query under construction.
///
/// Misuse (choosing a second source, ordering twice, ordering a search) is
/// reported by the terminal method.
#[derive(Debug)]
pub struct Query {
    store: Arc<DocumentStore>,
    plan: QueryPlan,
    source_chosen: bool,
    ordered: bool,
    error: Option<CoreError>,
}

impl Query {
    pub(crate) fn new(store: Arc<DocumentStore>, table: &str) -> Self {
        Self {
            store,
            plan: QueryPlan::full_table_scan(table),
            source_chosen: false,
            ordered: false,
            error: None,
        }
    }

    pub(crate) fn failed(store: Arc<DocumentStore>, table: &str, error: CoreError) -> Self {
        let mut query = Self::new(store, table);
        query.error = Some(error);
        query
    }

    fn fail(mut self, message: impl Into<String>) -> Self {
        if self.error.is_none() {
            self.error = Some(CoreError::invalid_query(message));
        }
        self
    }

    fn choose_source(mut self, source: QuerySource) -> Self {
        if self.source_chosen || !self.plan.operators.is_empty() || self.ordered {
            return self.fail("the query source must be chosen first and only once");
        }
        self.plan.source = source;
        self.source_chosen = true;
        self
    }

    /// Scans every document by creation time.
    #[must_use]
    pub fn full_table_scan(self) -> Self {
        let table = self.plan.source.table().to_string();
        self.choose_source(QuerySource::FullTableScan {
            table,
            order: Order::Asc,
        })
    }

    /// Reads documents through an index, optionally narrowed by a range.
    #[must_use]
    pub fn with_index(
        self,
        index: impl Into<String>,
        range: impl FnOnce(IndexRangeBuilder) -> IndexRangeBuilder,
    ) -> Self {
        let table = self.plan.source.table().to_string();
        self.choose_source(QuerySource::IndexRange {
            table,
            index: index.into(),
            range: range(IndexRangeBuilder::default()).into_clauses(),
            order: Order::Asc,
        })
    }

    /// Reads documents matching a search index query.
    #[must_use]
    pub fn with_search_index(
        self,
        index: impl Into<String>,
        filters: impl FnOnce(SearchFilterBuilder) -> SearchFilterBuilder,
    ) -> Self {
        let table = self.plan.source.table().to_string();
        self.choose_source(QuerySource::Search {
            table,
            index: index.into(),
            filters: filters(SearchFilterBuilder::default()).into_filters(),
        })
    }

    /// Sets the result order.
    #[must_use]
    pub fn order(mut self, order: Order) -> Self {
        if self.ordered {
            return self.fail("order() may only be called once");
        }
        self.ordered = true;
        self.source_chosen = true;
        let reorderable = match &mut self.plan.source {
            QuerySource::FullTableScan { order: o, .. } | QuerySource::IndexRange { order: o, .. } => {
                *o = order;
                true
            }
            QuerySource::Search { .. } => false,
        };
        if reorderable {
            self
        } else {
            self.fail("search results have a fixed order and cannot be reordered")
        }
    }

    /// Keeps documents for which the expression is truthy.
    #[must_use]
    pub fn filter(mut self, predicate: impl FnOnce(&FilterBuilder) -> Expression) -> Self {
        self.source_chosen = true;
        self.plan
            .operators
            .push(QueryOperator::Filter(predicate(&FilterBuilder)));
        self
    }

    /// Keeps documents for which a prebuilt expression is truthy.
    #[must_use]
    pub fn filter_expression(mut self, expression: Expression) -> Self {
        self.source_chosen = true;
        self.plan.operators.push(QueryOperator::Filter(expression));
        self
    }

    /// Returns the plan built so far.
    #[must_use]
    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    fn run(self) -> CoreResult<Vec<Document>> {
        if let Some(error) = self.error {
            return Err(error);
        }
        execute(&self.store, &self.plan)
    }

    /// Returns every result.
    pub fn collect(self) -> CoreResult<Vec<Document>> {
        self.run()
    }

    /// Returns the first `n` results.
    pub fn take(mut self, n: usize) -> CoreResult<Vec<Document>> {
        self.plan.operators.push(QueryOperator::Limit(n));
        self.run()
    }

    /// Returns the first result.
    pub fn first(self) -> CoreResult<Option<Document>> {
        Ok(self.take(1)?.into_iter().next())
    }

    /// Returns the only result; fails when there is more than one.
    pub fn unique(self) -> CoreResult<Option<Document>> {
        let mut docs = self.take(2)?;
        if docs.len() > 1 {
            return Err(CoreError::invalid_query(format!(
                "unique() query returned more than one result: {} and {}",
                docs[0].id(),
                docs[1].id()
            )));
        }
        Ok(docs.pop())
    }

    /// Returns one page of results.
    pub fn paginate(self, options: PaginationOptions) -> CoreResult<PaginationResult> {
        if let Some(error) = self.error {
            return Err(error);
        }
        paginate(&self.store, &self.plan, &options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Schema, TableDefinition};
    use docsim_values::{v, Value};
    use serde_json::json;

    fn store() -> Arc<DocumentStore> {
        let schema = Schema::new().table(
            "messages",
            TableDefinition::new(v::object([("author", v::string()), ("body", v::string())]))
                .index("by_author", ["author"])
                .search_index("search_body", "body", ["author"]),
        );
        let store = Arc::new(DocumentStore::new(Some(Arc::new(schema))));
        store.begin();
        for (author, body) in [("sarah", "hello world"), ("lee", "hi"), ("sarah", "bye")] {
            store
                .insert("messages", Value::from(json!({"author": author, "body": body})))
                .unwrap();
        }
        store
    }

    fn bodies(docs: &[Document]) -> Vec<&str> {
        docs.iter().filter_map(|d| d.get_str("body")).collect()
    }

    #[test]
    fn index_with_order_and_take() {
        let store = store();
        let docs = Query::new(Arc::clone(&store), "messages")
            .with_index("by_author", |r| r.eq("author", "sarah"))
            .order(Order::Desc)
            .take(1)
            .unwrap();
        assert_eq!(bodies(&docs), vec!["bye"]);
    }

    #[test]
    fn filter_closure() {
        let store = store();
        let docs = Query::new(Arc::clone(&store), "messages")
            .filter(|q| q.eq(q.field("author"), "lee"))
            .collect()
            .unwrap();
        assert_eq!(bodies(&docs), vec!["hi"]);
    }

    #[test]
    fn unique_rejects_duplicates() {
        let store = store();
        let err = Query::new(Arc::clone(&store), "messages")
            .with_index("by_author", |r| r.eq("author", "sarah"))
            .unique()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidQuery { .. }));

        let one = Query::new(Arc::clone(&store), "messages")
            .with_index("by_author", |r| r.eq("author", "lee"))
            .unique()
            .unwrap();
        assert!(one.is_some());
    }

    #[test]
    fn search_query() {
        let store = store();
        let docs = Query::new(Arc::clone(&store), "messages")
            .with_search_index("search_body", |s| s.search("body", "hel").eq("author", "sarah"))
            .collect()
            .unwrap();
        assert_eq!(bodies(&docs), vec!["hello world"]);
    }

    #[test]
    fn ordering_search_fails() {
        let store = store();
        let result = Query::new(Arc::clone(&store), "messages")
            .with_search_index("search_body", |s| s.search("body", "hi"))
            .order(Order::Desc)
            .collect();
        assert!(result.is_err());
    }

    #[test]
    fn second_source_fails() {
        let store = store();
        let result = Query::new(Arc::clone(&store), "messages")
            .full_table_scan()
            .with_index("by_author", |r| r)
            .collect();
        assert!(result.is_err());
    }

    #[test]
    fn chaining_error_surfaces_before_reading() {
        let store = store();
        let err = Query::new(Arc::clone(&store), "messages")
            .with_index("by_author", |r| r.eq("body", "x"))
            .first()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidIndexRange { .. }));
    }
}

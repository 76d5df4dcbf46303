//! Query plan interpretation.

use super::plan::{Order, QueryOperator, QueryPlan, QuerySource};
use super::range::{matches_range, validate_range};
use super::search::{matches_search, validate_search};
use crate::error::{CoreError, CoreResult};
use crate::schema::index_key_fields;
use crate::store::DocumentStore;
use crate::types::Document;
use docsim_values::{compare_keys, Value, CREATION_TIME_FIELD, ID_FIELD};

/// Cursor returned once a paginated query is exhausted.
pub const END_CURSOR: &str = "_end_cursor";

/// Options for one page of a paginated query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationOptions {
    /// Id of the last document of the previous page, or `None` to start.
    pub cursor: Option<String>,
    /// Page size; at least 1.
    pub num_items: usize,
}

impl PaginationOptions {
    /// First page of `num_items` documents.
    #[must_use]
    pub fn first(num_items: usize) -> Self {
        Self {
            cursor: None,
            num_items,
        }
    }

    /// Page of `num_items` documents after `cursor`.
    #[must_use]
    pub fn after(cursor: impl Into<String>, num_items: usize) -> Self {
        Self {
            cursor: Some(cursor.into()),
            num_items,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationResult {
    /// Documents in this page.
    pub page: Vec<Document>,
    /// True once the scan reached the end of the results.
    pub is_done: bool,
    /// Cursor for the next page.
    pub continue_cursor: String,
}

impl PaginationResult {
    /// Object form with `page`, `isDone` and `continueCursor`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::object([
            (
                "page",
                Value::Array(self.page.iter().map(Document::to_value).collect()),
            ),
            ("isDone", Value::Boolean(self.is_done)),
            ("continueCursor", Value::from(self.continue_cursor.as_str())),
        ])
    }
}

/// Runs a plan against the store's current view.
///
/// Documents are selected by the source, sorted by its key, passed through
/// the operators in order and then limited.
pub fn execute(store: &DocumentStore, plan: &QueryPlan) -> CoreResult<Vec<Document>> {
    let mut docs = scan(store, &plan.source)?;
    for operator in &plan.operators {
        match operator {
            QueryOperator::Filter(expression) => {
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if expression.matches(&doc)? {
                        kept.push(doc);
                    }
                }
                docs = kept;
            }
            QueryOperator::Limit(n) => docs.truncate(*n),
        }
    }
    Ok(docs)
}

fn scan(store: &DocumentStore, source: &QuerySource) -> CoreResult<Vec<Document>> {
    let creation_order = [CREATION_TIME_FIELD.to_string(), ID_FIELD.to_string()];
    match source {
        QuerySource::FullTableScan { table, order } => {
            let docs = store.table_documents(table);
            Ok(sort_by_fields(docs, &creation_order, *order))
        }
        QuerySource::IndexRange {
            table,
            index,
            range,
            order,
        } => {
            let fields = index_key_fields(store.schema(), table, index)?;
            validate_range(index, &fields, range)?;
            let docs = store
                .table_documents(table)
                .into_iter()
                .filter(|doc| matches_range(doc, range))
                .collect();
            Ok(sort_by_fields(docs, &fields, *order))
        }
        QuerySource::Search {
            table,
            index,
            filters,
        } => {
            let definition = store
                .schema()
                .ok_or_else(|| CoreError::SearchIndexNotFound {
                    table: table.clone(),
                    index: index.clone(),
                })?
                .search_index(table, index)?;
            validate_search(definition, filters)?;
            let docs = store
                .table_documents(table)
                .into_iter()
                .filter(|doc| matches_search(doc, filters))
                .collect();
            Ok(sort_by_fields(docs, &creation_order, Order::Asc))
        }
    }
}

fn sort_by_fields(docs: Vec<Document>, fields: &[String], order: Order) -> Vec<Document> {
    let mut keyed: Vec<(Vec<Option<Value>>, Document)> = docs
        .into_iter()
        .map(|doc| (fields.iter().map(|f| doc.get(f)).collect(), doc))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| match order {
        Order::Asc => compare_keys(a, b),
        Order::Desc => compare_keys(b, a),
    });
    keyed.into_iter().map(|(_, doc)| doc).collect()
}

/// Runs a plan and returns the page after `options.cursor`.
pub fn paginate(
    store: &DocumentStore,
    plan: &QueryPlan,
    options: &PaginationOptions,
) -> CoreResult<PaginationResult> {
    if options.num_items == 0 {
        return Err(CoreError::invalid_query("numItems must be at least 1"));
    }
    let results = execute(store, plan)?;

    let mut collecting = options.cursor.is_none();
    let mut page = Vec::new();
    for doc in results {
        if collecting {
            page.push(doc);
            if page.len() >= options.num_items {
                let continue_cursor = page
                    .last()
                    .map_or_else(|| END_CURSOR.to_string(), |d| d.id().to_string());
                return Ok(PaginationResult {
                    page,
                    is_done: false,
                    continue_cursor,
                });
            }
        } else if options.cursor.as_deref() == Some(doc.id().as_str()) {
            collecting = true;
        }
    }

    Ok(PaginationResult {
        page,
        is_done: true,
        continue_cursor: END_CURSOR.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expression::FilterBuilder;
    use crate::query::plan::RangeOp;
    use crate::query::plan::RangeExpression;
    use crate::schema::{Schema, TableDefinition};
    use docsim_values::v;
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> DocumentStore {
        let schema = Schema::new()
            .table(
                "messages",
                TableDefinition::new(v::object([("author", v::string()), ("n", v::number())]))
                    .index("by_author", ["author"])
                    .search_index("search_author", "author", Vec::<String>::new()),
            )
            .schema_validation(false);
        let store = DocumentStore::new(Some(Arc::new(schema)));
        store.begin();
        for (author, n) in [("b", 1), ("a", 2), ("b", 3), ("c", 4)] {
            store
                .insert("messages", Value::from(json!({"author": author, "n": n})))
                .unwrap();
        }
        store
    }

    fn ns(docs: &[Document]) -> Vec<f64> {
        docs.iter().filter_map(|d| d.get("n")?.as_f64()).collect()
    }

    #[test]
    fn full_scan_orders_by_creation() {
        let store = store();
        let mut plan = QueryPlan::full_table_scan("messages");
        assert_eq!(ns(&execute(&store, &plan).unwrap()), vec![1.0, 2.0, 3.0, 4.0]);

        plan.source = QuerySource::FullTableScan {
            table: "messages".into(),
            order: Order::Desc,
        };
        assert_eq!(ns(&execute(&store, &plan).unwrap()), vec![4.0, 3.0, 2.0, 1.0]);
    }

    #[test]
    fn index_range_sorts_by_index_key() {
        let store = store();
        let plan = QueryPlan {
            source: QuerySource::IndexRange {
                table: "messages".into(),
                index: "by_author".into(),
                range: vec![],
                order: Order::Asc,
            },
            operators: vec![],
        };
        assert_eq!(ns(&execute(&store, &plan).unwrap()), vec![2.0, 1.0, 3.0, 4.0]);
    }

    #[test]
    fn index_range_filters() {
        let store = store();
        let plan = QueryPlan {
            source: QuerySource::IndexRange {
                table: "messages".into(),
                index: "by_author".into(),
                range: vec![RangeExpression {
                    field_path: "author".into(),
                    op: RangeOp::Eq,
                    value: Some(Value::from("b")),
                }],
                order: Order::Desc,
            },
            operators: vec![],
        };
        assert_eq!(ns(&execute(&store, &plan).unwrap()), vec![3.0, 1.0]);
    }

    #[test]
    fn unknown_index_fails() {
        let store = store();
        let plan = QueryPlan {
            source: QuerySource::IndexRange {
                table: "messages".into(),
                index: "nope".into(),
                range: vec![],
                order: Order::Asc,
            },
            operators: vec![],
        };
        assert!(matches!(
            execute(&store, &plan),
            Err(CoreError::IndexNotFound { .. })
        ));
    }

    #[test]
    fn filter_then_limit() {
        let store = store();
        let q = FilterBuilder;
        let plan = QueryPlan {
            source: QuerySource::FullTableScan {
                table: "messages".into(),
                order: Order::Asc,
            },
            operators: vec![
                QueryOperator::Filter(q.gt(q.field("n"), 1.0)),
                QueryOperator::Limit(2),
            ],
        };
        assert_eq!(ns(&execute(&store, &plan).unwrap()), vec![2.0, 3.0]);
    }

    #[test]
    fn search_source() {
        let store = store();
        let plan = QueryPlan {
            source: QuerySource::Search {
                table: "messages".into(),
                index: "search_author".into(),
                filters: vec![crate::query::plan::SearchFilter::Search {
                    field_path: "author".into(),
                    query: "B".into(),
                }],
            },
            operators: vec![],
        };
        assert_eq!(ns(&execute(&store, &plan).unwrap()), vec![1.0, 3.0]);
    }

    #[test]
    fn pagination_walks_all_pages() {
        let store = store();
        let plan = QueryPlan::full_table_scan("messages");

        let first = paginate(&store, &plan, &PaginationOptions::first(2)).unwrap();
        assert_eq!(ns(&first.page), vec![1.0, 2.0]);
        assert!(!first.is_done);

        let second =
            paginate(&store, &plan, &PaginationOptions::after(&first.continue_cursor, 2)).unwrap();
        assert_eq!(ns(&second.page), vec![3.0, 4.0]);
        assert!(!second.is_done);

        let third =
            paginate(&store, &plan, &PaginationOptions::after(&second.continue_cursor, 2)).unwrap();
        assert!(third.page.is_empty());
        assert!(third.is_done);
        assert_eq!(third.continue_cursor, END_CURSOR);
    }

    #[test]
    fn pagination_short_last_page_is_done() {
        let store = store();
        let plan = QueryPlan::full_table_scan("messages");
        let page = paginate(&store, &plan, &PaginationOptions::first(10)).unwrap();
        assert_eq!(page.page.len(), 4);
        assert!(page.is_done);
    }

    #[test]
    fn zero_page_size_rejected() {
        let store = store();
        let plan = QueryPlan::full_table_scan("messages");
        assert!(paginate(&store, &plan, &PaginationOptions::first(0)).is_err());
    }
}

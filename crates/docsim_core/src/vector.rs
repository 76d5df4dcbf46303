//! Brute-force vector search over a declared vector index.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::query::Expression;
use crate::store::DocumentStore;
use crate::types::Document;
use docsim_values::{compare_keys, DocumentId, Value, CREATION_TIME_FIELD, ID_FIELD};
use std::cmp::Ordering;

/// A vector search request.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearchQuery {
    /// Query embedding; must match the index dimensions.
    pub vector: Vec<f64>,
    /// Maximum number of results; the configured default when `None`.
    pub limit: Option<usize>,
    /// Documents for which this is not truthy are excluded before scoring.
    pub filter: Option<Expression>,
}

impl VectorSearchQuery {
    /// Searches for `vector` with the default limit and no filter.
    #[must_use]
    pub fn new(vector: Vec<f64>) -> Self {
        Self {
            vector,
            limit: None,
            filter: None,
        }
    }

    /// Sets the result limit.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the filter.
    #[must_use]
    pub fn filter(mut self, filter: Expression) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// One scored match.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearchResult {
    /// Matching document.
    pub id: DocumentId,
    /// Cosine similarity with the query; higher is closer.
    pub score: f64,
}

/// Scores every candidate of `table` against the query.
///
/// Ties keep scan order `(_creationTime, _id)`.
pub fn vector_search(
    store: &DocumentStore,
    config: &Config,
    table: &str,
    index: &str,
    query: &VectorSearchQuery,
) -> CoreResult<Vec<VectorSearchResult>> {
    let definition = store
        .schema()
        .ok_or_else(|| CoreError::VectorIndexNotFound {
            table: table.to_string(),
            index: index.to_string(),
        })?
        .vector_index(table, index)?;

    let limit = query.limit.unwrap_or(config.default_vector_limit);
    if limit == 0 || limit > config.max_vector_limit {
        return Err(CoreError::invalid_query(format!(
            "vector search limit must be between 1 and {}, got {limit}",
            config.max_vector_limit
        )));
    }
    if query.vector.len() != definition.dimensions {
        return Err(CoreError::invalid_query(format!(
            "query vector has {} dimensions but index {table}.{index} expects {}",
            query.vector.len(),
            definition.dimensions
        )));
    }

    let mut candidates = store.table_documents(table);
    sort_by_creation(&mut candidates);

    let mut results = Vec::new();
    for doc in &candidates {
        if let Some(filter) = &query.filter {
            if !filter.matches(doc)? {
                continue;
            }
        }
        let Some(embedding) = embedding(doc, &definition.vector_field, definition.dimensions) else {
            continue;
        };
        results.push(VectorSearchResult {
            id: doc.id().clone(),
            score: cosine_similarity(&query.vector, &embedding),
        });
    }

    // stable: equal scores stay in scan order
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    results.truncate(limit);
    Ok(results)
}

fn sort_by_creation(docs: &mut [Document]) {
    docs.sort_by(|a, b| {
        compare_keys(
            &[a.get(CREATION_TIME_FIELD), a.get(ID_FIELD)],
            &[b.get(CREATION_TIME_FIELD), b.get(ID_FIELD)],
        )
    });
}

fn embedding(doc: &Document, field: &str, dimensions: usize) -> Option<Vec<f64>> {
    let Value::Array(items) = doc.get(field)? else {
        return None;
    };
    if items.len() != dimensions {
        return None;
    }
    items.iter().map(Value::as_f64).collect()
}

/// Cosine similarity: `dot(a, b) / (|a| * |b|)`.
///
/// Returns 0.0 if either vector has zero norm.
#[must_use]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

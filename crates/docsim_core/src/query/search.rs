//! Search index filters and token-prefix matching.

use super::plan::SearchFilter;
use crate::error::{CoreError, CoreResult};
use crate::schema::SearchIndexDefinition;
use crate::types::Document;
use docsim_values::{values_equal, Value};

/// Builder handed to `Query::with_search_index` closures.
#[derive(Debug, Clone, Default)]
pub struct SearchFilterBuilder {
    filters: Vec<SearchFilter>,
}

impl SearchFilterBuilder {
    /// Full-text match of `query` against `field`.
    #[must_use]
    pub fn search(mut self, field: impl Into<String>, query: impl Into<String>) -> Self {
        self.filters.push(SearchFilter::Search {
            field_path: field.into(),
            query: query.into(),
        });
        self
    }

    /// Equality on a filter field.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(SearchFilter::Eq {
            field_path: field.into(),
            value: Some(value.into()),
        });
        self
    }

    /// The filter field is undefined.
    #[must_use]
    pub fn eq_undefined(mut self, field: impl Into<String>) -> Self {
        self.filters.push(SearchFilter::Eq {
            field_path: field.into(),
            value: None,
        });
        self
    }

    pub(crate) fn into_filters(self) -> Vec<SearchFilter> {
        self.filters
    }
}

/// Checks that every filter targets a field the index declares.
pub fn validate_search(index: &SearchIndexDefinition, filters: &[SearchFilter]) -> CoreResult<()> {
    let mut searches = 0;
    for filter in filters {
        match filter {
            SearchFilter::Search { field_path, .. } => {
                if field_path != &index.search_field {
                    return Err(CoreError::invalid_query(format!(
                        "search index {} searches field \"{}\", not \"{field_path}\"",
                        index.name, index.search_field
                    )));
                }
                searches += 1;
            }
            SearchFilter::Eq { field_path, .. } => {
                if !index.filter_fields.contains(field_path) {
                    return Err(CoreError::invalid_query(format!(
                        "field \"{field_path}\" is not a filter field of search index {}",
                        index.name
                    )));
                }
            }
        }
    }
    if searches != 1 {
        return Err(CoreError::invalid_query(format!(
            "a search query needs exactly one .search() clause, got {searches}"
        )));
    }
    Ok(())
}

/// Returns true if `doc` passes every filter.
#[must_use]
pub fn matches_search(doc: &Document, filters: &[SearchFilter]) -> bool {
    filters.iter().all(|filter| match filter {
        SearchFilter::Search { field_path, query } => match doc.get(field_path) {
            Some(Value::String(text)) => text_matches(query, &text),
            _ => false,
        },
        SearchFilter::Eq { field_path, value } => {
            values_equal(doc.get(field_path).as_ref(), value.as_ref())
        }
    })
}

/// Splits text into lowercase whitespace-delimited tokens.
fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// True when every query term is a prefix of some word of `text`.
#[must_use]
pub fn text_matches(query: &str, text: &str) -> bool {
    let words = tokenize(text);
    tokenize(query)
        .iter()
        .all(|term| words.iter().any(|word| word.starts_with(term.as_str())))
}

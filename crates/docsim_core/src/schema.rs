//! Schema definitions: table validators and declared indexes.

use crate::error::{CoreError, CoreResult};
use docsim_values::{Validator, Value, CREATION_TIME_FIELD, ID_FIELD};
use std::collections::BTreeMap;

/// Built-in index ordering every table by id.
pub const BY_ID_INDEX: &str = "by_id";

/// Built-in index ordering every table by creation time.
pub const BY_CREATION_TIME_INDEX: &str = "by_creation_time";

/// A declared database index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    /// Index name, unique within its table.
    pub name: String,
    /// Indexed field paths, in order.
    pub fields: Vec<String>,
}

/// A declared full-text search index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchIndexDefinition {
    /// Index name.
    pub name: String,
    /// The string field searched.
    pub search_field: String,
    /// Fields usable in equality filters.
    pub filter_fields: Vec<String>,
}

/// A declared vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndexDefinition {
    /// Index name.
    pub name: String,
    /// The field holding the embedding.
    pub vector_field: String,
    /// Embedding dimension.
    pub dimensions: usize,
    /// Fields usable in filters.
    pub filter_fields: Vec<String>,
}

/// One table of a schema.
#[derive(Debug, Clone)]
pub struct TableDefinition {
    document: Validator,
    indexes: Vec<IndexDefinition>,
    search_indexes: Vec<SearchIndexDefinition>,
    vector_indexes: Vec<VectorIndexDefinition>,
}

impl TableDefinition {
    /// Creates a table whose documents must match `document`.
    #[must_use]
    pub fn new(document: Validator) -> Self {
        Self {
            document,
            indexes: Vec::new(),
            search_indexes: Vec::new(),
            vector_indexes: Vec::new(),
        }
    }

    /// Declares an index over `fields`.
    #[must_use]
    pub fn index<I, S>(mut self, name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes.push(IndexDefinition {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Declares a search index.
    #[must_use]
    pub fn search_index<I, S>(
        mut self,
        name: impl Into<String>,
        search_field: impl Into<String>,
        filter_fields: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_indexes.push(SearchIndexDefinition {
            name: name.into(),
            search_field: search_field.into(),
            filter_fields: filter_fields.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Declares a vector index.
    #[must_use]
    pub fn vector_index<I, S>(
        mut self,
        name: impl Into<String>,
        vector_field: impl Into<String>,
        dimensions: usize,
        filter_fields: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vector_indexes.push(VectorIndexDefinition {
            name: name.into(),
            vector_field: vector_field.into(),
            dimensions,
            filter_fields: filter_fields.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Returns the document validator.
    #[must_use]
    pub fn document_validator(&self) -> &Validator {
        &self.document
    }
}

/// A database schema.
#[derive(Debug, Clone)]
pub struct Schema {
    tables: BTreeMap<String, TableDefinition>,
    schema_validation: bool,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            tables: BTreeMap::new(),
            schema_validation: true,
        }
    }
}

impl Schema {
    /// Creates an empty schema with validation on.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a table.
    #[must_use]
    pub fn table(mut self, name: impl Into<String>, definition: TableDefinition) -> Self {
        self.tables.insert(name.into(), definition);
        self
    }

    /// Turns document validation on or off. Indexes stay declared either way.
    #[must_use]
    pub fn schema_validation(mut self, enabled: bool) -> Self {
        self.schema_validation = enabled;
        self
    }

    /// Returns whether writes are validated.
    #[must_use]
    pub fn validation_enabled(&self) -> bool {
        self.schema_validation
    }

    /// Returns a table definition.
    #[must_use]
    pub fn table_definition(&self, table: &str) -> Option<&TableDefinition> {
        self.tables.get(table)
    }

    /// Validates the user fields of a document about to be written.
    pub fn validate_document(&self, table: &str, fields: &BTreeMap<String, Value>) -> CoreResult<()> {
        if !self.schema_validation {
            return Ok(());
        }
        let definition = self
            .tables
            .get(table)
            .ok_or_else(|| CoreError::TableNotInSchema {
                table: table.to_string(),
            })?;
        definition.document.validate_fields(fields)?;
        Ok(())
    }

    /// Looks up a search index.
    pub fn search_index(&self, table: &str, index: &str) -> CoreResult<&SearchIndexDefinition> {
        self.tables
            .get(table)
            .and_then(|t| t.search_indexes.iter().find(|i| i.name == index))
            .ok_or_else(|| CoreError::SearchIndexNotFound {
                table: table.to_string(),
                index: index.to_string(),
            })
    }

    /// Looks up a vector index.
    pub fn vector_index(&self, table: &str, index: &str) -> CoreResult<&VectorIndexDefinition> {
        self.tables
            .get(table)
            .and_then(|t| t.vector_indexes.iter().find(|i| i.name == index))
            .ok_or_else(|| CoreError::VectorIndexNotFound {
                table: table.to_string(),
                index: index.to_string(),
            })
    }
}

/// Resolves the full key fields of an index: declared fields followed by
/// `_creationTime` and `_id`.
///
/// The built-in `by_id` and `by_creation_time` indexes exist on every table,
/// with or without a schema.
pub fn index_key_fields(schema: Option<&Schema>, table: &str, index: &str) -> CoreResult<Vec<String>> {
    match index {
        BY_ID_INDEX => return Ok(vec![ID_FIELD.to_string()]),
        BY_CREATION_TIME_INDEX => {
            return Ok(vec![CREATION_TIME_FIELD.to_string(), ID_FIELD.to_string()])
        }
        _ => {}
    }
    let declared = schema
        .and_then(|s| s.tables.get(table))
        .and_then(|t| t.indexes.iter().find(|i| i.name == index))
        .ok_or_else(|| CoreError::IndexNotFound {
            table: table.to_string(),
            index: index.to_string(),
        })?;
    let mut fields = declared.fields.clone();
    fields.push(CREATION_TIME_FIELD.to_string());
    fields.push(ID_FIELD.to_string());
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsim_values::v;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new().table(
            "messages",
            TableDefinition::new(v::object([("author", v::string()), ("body", v::string())]))
                .index("by_author", ["author"])
                .search_index("search_body", "body", ["author"])
                .vector_index("by_embedding", "embedding", 3, Vec::<String>::new()),
        )
    }

    fn fields(j: serde_json::Value) -> BTreeMap<String, Value> {
        Value::from(j).into_object().unwrap()
    }

    #[test]
    fn index_fields_get_system_suffix() {
        let schema = schema();
        assert_eq!(
            index_key_fields(Some(&schema), "messages", "by_author").unwrap(),
            vec!["author", "_creationTime", "_id"]
        );
        assert_eq!(
            index_key_fields(None, "anything", BY_CREATION_TIME_INDEX).unwrap(),
            vec!["_creationTime", "_id"]
        );
        assert!(matches!(
            index_key_fields(Some(&schema), "messages", "nope"),
            Err(CoreError::IndexNotFound { .. })
        ));
    }

    #[test]
    fn validation_checks_declared_tables() {
        let schema = schema();
        assert!(schema
            .validate_document("messages", &fields(json!({"author": "a", "body": "b"})))
            .is_ok());
        assert!(schema
            .validate_document("messages", &fields(json!({"author": "a"})))
            .is_err());
        assert!(matches!(
            schema.validate_document("other", &fields(json!({}))),
            Err(CoreError::TableNotInSchema { .. })
        ));
    }

    #[test]
    fn validation_can_be_disabled() {
        let schema = schema().schema_validation(false);
        assert!(schema.validate_document("other", &fields(json!({"x": 1}))).is_ok());
    }

    #[test]
    fn search_and_vector_lookup() {
        let schema = schema();
        assert_eq!(
            schema.search_index("messages", "search_body").unwrap().search_field,
            "body"
        );
        assert_eq!(schema.vector_index("messages", "by_embedding").unwrap().dimensions, 3);
        assert!(schema.vector_index("messages", "x").is_err());
    }
}

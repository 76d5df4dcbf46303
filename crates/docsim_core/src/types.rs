//! Core type definitions for docsim.

use crate::error::{CoreError, CoreResult};
use docsim_values::{DocumentId, Value, CREATION_TIME_FIELD, ID_FIELD};
use std::collections::BTreeMap;
use std::fmt;

/// Unique identifier for a transaction.
///
/// Transaction IDs are monotonically increasing and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// The kind of a registered function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// Read-only, deterministic.
    Query,
    /// Transactional read-write.
    Mutation,
    /// Free to call other functions and run side effects.
    Action,
    /// HTTP endpoint, run like an action.
    HttpAction,
}

impl FunctionKind {
    /// Returns the lower-case kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Action => "action",
            Self::HttpAction => "httpAction",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored document: user fields plus the two system fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: DocumentId,
    creation_time: f64,
    fields: BTreeMap<String, Value>,
}

impl Document {
    pub(crate) fn new(id: DocumentId, creation_time: f64, fields: BTreeMap<String, Value>) -> Self {
        Self {
            id,
            creation_time,
            fields,
        }
    }

    /// Returns the document id.
    #[must_use]
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Returns the creation time in milliseconds since the Unix epoch.
    #[must_use]
    pub fn creation_time(&self) -> f64 {
        self.creation_time
    }

    /// Returns the user fields.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub(crate) fn into_fields(self) -> BTreeMap<String, Value> {
        self.fields
    }

    /// Resolves a dotted field path, including `_id` and `_creationTime`.
    ///
    /// Returns `None` (undefined) when any segment is missing or is not an
    /// object.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Value> {
        match path {
            ID_FIELD => Some(Value::from(&self.id)),
            CREATION_TIME_FIELD => Some(Value::Float64(self.creation_time)),
            _ => {
                let (head, rest) = match path.split_once('.') {
                    Some((head, rest)) => (head, Some(rest)),
                    None => (path, None),
                };
                let value = self.fields.get(head)?;
                match rest {
                    None => Some(value.clone()),
                    Some(rest) => value.get_path(rest).cloned(),
                }
            }
        }
    }

    /// Returns the string value of a top-level field.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Returns the document as an object value with system fields included.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert(ID_FIELD.to_string(), Value::from(&self.id));
        map.insert(
            CREATION_TIME_FIELD.to_string(),
            Value::Float64(self.creation_time),
        );
        Value::Object(map)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.to_value()
    }
}

impl From<&Document> for Value {
    fn from(doc: &Document) -> Self {
        doc.to_value()
    }
}

/// A shallow update: each entry either sets a field or removes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    entries: BTreeMap<String, Option<Value>>,
}

impl Patch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(field.into(), Some(value.into()));
        self
    }

    /// Removes a field.
    #[must_use]
    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.entries.insert(field.into(), None);
        self
    }

    /// Builds a patch from an object value. Every key is a set.
    pub fn from_value(value: Value) -> CoreResult<Self> {
        let map = value
            .into_object()
            .ok_or_else(|| CoreError::invalid_operation("patch value must be an object"))?;
        Ok(Self {
            entries: map.into_iter().map(|(k, v)| (k, Some(v))).collect(),
        })
    }

    /// Returns true if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries; `None` means unset.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Option<Value>)> {
        self.entries.iter()
    }
}

impl From<BTreeMap<String, Value>> for Patch {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self {
            entries: map.into_iter().map(|(k, v)| (k, Some(v))).collect(),
        }
    }
}

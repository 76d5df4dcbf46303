//! Document identifiers.

use crate::error::{ValueError, ValueResult};
use std::fmt;

/// Unique identifier for a document.
///
/// Ids have the form `<sequence>;<table>`, so the owning table can be
/// recovered without a lookup. Ids are never reused within a store.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(String);

impl DocumentId {
    /// Creates an id for the given sequence number and table.
    #[must_use]
    pub fn new(sequence: u64, table: &str) -> Self {
        Self(format!("{sequence};{table}"))
    }

    /// Parses an id string.
    pub fn parse(s: &str) -> ValueResult<Self> {
        let Some((seq, table)) = s.split_once(';') else {
            return Err(ValueError::invalid_id(s));
        };
        if seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit()) || table.is_empty() {
            return Err(ValueError::invalid_id(s));
        }
        Ok(Self(s.to_string()))
    }

    /// Returns the owning table name.
    #[must_use]
    pub fn table(&self) -> &str {
        self.0.split_once(';').map_or("", |(_, table)| table)
    }

    /// Returns the sequence component.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.0
            .split_once(';')
            .and_then(|(seq, _)| seq.parse().ok())
            .unwrap_or(0)
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DocumentId {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<DocumentId> for crate::Value {
    fn from(id: DocumentId) -> Self {
        crate::Value::String(id.0)
    }
}

impl From<&DocumentId> for crate::Value {
    fn from(id: &DocumentId) -> Self {
        crate::Value::String(id.0.clone())
    }
}

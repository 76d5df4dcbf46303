//! Error types for the values crate.

use thiserror::Error;

/// Result type for value operations.
pub type ValueResult<T> = Result<T, ValueError>;

/// Errors raised while building or checking values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A document id string could not be parsed.
    #[error("invalid document id: {id:?}")]
    InvalidId {
        /// The rejected id string.
        id: String,
    },

    /// A table name violates the naming rules.
    #[error("invalid table name {name:?}: {reason}")]
    InvalidTableName {
        /// The rejected name.
        name: String,
        /// Which rule was violated.
        reason: String,
    },

    /// A field name violates the naming rules.
    #[error("invalid field name {name:?}: {reason}")]
    InvalidFieldName {
        /// The rejected name.
        name: String,
        /// Which rule was violated.
        reason: String,
    },

    /// A value has the wrong shape for the requested operation.
    #[error("unexpected value: {message}")]
    Unexpected {
        /// Description of the mismatch.
        message: String,
    },
}

impl ValueError {
    /// Creates an invalid id error.
    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId { id: id.into() }
    }

    /// Creates an invalid table name error.
    pub fn invalid_table_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTableName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid field name error.
    pub fn invalid_field_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFieldName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unexpected value error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }
}

/// A value failed to match a declared validator.
///
/// `path` is the dotted path from the validated root to the offending
/// field (empty for the root itself).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}{}", render_path(.path))]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub path: String,
    /// Human-readable description.
    pub message: String,
}

fn render_path(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" (path: {path})")
    }
}

impl ValidationError {
    /// Creates a validation error at `path`.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display_includes_path() {
        let err = ValidationError::new(".author", "expected v.string()");
        assert_eq!(err.to_string(), "expected v.string() (path: .author)");

        let root = ValidationError::new("", "expected v.null()");
        assert_eq!(root.to_string(), "expected v.null()");
    }

    #[test]
    fn constructors() {
        assert!(matches!(
            ValueError::invalid_id("nope"),
            ValueError::InvalidId { .. }
        ));
        let err = ValueError::invalid_field_name("$x", "must not start with '$'");
        assert!(err.to_string().contains("$x"));
    }
}

//! Naming rules for tables and fields.

use crate::error::{ValueError, ValueResult};
use crate::value::Value;

/// Longest accepted table name.
pub const MAX_TABLE_NAME_LENGTH: usize = 64;

/// Longest accepted field name.
pub const MAX_FIELD_NAME_LENGTH: usize = 1024;

/// System field holding the document id.
pub const ID_FIELD: &str = "_id";

/// System field holding the creation timestamp.
pub const CREATION_TIME_FIELD: &str = "_creationTime";

/// Returns true for names reserved for system tables.
#[must_use]
pub fn is_system_table(name: &str) -> bool {
    name.starts_with('_')
}

/// Checks a user table name.
pub fn validate_table_name(name: &str) -> ValueResult<()> {
    if name.is_empty() {
        return Err(ValueError::invalid_table_name(name, "must not be empty"));
    }
    if name.len() > MAX_TABLE_NAME_LENGTH {
        return Err(ValueError::invalid_table_name(
            name,
            format!("must be at most {MAX_TABLE_NAME_LENGTH} characters"),
        ));
    }
    if is_system_table(name) {
        return Err(ValueError::invalid_table_name(
            name,
            "names starting with '_' are reserved for system tables",
        ));
    }
    let mut chars = name.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return Err(ValueError::invalid_table_name(
            name,
            "must start with a letter",
        ));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValueError::invalid_table_name(
            name,
            "may only contain letters, digits and '_'",
        ));
    }
    Ok(())
}

/// Checks a field name. Top-level fields additionally may not start with `_`.
pub fn validate_field_name(name: &str, top_level: bool) -> ValueResult<()> {
    if name.is_empty() {
        return Err(ValueError::invalid_field_name(name, "must not be empty"));
    }
    if name.len() > MAX_FIELD_NAME_LENGTH {
        return Err(ValueError::invalid_field_name(
            name,
            format!("must be at most {MAX_FIELD_NAME_LENGTH} characters"),
        ));
    }
    if name.starts_with('$') {
        return Err(ValueError::invalid_field_name(
            name,
            "must not start with '$'",
        ));
    }
    if top_level && name.starts_with('_') {
        return Err(ValueError::invalid_field_name(
            name,
            "top-level fields starting with '_' are reserved",
        ));
    }
    if !name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err(ValueError::invalid_field_name(
            name,
            "must only contain printable ASCII characters",
        ));
    }
    Ok(())
}

/// Checks every nested object key of a value.
pub fn validate_nested_fields(value: &Value) -> ValueResult<()> {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                validate_field_name(k, false)?;
                validate_nested_fields(v)?;
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(validate_nested_fields),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_names() {
        assert!(validate_table_name("messages").is_ok());
        assert!(validate_table_name("user_profiles2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("_storage").is_err());
        assert!(validate_table_name("2fast").is_err());
        assert!(validate_table_name("has-dash").is_err());
        assert!(validate_table_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn field_names() {
        assert!(validate_field_name("body", true).is_ok());
        assert!(validate_field_name("_private", false).is_ok());
        assert!(validate_field_name("_private", true).is_err());
        assert!(validate_field_name("$op", false).is_err());
        assert!(validate_field_name("", false).is_err());
        assert!(validate_field_name("caf\u{e9}", false).is_err());
    }

    #[test]
    fn nested_fields_checked() {
        let ok = Value::from(json!({"a": [{"b": 1}]}));
        assert!(validate_nested_fields(&ok).is_ok());
        let bad = Value::from(json!({"a": [{"$b": 1}]}));
        assert!(validate_nested_fields(&bad).is_err());
    }
}

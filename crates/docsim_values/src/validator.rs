//! Declarative value validators.
//!
//! A [`Validator`] is a closed tree describing an accepted shape. It is
//! interpreted by [`Validator::validate`], which reports the path of the
//! first offending field.
//!
//! ```
//! use docsim_values::{v, Value};
//!
//! let message = v::object([("author", v::string()), ("body", v::string())]);
//! let ok = Value::object([("author", Value::from("sarah")), ("body", Value::from("hi"))]);
//! assert!(message.validate(Some(&ok)).is_ok());
//! ```

use crate::compare::values_equal;
use crate::error::ValidationError;
use crate::id::DocumentId;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A value validator.
#[derive(Debug, Clone, PartialEq)]
pub enum Validator {
    /// Accepts `null`.
    Null,
    /// Accepts numbers (`Float64`).
    Float64,
    /// Accepts bigints (`Int64`).
    Int64,
    /// Accepts booleans.
    Boolean,
    /// Accepts strings.
    String,
    /// Accepts byte strings.
    Bytes,
    /// Accepts any defined value.
    Any,
    /// Accepts exactly this value.
    Literal(Value),
    /// Accepts ids of the named table.
    Id(String),
    /// Accepts arrays whose elements all match.
    Array(Box<Validator>),
    /// Accepts objects with exactly these fields.
    Object(BTreeMap<String, Validator>),
    /// Accepts objects whose keys and values all match.
    Record(Box<Validator>, Box<Validator>),
    /// Accepts values matching any member.
    Union(Vec<Validator>),
    /// Accepts a missing value or the inner shape. Meaningful as an object field.
    Optional(Box<Validator>),
}

/// Validator constructors mirroring the schema DSL.
pub mod v {
    use super::Validator;
    use crate::value::Value;

    /// `v.null()`
    #[must_use]
    pub fn null() -> Validator {
        Validator::Null
    }

    /// `v.number()`
    #[must_use]
    pub fn number() -> Validator {
        Validator::Float64
    }

    /// `v.int64()`
    #[must_use]
    pub fn int64() -> Validator {
        Validator::Int64
    }

    /// `v.boolean()`
    #[must_use]
    pub fn boolean() -> Validator {
        Validator::Boolean
    }

    /// `v.string()`
    #[must_use]
    pub fn string() -> Validator {
        Validator::String
    }

    /// `v.bytes()`
    #[must_use]
    pub fn bytes() -> Validator {
        Validator::Bytes
    }

    /// `v.any()`
    #[must_use]
    pub fn any() -> Validator {
        Validator::Any
    }

    /// `v.literal(value)`
    pub fn literal(value: impl Into<Value>) -> Validator {
        Validator::Literal(value.into())
    }

    /// `v.id(table)`
    pub fn id(table: impl Into<String>) -> Validator {
        Validator::Id(table.into())
    }

    /// `v.array(element)`
    #[must_use]
    pub fn array(element: Validator) -> Validator {
        Validator::Array(Box::new(element))
    }

    /// `v.object({...})`
    pub fn object<K, I>(fields: I) -> Validator
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Validator)>,
    {
        Validator::Object(fields.into_iter().map(|(k, f)| (k.into(), f)).collect())
    }

    /// `v.record(keys, values)`
    #[must_use]
    pub fn record(keys: Validator, values: Validator) -> Validator {
        Validator::Record(Box::new(keys), Box::new(values))
    }

    /// `v.union(...)`
    pub fn union(members: impl IntoIterator<Item = Validator>) -> Validator {
        Validator::Union(members.into_iter().collect())
    }

    /// `v.optional(inner)`
    #[must_use]
    pub fn optional(inner: Validator) -> Validator {
        Validator::Optional(Box::new(inner))
    }
}

impl Validator {
    /// Returns true if this validator accepts a missing value.
    #[must_use]
    pub fn is_optional(&self) -> bool {
        matches!(self, Validator::Optional(_))
    }

    /// Validates a possibly-missing value.
    pub fn validate(&self, value: Option<&Value>) -> Result<(), ValidationError> {
        self.validate_at(value, &mut String::new())
    }

    /// Validates the fields of an object without requiring the wrapper value.
    pub fn validate_fields(&self, fields: &BTreeMap<String, Value>) -> Result<(), ValidationError> {
        match self {
            Validator::Object(shape) => validate_object(shape, fields, &mut String::new()),
            Validator::Any => Ok(()),
            Validator::Union(members) => {
                if members
                    .iter()
                    .any(|m| m.validate_fields(fields).is_ok())
                {
                    Ok(())
                } else {
                    Err(mismatch(self, Some(&Value::Object(fields.clone())), ""))
                }
            }
            other => Err(mismatch(other, Some(&Value::Object(fields.clone())), "")),
        }
    }

    fn validate_at(&self, value: Option<&Value>, path: &mut String) -> Result<(), ValidationError> {
        let Some(value) = value else {
            return match self {
                Validator::Optional(_) => Ok(()),
                _ => Err(ValidationError::new(
                    path.clone(),
                    format!("missing required value, expected {self}"),
                )),
            };
        };

        let ok = match self {
            Validator::Null => value.is_null(),
            Validator::Float64 => matches!(value, Value::Float64(_)),
            Validator::Int64 => matches!(value, Value::Int64(_)),
            Validator::Boolean => matches!(value, Value::Boolean(_)),
            Validator::String => matches!(value, Value::String(_)),
            Validator::Bytes => matches!(value, Value::Bytes(_)),
            Validator::Any => true,
            Validator::Literal(expected) => values_equal(Some(expected), Some(value)),
            Validator::Id(table) => value
                .as_str()
                .and_then(|s| DocumentId::parse(s).ok())
                .is_some_and(|id| id.table() == table),
            Validator::Optional(inner) => return inner.validate_at(Some(value), path),
            Validator::Array(element) => {
                let Value::Array(items) = value else {
                    return Err(mismatch(self, Some(value), path));
                };
                for (i, item) in items.iter().enumerate() {
                    let len = path.len();
                    path.push_str(&format!("[{i}]"));
                    element.validate_at(Some(item), path)?;
                    path.truncate(len);
                }
                true
            }
            Validator::Object(shape) => {
                let Value::Object(fields) = value else {
                    return Err(mismatch(self, Some(value), path));
                };
                return validate_object(shape, fields, path);
            }
            Validator::Record(keys, values) => {
                let Value::Object(fields) = value else {
                    return Err(mismatch(self, Some(value), path));
                };
                for (k, v) in fields {
                    let len = path.len();
                    path.push('.');
                    path.push_str(k);
                    keys.validate_at(Some(&Value::String(k.clone())), path)?;
                    values.validate_at(Some(v), path)?;
                    path.truncate(len);
                }
                true
            }
            Validator::Union(members) => members
                .iter()
                .any(|m| m.validate_at(Some(value), &mut path.clone()).is_ok()),
        };

        if ok {
            Ok(())
        } else {
            Err(mismatch(self, Some(value), path))
        }
    }
}

fn validate_object(
    shape: &BTreeMap<String, Validator>,
    fields: &BTreeMap<String, Value>,
    path: &mut String,
) -> Result<(), ValidationError> {
    for (name, field_validator) in shape {
        let len = path.len();
        path.push('.');
        path.push_str(name);
        match fields.get(name) {
            None if !field_validator.is_optional() => {
                return Err(ValidationError::new(
                    path.clone(),
                    format!("object is missing the required field `{name}`"),
                ));
            }
            value => field_validator.validate_at(value, path)?,
        }
        path.truncate(len);
    }
    if let Some(extra) = fields.keys().find(|k| !shape.contains_key(*k)) {
        let mut extra_path = path.clone();
        extra_path.push('.');
        extra_path.push_str(extra);
        return Err(ValidationError::new(
            extra_path,
            format!("object contains extra field `{extra}` that is not in the validator"),
        ));
    }
    Ok(())
}

fn mismatch(validator: &Validator, value: Option<&Value>, path: &str) -> ValidationError {
    let found = match value {
        Some(v) => format!("{} {v}", v.type_name()),
        None => "undefined".to_string(),
    };
    ValidationError::new(
        path,
        format!("value does not match validator: expected {validator}, found {found}"),
    )
}

impl fmt::Display for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validator::Null => write!(f, "v.null()"),
            Validator::Float64 => write!(f, "v.number()"),
            Validator::Int64 => write!(f, "v.int64()"),
            Validator::Boolean => write!(f, "v.boolean()"),
            Validator::String => write!(f, "v.string()"),
            Validator::Bytes => write!(f, "v.bytes()"),
            Validator::Any => write!(f, "v.any()"),
            Validator::Literal(value) => write!(f, "v.literal({value})"),
            Validator::Id(table) => write!(f, "v.id({table:?})"),
            Validator::Array(element) => write!(f, "v.array({element})"),
            Validator::Object(shape) => {
                write!(f, "v.object({{")?;
                for (i, (k, field)) in shape.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {field}")?;
                }
                write!(f, "}})")
            }
            Validator::Record(keys, values) => write!(f, "v.record({keys}, {values})"),
            Validator::Union(members) => {
                write!(f, "v.union(")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{m}")?;
                }
                write!(f, ")")
            }
            Validator::Optional(inner) => write!(f, "v.optional({inner})"),
        }
    }
}

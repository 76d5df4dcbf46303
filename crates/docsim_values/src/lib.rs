//! # docsim values
//!
//! Value model shared by every docsim crate.
//!
//! This crate provides:
//! - [`Value`], the dynamic document value (with `undefined` modelled as `None`)
//! - [`compare_values`], the total order used for sorting and index ranges
//! - [`Validator`], the declarative shape checker behind schemas and function arguments
//! - Table and field naming rules
//! - [`DocumentId`], identifiers that encode their owning table
//!
//! ## Usage
//!
//! ```
//! use docsim_values::{compare_values, v, Value};
//! use std::cmp::Ordering;
//!
//! let a = Value::from("apple");
//! assert_eq!(compare_values(None, Some(&a)), Ordering::Less);
//! assert!(v::string().validate(Some(&a)).is_ok());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compare;
mod error;
mod id;
pub mod identifier;
mod validator;
mod value;

pub use compare::{compare_keys, compare_values, values_equal};
pub use error::{ValidationError, ValueError, ValueResult};
pub use id::DocumentId;
pub use identifier::{CREATION_TIME_FIELD, ID_FIELD};
pub use validator::{v, Validator};
pub use value::Value;

//! Filter expressions evaluated against documents.

use crate::error::{CoreError, CoreResult};
use crate::types::Document;
use docsim_values::{compare_values, values_equal, DocumentId, Value};
use std::cmp::Ordering;

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Remainder.
    Mod,
}

impl ArithmeticOp {
    const fn verb(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "subtract",
            Self::Mul => "multiply",
            Self::Div => "divide",
            Self::Mod => "take the remainder of",
        }
    }
}

/// A filter expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Reads a dotted field path.
    Field(String),
    /// A constant; `None` is undefined.
    Literal(Option<Value>),
    /// Equality under the value comparator.
    Eq(Box<Expression>, Box<Expression>),
    /// Inequality.
    Neq(Box<Expression>, Box<Expression>),
    /// Less than.
    Lt(Box<Expression>, Box<Expression>),
    /// Less than or equal.
    Lte(Box<Expression>, Box<Expression>),
    /// Greater than.
    Gt(Box<Expression>, Box<Expression>),
    /// Greater than or equal.
    Gte(Box<Expression>, Box<Expression>),
    /// Arithmetic on two operands of the same numeric kind.
    Arithmetic(ArithmeticOp, Box<Expression>, Box<Expression>),
    /// Numeric negation.
    Neg(Box<Expression>),
    /// True when every operand is truthy.
    And(Vec<Expression>),
    /// True when some operand is truthy.
    Or(Vec<Expression>),
    /// Logical negation.
    Not(Box<Expression>),
}

impl Expression {
    /// A field reference.
    #[must_use]
    pub fn field(path: impl Into<String>) -> Self {
        Self::Field(path.into())
    }

    /// A literal value.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(Some(value.into()))
    }

    /// The undefined literal.
    #[must_use]
    pub const fn undefined() -> Self {
        Self::Literal(None)
    }

    /// Evaluates the expression. `None` is undefined.
    pub fn evaluate(&self, doc: &Document) -> CoreResult<Option<Value>> {
        let result = match self {
            Self::Field(path) => doc.get(path),
            Self::Literal(value) => value.clone(),
            Self::Eq(a, b) => Some(Value::Boolean(values_equal(
                a.evaluate(doc)?.as_ref(),
                b.evaluate(doc)?.as_ref(),
            ))),
            Self::Neq(a, b) => Some(Value::Boolean(!values_equal(
                a.evaluate(doc)?.as_ref(),
                b.evaluate(doc)?.as_ref(),
            ))),
            Self::Lt(a, b) => Some(Value::Boolean(compare(doc, a, b)? == Ordering::Less)),
            Self::Lte(a, b) => Some(Value::Boolean(compare(doc, a, b)? != Ordering::Greater)),
            Self::Gt(a, b) => Some(Value::Boolean(compare(doc, a, b)? == Ordering::Greater)),
            Self::Gte(a, b) => Some(Value::Boolean(compare(doc, a, b)? != Ordering::Less)),
            Self::Arithmetic(op, a, b) => Some(arithmetic(*op, a.evaluate(doc)?, b.evaluate(doc)?)?),
            Self::Neg(a) => Some(negate(a.evaluate(doc)?)?),
            Self::And(items) => {
                for item in items {
                    if !truthy(item.evaluate(doc)?.as_ref()) {
                        return Ok(Some(Value::Boolean(false)));
                    }
                }
                Some(Value::Boolean(true))
            }
            Self::Or(items) => {
                for item in items {
                    if truthy(item.evaluate(doc)?.as_ref()) {
                        return Ok(Some(Value::Boolean(true)));
                    }
                }
                Some(Value::Boolean(false))
            }
            Self::Not(a) => Some(Value::Boolean(!truthy(a.evaluate(doc)?.as_ref()))),
        };
        Ok(result)
    }

    /// Evaluates the expression as a filter predicate.
    pub fn matches(&self, doc: &Document) -> CoreResult<bool> {
        Ok(truthy(self.evaluate(doc)?.as_ref()))
    }

    /// Parses the JSON form, e.g. `{"$eq": [{"$field": "a"}, {"$literal": 1}]}`.
    ///
    /// Unknown operators are rejected.
    pub fn from_json(json: &serde_json::Value) -> CoreResult<Self> {
        let object = json
            .as_object()
            .filter(|o| o.len() == 1)
            .ok_or_else(|| {
                CoreError::invalid_expression(format!("expected a single-key operator object, got {json}"))
            })?;
        let Some((op, operand)) = object.iter().next() else {
            return Err(CoreError::invalid_expression("empty expression"));
        };

        let expression = match op.as_str() {
            "$field" => {
                let path = operand
                    .as_str()
                    .ok_or_else(|| CoreError::invalid_expression("$field takes a string path"))?;
                Self::Field(path.to_string())
            }
            "$literal" => Self::Literal(Some(Value::from_json(operand.clone()))),
            "$eq" => binary(operand, Self::Eq)?,
            "$neq" => binary(operand, Self::Neq)?,
            "$lt" => binary(operand, Self::Lt)?,
            "$lte" => binary(operand, Self::Lte)?,
            "$gt" => binary(operand, Self::Gt)?,
            "$gte" => binary(operand, Self::Gte)?,
            "$add" => binary(operand, |a, b| Self::Arithmetic(ArithmeticOp::Add, a, b))?,
            "$sub" => binary(operand, |a, b| Self::Arithmetic(ArithmeticOp::Sub, a, b))?,
            "$mul" => binary(operand, |a, b| Self::Arithmetic(ArithmeticOp::Mul, a, b))?,
            "$div" => binary(operand, |a, b| Self::Arithmetic(ArithmeticOp::Div, a, b))?,
            "$mod" => binary(operand, |a, b| Self::Arithmetic(ArithmeticOp::Mod, a, b))?,
            "$neg" => Self::Neg(Box::new(Self::from_json(operand)?)),
            "$not" => Self::Not(Box::new(Self::from_json(operand)?)),
            "$and" => Self::And(list(operand)?),
            "$or" => Self::Or(list(operand)?),
            other => {
                return Err(CoreError::invalid_expression(format!(
                    "unknown operator `{other}`"
                )))
            }
        };
        Ok(expression)
    }
}

fn binary(
    operand: &serde_json::Value,
    build: impl FnOnce(Box<Expression>, Box<Expression>) -> Expression,
) -> CoreResult<Expression> {
    match operand.as_array().map(Vec::as_slice) {
        Some([a, b]) => Ok(build(
            Box::new(Expression::from_json(a)?),
            Box::new(Expression::from_json(b)?),
        )),
        _ => Err(CoreError::invalid_expression(format!(
            "expected two operands, got {operand}"
        ))),
    }
}

fn list(operand: &serde_json::Value) -> CoreResult<Vec<Expression>> {
    operand
        .as_array()
        .ok_or_else(|| CoreError::invalid_expression(format!("expected a list, got {operand}")))?
        .iter()
        .map(Expression::from_json)
        .collect()
}

fn compare(doc: &Document, a: &Expression, b: &Expression) -> CoreResult<Ordering> {
    Ok(compare_values(
        a.evaluate(doc)?.as_ref(),
        b.evaluate(doc)?.as_ref(),
    ))
}

/// Truthiness of an evaluated expression.
#[must_use]
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Boolean(b)) => *b,
        Some(Value::Float64(f)) => *f != 0.0 && !f.is_nan(),
        Some(Value::Int64(i)) => *i != 0,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn arithmetic(op: ArithmeticOp, a: Option<Value>, b: Option<Value>) -> CoreResult<Value> {
    match (a, b) {
        (Some(Value::Float64(x)), Some(Value::Float64(y))) => Ok(Value::Float64(match op {
            ArithmeticOp::Add => x + y,
            ArithmeticOp::Sub => x - y,
            ArithmeticOp::Mul => x * y,
            ArithmeticOp::Div => x / y,
            ArithmeticOp::Mod => x % y,
        })),
        (Some(Value::Int64(x)), Some(Value::Int64(y))) => {
            let result = match op {
                ArithmeticOp::Add => x.checked_add(y),
                ArithmeticOp::Sub => x.checked_sub(y),
                ArithmeticOp::Mul => x.checked_mul(y),
                ArithmeticOp::Div => x.checked_div(y),
                ArithmeticOp::Mod => x.checked_rem(y),
            };
            result.map(Value::Int64).ok_or_else(|| {
                CoreError::invalid_expression(format!(
                    "cannot {} {x}n and {y}n: overflow or division by zero",
                    op.verb()
                ))
            })
        }
        (a, b) => Err(CoreError::invalid_expression(format!(
            "cannot {} {} and {}",
            op.verb(),
            kind(a.as_ref()),
            kind(b.as_ref())
        ))),
    }
}

fn negate(value: Option<Value>) -> CoreResult<Value> {
    match value {
        Some(Value::Float64(x)) => Ok(Value::Float64(-x)),
        Some(Value::Int64(x)) => x
            .checked_neg()
            .map(Value::Int64)
            .ok_or_else(|| CoreError::invalid_expression("bigint negation overflow")),
        other => Err(CoreError::invalid_expression(format!(
            "cannot negate {}",
            kind(other.as_ref())
        ))),
    }
}

fn kind(value: Option<&Value>) -> &'static str {
    value.map_or("undefined", Value::type_name)
}

macro_rules! literal_from {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Expression {
                fn from(value: $t) -> Self {
                    Self::literal(value)
                }
            }
        )*
    };
}

literal_from!(Value, bool, i64, f64, String, &str, DocumentId, &DocumentId);

impl From<Option<Value>> for Expression {
    fn from(value: Option<Value>) -> Self {
        Self::Literal(value)
    }
}

/// Builder handed to `Query::filter` closures.
///
/// Plain Rust values passed to the comparison methods are literals; use
/// [`FilterBuilder::field`] to read from the document.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterBuilder;

macro_rules! binary_builders {
    ($($name:ident => $variant:ident),* $(,)?) => {
        $(
            #[doc = concat!("Builds a `", stringify!($name), "` comparison.")]
            #[must_use]
            pub fn $name(&self, a: impl Into<Expression>, b: impl Into<Expression>) -> Expression {
                Expression::$variant(Box::new(a.into()), Box::new(b.into()))
            }
        )*
    };
}

macro_rules! arithmetic_builders {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            #[doc = concat!("Builds an arithmetic `", stringify!($op), "`.")]
            #[must_use]
            pub fn $name(&self, a: impl Into<Expression>, b: impl Into<Expression>) -> Expression {
                Expression::Arithmetic(ArithmeticOp::$op, Box::new(a.into()), Box::new(b.into()))
            }
        )*
    };
}

impl FilterBuilder {
    /// Reads a dotted field path.
    #[must_use]
    pub fn field(&self, path: impl Into<String>) -> Expression {
        Expression::field(path)
    }

    binary_builders!(eq => Eq, neq => Neq, lt => Lt, lte => Lte, gt => Gt, gte => Gte);
    arithmetic_builders!(add => Add, sub => Sub, mul => Mul, div => Div, modulo => Mod);

    /// Numeric negation.
    #[must_use]
    pub fn neg(&self, a: impl Into<Expression>) -> Expression {
        Expression::Neg(Box::new(a.into()))
    }

    /// Logical and.
    #[must_use]
    pub fn and(&self, items: impl IntoIterator<Item = Expression>) -> Expression {
        Expression::And(items.into_iter().collect())
    }

    /// Logical or.
    #[must_use]
    pub fn or(&self, items: impl IntoIterator<Item = Expression>) -> Expression {
        Expression::Or(items.into_iter().collect())
    }

    /// Logical not.
    #[must_use]
    pub fn not(&self, a: impl Into<Expression>) -> Expression {
        Expression::Not(Box::new(a.into()))
    }
}

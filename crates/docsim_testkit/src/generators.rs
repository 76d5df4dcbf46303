//! Property-based test generators using proptest.
//!
//! Provides strategies for documents of the sample app and for index range
//! chains, valid and invalid.

use docsim_core::{IndexRangeBuilder, Value};
use proptest::prelude::*;

/// Strategy for author names drawn from a small pool, so index ranges and
/// equality filters hit several documents.
pub fn author_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["sarah", "michal", "lee", "ana"]).prop_map(str::to_string)
}

/// Strategy for message bodies made of a few short words.
pub fn body_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-e]{1,4}", 1..4).prop_map(|words| words.join(" "))
}

/// Strategy for `(author, body)` batches to insert.
pub fn message_batch_strategy(max: usize) -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec((author_strategy(), body_strategy()), 0..=max)
}

/// Strategy for page sizes.
pub fn page_size_strategy() -> impl Strategy<Value = usize> {
    1usize..12
}

/// Strategy for 3-dimensional vectors with small integer components.
pub fn vector_strategy() -> impl Strategy<Value = [f64; 3]> {
    prop::array::uniform3((-3i32..=3).prop_map(f64::from))
}

/// One clause of an index range chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeStep {
    /// `.eq(field)`
    Eq(usize),
    /// `.gt(field)`
    Gt(usize),
    /// `.gte(field)`
    Gte(usize),
    /// `.lt(field)`
    Lt(usize),
    /// `.lte(field)`
    Lte(usize),
}

impl RangeStep {
    fn field(self) -> usize {
        match self {
            Self::Eq(f) | Self::Gt(f) | Self::Gte(f) | Self::Lt(f) | Self::Lte(f) => f,
        }
    }

    fn is_lower(self) -> bool {
        matches!(self, Self::Gt(_) | Self::Gte(_))
    }

    fn is_upper(self) -> bool {
        matches!(self, Self::Lt(_) | Self::Lte(_))
    }
}

/// Returns true if `steps` is a well-formed chain over `fields` index
/// fields: equalities on a prefix of the fields, then at most one lower and
/// one upper bound, in either order, on the next field.
pub fn is_valid_chain(steps: &[RangeStep], fields: usize) -> bool {
    let eqs = steps.iter().take_while(|s| matches!(s, RangeStep::Eq(_))).count();
    if steps[..eqs].iter().enumerate().any(|(i, s)| s.field() != i) {
        return false;
    }
    let bounds = &steps[eqs..];
    if bounds.is_empty() {
        return eqs <= fields;
    }
    if eqs >= fields || bounds.iter().any(|s| s.field() != eqs) {
        return false;
    }
    match bounds {
        [only] => only.is_lower() || only.is_upper(),
        [a, b] => (a.is_lower() && b.is_upper()) || (a.is_upper() && b.is_lower()),
        _ => false,
    }
}

/// Applies `steps` to a builder over fields `f0`, `f1`, ...
pub fn build_chain(steps: &[RangeStep]) -> IndexRangeBuilder {
    steps
        .iter()
        .fold(IndexRangeBuilder::default(), |builder, step| {
            let name = format!("f{}", step.field());
            let value = Value::Float64(1.0);
            match step {
                RangeStep::Eq(_) => builder.eq(name, value),
                RangeStep::Gt(_) => builder.gt(name, value),
                RangeStep::Gte(_) => builder.gte(name, value),
                RangeStep::Lt(_) => builder.lt(name, value),
                RangeStep::Lte(_) => builder.lte(name, value),
            }
        })
}

/// Strategy for arbitrary chains over up to `fields` fields.
pub fn range_chain_strategy(fields: usize) -> impl Strategy<Value = Vec<RangeStep>> {
    let step = (0..5usize, 0..fields).prop_map(|(kind, field)| match kind {
        0 => RangeStep::Eq(field),
        1 => RangeStep::Gt(field),
        2 => RangeStep::Gte(field),
        3 => RangeStep::Lt(field),
        _ => RangeStep::Lte(field),
    });
    prop::collection::vec(step, 0..5)
}

/// Strategy biased towards well-formed chains.
pub fn valid_range_chain_strategy(fields: usize) -> impl Strategy<Value = Vec<RangeStep>> {
    (0..=fields, any::<bool>(), any::<bool>(), 0..4usize).prop_map(move |(eqs, inclusive_lo, inclusive_hi, bounds)| {
        let mut steps: Vec<RangeStep> = (0..eqs).map(RangeStep::Eq).collect();
        if eqs < fields {
            let lower = if inclusive_lo { RangeStep::Gte(eqs) } else { RangeStep::Gt(eqs) };
            let upper = if inclusive_hi { RangeStep::Lte(eqs) } else { RangeStep::Lt(eqs) };
            match bounds {
                1 => steps.push(lower),
                2 => steps.push(upper),
                3 => steps.extend([lower, upper]),
                _ => {}
            }
        }
        steps
    })
}

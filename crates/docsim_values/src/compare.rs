//! Total ordering over heterogeneous values.
//!
//! Kinds are ordered first, contents second:
//!
//! `undefined < null < bigint < number < boolean < string < bytes < array < object`
//!
//! `undefined` is represented by `None` and forms its own bucket, distinct
//! from `null`. Floats use IEEE-754 total ordering so the relation stays
//! transitive in the presence of `NaN` and signed zeros.

use crate::value::Value;
use std::cmp::Ordering;

fn kind_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Int64(_)) => 2,
        Some(Value::Float64(_)) => 3,
        Some(Value::Boolean(_)) => 4,
        Some(Value::String(_)) => 5,
        Some(Value::Bytes(_)) => 6,
        Some(Value::Array(_)) => 7,
        Some(Value::Object(_)) => 8,
    }
}

/// Compares two possibly-undefined values.
#[must_use]
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank = kind_rank(a).cmp(&kind_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Some(a), Some(b)) => compare_defined(a, b),
        _ => Ordering::Equal,
    }
}

fn compare_defined(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int64(x), Value::Int64(y)) => x.cmp(y),
        (Value::Float64(x), Value::Float64(y)) => x.total_cmp(y),
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (xv, yv) in x.iter().zip(y.iter()) {
                let ord = compare_values(Some(xv), Some(yv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((xk, xv), (yk, yv)) in x.iter().zip(y.iter()) {
                let key_ord = xk.cmp(yk);
                if key_ord != Ordering::Equal {
                    return key_ord;
                }
                let val_ord = compare_values(Some(xv), Some(yv));
                if val_ord != Ordering::Equal {
                    return val_ord;
                }
            }
            x.len().cmp(&y.len())
        }
        // Null vs null, or kinds already separated by rank.
        _ => Ordering::Equal,
    }
}

/// Compares two sort keys element by element.
#[must_use]
pub fn compare_keys(a: &[Option<Value>], b: &[Option<Value>]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = compare_values(x.as_ref(), y.as_ref());
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Equality under the total order (so `NaN == NaN` and `undefined == undefined`).
#[must_use]
pub fn values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    compare_values(a, b) == Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn ordered_samples() -> Vec<Option<Value>> {
        vec![
            None,
            Some(Value::Null),
            Some(Value::Int64(-5)),
            Some(Value::Int64(7)),
            Some(Value::Float64(-1.5)),
            Some(Value::Float64(2.0)),
            Some(Value::Boolean(false)),
            Some(Value::Boolean(true)),
            Some(Value::from("a")),
            Some(Value::from("b")),
            Some(Value::bytes(vec![0])),
            Some(Value::Array(vec![])),
            Some(Value::Array(vec![Value::Null])),
            Some(Value::empty_object()),
        ]
    }

    #[test]
    fn kinds_are_ordered() {
        let samples = ordered_samples();
        for (i, a) in samples.iter().enumerate() {
            for (j, b) in samples.iter().enumerate() {
                assert_eq!(
                    compare_values(a.as_ref(), b.as_ref()),
                    i.cmp(&j),
                    "{a:?} vs {b:?}"
                );
            }
        }
    }

    #[test]
    fn undefined_is_not_null() {
        assert_eq!(compare_values(None, Some(&Value::Null)), Ordering::Less);
        assert!(values_equal(None, None));
        assert!(!values_equal(None, Some(&Value::Null)));
    }

    #[test]
    fn arrays_compare_prefix_first() {
        let short = Value::Array(vec![Value::Float64(1.0)]);
        let long = Value::Array(vec![Value::Float64(1.0), Value::Float64(0.0)]);
        assert_eq!(compare_values(Some(&short), Some(&long)), Ordering::Less);
    }

    #[test]
    fn nested_values_of_different_kinds_are_ordered() {
        let int = Value::Array(vec![Value::Float64(5.0)]);
        let string = Value::Array(vec![Value::from("x")]);
        let smaller = Value::Array(vec![Value::Float64(3.0)]);
        assert_eq!(compare_values(Some(&int), Some(&string)), Ordering::Less);
        assert_eq!(compare_values(Some(&string), Some(&smaller)), Ordering::Greater);
        assert_eq!(compare_values(Some(&int), Some(&smaller)), Ordering::Greater);
        assert!(!values_equal(Some(&int), Some(&string)));

        let null = Value::object([("k", Value::Null)]);
        let boolean = Value::object([("k", Value::Boolean(true))]);
        assert_eq!(compare_values(Some(&null), Some(&boolean)), Ordering::Less);
        assert_eq!(compare_values(Some(&boolean), Some(&null)), Ordering::Greater);
    }

    #[test]
    fn nan_is_self_equal() {
        let nan = Value::Float64(f64::NAN);
        assert!(values_equal(Some(&nan), Some(&nan)));
    }

    #[test]
    fn compare_keys_lexicographic() {
        let a = vec![Some(Value::from("sarah")), Some(Value::Float64(1.0))];
        let b = vec![Some(Value::from("sarah")), Some(Value::Float64(2.0))];
        assert_eq!(compare_keys(&a, &b), Ordering::Less);
        assert_eq!(compare_keys(&b, &a), Ordering::Greater);
        assert_eq!(compare_keys(&a, &a), Ordering::Equal);
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<i64>().prop_map(Value::Int64),
            any::<f64>().prop_map(Value::Float64),
            any::<bool>().prop_map(Value::Boolean),
            "[a-c]{0,3}".prop_map(Value::String),
            prop::collection::vec(any::<u8>(), 0..3).prop_map(Value::Bytes),
        ]
    }

    fn value_strategy() -> impl Strategy<Value = Option<Value>> {
        let tree = leaf().prop_recursive(2, 8, 3, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..3).prop_map(Value::Array),
                prop::collection::btree_map("[a-b]", inner, 0..3)
                    .prop_map(|m: BTreeMap<String, Value>| Value::Object(m)),
            ]
        });
        prop::option::weighted(0.9, tree)
    }

    proptest! {
        #[test]
        fn antisymmetric(a in value_strategy(), b in value_strategy()) {
            let ab = compare_values(a.as_ref(), b.as_ref());
            let ba = compare_values(b.as_ref(), a.as_ref());
            prop_assert_eq!(ab, ba.reverse());
        }

        #[test]
        fn transitive(a in value_strategy(), b in value_strategy(), c in value_strategy()) {
            let mut v = vec![a, b, c];
            v.sort_by(|x, y| compare_values(x.as_ref(), y.as_ref()));
            prop_assert_ne!(compare_values(v[0].as_ref(), v[1].as_ref()), Ordering::Greater);
            prop_assert_ne!(compare_values(v[1].as_ref(), v[2].as_ref()), Ordering::Greater);
            prop_assert_ne!(compare_values(v[0].as_ref(), v[2].as_ref()), Ordering::Greater);
        }

        #[test]
        fn reflexive(a in value_strategy()) {
            prop_assert_eq!(compare_values(a.as_ref(), a.as_ref()), Ordering::Equal);
        }
    }
}

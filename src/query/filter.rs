// query/filter.rs — document predicate evaluation.
//
// The subset of the document-query language the read paths and the
// reconciliation engine actually issue: field equality (with element
// matching on array fields), $eq/$ne, ordered comparisons, $in/$nin,
// $exists, and top-level $and/$or. The matcher is total — an unknown
// operator matches nothing rather than erroring.

use serde_json::Value;

use crate::store::Document;

/// Does `doc` satisfy `filter`? Every clause must hold (implicit AND).
pub fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, cond)| match key.as_str() {
        "$and" => match cond {
            Value::Array(clauses) => clauses
                .iter()
                .all(|c| c.as_object().is_some_and(|f| matches(doc, f))),
            _ => false,
        },
        "$or" => match cond {
            Value::Array(clauses) => clauses
                .iter()
                .any(|c| c.as_object().is_some_and(|f| matches(doc, f))),
            _ => false,
        },
        field => clause_matches(doc.get(field), cond),
    })
}

/// Does a single field clause hold for `field` (None when the document lacks
/// the key)? `cond` is either a literal to compare against or an operator
/// document like `{"$ne": ...}`.
pub fn clause_matches(field: Option<&Value>, cond: &Value) -> bool {
    if let Some(ops) = operator_doc(cond) {
        return ops.iter().all(|(op, arg)| op_matches(field, op, arg));
    }
    eq_matches(field, cond)
}

fn op_matches(field: Option<&Value>, op: &str, arg: &Value) -> bool {
    match op {
        "$eq" => eq_matches(field, arg),
        "$ne" => !eq_matches(field, arg),
        "$gt" => order_matches(field, arg, |o| o == std::cmp::Ordering::Greater),
        "$gte" => order_matches(field, arg, |o| o != std::cmp::Ordering::Less),
        "$lt" => order_matches(field, arg, |o| o == std::cmp::Ordering::Less),
        "$lte" => order_matches(field, arg, |o| o != std::cmp::Ordering::Greater),
        "$in" => match arg {
            Value::Array(options) => options.iter().any(|v| eq_matches(field, v)),
            _ => false,
        },
        "$nin" => match arg {
            Value::Array(options) => !options.iter().any(|v| eq_matches(field, v)),
            _ => false,
        },
        "$exists" => arg.as_bool().is_some_and(|want| field.is_some() == want),
        _ => false,
    }
}

/// Equality with array-element semantics: a scalar probe matches an array
/// field when any element equals it. A missing field equals null.
fn eq_matches(field: Option<&Value>, probe: &Value) -> bool {
    match field {
        None => probe.is_null(),
        Some(Value::Array(elems)) if !probe.is_array() => {
            elems.iter().any(|e| value_eq(e, probe))
        }
        Some(v) => value_eq(v, probe),
    }
}

fn order_matches(
    field: Option<&Value>,
    probe: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> bool {
    field
        .and_then(|v| compare_same_type(v, probe))
        .is_some_and(accept)
}

/// Value equality that treats all JSON numbers as one numeric domain.
pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| value_eq(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| value_eq(v, w)))
        }
        _ => a == b,
    }
}

/// Ordered comparison for the range operators. Only same-type number and
/// string pairs compare; everything else yields no ordering and the clause
/// does not match.
fn compare_same_type(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Treat `cond` as an operator document only when every key is an operator.
/// `{"a": 1}` as a probe value stays a literal object comparison.
fn operator_doc(cond: &Value) -> Option<&Document> {
    match cond {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => {
            Some(map)
        }
        _ => None,
    }
}

#![forbid(unsafe_code)]

//! Structural equality and baseline diffing.
//!
//! [`deep_equal`] is the comparison behind dirty tracking: objects compare by
//! key set and per-key value regardless of insertion order, arrays compare
//! positionally, dates compare at millisecond precision, and opaque handles
//! compare by identity.
//!
//! [`diff_values`] walks the current value tree against a baseline and
//! produces the sparse dirty tree: one `true` leaf per position whose value
//! differs, including positions the current value no longer has.

use indexmap::IndexMap;
use time::OffsetDateTime;

use crate::tree::{ArrayNode, Tree};
use crate::value::Value;

fn millis(date: &OffsetDateTime) -> i128 {
    date.unix_timestamp_nanos() / 1_000_000
}

/// Structural equality.
///
/// Numbers use IEEE comparison, so `NaN` never equals itself. Sets ignore
/// order; maps compare entry by entry, ignoring order.
#[must_use]
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Date(x), Value::Date(y)) => millis(x) == millis(y),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| deep_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, l)| y.get(key).is_some_and(|r| deep_equal(l, r)))
        }
        (Value::Set(x), Value::Set(y)) => {
            x.len() == y.len() && x.iter().all(|l| y.iter().any(|r| deep_equal(l, r)))
        }
        (Value::Map(x), Value::Map(y)) => {
            x.len() == y.len()
                && x.iter().all(|(lk, lv)| {
                    y.iter()
                        .any(|(rk, rv)| deep_equal(lk, rk) && deep_equal(lv, rv))
                })
        }
        (Value::Opaque(x), Value::Opaque(y)) => x.ptr_eq(y),
        _ => false,
    }
}

/// Compare optional values, treating `None` as `Undefined`.
#[must_use]
pub fn deep_equal_opt(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => deep_equal(a, b),
        (Some(only), None) | (None, Some(only)) => only.is_undefined(),
        (None, None) => true,
    }
}

/// Build the dirty tree of `current` against `baseline`.
///
/// Positions present on either side are visited. A position that exists only
/// in the baseline marks every baseline leaf beneath it. A container whose
/// baseline counterpart is not a container of the same kind marks every
/// leaf beneath it; an empty one is marked as a whole unless the baseline
/// is absent.
#[must_use]
pub fn diff_values(baseline: &Value, current: &Value) -> Tree<bool> {
    let mut tree = diff_node(Some(baseline), Some(current));
    tree.prune();
    tree
}

fn diff_node(baseline: Option<&Value>, current: Option<&Value>) -> Tree<bool> {
    let (base, current) = match (baseline, current) {
        (Some(base), Some(current)) => (base, current),
        (Some(only), None) | (None, Some(only)) => return replaced(None, only),
        (None, None) => return Tree::Vacant,
    };
    match (base, current) {
        (Value::Object(base), Value::Object(map)) => {
            let mut nodes: IndexMap<String, Tree<bool>> = map
                .iter()
                .map(|(key, child)| (key.clone(), diff_node(base.get(key), Some(child))))
                .collect();
            for (key, child) in base.iter().filter(|(key, _)| !map.contains_key(*key)) {
                nodes.insert(key.clone(), diff_node(Some(child), None));
            }
            Tree::Object(nodes)
        }
        (Value::Array(base), Value::Array(items)) => Tree::Array(ArrayNode::new(
            (0..base.len().max(items.len()))
                .map(|index| diff_node(base.get(index), items.get(index)))
                .collect(),
        )),
        (_, Value::Object(_) | Value::Array(_)) => replaced(Some(base), current),
        (Value::Object(_) | Value::Array(_), _) => replaced(Some(current), base),
        (_, leaf) => {
            if deep_equal(base, leaf) {
                Tree::Vacant
            } else {
                Tree::Leaf(true)
            }
        }
    }
}

/// Marks for `value` when the other side holds `other`, or nothing.
fn replaced(other: Option<&Value>, value: &Value) -> Tree<bool> {
    let marks = mark_all(value);
    let defined = other.is_some_and(|other| !other.is_undefined());
    if marks.is_empty() && defined && !deep_equal_opt(other, Some(value)) {
        Tree::Leaf(true)
    } else {
        marks
    }
}

/// Mark every defined leaf of `value` as dirty.
#[must_use]
pub fn mark_all(value: &Value) -> Tree<bool> {
    match value {
        Value::Undefined => Tree::Vacant,
        Value::Object(map) => Tree::Object(
            map.iter()
                .map(|(key, child)| (key.clone(), mark_all(child)))
                .collect::<IndexMap<_, _>>(),
        ),
        Value::Array(items) => Tree::Array(ArrayNode::new(items.iter().map(mark_all).collect())),
        _ => Tree::Leaf(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::get;
    use crate::value::OpaqueKind;
    use time::macros::datetime;

    #[test]
    fn objects_ignore_key_order() {
        let a = Value::object([("x", Value::from(1)), ("y", Value::from(2))]);
        let b = Value::object([("y", Value::from(2)), ("x", Value::from(1))]);
        assert!(deep_equal(&a, &b));
    }

    #[test]
    fn arrays_of_objects_compare_by_key_sets() {
        let a = Value::array([Value::object([("id", Value::from(1))])]);
        let b = Value::array([Value::object([("id", Value::from(1)), ("extra", Value::Null)])]);
        assert!(!deep_equal(&a, &b));
    }

    #[test]
    fn dates_compare_by_millis() {
        let a = Value::Date(datetime!(2024-03-01 12:00:00.0001 UTC));
        let b = Value::Date(datetime!(2024-03-01 12:00:00.0009 UTC));
        let c = Value::Date(datetime!(2024-03-01 12:00:01 UTC));
        assert!(deep_equal(&a, &b));
        assert!(!deep_equal(&a, &c));
    }

    #[test]
    fn opaque_compares_by_identity() {
        let blob = Value::opaque(OpaqueKind::Blob, vec![0u8; 4]);
        let same = blob.clone();
        let other = Value::opaque(OpaqueKind::Blob, vec![0u8; 4]);
        assert!(deep_equal(&blob, &same));
        assert!(!deep_equal(&blob, &other));
    }

    #[test]
    fn nan_is_never_equal() {
        assert!(!deep_equal(&Value::from(f64::NAN), &Value::from(f64::NAN)));
    }

    #[test]
    fn diff_marks_changed_leaves_only() {
        let baseline = Value::object([
            ("name", Value::from("ada")),
            ("tags", Value::array([Value::from("a"), Value::from("b")])),
        ]);
        let current = Value::object([
            ("name", Value::from("ada")),
            ("tags", Value::array([Value::from("a"), Value::from("z")])),
        ]);
        let dirty = diff_values(&baseline, &current);
        assert!(get(&dirty, "name").is_none());
        assert!(get(&dirty, "tags.0").is_none());
        assert_eq!(get(&dirty, "tags.1").and_then(Tree::leaf), Some(&true));
    }

    #[test]
    fn diff_marks_whole_subtree_when_shape_changes() {
        let baseline = Value::object([("address", Value::Null)]);
        let current = Value::object([(
            "address",
            Value::object([("city", Value::from("x")), ("zip", Value::from("1"))]),
        )]);
        let dirty = diff_values(&baseline, &current);
        assert_eq!(dirty.leaves().len(), 2);
    }

    #[test]
    fn diff_marks_keys_missing_from_current() {
        let baseline = Value::object([("name", Value::from("ada")), ("email", Value::from("a@x"))]);
        let current = Value::object([("name", Value::from("ada"))]);
        let dirty = diff_values(&baseline, &current);
        assert!(dirty.any());
        assert_eq!(get(&dirty, "email").and_then(Tree::leaf), Some(&true));
        assert!(get(&dirty, "name").is_none());
    }

    #[test]
    fn diff_marks_array_tail_missing_from_current() {
        let baseline = Value::array([Value::from(1), Value::from(2)]);
        let current = Value::array([Value::from(1)]);
        let dirty = diff_values(&baseline, &current);
        assert!(dirty.any());
        assert!(get(&dirty, "0").is_none());
        assert_eq!(get(&dirty, "1").and_then(Tree::leaf), Some(&true));
    }

    #[test]
    fn diff_marks_container_replaced_by_scalar() {
        let baseline = Value::object([("address", Value::object([("city", Value::from("x"))]))]);
        let current = Value::object([("address", Value::Null)]);
        let dirty = diff_values(&baseline, &current);
        assert_eq!(get(&dirty, "address.city").and_then(Tree::leaf), Some(&true));

        let emptied = Value::object([("address", Value::Object(IndexMap::new()))]);
        let dirty = diff_values(&emptied, &current);
        assert_eq!(get(&dirty, "address").and_then(Tree::leaf), Some(&true));
    }

    #[test]
    fn diff_of_equal_trees_is_empty() {
        let value = Value::object([("a", Value::array([Value::from(1)]))]);
        assert!(diff_values(&value, &value.clone()).is_empty());
    }
}

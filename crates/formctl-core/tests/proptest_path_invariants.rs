//! Property-based invariant tests for path addressing.
//!
//! 1. Round-trip: `get(set(tree, p, v), p) == v` for any well-formed path.
//! 2. Bracketed and dotted spellings of a path address the same slot.
//! 3. `unset` never re-indexes siblings of the removed array element.
//! 4. Bookkeeping trees share the round-trip property with values.
//! 5. `deep_equal` is reflexive for clones of NaN-free values.
//! 6. `diff_values` marks something iff the trees differ, whichever side
//!    holds the extra keys or items.

use formctl_core::path::{FieldPath, get, set, unset};
use formctl_core::{Tree, Value, deep_equal, diff_values};
use proptest::prelude::*;

// ── Strategies ────────────────────────────────────────────────────────────

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z][a-z0-9_]{0,6}".prop_filter("reserved key", |s| s != "root"),
        (0usize..6).prop_map(|i| i.to_string()),
    ]
}

fn dotted_path() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(segment(), 1..5)
}

fn leaf_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (-1.0e6f64..1.0e6).prop_map(Value::from),
        "[a-zA-Z ]{0,12}".prop_map(Value::from),
    ]
}

fn value_tree() -> impl Strategy<Value = Value> {
    leaf_value().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
            prop::collection::vec(("[a-z]{1,4}", inner), 0..4).prop_map(Value::object),
        ]
    })
}

// ─── 1. Round-trip ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn set_then_get_round_trips(
        start in value_tree(),
        segments in dotted_path(),
        value in leaf_value(),
    ) {
        let path = segments.join(".");
        let mut tree = start;
        set(&mut tree, &path, value.clone());
        prop_assert_eq!(get(&tree, &path), Some(&value));
    }
}

// ─── 2. Bracketed spelling ────────────────────────────────────────────────

proptest! {
    #[test]
    fn bracketed_and_dotted_agree(segments in dotted_path()) {
        let dotted = segments.join(".");
        let bracketed = segments
            .iter()
            .enumerate()
            .map(|(i, s)| {
                if i > 0 && s.bytes().all(|b| b.is_ascii_digit()) {
                    format!("[{s}]")
                } else if i > 0 {
                    format!(".{s}")
                } else {
                    s.clone()
                }
            })
            .collect::<String>();
        prop_assert_eq!(FieldPath::parse(&dotted), FieldPath::parse(&bracketed));
    }
}

// ─── 3. unset keeps siblings addressable ──────────────────────────────────

proptest! {
    #[test]
    fn unset_keeps_sibling_indexes(
        items in prop::collection::vec(leaf_value().prop_filter("defined", |v| !v.is_null()), 2..8),
        victim in 0usize..8,
    ) {
        let victim = victim % items.len();
        let mut tree = Value::object([("list", Value::from(items.clone()))]);
        unset(&mut tree, &format!("list.{victim}"));
        for (index, item) in items.iter().enumerate() {
            let at = get(&tree, &format!("list.{index}"));
            if index == victim {
                prop_assert!(at.is_none());
            } else {
                prop_assert_eq!(at, Some(item));
            }
        }
    }
}

// ─── 4. Bookkeeping trees ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn tree_round_trips(paths in prop::collection::vec(dotted_path(), 1..6)) {
        let mut dirty = Tree::new();
        let last = paths.last().map(|p| p.join(".")).unwrap_or_default();
        for path in &paths {
            set(&mut dirty, &path.join("."), Tree::Leaf(true));
        }
        prop_assert_eq!(get(&dirty, &last).and_then(Tree::leaf), Some(&true));
    }
}

// ─── 5. deep_equal reflexive on clones ────────────────────────────────────

proptest! {
    #[test]
    fn clone_is_deep_equal(value in value_tree()) {
        prop_assert!(deep_equal(&value, &value.clone()));
    }
}

// ─── 6. Diff agrees with equality ─────────────────────────────────────────

/// Trees without empty containers, where any difference has a leaf to mark.
fn dense_tree() -> impl Strategy<Value = Value> {
    leaf_value().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(Value::from),
            prop::collection::vec(("[a-z]{1,4}", inner), 1..4).prop_map(Value::object),
        ]
    })
}

proptest! {
    #[test]
    fn diff_marks_iff_values_differ(baseline in dense_tree(), current in dense_tree()) {
        let differ = !deep_equal(&baseline, &current);
        prop_assert_eq!(diff_values(&baseline, &current).any(), differ);
        prop_assert_eq!(diff_values(&current, &baseline).any(), differ);
    }

    #[test]
    fn dropping_a_key_is_always_dirty(entries in prop::collection::vec(("[a-z]{1,4}", leaf_value()), 2..5)) {
        let baseline = Value::object(entries.clone());
        let mut narrowed = baseline.clone();
        let first = entries[0].0.clone();
        unset(&mut narrowed, &first);
        prop_assert!(diff_values(&baseline, &narrowed).any());
    }
}

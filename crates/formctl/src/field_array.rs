#![forbid(unsafe_code)]

//! Index algebra for field arrays.
//!
//! One [`ArrayOp`] is applied to every list that is indexed like the array:
//! the values, the item ids, and the bookkeeping trees (dirty, touched,
//! errors, registry). Applying the same op everywhere keeps them aligned, so
//! bookkeeping at index `i` always describes the item now at `i`.
//!
//! # Invariants
//!
//! - Inserted bookkeeping slots are placeholders (no entry), never `false`.
//! - Batch removal tests index membership in one pass; indexes never drift
//!   between deletions. Out-of-range indexes are ignored.
//! - A removal that leaves only placeholders empties the list.
//! - `move` to a slot past the end materializes placeholders up to it first.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | `swap` past the end | list padded with placeholders, then swapped |
//! | `move` from past the end | a placeholder is moved |
//! | `insert` past the end | appended |
//! | `swap`/`move`/`update` index above `MAX_INDEX` | no-op |

use formctl_core::path::MAX_INDEX;
use formctl_core::{Tree, Value};

/// A list element that has an unset form.
pub trait ArraySlot: Sized {
    fn placeholder() -> Self;

    fn is_placeholder(&self) -> bool;
}

impl ArraySlot for Value {
    fn placeholder() -> Self {
        Value::Undefined
    }

    fn is_placeholder(&self) -> bool {
        self.is_undefined()
    }
}

impl<T> ArraySlot for Tree<T> {
    fn placeholder() -> Self {
        Tree::Vacant
    }

    fn is_placeholder(&self) -> bool {
        matches!(self, Tree::Vacant)
    }
}

/// Stable key of one array item, independent of its position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ItemId(pub String);

impl ArraySlot for ItemId {
    fn placeholder() -> Self {
        ItemId(String::new())
    }

    fn is_placeholder(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One field array operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayOp {
    Append { count: usize },
    Prepend { count: usize },
    Insert { index: usize, count: usize },
    /// `None` removes every item.
    Remove { indexes: Option<Vec<usize>> },
    Swap { a: usize, b: usize },
    Move { from: usize, to: usize },
    Update { index: usize },
    Replace { count: usize },
}

impl ArrayOp {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ArrayOp::Append { .. } => "append",
            ArrayOp::Prepend { .. } => "prepend",
            ArrayOp::Insert { .. } => "insert",
            ArrayOp::Remove { .. } => "remove",
            ArrayOp::Swap { .. } => "swap",
            ArrayOp::Move { .. } => "move",
            ArrayOp::Update { .. } => "update",
            ArrayOp::Replace { .. } => "replace",
        }
    }

    /// Whether bookkeeping trees are reindexed by this op. `update` keeps
    /// positions and `replace` rebuilds bookkeeping from scratch.
    #[must_use]
    pub fn shifts_bookkeeping(&self) -> bool {
        !matches!(self, ArrayOp::Update { .. } | ArrayOp::Replace { .. })
    }

    /// Whether every index the op pads up to is addressable.
    #[must_use]
    pub fn in_range(&self) -> bool {
        match self {
            ArrayOp::Swap { a, b } => (*a).max(*b) <= MAX_INDEX,
            ArrayOp::Move { to, .. } => *to <= MAX_INDEX,
            ArrayOp::Update { index } => *index <= MAX_INDEX,
            _ => true,
        }
    }

    /// Apply the op to `items`. `fill(k)` produces the `k`-th new item for
    /// ops that add items. Out-of-range ops leave `items` alone.
    pub fn apply<T: ArraySlot>(&self, items: &mut Vec<T>, mut fill: impl FnMut(usize) -> T) {
        if !self.in_range() {
            return;
        }
        match self {
            ArrayOp::Append { count } => items.extend((0..*count).map(&mut fill)),
            ArrayOp::Prepend { count } => {
                items.splice(0..0, (0..*count).map(&mut fill));
            }
            ArrayOp::Insert { index, count } => {
                let at = (*index).min(items.len());
                items.splice(at..at, (0..*count).map(&mut fill));
            }
            ArrayOp::Remove { indexes } => remove_at(items, indexes.as_deref()),
            ArrayOp::Swap { a, b } => {
                pad(items, (*a).max(*b) + 1);
                items.swap(*a, *b);
            }
            ArrayOp::Move { from, to } => move_item(items, *from, *to),
            ArrayOp::Update { index } => {
                pad(items, index + 1);
                items[*index] = fill(0);
            }
            ArrayOp::Replace { count } => {
                items.clear();
                items.extend((0..*count).map(fill));
            }
        }
    }
}

fn pad<T: ArraySlot>(items: &mut Vec<T>, len: usize) {
    if items.len() < len {
        items.resize_with(len, T::placeholder);
    }
}

fn remove_at<T: ArraySlot>(items: &mut Vec<T>, indexes: Option<&[usize]>) {
    let Some(indexes) = indexes else {
        items.clear();
        return;
    };
    let mut position = 0;
    items.retain(|_| {
        let keep = !indexes.contains(&position);
        position += 1;
        keep
    });
    if items.iter().all(ArraySlot::is_placeholder) {
        items.clear();
    }
}

fn move_item<T: ArraySlot>(items: &mut Vec<T>, from: usize, to: usize) {
    pad(items, to + 1);
    let item = if from < items.len() {
        items.remove(from)
    } else {
        T::placeholder()
    };
    let at = to.min(items.len());
    items.insert(at, item);
}

/// Apply `op` to the array node of a bookkeeping tree, then trim trailing
/// placeholders. The node's array-level entry is left alone.
pub fn shift_tree<T>(node: &mut Tree<T>, op: &ArrayOp) {
    if let Tree::Array(array) = node {
        op.apply(&mut array.items, |_| Tree::Vacant);
        array.trim();
    }
}

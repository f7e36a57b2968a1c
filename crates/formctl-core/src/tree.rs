#![forbid(unsafe_code)]

//! Sparse bookkeeping trees.
//!
//! A [`Tree<T>`] has the same shape as the value tree at every position where
//! bookkeeping exists: dirty and touched flags are `Tree<bool>`, field errors
//! are `Tree<FieldError>`, and the field registry is `Tree<FieldDescriptor>`.
//!
//! Array nodes carry an optional synthetic `root` entry, addressed by the
//! [`ROOT_KEY`](crate::path::ROOT_KEY) segment (`items.root`), for state that
//! belongs to the array as a whole rather than one of its items.
//!
//! # Invariants
//!
//! - Removing an array item leaves a [`Tree::Vacant`] hole; trailing holes are
//!   trimmed so the array is never longer than its last occupied slot + 1.
//! - An array with no occupied slot and no root entry counts as empty and is
//!   pruned by [`unset`](crate::path::unset).

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::path::{FieldPath, MAX_INDEX, PathNode, Segment};

/// The items of an array node plus its array-level entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayNode<T> {
    pub items: Vec<Tree<T>>,
    pub root: Option<Box<Tree<T>>>,
}

impl<T> ArrayNode<T> {
    #[must_use]
    pub fn new(items: Vec<Tree<T>>) -> Self {
        Self { items, root: None }
    }

    /// Drop trailing vacant slots.
    pub fn trim(&mut self) {
        while self.items.last().is_some_and(Tree::is_vacant_node) {
            self.items.pop();
        }
    }
}

impl<T> Default for ArrayNode<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            root: None,
        }
    }
}

/// A sparse tree of `T` leaves.
#[derive(Debug, Clone, PartialEq)]
pub enum Tree<T> {
    Vacant,
    Leaf(T),
    Object(IndexMap<String, Tree<T>>),
    Array(ArrayNode<T>),
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Tree::Vacant
    }
}

impl<T> Tree<T> {
    #[must_use]
    pub fn new() -> Self {
        Tree::Vacant
    }

    fn is_vacant_node(&self) -> bool {
        matches!(self, Tree::Vacant)
    }

    #[must_use]
    pub fn leaf(&self) -> Option<&T> {
        match self {
            Tree::Leaf(value) => Some(value),
            _ => None,
        }
    }

    pub fn leaf_mut(&mut self) -> Option<&mut T> {
        match self {
            Tree::Leaf(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&ArrayNode<T>> {
        match self {
            Tree::Array(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut ArrayNode<T>> {
        match self {
            Tree::Array(node) => Some(node),
            _ => None,
        }
    }

    /// Whether the tree holds no leaf anywhere.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Tree::Vacant => true,
            Tree::Leaf(_) => false,
            Tree::Object(map) => map.values().all(Tree::is_empty),
            Tree::Array(node) => {
                node.items.iter().all(Tree::is_empty) && node.root.as_deref().is_none_or(Tree::is_empty)
            }
        }
    }

    /// Leaves in depth-first order with their paths. An array's root entry
    /// is reported after its items under the `root` segment.
    #[must_use]
    pub fn leaves(&self) -> Vec<(FieldPath, &T)> {
        let mut out = Vec::new();
        self.collect_leaves(&FieldPath::root(), &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, at: &FieldPath, out: &mut Vec<(FieldPath, &'a T)>) {
        match self {
            Tree::Vacant => {}
            Tree::Leaf(value) => out.push((at.clone(), value)),
            Tree::Object(map) => {
                for (key, child) in map {
                    child.collect_leaves(&at.child(Segment::Key(key.clone())), out);
                }
            }
            Tree::Array(node) => {
                for (index, child) in node.items.iter().enumerate() {
                    child.collect_leaves(&at.index(index), out);
                }
                if let Some(root) = node.root.as_deref() {
                    root.collect_leaves(&at.child(Segment::Key(crate::path::ROOT_KEY.into())), out);
                }
            }
        }
    }

    /// Transform every leaf, keeping the shape.
    #[must_use]
    pub fn map<U>(&self, f: &impl Fn(&T) -> U) -> Tree<U> {
        match self {
            Tree::Vacant => Tree::Vacant,
            Tree::Leaf(value) => Tree::Leaf(f(value)),
            Tree::Object(map) => Tree::Object(map.iter().map(|(k, v)| (k.clone(), v.map(f))).collect()),
            Tree::Array(node) => Tree::Array(ArrayNode {
                items: node.items.iter().map(|item| item.map(f)).collect(),
                root: node.root.as_deref().map(|root| Box::new(root.map(f))),
            }),
        }
    }

    /// Remove vacant children and empty containers throughout, collapsing
    /// to [`Tree::Vacant`] when nothing is left.
    pub fn prune(&mut self) {
        match self {
            Tree::Vacant | Tree::Leaf(_) => return,
            Tree::Object(map) => {
                for child in map.values_mut() {
                    child.prune();
                }
                map.retain(|_, child| !child.is_vacant_node());
            }
            Tree::Array(node) => {
                for child in &mut node.items {
                    child.prune();
                }
                if let Some(root) = node.root.as_deref_mut() {
                    root.prune();
                }
                if node.root.as_deref().is_some_and(Tree::is_vacant_node) {
                    node.root = None;
                }
                node.trim();
            }
        }
        if self.is_empty() {
            *self = Tree::Vacant;
        }
    }
}

impl Tree<bool> {
    /// Whether any leaf is `true`.
    #[must_use]
    pub fn any(&self) -> bool {
        self.leaves().into_iter().any(|(_, flag)| *flag)
    }
}

impl<T> PathNode for Tree<T> {
    fn vacant() -> Self {
        Tree::Vacant
    }

    fn is_vacant(&self) -> bool {
        self.is_vacant_node()
    }

    fn is_container(&self) -> bool {
        matches!(self, Tree::Object(_) | Tree::Array(_))
    }

    fn is_empty_container(&self) -> bool {
        match self {
            Tree::Object(map) => map.values().all(Tree::is_vacant_node),
            Tree::Array(node) => node.items.iter().all(Tree::is_vacant_node) && node.root.is_none(),
            _ => false,
        }
    }

    fn child(&self, segment: &Segment) -> Option<&Self> {
        match (self, segment) {
            (Tree::Object(map), segment) => map.get(segment.to_key().as_ref()),
            (Tree::Array(node), Segment::Index(index)) => node.items.get(*index),
            (Tree::Array(node), segment) if segment.is_root_key() => node.root.as_deref(),
            _ => None,
        }
    }

    fn child_mut(&mut self, segment: &Segment) -> Option<&mut Self> {
        match (self, segment) {
            (Tree::Object(map), segment) => map.get_mut(segment.to_key().as_ref()),
            (Tree::Array(node), Segment::Index(index)) => node.items.get_mut(*index),
            (Tree::Array(node), segment) if segment.is_root_key() => node.root.as_deref_mut(),
            _ => None,
        }
    }

    /// A vacant node addressed by `root` becomes an array so that
    /// array-level entries can be written before any item exists.
    fn slot(&mut self, segment: &Segment) -> &mut Self {
        let fits = match (&*self, segment) {
            (Tree::Object(_), _) => true,
            (Tree::Array(_), segment) => segment.is_index() || segment.is_root_key(),
            _ => false,
        };
        if !fits {
            *self = if segment.is_index() || segment.is_root_key() {
                Tree::Array(ArrayNode::default())
            } else {
                Tree::Object(IndexMap::new())
            };
        }
        match self {
            Tree::Object(map) => map.entry(segment.to_key().into_owned()).or_insert(Tree::Vacant),
            Tree::Array(node) => match segment.index() {
                Some(index) => {
                    let index = if index <= MAX_INDEX { index } else { node.items.len() };
                    if node.items.len() <= index {
                        node.items.resize_with(index + 1, || Tree::Vacant);
                    }
                    &mut node.items[index]
                }
                None => &mut **node.root.get_or_insert_with(|| Box::new(Tree::Vacant)),
            },
            // Reshaped into a container above.
            other => other,
        }
    }

    fn remove_child(&mut self, segment: &Segment) -> Option<Self> {
        match (self, segment) {
            (Tree::Object(map), segment) => map.shift_remove(segment.to_key().as_ref()),
            (Tree::Array(node), Segment::Index(index)) => {
                let removed = node
                    .items
                    .get_mut(*index)
                    .map(|slot| std::mem::replace(slot, Tree::Vacant));
                node.trim();
                removed
            }
            (Tree::Array(node), segment) if segment.is_root_key() => node.root.take().map(|root| *root),
            _ => None,
        }
    }
}

impl<T: Serialize> Serialize for Tree<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Tree::Vacant => serializer.serialize_none(),
            Tree::Leaf(value) => value.serialize(serializer),
            Tree::Object(map) => {
                let mut out = serializer.serialize_map(None)?;
                for (key, child) in map.iter().filter(|(_, child)| !child.is_vacant_node()) {
                    out.serialize_entry(key, child)?;
                }
                out.end()
            }
            Tree::Array(ArrayNode { items, root: None }) => {
                let mut out = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    out.serialize_element(item)?;
                }
                out.end()
            }
            Tree::Array(ArrayNode { items, root: Some(root) }) => {
                let mut out = serializer.serialize_map(None)?;
                for (index, item) in items.iter().enumerate() {
                    if !item.is_vacant_node() {
                        out.serialize_entry(&index.to_string(), item)?;
                    }
                }
                out.serialize_entry(crate::path::ROOT_KEY, root)?;
                out.end()
            }
        }
    }
}

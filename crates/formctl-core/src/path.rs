#![forbid(unsafe_code)]

//! Dotted-path addressing shared by every tree in the engine.
//!
//! A [`FieldPath`] is a sequence of [`Segment`]s parsed from strings such as
//! `user.addresses.0.city` or `user.addresses[0].city`. Segments that consist
//! only of ASCII digits are array indexes; everything else is a property key.
//!
//! The free functions [`get`], [`set`] and [`unset`] work over any type that
//! implements [`PathNode`], which is how the value tree and the dirty,
//! touched, error and registry trees all share one addressing scheme.
//!
//! # Invariants
//!
//! - Reads never fail: a missing segment anywhere along the path yields `None`.
//! - [`set`] creates intermediate containers, choosing an array when the
//!   segment being descended into is an index and an object otherwise.
//! - [`unset`] leaves a vacant hole when removing an array element (no
//!   re-indexing) and then removes any ancestor left empty, stopping at the
//!   root.
//! - Malformed or empty paths are no-ops.
//! - Indexes above [`MAX_INDEX`] are out of range: [`set`] ignores the
//!   write and reads find nothing there.

use std::borrow::Cow;
use std::fmt;
use std::hash::Hash;

use indexmap::IndexSet;
use smallvec::SmallVec;

/// The synthetic key addressing array-level entries (e.g. `items.root`).
pub const ROOT_KEY: &str = "root";

/// Largest array index a write may address.
pub const MAX_INDEX: usize = 1 << 20;

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A property name.
    Key(String),
    /// A non-negative array index.
    Index(usize),
}

impl Segment {
    /// Parse a raw segment, treating all-digit text as an index. Digits too
    /// large for `usize` parse as an out-of-range index.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            return Segment::Index(raw.parse::<usize>().unwrap_or(usize::MAX));
        }
        Segment::Key(raw.to_owned())
    }

    /// The index, if this segment is one.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match self {
            Segment::Index(index) => Some(*index),
            Segment::Key(_) => None,
        }
    }

    /// Whether this segment is an index above [`MAX_INDEX`].
    #[must_use]
    pub fn is_out_of_range(&self) -> bool {
        self.index().is_some_and(|index| index > MAX_INDEX)
    }

    /// Whether this segment is an array index.
    #[must_use]
    pub fn is_index(&self) -> bool {
        matches!(self, Segment::Index(_))
    }

    /// Whether this segment is the synthetic `root` key.
    #[must_use]
    pub fn is_root_key(&self) -> bool {
        matches!(self, Segment::Key(key) if key == ROOT_KEY)
    }

    /// The segment as an object key.
    #[must_use]
    pub fn to_key(&self) -> Cow<'_, str> {
        match self {
            Segment::Key(key) => Cow::Borrowed(key),
            Segment::Index(index) => Cow::Owned(index.to_string()),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => f.write_str(key),
            Segment::Index(index) => write!(f, "{index}"),
        }
    }
}

// ---------------------------------------------------------------------------
// FieldPath
// ---------------------------------------------------------------------------

/// A parsed field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FieldPath {
    segments: SmallVec<[Segment; 4]>,
}

impl FieldPath {
    /// Parse a dotted or bracketed path.
    ///
    /// Quotes and closing brackets are dropped, then the text is split on `.`
    /// and `[`; empty pieces are ignored, so `a..b` and `a[0]` both parse.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let cleaned: String = raw
            .chars()
            .filter(|c| !matches!(c, '"' | '\'' | ']'))
            .collect();
        let segments = cleaned
            .split(['.', '['])
            .filter(|piece| !piece.is_empty())
            .map(Segment::parse)
            .collect();
        Self { segments }
    }

    /// Build a path from segments.
    #[must_use]
    pub fn from_segments(segments: impl IntoIterator<Item = Segment>) -> Self {
        Self {
            segments: segments.into_iter().collect(),
        }
    }

    /// The empty path, addressing a whole tree.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The last segment.
    #[must_use]
    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// The path without its last segment, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<FieldPath> {
        let (_, parents) = self.segments.split_last()?;
        Some(Self::from_segments(parents.iter().cloned()))
    }

    /// This path extended by one segment.
    #[must_use]
    pub fn child(&self, segment: Segment) -> FieldPath {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    /// This path extended by an array index.
    #[must_use]
    pub fn index(&self, index: usize) -> FieldPath {
        self.child(Segment::Index(index))
    }

    /// Whether `prefix` is a segment-wise prefix of this path (or equal to it).
    #[must_use]
    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Whether either path is a prefix of the other.
    #[must_use]
    pub fn is_related(&self, other: &FieldPath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl From<&str> for FieldPath {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<&String> for FieldPath {
    fn from(raw: &String) -> Self {
        Self::parse(raw)
    }
}

/// Normalize a path string (`a[0].b` becomes `a.0.b`).
#[must_use]
pub fn normalize(raw: &str) -> String {
    FieldPath::parse(raw).to_string()
}

/// Whether two path strings are equal or one is a segment-wise prefix of the other.
#[must_use]
pub fn is_related(a: &str, b: &str) -> bool {
    FieldPath::parse(a).is_related(&FieldPath::parse(b))
}

// ---------------------------------------------------------------------------
// PathNode
// ---------------------------------------------------------------------------

/// A node of a path-addressable tree.
///
/// Implemented by [`Value`](crate::value::Value) and [`Tree`](crate::tree::Tree).
pub trait PathNode: Sized {
    /// The unset marker (also used for array holes).
    fn vacant() -> Self;

    fn is_vacant(&self) -> bool;

    /// Whether this node is an object or array.
    fn is_container(&self) -> bool;

    /// Whether this node is a container with no occupied children.
    fn is_empty_container(&self) -> bool;

    fn child(&self, segment: &Segment) -> Option<&Self>;

    fn child_mut(&mut self, segment: &Segment) -> Option<&mut Self>;

    /// The slot for `segment`, reshaping `self` into a fitting container
    /// first when it is not one. Array slots past the end are padded with
    /// vacant nodes. Callers never pass an index above [`MAX_INDEX`].
    fn slot(&mut self, segment: &Segment) -> &mut Self;

    /// Remove the child at `segment`. Array elements leave a vacant hole.
    fn remove_child(&mut self, segment: &Segment) -> Option<Self>;
}

fn node_at<'a, N: PathNode>(tree: &'a N, segments: &[Segment]) -> Option<&'a N> {
    let mut node = tree;
    for segment in segments {
        node = node.child(segment)?;
    }
    Some(node)
}

fn node_at_mut<'a, N: PathNode>(tree: &'a mut N, segments: &[Segment]) -> Option<&'a mut N> {
    let mut node = tree;
    for segment in segments {
        node = node.child_mut(segment)?;
    }
    Some(node)
}

/// Read the node at `segments`; vacant nodes read as `None`.
pub fn get_at<'a, N: PathNode>(tree: &'a N, segments: &[Segment]) -> Option<&'a N> {
    node_at(tree, segments).filter(|node| !node.is_vacant())
}

/// Mutable variant of [`get_at`].
pub fn get_at_mut<'a, N: PathNode>(tree: &'a mut N, segments: &[Segment]) -> Option<&'a mut N> {
    node_at_mut(tree, segments).filter(|node| !node.is_vacant())
}

/// Read the node at `path`. The empty path reads as `None`.
pub fn get<'a, N: PathNode>(tree: &'a N, path: &str) -> Option<&'a N> {
    let path = FieldPath::parse(path);
    if path.is_empty() {
        return None;
    }
    get_at(tree, path.segments())
}

/// Mutable variant of [`get`].
pub fn get_mut<'a, N: PathNode>(tree: &'a mut N, path: &str) -> Option<&'a mut N> {
    let path = FieldPath::parse(path);
    if path.is_empty() {
        return None;
    }
    get_at_mut(tree, path.segments())
}

/// Read the node at `path`, falling back to `default`.
pub fn get_or<'a, N: PathNode>(tree: &'a N, path: &str, default: &'a N) -> &'a N {
    get(tree, path).unwrap_or(default)
}

/// Write `value` at `segments`, creating containers along the way.
pub fn set_at<N: PathNode>(tree: &mut N, segments: &[Segment], value: N) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    if segments.iter().any(Segment::is_out_of_range) {
        tracing::trace!(segments = segments.len(), "write past the index limit ignored");
        return;
    }
    let mut node = tree;
    for segment in parents {
        node = node.slot(segment);
    }
    *node.slot(last) = value;
}

/// Write `value` at `path`. Empty paths are ignored.
pub fn set<N: PathNode>(tree: &mut N, path: &str, value: N) {
    set_at(tree, FieldPath::parse(path).segments(), value);
}

/// Remove the node at `segments`, then prune ancestors left empty.
pub fn unset_at<N: PathNode>(tree: &mut N, segments: &[Segment]) -> Option<N> {
    let (last, parents) = segments.split_last()?;
    let removed = node_at_mut(tree, parents)?.remove_child(last);
    if !parents.is_empty() && node_at(tree, parents).is_some_and(PathNode::is_empty_container) {
        unset_at(tree, parents);
    }
    removed.filter(|node| !node.is_vacant())
}

/// Remove the node at `path`. Returns the removed node, if any.
pub fn unset<N: PathNode>(tree: &mut N, path: &str) -> Option<N> {
    unset_at(tree, FieldPath::parse(path).segments())
}

/// Drop vacant slots.
pub fn compact<N: PathNode>(items: impl IntoIterator<Item = N>) -> Vec<N> {
    items.into_iter().filter(|item| !item.is_vacant()).collect()
}

/// Whether a slice holds no occupied slot.
pub fn is_all_vacant<N: PathNode>(items: &[N]) -> bool {
    items.iter().all(PathNode::is_vacant)
}

/// Remove duplicates, keeping the first occurrence of each item.
pub fn dedupe<T: Hash + Eq>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    items.into_iter().collect::<IndexSet<T>>().into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn parse_dotted_and_bracketed() {
        let dotted = FieldPath::parse("user.addresses.0.city");
        let bracketed = FieldPath::parse("user.addresses[0].city");
        assert_eq!(dotted, bracketed);
        assert_eq!(dotted.len(), 4);
        assert_eq!(dotted.segments()[2], Segment::Index(0));
        assert_eq!(dotted.to_string(), "user.addresses.0.city");
    }

    #[test]
    fn parse_drops_quotes_and_empty_pieces() {
        let path = FieldPath::parse("a[\"b\"]..c");
        assert_eq!(path.to_string(), "a.b.c");
        assert!(FieldPath::parse("").is_empty());
        assert!(FieldPath::parse("...").is_empty());
    }

    #[test]
    fn writes_past_the_index_limit_are_ignored() {
        let mut values = Value::object([("a", Value::array([]))]);
        set(&mut values, "a.18446744073709551615", Value::from(1));
        set(&mut values, &format!("a.{}", MAX_INDEX + 1), Value::from(1));
        set(&mut values, "a.99999999999999999999999", Value::from(1));
        assert_eq!(get(&values, "a").and_then(Value::as_array).map(<[Value]>::len), Some(0));
        assert!(get(&values, "a.18446744073709551615").is_none());

        set(&mut values, "b.3", Value::from(2));
        assert_eq!(get(&values, "b.3"), Some(&Value::from(2)));
    }

    #[test]
    fn prefix_relations_are_segment_aware() {
        assert!(is_related("a", "a.b"));
        assert!(is_related("a.b", "a"));
        assert!(is_related("a.b", "a.b"));
        assert!(!is_related("a", "ab"));
        assert!(!is_related("a.b", "a.c"));
    }

    #[test]
    fn parent_and_child() {
        let path = FieldPath::parse("items.2.name");
        assert_eq!(path.parent().map(|p| p.to_string()), Some("items.2".into()));
        assert_eq!(FieldPath::parse("items").index(3).to_string(), "items.3");
        assert!(FieldPath::root().parent().is_none());
    }

    #[test]
    fn get_missing_intermediate_is_none() {
        let tree = Value::object([("a", Value::from(1))]);
        assert!(get(&tree, "a.b.c").is_none());
        assert!(get(&tree, "x").is_none());
        assert!(get(&tree, "").is_none());
        let fallback = Value::from("fallback");
        assert_eq!(get_or(&tree, "x.y", &fallback), &fallback);
    }

    #[test]
    fn set_infers_arrays_from_index_segments() {
        let mut tree = Value::Undefined;
        set(&mut tree, "list.1.name", Value::from("b"));
        let list = get(&tree, "list").and_then(Value::as_array).map(<[Value]>::len);
        assert_eq!(list, Some(2));
        assert!(get(&tree, "list.0").is_none());
        assert_eq!(get(&tree, "list.1.name"), Some(&Value::from("b")));
    }

    #[test]
    fn set_replaces_scalars_on_the_way() {
        let mut tree = Value::object([("a", Value::from(5))]);
        set(&mut tree, "a.b", Value::from(true));
        assert_eq!(get(&tree, "a.b"), Some(&Value::from(true)));
    }

    #[test]
    fn unset_keeps_array_gaps() {
        let mut tree = Value::object([(
            "list",
            Value::array([Value::from(1), Value::from(2), Value::from(3)]),
        )]);
        let removed = unset(&mut tree, "list.1");
        assert_eq!(removed, Some(Value::from(2)));
        assert_eq!(get(&tree, "list.0"), Some(&Value::from(1)));
        assert!(get(&tree, "list.1").is_none());
        assert_eq!(get(&tree, "list.2"), Some(&Value::from(3)));
    }

    #[test]
    fn unset_prunes_empty_ancestors() {
        let mut tree = Value::object([
            ("a", Value::object([("b", Value::object([("c", Value::from(1))]))])),
            ("keep", Value::from(true)),
        ]);
        unset(&mut tree, "a.b.c");
        assert!(get(&tree, "a").is_none());
        assert_eq!(get(&tree, "keep"), Some(&Value::from(true)));
    }

    #[test]
    fn unset_prunes_all_hole_arrays() {
        let mut tree = Value::object([("list", Value::array([Value::from(1)]))]);
        unset(&mut tree, "list.0");
        assert!(get(&tree, "list").is_none());
    }

    #[test]
    fn compact_and_dedupe() {
        let items = vec![Value::Undefined, Value::from(1), Value::Undefined];
        assert_eq!(compact(items), vec![Value::from(1)]);
        assert_eq!(dedupe(["a", "b", "a", "c", "b"]), vec!["a", "b", "c"]);
    }
}

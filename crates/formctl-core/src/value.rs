#![forbid(unsafe_code)]

//! The dynamic value model for form data.
//!
//! [`Value`] mirrors the logical form shape: objects and arrays nest, leaves
//! hold scalars, dates, sets, maps, or opaque handles that the engine must
//! never look inside (file blobs, element handles, class instances).
//!
//! # Cloning
//!
//! Every variant reports a [`CloneStrategy`]:
//!
//! | Strategy | Variants | Behavior |
//! |----------|----------|----------|
//! | `Structural` | scalars, `Date`, `Set`, `Map` | copied by value |
//! | `Passthrough` | `Opaque` | the handle is shared, never copied |
//! | `Container` | `Array`, `Object` | recurse into children |
//!
//! [`clone_value`] dispatches on that tag, and `Clone for Value` delegates to
//! it, so snapshots handed to observers and default-value baselines are always
//! structure-preserving.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::path::{MAX_INDEX, PathNode, Segment};

// ---------------------------------------------------------------------------
// Opaque handles
// ---------------------------------------------------------------------------

/// What an [`OpaqueValue`] stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpaqueKind {
    /// Binary payload.
    Blob,
    /// File selected by the user.
    File,
    /// A UI element handle.
    Element,
    /// Any other non-plain object.
    Instance,
}

/// A shared handle to something the engine stores but never inspects.
#[derive(Clone)]
pub struct OpaqueValue {
    kind: OpaqueKind,
    inner: Rc<dyn Any>,
}

impl OpaqueValue {
    #[must_use]
    pub fn new<T: Any>(kind: OpaqueKind, value: T) -> Self {
        Self {
            kind,
            inner: Rc::new(value),
        }
    }

    #[must_use]
    pub fn kind(&self) -> OpaqueKind {
        self.kind
    }

    /// Borrow the wrapped object if it has type `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Whether two handles point at the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &OpaqueValue) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueValue")
            .field("kind", &self.kind)
            .field("ptr", &Rc::as_ptr(&self.inner).cast::<()>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// How a value is copied when a snapshot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneStrategy {
    Structural,
    Passthrough,
    Container,
}

/// A form value.
#[derive(Debug, Default)]
pub enum Value {
    /// Unset. Also marks holes inside arrays.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(OffsetDateTime),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
    /// Insertion-ordered set of distinct values.
    Set(Vec<Value>),
    /// Insertion-ordered key/value pairs with arbitrary keys.
    Map(Vec<(Value, Value)>),
    Opaque(OpaqueValue),
}

impl Value {
    /// Build an object from key/value pairs.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build an array.
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(items.into_iter().collect())
    }

    /// Build a set, dropping duplicates.
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        let mut out: Vec<Value> = Vec::new();
        for item in items {
            if !out.iter().any(|existing| crate::equal::deep_equal(existing, &item)) {
                out.push(item);
            }
        }
        Value::Set(out)
    }

    /// Wrap an opaque object.
    pub fn opaque<T: Any>(kind: OpaqueKind, value: T) -> Self {
        Value::Opaque(OpaqueValue::new(kind, value))
    }

    #[must_use]
    pub fn clone_strategy(&self) -> CloneStrategy {
        match self {
            Value::Array(_) | Value::Object(_) => CloneStrategy::Container,
            Value::Opaque(_) => CloneStrategy::Passthrough,
            _ => CloneStrategy::Structural,
        }
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `Undefined` or `Null`.
    #[must_use]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Whether the value counts as true in a boolean context.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<OffsetDateTime> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_opaque(&self) -> Option<&OpaqueValue> {
        match self {
            Value::Opaque(handle) => Some(handle),
            _ => None,
        }
    }

    /// Length of strings (in chars), arrays, sets and maps.
    #[must_use]
    pub fn length(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(items) | Value::Set(items) => Some(items.len()),
            Value::Map(entries) => Some(entries.len()),
            _ => None,
        }
    }

    /// Short type name for logs.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Opaque(_) => "opaque",
        }
    }

    /// Convert to JSON. Undefined and opaque values become `null`, dates
    /// become RFC 3339 strings, sets become arrays, maps become arrays of
    /// `[key, value]` pairs.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Undefined | Value::Null | Value::Opaque(_) => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Value::String(s) => Json::String(s.clone()),
            Value::Date(d) => d.format(&Rfc3339).map_or(Json::Null, Json::String),
            Value::Array(items) | Value::Set(items) => {
                Json::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => Json::Object(
                map.iter()
                    .filter(|(_, v)| !v.is_undefined())
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Map(entries) => Json::Array(
                entries
                    .iter()
                    .map(|(k, v)| Json::Array(vec![k.to_json(), v.to_json()]))
                    .collect(),
            ),
        }
    }

    fn share(&self) -> Value {
        match self {
            Value::Opaque(handle) => Value::Opaque(handle.clone()),
            other => other.copy_structural(),
        }
    }

    fn copy_structural(&self) -> Value {
        match self {
            Value::Undefined => Value::Undefined,
            Value::Null => Value::Null,
            Value::Bool(b) => Value::Bool(*b),
            Value::Number(n) => Value::Number(*n),
            Value::String(s) => Value::String(s.clone()),
            Value::Date(d) => Value::Date(*d),
            Value::Set(items) => Value::Set(items.iter().map(clone_value).collect()),
            Value::Map(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| (clone_value(k), clone_value(v)))
                    .collect(),
            ),
            Value::Array(_) | Value::Object(_) => self.clone_container(),
            Value::Opaque(_) => self.share(),
        }
    }

    fn clone_container(&self) -> Value {
        match self {
            Value::Array(items) => Value::Array(items.iter().map(clone_value).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), clone_value(v)))
                    .collect(),
            ),
            other => other.copy_structural(),
        }
    }
}

/// Copy a value according to its [`CloneStrategy`].
#[must_use]
pub fn clone_value(value: &Value) -> Value {
    match value.clone_strategy() {
        CloneStrategy::Passthrough => value.share(),
        CloneStrategy::Structural => value.copy_structural(),
        CloneStrategy::Container => value.clone_container(),
    }
}

impl Clone for Value {
    fn clone(&self) -> Self {
        clone_value(self)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        crate::equal::deep_equal(self, other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::String(s) => f.write_str(s),
            Value::Opaque(handle) => write!(f, "[opaque {:?}]", handle.kind()),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<OffsetDateTime> for Value {
    fn from(d: OffsetDateTime) -> Self {
        Value::Date(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Object(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(option: Option<T>) -> Self {
        option.map_or(Value::Undefined, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

// ---------------------------------------------------------------------------
// Path addressing
// ---------------------------------------------------------------------------

impl PathNode for Value {
    fn vacant() -> Self {
        Value::Undefined
    }

    fn is_vacant(&self) -> bool {
        self.is_undefined()
    }

    fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    fn is_empty_container(&self) -> bool {
        match self {
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.iter().all(Value::is_undefined),
            _ => false,
        }
    }

    fn child(&self, segment: &Segment) -> Option<&Self> {
        match (self, segment) {
            (Value::Object(map), segment) => map.get(segment.to_key().as_ref()),
            (Value::Array(items), Segment::Index(index)) => items.get(*index),
            _ => None,
        }
    }

    fn child_mut(&mut self, segment: &Segment) -> Option<&mut Self> {
        match (self, segment) {
            (Value::Object(map), segment) => map.get_mut(segment.to_key().as_ref()),
            (Value::Array(items), Segment::Index(index)) => items.get_mut(*index),
            _ => None,
        }
    }

    fn slot(&mut self, segment: &Segment) -> &mut Self {
        let fits = matches!(
            (&*self, segment),
            (Value::Object(_), _) | (Value::Array(_), Segment::Index(_))
        );
        if !fits {
            *self = match segment {
                Segment::Index(_) => Value::Array(Vec::new()),
                Segment::Key(_) => Value::Object(IndexMap::new()),
            };
        }
        match self {
            Value::Object(map) => map
                .entry(segment.to_key().into_owned())
                .or_insert(Value::Undefined),
            Value::Array(items) => {
                let index = segment
                    .index()
                    .filter(|index| *index <= MAX_INDEX)
                    .unwrap_or(items.len());
                if items.len() <= index {
                    items.resize_with(index + 1, || Value::Undefined);
                }
                &mut items[index]
            }
            // Reshaped into a container above.
            other => other,
        }
    }

    fn remove_child(&mut self, segment: &Segment) -> Option<Self> {
        match (self, segment) {
            (Value::Object(map), segment) => map.shift_remove(segment.to_key().as_ref()),
            (Value::Array(items), Segment::Index(index)) => items
                .get_mut(*index)
                .map(|slot| std::mem::replace(slot, Value::Undefined)),
            _ => None,
        }
    }
}

#![forbid(unsafe_code)]

//! Core data structures for formctl.
//!
//! - [`value`]: the dynamic form value model and its clone strategies.
//! - [`path`]: dotted-path parsing and `get`/`set`/`unset` over any [`PathNode`].
//! - [`tree`]: sparse bookkeeping trees (dirty, touched, errors, registry).
//! - [`equal`]: structural equality and baseline diffing.
//! - [`subject`]: the multicast observable every notification channel uses.

pub mod equal;
pub mod path;
pub mod subject;
pub mod tree;
pub mod value;

pub use equal::{deep_equal, diff_values};
pub use path::{FieldPath, PathNode, ROOT_KEY, Segment};
pub use subject::{ObserverId, Subject, Subscription};
pub use tree::{ArrayNode, Tree};
pub use value::{CloneStrategy, OpaqueKind, OpaqueValue, Value, clone_value};

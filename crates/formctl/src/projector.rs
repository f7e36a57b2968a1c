#![forbid(unsafe_code)]

//! The observable form state and the rules for broadcasting its deltas.
//!
//! [`FormState`] is the canonical snapshot. Every mutation produces a
//! [`FormStatePatch`] holding only the keys it changed; patches are merged
//! per key (last write wins) by the state update queue before delivery.
//!
//! # Read sets
//!
//! Each state observer owns a [`ReadSet`]: the keys it has declared or read
//! through a [`StateView`]. A patch reaches the observer only when it touches
//! one of those keys, or when the observer asked for every delta.
//!
//! # Name filters
//!
//! A patch names the fields it concerns. An observer scoped to some names
//! receives the patch when any of its names is equal to, an ancestor of, or
//! a descendant of a patch name (segment-wise, so `a` matches `a.b` but not
//! `ab`). Patches naming nothing concern the whole form.

use std::cell::Cell;
use std::rc::Rc;

use bitflags::bitflags;
use formctl_core::{FieldPath, Tree};
use formctl_runtime::Merge;
use formctl_validation::FieldError;
use serde::Serialize;

bitflags! {
    /// Top-level keys of [`FormState`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StateKeys: u16 {
        const IS_DIRTY = 1 << 0;
        const DIRTY_FIELDS = 1 << 1;
        const TOUCHED_FIELDS = 1 << 2;
        const ERRORS = 1 << 3;
        const IS_VALID = 1 << 4;
        const IS_VALIDATING = 1 << 5;
        const VALIDATING_FIELDS = 1 << 6;
        const IS_SUBMITTING = 1 << 7;
        const IS_SUBMITTED = 1 << 8;
        const SUBMIT_COUNT = 1 << 9;
        const IS_SUBMIT_SUCCESSFUL = 1 << 10;
        const FOCUSED_FIELD = 1 << 11;
        const DISABLED = 1 << 12;
    }
}

/// Snapshot of the observable form state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormState {
    pub is_dirty: bool,
    pub dirty_fields: Tree<bool>,
    pub touched_fields: Tree<bool>,
    pub errors: Tree<FieldError>,
    pub is_valid: bool,
    pub is_validating: bool,
    pub validating_fields: Vec<String>,
    pub is_submitting: bool,
    pub is_submitted: bool,
    pub submit_count: u32,
    pub is_submit_successful: bool,
    pub focused_field: Option<String>,
    pub disabled: bool,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            is_dirty: false,
            dirty_fields: Tree::Vacant,
            touched_fields: Tree::Vacant,
            errors: Tree::Vacant,
            is_valid: true,
            is_validating: false,
            validating_fields: Vec::new(),
            is_submitting: false,
            is_submitted: false,
            submit_count: 0,
            is_submit_successful: false,
            focused_field: None,
            disabled: false,
        }
    }
}

/// A partial form state. `None` means "unchanged".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormStatePatch {
    /// Fields the change concerns; empty for form-wide changes.
    pub names: Vec<String>,
    pub is_dirty: Option<bool>,
    pub dirty_fields: Option<Tree<bool>>,
    pub touched_fields: Option<Tree<bool>>,
    pub errors: Option<Tree<FieldError>>,
    pub is_valid: Option<bool>,
    pub is_validating: Option<bool>,
    pub validating_fields: Option<Vec<String>>,
    pub is_submitting: Option<bool>,
    pub is_submitted: Option<bool>,
    pub submit_count: Option<u32>,
    pub is_submit_successful: Option<bool>,
    pub focused_field: Option<Option<String>>,
    pub disabled: Option<bool>,
}

fn take_newer<T>(slot: &mut Option<T>, newer: Option<T>) {
    if newer.is_some() {
        *slot = newer;
    }
}

impl Merge for FormStatePatch {
    fn merge(&mut self, newer: Self) {
        for name in newer.names {
            if !self.names.contains(&name) {
                self.names.push(name);
            }
        }
        take_newer(&mut self.is_dirty, newer.is_dirty);
        take_newer(&mut self.dirty_fields, newer.dirty_fields);
        take_newer(&mut self.touched_fields, newer.touched_fields);
        take_newer(&mut self.errors, newer.errors);
        take_newer(&mut self.is_valid, newer.is_valid);
        take_newer(&mut self.is_validating, newer.is_validating);
        take_newer(&mut self.validating_fields, newer.validating_fields);
        take_newer(&mut self.is_submitting, newer.is_submitting);
        take_newer(&mut self.is_submitted, newer.is_submitted);
        take_newer(&mut self.submit_count, newer.submit_count);
        take_newer(&mut self.is_submit_successful, newer.is_submit_successful);
        take_newer(&mut self.focused_field, newer.focused_field);
        take_newer(&mut self.disabled, newer.disabled);
    }

    fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }
}

impl FormStatePatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope the patch to `name`.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    /// The keys this patch sets.
    #[must_use]
    pub fn keys(&self) -> StateKeys {
        let mut keys = StateKeys::empty();
        keys.set(StateKeys::IS_DIRTY, self.is_dirty.is_some());
        keys.set(StateKeys::DIRTY_FIELDS, self.dirty_fields.is_some());
        keys.set(StateKeys::TOUCHED_FIELDS, self.touched_fields.is_some());
        keys.set(StateKeys::ERRORS, self.errors.is_some());
        keys.set(StateKeys::IS_VALID, self.is_valid.is_some());
        keys.set(StateKeys::IS_VALIDATING, self.is_validating.is_some());
        keys.set(StateKeys::VALIDATING_FIELDS, self.validating_fields.is_some());
        keys.set(StateKeys::IS_SUBMITTING, self.is_submitting.is_some());
        keys.set(StateKeys::IS_SUBMITTED, self.is_submitted.is_some());
        keys.set(StateKeys::SUBMIT_COUNT, self.submit_count.is_some());
        keys.set(StateKeys::IS_SUBMIT_SUCCESSFUL, self.is_submit_successful.is_some());
        keys.set(StateKeys::FOCUSED_FIELD, self.focused_field.is_some());
        keys.set(StateKeys::DISABLED, self.disabled.is_some());
        keys
    }

    /// Write every set key into `state`.
    pub fn apply_to(&self, state: &mut FormState) {
        fn put<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
        put(&mut state.is_dirty, &self.is_dirty);
        put(&mut state.dirty_fields, &self.dirty_fields);
        put(&mut state.touched_fields, &self.touched_fields);
        put(&mut state.errors, &self.errors);
        put(&mut state.is_valid, &self.is_valid);
        put(&mut state.is_validating, &self.is_validating);
        put(&mut state.validating_fields, &self.validating_fields);
        put(&mut state.is_submitting, &self.is_submitting);
        put(&mut state.is_submitted, &self.is_submitted);
        put(&mut state.submit_count, &self.submit_count);
        put(&mut state.is_submit_successful, &self.is_submit_successful);
        put(&mut state.focused_field, &self.focused_field);
        put(&mut state.disabled, &self.disabled);
    }
}

// ---------------------------------------------------------------------------
// Read sets
// ---------------------------------------------------------------------------

/// The keys one observer has declared or read. Clones share the set.
#[derive(Debug, Clone, Default)]
pub struct ReadSet {
    keys: Rc<Cell<StateKeys>>,
}

impl ReadSet {
    #[must_use]
    pub fn new(declared: StateKeys) -> Self {
        Self {
            keys: Rc::new(Cell::new(declared)),
        }
    }

    #[must_use]
    pub fn keys(&self) -> StateKeys {
        self.keys.get()
    }

    pub fn record(&self, keys: StateKeys) {
        self.keys.set(self.keys.get() | keys);
    }
}

/// Read access to a state snapshot that records which keys were read.
#[derive(Debug, Clone)]
pub struct StateView {
    state: FormState,
    reads: ReadSet,
}

impl StateView {
    #[must_use]
    pub fn new(state: FormState, reads: ReadSet) -> Self {
        Self { state, reads }
    }

    fn read<T>(&self, key: StateKeys, value: T) -> T {
        self.reads.record(key);
        value
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.read(StateKeys::IS_DIRTY, self.state.is_dirty)
    }

    #[must_use]
    pub fn dirty_fields(&self) -> &Tree<bool> {
        self.read(StateKeys::DIRTY_FIELDS, &self.state.dirty_fields)
    }

    #[must_use]
    pub fn touched_fields(&self) -> &Tree<bool> {
        self.read(StateKeys::TOUCHED_FIELDS, &self.state.touched_fields)
    }

    #[must_use]
    pub fn errors(&self) -> &Tree<FieldError> {
        self.read(StateKeys::ERRORS, &self.state.errors)
    }

    /// The error at `path`, reading the `errors` key.
    #[must_use]
    pub fn error(&self, path: &str) -> Option<&FieldError> {
        formctl_core::path::get(self.errors(), path).and_then(Tree::leaf)
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.read(StateKeys::IS_VALID, self.state.is_valid)
    }

    #[must_use]
    pub fn is_validating(&self) -> bool {
        self.read(StateKeys::IS_VALIDATING, self.state.is_validating)
    }

    #[must_use]
    pub fn validating_fields(&self) -> &[String] {
        self.read(StateKeys::VALIDATING_FIELDS, &self.state.validating_fields)
    }

    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.read(StateKeys::IS_SUBMITTING, self.state.is_submitting)
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.read(StateKeys::IS_SUBMITTED, self.state.is_submitted)
    }

    #[must_use]
    pub fn submit_count(&self) -> u32 {
        self.read(StateKeys::SUBMIT_COUNT, self.state.submit_count)
    }

    #[must_use]
    pub fn is_submit_successful(&self) -> bool {
        self.read(StateKeys::IS_SUBMIT_SUCCESSFUL, self.state.is_submit_successful)
    }

    #[must_use]
    pub fn focused_field(&self) -> Option<&str> {
        self.read(StateKeys::FOCUSED_FIELD, self.state.focused_field.as_deref())
    }

    #[must_use]
    pub fn disabled(&self) -> bool {
        self.read(StateKeys::DISABLED, self.state.disabled)
    }

    /// The whole snapshot, without recording reads.
    #[must_use]
    pub fn snapshot(&self) -> &FormState {
        &self.state
    }
}

// ---------------------------------------------------------------------------
// Delivery rules
// ---------------------------------------------------------------------------

/// Whether a patch must reach an observer with read set `reads`.
#[must_use]
pub fn should_render(patch: &FormStatePatch, reads: StateKeys, all: bool) -> bool {
    let keys = patch.keys();
    !keys.is_empty() && (all || keys.intersects(reads))
}

/// Whether a change to `names` concerns an observer scoped to `filter`.
///
/// An empty filter or an empty name list always matches.
#[must_use]
pub fn should_subscribe_by_name(filter: &[String], names: &[String], exact: bool) -> bool {
    if filter.is_empty() || names.is_empty() {
        return true;
    }
    names.iter().any(|name| {
        let signal = FieldPath::parse(name);
        filter.iter().any(|wanted| {
            let wanted = FieldPath::parse(wanted);
            if exact {
                wanted == signal
            } else {
                wanted.is_related(&signal)
            }
        })
    })
}

#![forbid(unsafe_code)]

//! Mutable state of one form control.
//!
//! The store holds the value tree, the baseline, the bookkeeping trees and
//! the registry. Its methods mutate only the store; building patches and
//! notifying observers is left to the control.
//!
//! # Invariants
//!
//! - `state` mirrors the bookkeeping trees after every committed patch.
//! - `revisions[path]` grows on every value write to `path`; validation
//!   results captured at an older revision are discarded. Entries are kept
//!   only for paths that still name a field or field array once a subtree
//!   is unregistered or an array reshaped.
//! - `array_ids[name]` has one id per item of the array at `name`.

use formctl_core::equal::{deep_equal_opt, diff_values};
use formctl_core::path::{get, normalize, set, unset};
use formctl_core::{FieldPath, Tree, Value};
use formctl_validation::FieldError;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::disabled::{DisabledSetting, ReadOnlyTracker};
use crate::field_array::{ArraySlot, ItemId};
use crate::focus::FocusTracker;
use crate::projector::{FormState, FormStatePatch};
use crate::registry::Registry;

#[derive(Debug, Default)]
pub(crate) struct FormStore {
    pub values: Value,
    pub defaults: Value,
    pub dirty: Tree<bool>,
    pub touched: Tree<bool>,
    pub errors: Tree<FieldError>,
    pub registry: Registry,
    pub state: FormState,
    pub array_ids: FxHashMap<String, Vec<ItemId>>,
    /// Field arrays whose items differ from the baseline in length or order.
    pub array_structure: FxHashSet<String>,
    pub revisions: FxHashMap<String, u64>,
    next_revision: u64,
    /// Bumped by `reset`; results of passes started before are discarded.
    pub epoch: u64,
    pub read_only: ReadOnlyTracker,
    pub focus: FocusTracker,
    pub disabled: DisabledSetting,
    /// Paths with a validation in flight.
    pub validating: Vec<String>,
    /// Path to focus once a binding for it is attached.
    pub pending_focus: Option<String>,
    next_item_id: u64,
}

impl FormStore {
    pub fn new(defaults: Value, disabled: DisabledSetting) -> Self {
        let mut store = Self {
            values: defaults.clone(),
            defaults,
            disabled,
            ..Self::default()
        };
        store.state.disabled = store.disabled.is_form_disabled();
        store
    }

    // -- values ---------------------------------------------------------------

    /// Current value at `path`, `Undefined` when absent.
    pub fn value_at(&self, path: &str) -> Value {
        get(&self.values, path).cloned().unwrap_or_default()
    }

    pub fn baseline_at(&self, path: &str) -> Value {
        get(&self.defaults, path).cloned().unwrap_or_default()
    }

    /// Write `value` at `path` and bump the revisions of every path the write
    /// can change.
    pub fn write_value(&mut self, path: &str, value: Value) {
        if path.is_empty() {
            self.values = value;
        } else {
            set(&mut self.values, path, value);
        }
        self.bump_related(path);
    }

    pub fn remove_value(&mut self, path: &str) {
        unset(&mut self.values, path);
        self.bump_related(path);
    }

    // -- revisions ------------------------------------------------------------

    pub fn revision(&self, path: &str) -> u64 {
        self.revisions.get(path).copied().unwrap_or(0)
    }

    /// Bump `path`, the registered fields beneath it and the field arrays
    /// above or beneath it.
    pub fn bump_related(&mut self, path: &str) {
        let mut touched = self.registry.descendants(path);
        let prefix = FieldPath::parse(path);
        touched.extend(
            self.registry
                .array_names()
                .into_iter()
                .filter(|name| FieldPath::parse(name).is_related(&prefix)),
        );
        touched.push(normalize(path));
        for name in touched {
            self.next_revision += 1;
            self.revisions.insert(name, self.next_revision);
        }
    }

    /// Drop revisions under `path` that no longer address a registered
    /// field or field array.
    pub fn forget_revisions(&mut self, path: &str) {
        let prefix = FieldPath::parse(path);
        let registry = &self.registry;
        let arrays = &self.array_ids;
        self.revisions.retain(|name, _| {
            !FieldPath::parse(name).starts_with(&prefix) || registry.contains(name) || arrays.contains_key(name)
        });
    }

    // -- dirty ----------------------------------------------------------------

    /// Recompute the dirty subtree at `path` from a diff against the baseline.
    /// Returns whether the dirty tree changed.
    pub fn refresh_dirty(&mut self, path: &str) -> bool {
        let diff = diff_values(&self.baseline_at(path), &self.value_at(path));
        let before = get(&self.dirty, path).cloned();
        if diff.is_empty() {
            unset(&mut self.dirty, path);
        } else {
            set(&mut self.dirty, path, diff);
        }
        get(&self.dirty, path).cloned() != before
    }

    /// Re-check which field arrays at or around `path` differ from their
    /// baseline.
    pub fn refresh_array_structure(&mut self, path: &str) {
        let prefix = FieldPath::parse(path);
        let names: Vec<String> = self
            .array_ids
            .keys()
            .filter(|name| FieldPath::parse(name).is_related(&prefix))
            .cloned()
            .collect();
        for name in names {
            let same = deep_equal_opt(get(&self.defaults, &name), get(&self.values, &name));
            if same {
                self.array_structure.remove(&name);
            } else {
                self.array_structure.insert(name);
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.any() || !self.array_structure.is_empty()
    }

    /// Full diff of the value tree against the baseline.
    pub fn rediff(&mut self) {
        self.dirty = diff_values(&self.defaults, &self.values);
        self.array_structure.clear();
        let names: Vec<String> = self.array_ids.keys().cloned().collect();
        for name in names {
            self.refresh_array_structure(&name);
        }
    }

    // -- touched / errors -----------------------------------------------------

    pub fn is_touched(&self, path: &str) -> bool {
        get(&self.touched, path).is_some_and(Tree::any)
    }

    /// Mark `path` touched. Returns whether it was not touched before.
    pub fn touch(&mut self, path: &str) -> bool {
        if get(&self.touched, path).and_then(Tree::leaf).copied() == Some(true) {
            return false;
        }
        set(&mut self.touched, path, Tree::Leaf(true));
        true
    }

    pub fn error_at(&self, path: &str) -> Option<&FieldError> {
        get(&self.errors, path).and_then(Tree::leaf)
    }

    pub fn has_error_under(&self, path: &str) -> bool {
        get(&self.errors, path).is_some_and(|node| !node.is_empty())
    }

    // -- field array ids ------------------------------------------------------

    pub fn fresh_id(&mut self) -> ItemId {
        self.next_item_id += 1;
        ItemId(format!("item-{}", self.next_item_id))
    }

    /// Ids of the array at `name`, created or resized to match its value.
    pub fn ids_for(&mut self, name: &str) -> Vec<ItemId> {
        let len = get(&self.values, name).and_then(Value::as_array).map_or(0, <[Value]>::len);
        let mut ids = self.array_ids.remove(name).unwrap_or_default();
        ids.truncate(len);
        while ids.len() < len {
            let id = self.fresh_id();
            ids.push(id);
        }
        self.array_ids.insert(name.to_owned(), ids.clone());
        ids
    }

    /// Replace placeholder ids with fresh ones and store the list.
    pub fn store_ids(&mut self, name: &str, mut ids: Vec<ItemId>) -> Vec<ItemId> {
        for id in &mut ids {
            if id.is_placeholder() {
                *id = self.fresh_id();
            }
        }
        self.array_ids.insert(name.to_owned(), ids.clone());
        ids
    }

    /// Regenerate the ids of every tracked array at or beneath `path`.
    pub fn regenerate_ids(&mut self, path: &str) {
        let prefix = FieldPath::parse(path);
        let names: Vec<String> = self
            .array_ids
            .keys()
            .filter(|name| FieldPath::parse(name).starts_with(&prefix))
            .cloned()
            .collect();
        for name in names {
            self.array_ids.remove(&name);
            self.ids_for(&name);
        }
    }

    // -- state ----------------------------------------------------------------

    /// Apply `patch` to the snapshot.
    pub fn commit(&mut self, patch: &FormStatePatch) {
        patch.apply_to(&mut self.state);
    }

    /// Patch carrying the dirty flags.
    pub fn dirty_patch(&self) -> FormStatePatch {
        FormStatePatch {
            is_dirty: Some(self.is_dirty()),
            dirty_fields: Some(self.dirty.clone()),
            ..FormStatePatch::default()
        }
    }

    /// Patch carrying the error tree and validity.
    pub fn errors_patch(&self) -> FormStatePatch {
        FormStatePatch {
            errors: Some(self.errors.clone()),
            is_valid: Some(self.errors.is_empty()),
            ..FormStatePatch::default()
        }
    }

    /// Patch carrying the validating flags.
    pub fn validating_patch(&self) -> FormStatePatch {
        FormStatePatch {
            is_validating: Some(!self.validating.is_empty()),
            validating_fields: Some(self.validating.clone()),
            ..FormStatePatch::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formctl_validation::RuleSet;

    fn store() -> FormStore {
        FormStore::new(
            Value::object([
                ("name", Value::from("ada")),
                ("items", Value::array([Value::from(1), Value::from(2)])),
            ]),
            DisabledSetting::default(),
        )
    }

    #[test]
    fn dirty_follows_baseline_diff() {
        let mut store = store();
        store.write_value("name", Value::from("grace"));
        assert!(store.refresh_dirty("name"));
        assert!(store.is_dirty());
        store.write_value("name", Value::from("ada"));
        assert!(store.refresh_dirty("name"));
        assert!(!store.is_dirty());
        assert!(!store.refresh_dirty("name"));
    }

    #[test]
    fn writes_bump_fields_beneath() {
        let mut store = store();
        store.registry.register("user.name", RuleSet::new());
        store.registry.register("user.email", RuleSet::new());
        let before = store.revision("user.email");
        store.write_value("user", Value::object([("name", Value::from("x"))]));
        assert!(store.revision("user.email") > before);
        assert!(store.revision("user.name") > 0);
    }

    #[test]
    fn forgetting_revisions_keeps_live_paths_only() {
        let mut store = store();
        store.registry.register("user.name", RuleSet::new());
        store.write_value("user", Value::object([("name", Value::from("x")), ("extra", Value::Null)]));
        store.write_value("user.extra", Value::Null);
        store.write_value("other", Value::from(1));
        assert!(store.revisions.contains_key("user.extra"));

        store.forget_revisions("user");
        assert!(!store.revisions.contains_key("user"));
        assert!(!store.revisions.contains_key("user.extra"));
        assert!(store.revisions.contains_key("user.name"));
        assert!(store.revisions.contains_key("other"));
    }

    #[test]
    fn array_structure_tracks_reorders() {
        let mut store = store();
        store.ids_for("items");
        store.write_value("items", Value::array([Value::from(2), Value::from(1)]));
        store.refresh_array_structure("items");
        assert!(store.is_dirty());
        store.write_value("items", Value::array([Value::from(1), Value::from(2)]));
        store.refresh_array_structure("items.0");
        assert!(!store.is_dirty());
    }

    #[test]
    fn ids_follow_array_length() {
        let mut store = store();
        let ids = store.ids_for("items");
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        store.write_value("items", Value::array([Value::from(1)]));
        assert_eq!(store.ids_for("items"), vec![ids[0].clone()]);
        store.regenerate_ids("items");
        assert_ne!(store.ids_for("items"), vec![ids[0].clone()]);
    }

    #[test]
    fn touch_is_reported_once() {
        let mut store = store();
        assert!(store.touch("name"));
        assert!(!store.touch("name"));
        assert!(store.is_touched("name"));
        assert!(!store.is_touched("items"));
    }
}

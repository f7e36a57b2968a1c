#![forbid(unsafe_code)]

//! The field registry: one [`FieldDescriptor`] per registered path, stored in
//! a tree with the same shape as the form values so that array operations
//! can shift descriptors together with every other bookkeeping tree.
//!
//! Field arrays are registered separately with their array-level rules.
//!
//! # Invariants
//!
//! - Re-registering a path replaces its rule set; rules the new set omits
//!   are cleared, never left over from the previous registration.
//! - A descriptor is unmounted when it has lost its bindings (or was
//!   unregistered with `keep_value`); unmounted fields are never validated.

use std::fmt;

use formctl_core::path::{get, get_mut, normalize, set, unset};
use formctl_core::{FieldPath, Tree, Value};
use formctl_validation::RuleSet;
use indexmap::IndexMap;

use crate::bindable::{BindingKind, BindingRef, read_group, same_binding, write_group};

/// One registered field.
#[derive(Clone)]
pub struct FieldDescriptor {
    pub rules: RuleSet,
    bindings: Vec<BindingRef>,
    pub mounted: bool,
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("rules", &self.rules)
            .field("bindings", &self.bindings.len())
            .field("mounted", &self.mounted)
            .finish()
    }
}

impl FieldDescriptor {
    #[must_use]
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            bindings: Vec::new(),
            mounted: true,
        }
    }

    #[must_use]
    pub fn bindings(&self) -> &[BindingRef] {
        &self.bindings
    }

    #[must_use]
    pub fn has_bindings(&self) -> bool {
        !self.bindings.is_empty()
    }

    /// Attach a binding. Returns `false` when it was already attached.
    pub fn attach(&mut self, binding: BindingRef) -> bool {
        if self.bindings.iter().any(|b| same_binding(b, &binding)) {
            return false;
        }
        self.bindings.push(binding);
        self.mounted = true;
        true
    }

    /// Detach a binding. Returns whether it was attached.
    pub fn detach(&mut self, binding: &BindingRef) -> bool {
        let before = self.bindings.len();
        self.bindings.retain(|b| !same_binding(b, binding));
        before != self.bindings.len()
    }

    /// Drop bindings that left the UI. Returns how many were dropped.
    pub fn prune_disconnected(&mut self) -> usize {
        let before = self.bindings.len();
        self.bindings.retain(|b| b.is_connected());
        before - self.bindings.len()
    }

    #[must_use]
    pub fn kind(&self) -> BindingKind {
        self.bindings.first().map_or(BindingKind::Input, |b| b.kind())
    }

    /// The value the bindings currently show, if any binding exists.
    #[must_use]
    pub fn read_value(&self) -> Option<Value> {
        read_group(&self.bindings)
    }

    /// Push `value` into the bindings.
    pub fn write_value(&self, value: &Value) {
        write_group(&self.bindings, value);
    }

    /// Focus the first binding that accepts focus.
    pub fn focus(&self) -> bool {
        self.bindings.iter().any(|b| b.focus())
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.bindings.first().is_some_and(|b| b.is_read_only())
    }

    /// The control-level disabled override.
    #[must_use]
    pub fn control_disabled(&self) -> Option<bool> {
        self.bindings.iter().find_map(|b| b.disabled())
    }

    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.bindings.iter().any(|b| b.is_populated())
    }

    /// Whether the primary binding shows a blank raw value.
    #[must_use]
    pub fn is_raw_blank(&self) -> bool {
        self.bindings.first().is_some_and(|b| {
            matches!(b.kind(), BindingKind::Input | BindingKind::Custom)
                && b.value().as_str().is_some_and(str::is_empty)
        })
    }
}

/// Result of [`Registry::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registered {
    pub created: bool,
    /// Rules the previous registration had and the new one lacks.
    pub removed_rules: Vec<&'static str>,
}

/// All registered fields and field arrays.
#[derive(Debug, Default)]
pub struct Registry {
    fields: Tree<FieldDescriptor>,
    arrays: IndexMap<String, RuleSet>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update the descriptor at `path`.
    pub fn register(&mut self, path: &str, rules: RuleSet) -> Registered {
        if let Some(existing) = get_mut(&mut self.fields, path).and_then(Tree::leaf_mut) {
            let removed_rules = existing.rules.replace_rules(rules);
            existing.mounted = true;
            tracing::debug!(field = path, removed = ?removed_rules, "field re-registered");
            return Registered {
                created: false,
                removed_rules,
            };
        }
        set(&mut self.fields, path, Tree::Leaf(FieldDescriptor::new(rules)));
        tracing::debug!(field = path, "field registered");
        Registered {
            created: true,
            removed_rules: Vec::new(),
        }
    }

    /// Remove the descriptor at `path`.
    pub fn remove(&mut self, path: &str) -> Option<FieldDescriptor> {
        let removed = match unset(&mut self.fields, path) {
            Some(Tree::Leaf(descriptor)) => Some(descriptor),
            _ => None,
        };
        if removed.is_some() {
            tracing::debug!(field = path, "field unregistered");
        }
        removed
    }

    #[must_use]
    pub fn field(&self, path: &str) -> Option<&FieldDescriptor> {
        get(&self.fields, path).and_then(Tree::leaf)
    }

    pub fn field_mut(&mut self, path: &str) -> Option<&mut FieldDescriptor> {
        get_mut(&mut self.fields, path).and_then(Tree::leaf_mut)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.field(path).is_some()
    }

    /// Registered field paths, in tree order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.fields
            .leaves()
            .into_iter()
            .map(|(path, _)| path.to_string())
            .collect()
    }

    /// Registered fields with their descriptors, in tree order.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, &FieldDescriptor)> {
        self.fields
            .leaves()
            .into_iter()
            .map(|(path, descriptor)| (path.to_string(), descriptor))
            .collect()
    }

    /// Registered paths equal to or beneath `prefix`.
    #[must_use]
    pub fn descendants(&self, prefix: &str) -> Vec<String> {
        let prefix = FieldPath::parse(prefix);
        self.fields
            .leaves()
            .into_iter()
            .filter(|(path, _)| path.starts_with(&prefix))
            .map(|(path, _)| path.to_string())
            .collect()
    }

    /// Mounted field paths, in tree order.
    #[must_use]
    pub fn mounted_names(&self) -> Vec<String> {
        self.fields
            .leaves()
            .into_iter()
            .filter(|(_, descriptor)| descriptor.mounted)
            .map(|(path, _)| path.to_string())
            .collect()
    }

    /// The descriptor tree, for operations that reshape it.
    pub fn tree_mut(&mut self) -> &mut Tree<FieldDescriptor> {
        &mut self.fields
    }

    // -- field arrays -------------------------------------------------------

    /// Register `name` as a field array with array-level `rules`.
    pub fn register_array(&mut self, name: &str, rules: RuleSet) -> Vec<&'static str> {
        let key = normalize(name);
        match self.arrays.get_mut(&key) {
            Some(existing) => existing.replace_rules(rules),
            None => {
                tracing::debug!(field_array = %key, "field array registered");
                self.arrays.insert(key, rules);
                Vec::new()
            }
        }
    }

    pub fn remove_array(&mut self, name: &str) -> Option<RuleSet> {
        self.arrays.shift_remove(&normalize(name))
    }

    #[must_use]
    pub fn is_field_array(&self, name: &str) -> bool {
        self.arrays.contains_key(&normalize(name))
    }

    /// Array-level rules of `name`, when it has any.
    #[must_use]
    pub fn array_rules(&self, name: &str) -> Option<&RuleSet> {
        self.arrays
            .get(&normalize(name))
            .filter(|rules| rules.has_validation())
    }

    /// Registered field array names.
    #[must_use]
    pub fn array_names(&self) -> Vec<String> {
        self.arrays.keys().cloned().collect()
    }

    /// Field arrays with array-level rules.
    #[must_use]
    pub fn validated_arrays(&self) -> Vec<String> {
        self.arrays
            .iter()
            .filter(|(_, rules)| rules.has_validation())
            .map(|(name, _)| name.clone())
            .collect()
    }
}

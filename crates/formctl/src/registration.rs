#![forbid(unsafe_code)]

//! Field registration and the binding lifecycle.
//!
//! `register` creates or updates a descriptor and returns a
//! [`FieldRegistration`]: the handle the binding layer uses to attach its
//! inputs and forward their events. When a field loses its last binding it
//! is either unregistered (`should_unregister`) or kept, unmounted, with its
//! value.

use std::fmt;
use std::rc::Rc;

use formctl_core::path::{normalize, unset};
use formctl_core::{FieldPath, Value};
use formctl_runtime::Merge;
use formctl_validation::RuleSet;

use crate::bindable::BindingRef;
use crate::control::{FieldEvent, FieldState, FormControl, ValueEventKind};
use crate::options::UnregisterOptions;
use crate::projector::FormStatePatch;

/// Handle to one registered field.
#[derive(Clone)]
pub struct FieldRegistration {
    control: FormControl,
    name: String,
}

impl fmt::Debug for FieldRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRegistration").field("name", &self.name).finish()
    }
}

impl FieldRegistration {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a live input. The input receives the field's current value.
    pub fn attach(&self, binding: BindingRef) {
        self.control.attach_binding(&self.name, binding);
    }

    pub fn detach(&self, binding: &BindingRef) {
        self.control.detach_binding(&self.name, binding);
    }

    pub fn on_change(&self, raw: impl Into<Value>) {
        self.control.notify(&self.name, FieldEvent::Change(raw.into()));
    }

    pub fn on_blur(&self) {
        self.control.notify(&self.name, FieldEvent::Blur);
    }

    pub fn on_focus(&self) {
        self.control.notify(&self.name, FieldEvent::Focus);
    }

    #[must_use]
    pub fn value(&self) -> Value {
        self.control.get_values(Some(&self.name))
    }

    #[must_use]
    pub fn field_state(&self) -> FieldState {
        self.control.get_field_state(&self.name)
    }
}

impl FormControl {
    /// Register the field at `name` with `rules`. Registering again replaces
    /// the rule set.
    pub fn register(&self, name: &str, rules: RuleSet) -> FieldRegistration {
        let key = normalize(name);
        {
            let mut store = self.store_mut();
            let seed = rules.value.clone();
            let outcome = store.registry.register(&key, rules);
            if outcome.created && store.value_at(&key).is_undefined() {
                let initial = seed
                    .filter(|value| !value.is_undefined())
                    .unwrap_or_else(|| store.baseline_at(&key));
                if !initial.is_undefined() {
                    store.write_value(&key, initial);
                }
            }
        }
        FieldRegistration {
            control: self.clone(),
            name: key,
        }
    }

    pub(crate) fn attach_binding(&self, key: &str, binding: BindingRef) {
        let (bindings, value, focus) = {
            let mut store = self.store_mut();
            let Some(descriptor) = store.registry.field_mut(key) else {
                tracing::trace!(field = key, "attach to unregistered field ignored");
                return;
            };
            if !descriptor.attach(Rc::clone(&binding)) {
                return;
            }
            let read_only = descriptor.is_read_only();
            let seed = descriptor.rules.value.clone();
            let shown = descriptor
                .read_value()
                .map(|raw| descriptor.rules.transform_input(raw));
            let bindings = descriptor.bindings().to_vec();

            let current = store.value_at(key);
            let value = if current.is_undefined() {
                let initial = seed
                    .filter(|value| !value.is_undefined())
                    .unwrap_or_else(|| store.baseline_at(key));
                if initial.is_undefined() {
                    if let Some(shown) = shown.filter(|value| !value.is_undefined()) {
                        store.write_value(key, shown);
                    }
                    None
                } else {
                    store.write_value(key, initial.clone());
                    Some(initial)
                }
            } else {
                Some(current)
            };
            store.read_only.observe(key, read_only);

            let path = FieldPath::parse(key);
            let focus = store
                .pending_focus
                .as_deref()
                .is_some_and(|pending| path.starts_with(&FieldPath::parse(pending)));
            if focus {
                store.pending_focus = None;
            }
            (bindings, value, focus)
        };
        if let Some(value) = value {
            Self::write_bindings(vec![(bindings, value)]);
        }
        tracing::trace!(field = key, "binding attached");
        if focus && binding.focus() {
            self.record_focus(key);
        }
    }

    pub(crate) fn detach_binding(&self, key: &str, binding: &BindingRef) {
        let should_unregister = {
            let mut store = self.store_mut();
            let Some(descriptor) = store.registry.field_mut(key) else {
                return;
            };
            if !descriptor.detach(binding) || descriptor.has_bindings() {
                return;
            }
            descriptor.mounted = false;
            descriptor
                .rules
                .should_unregister
                .unwrap_or(self.config().should_unregister)
        };
        self.release_unmounted(key, should_unregister);
    }

    fn release_unmounted(&self, key: &str, should_unregister: bool) {
        if should_unregister {
            self.unregister(key, UnregisterOptions::default());
            return;
        }
        tracing::debug!(field = key, "field unmounted, value kept");
        let patch = {
            let mut store = self.store_mut();
            let mut patch = FormStatePatch::new().named(key);
            if store.focus.release(key) {
                patch.focused_field = Some(None);
            }
            patch
        };
        self.commit(patch, false);
    }

    /// Drop bindings that left the UI and release fields left without any.
    /// Returns how many bindings were dropped.
    pub fn prune_disconnected(&self) -> usize {
        let default_unregister = self.config().should_unregister;
        let (dropped, orphans) = {
            let mut store = self.store_mut();
            let mut dropped = 0;
            let mut orphans = Vec::new();
            for name in store.registry.names() {
                let Some(descriptor) = store.registry.field_mut(&name) else {
                    continue;
                };
                let had_bindings = descriptor.has_bindings();
                dropped += descriptor.prune_disconnected();
                if had_bindings && !descriptor.has_bindings() {
                    descriptor.mounted = false;
                    let unregister = descriptor.rules.should_unregister.unwrap_or(default_unregister);
                    orphans.push((name, unregister));
                }
            }
            (dropped, orphans)
        };
        for (name, unregister) in orphans {
            self.release_unmounted(&name, unregister);
        }
        if dropped > 0 {
            tracing::debug!(dropped, "disconnected bindings pruned");
        }
        dropped
    }

    /// Re-read the read-only state of the bindings at or beneath `name`
    /// (every field when `None`). Returns whether any field changed.
    pub fn refresh_read_only(&self, name: Option<&str>) -> bool {
        let mut store = self.store_mut();
        let names = match name {
            Some(name) => store.registry.descendants(&normalize(name)),
            None => store.registry.names(),
        };
        let mut changed = false;
        for name in names {
            let read_only = store.registry.field(&name).is_some_and(|d| d.is_read_only());
            changed |= store.read_only.observe(&name, read_only);
        }
        changed
    }

    /// Remove the field (or every field) at or beneath `name`.
    pub fn unregister(&self, name: &str, options: UnregisterOptions) {
        let key = normalize(name);
        let patch = {
            let mut store = self.store_mut();
            let targets = store.registry.descendants(&key);
            for target in &targets {
                if options.keep_value {
                    if let Some(descriptor) = store.registry.field_mut(target) {
                        descriptor.mounted = false;
                    }
                } else {
                    store.registry.remove(target);
                }
                store.read_only.forget(target);
            }
            if !options.keep_value {
                store.remove_value(&key);
                store.registry.remove_array(&key);
                store.array_ids.retain(|array, _| !FieldPath::parse(array).starts_with(&FieldPath::parse(&key)));
                store.array_structure.remove(&key);
                store.forget_revisions(&key);
            }
            if !options.keep_error {
                unset(&mut store.errors, &key);
            }
            if !options.keep_dirty {
                unset(&mut store.dirty, &key);
            }
            if !options.keep_touched {
                unset(&mut store.touched, &key);
            }
            if !options.keep_default_value && !self.config().should_unregister {
                unset(&mut store.defaults, &key);
            }
            store.validating.retain(|field| !FieldPath::parse(field).starts_with(&FieldPath::parse(&key)));

            let mut patch = FormStatePatch::new().named(&key);
            if store.focus.release(&key) {
                patch.focused_field = Some(None);
            }
            patch.merge(store.dirty_patch());
            patch.touched_fields = Some(store.touched.clone());
            patch.errors = Some(store.errors.clone());
            if !options.keep_is_valid {
                patch.is_valid = Some(store.errors.is_empty());
            }
            tracing::debug!(field = %key, fields = targets.len(), keep_value = options.keep_value, "unregistered");
            patch
        };
        self.commit(patch, false);
        self.publish_values(Some(key), ValueEventKind::Unregister);
    }
}

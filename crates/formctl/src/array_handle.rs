#![forbid(unsafe_code)]

//! Field array handles.
//!
//! A [`FieldArray`] addresses the array at one path. Each operation goes
//! through [`FormControl::apply_array_op`], which applies the same
//! [`ArrayOp`] to the values, the item ids, and every bookkeeping tree.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | the path holds no array | treated as an empty array |
//! | `update`/`swap` past the end | placeholders fill the gap |

use formctl_core::path::{get, get_mut, normalize, unset};
use formctl_core::{Tree, Value};
use formctl_runtime::Merge;
use formctl_validation::RuleSet;

use crate::control::{ArrayEvent, BindingWrites, FormControl, ValueEventKind};
use crate::field_array::{ArrayOp, ArraySlot, ItemId, shift_tree};
use crate::options::FocusOptions;
use crate::projector::FormStatePatch;

/// One item of a field array, keyed by a stable id.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayItem {
    pub id: ItemId,
    pub value: Value,
}

/// Handle to the field array at one path.
#[derive(Debug, Clone)]
pub struct FieldArray {
    control: FormControl,
    name: String,
}

impl FieldArray {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The items with their ids.
    #[must_use]
    pub fn fields(&self) -> Vec<ArrayItem> {
        self.control.array_fields(&self.name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `values`, focusing the first new item.
    pub fn append(&self, values: Vec<Value>) {
        self.append_with(values, FocusOptions::focus());
    }

    pub fn append_with(&self, values: Vec<Value>, focus: FocusOptions) {
        let op = ArrayOp::Append { count: values.len() };
        self.control.apply_array_op(&self.name, op, values, focus);
    }

    pub fn prepend(&self, values: Vec<Value>) {
        self.prepend_with(values, FocusOptions::focus());
    }

    pub fn prepend_with(&self, values: Vec<Value>, focus: FocusOptions) {
        let op = ArrayOp::Prepend { count: values.len() };
        self.control.apply_array_op(&self.name, op, values, focus);
    }

    pub fn insert(&self, index: usize, values: Vec<Value>) {
        self.insert_with(index, values, FocusOptions::focus());
    }

    pub fn insert_with(&self, index: usize, values: Vec<Value>, focus: FocusOptions) {
        let op = ArrayOp::Insert {
            index,
            count: values.len(),
        };
        self.control.apply_array_op(&self.name, op, values, focus);
    }

    pub fn remove(&self, index: usize) {
        self.remove_many(vec![index]);
    }

    /// Remove several items at once. Indexes refer to positions before the
    /// removal.
    pub fn remove_many(&self, indexes: Vec<usize>) {
        let op = ArrayOp::Remove { indexes: Some(indexes) };
        self.control.apply_array_op(&self.name, op, Vec::new(), FocusOptions::default());
    }

    pub fn remove_all(&self) {
        let op = ArrayOp::Remove { indexes: None };
        self.control.apply_array_op(&self.name, op, Vec::new(), FocusOptions::default());
    }

    pub fn swap(&self, a: usize, b: usize) {
        self.control
            .apply_array_op(&self.name, ArrayOp::Swap { a, b }, Vec::new(), FocusOptions::default());
    }

    pub fn move_item(&self, from: usize, to: usize) {
        self.control
            .apply_array_op(&self.name, ArrayOp::Move { from, to }, Vec::new(), FocusOptions::default());
    }

    pub fn update(&self, index: usize, value: impl Into<Value>) {
        self.control.apply_array_op(
            &self.name,
            ArrayOp::Update { index },
            vec![value.into()],
            FocusOptions::default(),
        );
    }

    /// Replace every item. Ids are regenerated.
    pub fn replace(&self, values: Vec<Value>) {
        let op = ArrayOp::Replace { count: values.len() };
        self.control.apply_array_op(&self.name, op, values, FocusOptions::default());
    }
}

fn shift_entry<T>(tree: &mut Tree<T>, key: &str, op: &ArrayOp) {
    if let Some(node) = get_mut(tree, key) {
        shift_tree(node, op);
    }
    if get(tree, key).is_some_and(Tree::is_empty) {
        unset(tree, key);
    }
}

impl FormControl {
    /// Register the field array at `name` with array-level `rules`.
    pub fn register_field_array(&self, name: &str, rules: RuleSet) -> FieldArray {
        let key = normalize(name);
        {
            let mut store = self.store_mut();
            let removed = store.registry.register_array(&key, rules);
            if !removed.is_empty() {
                tracing::debug!(field_array = %key, ?removed, "array rules removed on re-registration");
            }
            store.ids_for(&key);
        }
        self.field_array(&key)
    }

    /// Handle to the array at `name`. The array need not be registered.
    #[must_use]
    pub fn field_array(&self, name: &str) -> FieldArray {
        FieldArray {
            control: self.clone(),
            name: normalize(name),
        }
    }

    pub(crate) fn array_fields(&self, name: &str) -> Vec<ArrayItem> {
        let mut store = self.store_mut();
        let ids = store.ids_for(name);
        let values = store.value_at(name);
        let items = values.as_array().unwrap_or_default();
        ids.into_iter()
            .zip(items.iter().cloned())
            .map(|(id, value)| ArrayItem { id, value })
            .collect()
    }

    /// Apply `op` to the array at `name` and to everything indexed like it.
    pub(crate) fn apply_array_op(&self, name: &str, op: ArrayOp, new_values: Vec<Value>, focus: FocusOptions) {
        let key = normalize(name);
        if !op.in_range() {
            tracing::trace!(field_array = %key, op = op.name(), "array operation past the index limit ignored");
            return;
        }
        let (patch, event, writes, revalidate) = {
            let mut store = self.store_mut();
            let mut items: Vec<Value> = store.value_at(&key).as_array().map(<[Value]>::to_vec).unwrap_or_default();
            let before_len = items.len();
            let mut ids = store.ids_for(&key);

            op.apply(&mut items, |k| new_values.get(k).cloned().unwrap_or_default());
            if !matches!(op, ArrayOp::Update { .. }) {
                op.apply(&mut ids, |_| ItemId::placeholder());
            }
            ids.resize_with(items.len(), ItemId::placeholder);
            store.write_value(&key, Value::Array(items.clone()));
            let ids = store.store_ids(&key, ids);

            if op.shifts_bookkeeping() {
                shift_entry(&mut store.dirty, &key, &op);
                shift_entry(&mut store.touched, &key, &op);
                shift_entry(&mut store.errors, &key, &op);
                shift_entry(store.registry.tree_mut(), &key, &op);
            }
            match &op {
                ArrayOp::Update { index } => {
                    store.refresh_dirty(&format!("{key}.{index}"));
                }
                ArrayOp::Replace { .. } => {
                    unset(&mut store.touched, &key);
                    unset(&mut store.errors, &key);
                    store.refresh_dirty(&key);
                }
                _ => {}
            }
            store.refresh_array_structure(&key);
            store.forget_revisions(&key);

            let root = format!("{key}.root");
            let config = self.config();
            let timely = (!config.mode.flags().is_on_submit() || store.state.is_submitted)
                && !config.re_validate_mode.flags().is_on_submit();
            let revalidate = if store.registry.array_rules(&key).is_some() {
                timely || store.error_at(&root).is_some()
            } else {
                unset(&mut store.errors, &root);
                false
            };

            if focus.should_focus {
                let first = match &op {
                    ArrayOp::Append { .. } => Some(before_len),
                    ArrayOp::Prepend { .. } => Some(0),
                    ArrayOp::Insert { index, .. } => Some((*index).min(before_len)),
                    _ => None,
                };
                store.pending_focus = first.map(|first| {
                    let index = first.saturating_add(focus.focus_index.unwrap_or(0));
                    match &focus.focus_name {
                        Some(field) => format!("{key}.{index}.{}", normalize(field)),
                        None => format!("{key}.{index}"),
                    }
                });
            }

            let mut patch = FormStatePatch::new().named(&key);
            patch.merge(store.dirty_patch());
            patch.touched_fields = Some(store.touched.clone());
            patch.merge(store.errors_patch());

            let writes: BindingWrites = store
                .registry
                .descendants(&key)
                .into_iter()
                .filter_map(|field| {
                    let bindings = store.registry.field(&field)?.bindings().to_vec();
                    Some((bindings, store.value_at(&field)))
                })
                .collect();
            let event = ArrayEvent {
                name: key.clone(),
                op: op.name(),
                values: items,
                ids,
            };
            (patch, event, writes, revalidate)
        };
        tracing::debug!(field_array = %key, op = op.name(), len = event.values.len(), "array operation applied");
        Self::write_bindings(writes);
        self.commit(patch, false);
        self.publish_array(event);
        self.publish_values(Some(key.clone()), ValueEventKind::ArrayOp);
        if revalidate {
            self.inner.validation.enqueue(Some(&format!("{key}.root")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_keep_ids_across_reorders() {
        let control = FormControl::default();
        control.set_value(
            "items",
            Value::array([Value::from("a"), Value::from("b"), Value::from("c")]),
            Default::default(),
        );
        let array = control.register_field_array("items", RuleSet::new());
        let before = array.fields();
        array.swap(0, 2);
        let after = array.fields();
        assert_eq!(after[0].id, before[2].id);
        assert_eq!(after[2].id, before[0].id);
        assert_eq!(after[1].id, before[1].id);
        assert_eq!(after[0].value, Value::from("c"));
    }

    #[test]
    fn appended_items_get_fresh_ids() {
        let control = FormControl::default();
        let array = control.register_field_array("tags", RuleSet::new());
        array.append_with(vec![Value::from("x"), Value::from("y")], FocusOptions::default());
        let fields = array.fields();
        assert_eq!(fields.len(), 2);
        assert_ne!(fields[0].id, fields[1].id);
        assert!(fields.iter().all(|item| !item.id.is_placeholder()));
    }

    #[test]
    fn append_records_pending_focus() {
        let control = FormControl::default();
        let array = control.register_field_array("rows", RuleSet::new());
        array.append_with(
            vec![Value::object([("name", Value::from(""))])],
            FocusOptions::default().focus_name("name"),
        );
        assert_eq!(control.store().pending_focus.as_deref(), Some("rows.0.name"));
    }

    #[test]
    fn replace_clears_item_bookkeeping() {
        let control = FormControl::default();
        let array = control.register_field_array("tags", RuleSet::new());
        array.append_with(vec![Value::from("a"), Value::from("b")], FocusOptions::default());
        control.set_value("tags.1", "b", crate::SetValueOptions::new().touch());
        let before = array.fields();
        array.replace(vec![Value::from("x")]);
        assert!(!control.get_field_state("tags.1").is_touched);
        assert!(get(&control.form_state().touched_fields, "tags").is_none());
        assert_ne!(array.fields()[0].id, before[0].id);
    }

    #[test]
    fn update_keeps_the_item_id() {
        let control = FormControl::default();
        let array = control.register_field_array("tags", RuleSet::new());
        array.append_with(vec![Value::from("a")], FocusOptions::default());
        let before = array.fields();
        array.update(0, "z");
        let after = array.fields();
        assert_eq!(after[0].id, before[0].id);
        assert_eq!(after[0].value, Value::from("z"));
    }

    #[test]
    fn ops_past_the_index_limit_change_nothing() {
        let control = FormControl::default();
        let array = control.register_field_array("tags", RuleSet::new());
        array.append_with(vec![Value::from("a")], FocusOptions::default());
        let before = array.fields();
        array.swap(0, usize::MAX);
        array.move_item(0, usize::MAX);
        array.update(usize::MAX, "z");
        assert_eq!(array.fields(), before);
    }

    #[test]
    fn removed_items_leave_no_revisions_behind() {
        let control = FormControl::default();
        let array = control.register_field_array("rows", RuleSet::new());
        array.append_with(
            vec![Value::object([("name", Value::from("a"))]), Value::object([("name", Value::from("b"))])],
            FocusOptions::default(),
        );
        control.register("rows.1.name", RuleSet::new());
        control.set_value("rows.1.name", "bee", crate::SetValueOptions::new());
        assert!(control.store().revisions.contains_key("rows.1.name"));

        array.remove(1);
        let store = control.store();
        assert!(!store.revisions.contains_key("rows.1.name"));
        assert!(store.revisions.contains_key("rows"));
    }

    #[test]
    fn update_rediffs_only_that_item() {
        let control = FormControl::new(
            crate::FormConfig::new().with_default_values(Value::object([(
                "items",
                Value::array([Value::from(1), Value::from(2)]),
            )])),
        );
        let array = control.register_field_array("items", RuleSet::new());
        array.update(1, 5);
        let state = control.get_field_state("items.1");
        assert!(state.is_dirty);
        assert!(!control.get_field_state("items.0").is_dirty);
        array.update(1, 2);
        assert!(!control.form_state().is_dirty);
    }
}

//! Property-based invariant tests for field array bookkeeping.
//!
//! 1. After any sequence of array operations, the touched flag at index `i`
//!    describes the item now at `i`, and no bookkeeping slot outlives the
//!    items.
//! 2. Item ids are unique, one per item, and follow their item through
//!    reorders and updates.
//! 3. Removing every item leaves no bookkeeping entry for the array.

use std::collections::HashSet;

use formctl::core::path::get;
use formctl::prelude::*;
use formctl::{FieldArray, ItemId};
use proptest::prelude::*;
use serde_json::json;

#[derive(Debug, Clone)]
enum Step {
    Append(u8),
    Prepend(u8),
    Insert(usize, u8),
    Remove(usize),
    Swap(usize, usize),
    Move(usize, usize),
    Update(usize, u8),
    Touch(usize),
}

/// What the array should look like, maintained independently of the control.
#[derive(Debug, Default)]
struct Model {
    values: Vec<u8>,
    touched: Vec<bool>,
    /// Ids observed after the previous step; `None` for slots that must
    /// receive a fresh id.
    ids: Vec<Option<ItemId>>,
}

impl Model {
    fn insert(&mut self, at: usize, value: u8) {
        self.values.insert(at, value);
        self.touched.insert(at, false);
        self.ids.insert(at, None);
    }

    fn remove(&mut self, at: usize) {
        self.values.remove(at);
        self.touched.remove(at);
        self.ids.remove(at);
    }
}

fn item(value: u8) -> Value {
    Value::from(u32::from(value))
}

fn form_with_items(initial: &[u8]) -> (FormControl, FieldArray) {
    let form = FormControl::new(FormConfig::new().with_default_values(Value::from(json!({ "items": initial }))));
    let array = form.register_field_array("items", RuleSet::new());
    (form, array)
}

/// Apply `step` to the control and the model. Index steps on an empty array
/// are skipped.
fn apply(form: &FormControl, array: &FieldArray, model: &mut Model, step: &Step) {
    let len = model.values.len();
    let quiet = FocusOptions::default();
    match *step {
        Step::Append(value) => {
            array.append_with(vec![item(value)], quiet);
            model.insert(len, value);
        }
        Step::Prepend(value) => {
            array.prepend_with(vec![item(value)], quiet);
            model.insert(0, value);
        }
        Step::Insert(index, value) => {
            let at = index % (len + 1);
            array.insert_with(at, vec![item(value)], quiet);
            model.insert(at, value);
        }
        _ if len == 0 => {}
        Step::Remove(index) => {
            let at = index % len;
            array.remove(at);
            model.remove(at);
        }
        Step::Swap(a, b) => {
            let (a, b) = (a % len, b % len);
            array.swap(a, b);
            model.values.swap(a, b);
            model.touched.swap(a, b);
            model.ids.swap(a, b);
        }
        Step::Move(from, to) => {
            let (from, to) = (from % len, to % len);
            array.move_item(from, to);
            let value = model.values.remove(from);
            let touched = model.touched.remove(from);
            let id = model.ids.remove(from);
            model.values.insert(to, value);
            model.touched.insert(to, touched);
            model.ids.insert(to, id);
        }
        Step::Update(index, value) => {
            let at = index % len;
            array.update(at, item(value));
            model.values[at] = value;
        }
        Step::Touch(index) => {
            let at = index % len;
            let path = format!("items.{at}");
            form.set_value(&path, item(model.values[at]), SetValueOptions::new().touch());
            model.touched[at] = true;
        }
    }
}

fn check(form: &FormControl, array: &FieldArray, model: &mut Model) -> std::result::Result<(), TestCaseError> {
    let fields = array.fields();
    prop_assert_eq!(fields.len(), model.values.len());
    let mut seen = HashSet::new();
    for (index, field) in fields.iter().enumerate() {
        prop_assert_eq!(&field.value, &item(model.values[index]));
        prop_assert!(!field.id.0.is_empty());
        prop_assert!(seen.insert(field.id.clone()), "duplicate id {}", field.id);
        if let Some(expected) = &model.ids[index] {
            prop_assert_eq!(&field.id, expected);
        }
        let state = form.get_field_state(&format!("items.{index}"));
        prop_assert_eq!(state.is_touched, model.touched[index], "touched at {}", index);
    }

    let touched = form.form_state().touched_fields;
    let slots = get(&touched, "items")
        .and_then(Tree::as_array)
        .map_or(0, |node| node.items.len());
    prop_assert!(slots <= model.values.len());

    model.ids = fields.into_iter().map(|field| Some(field.id)).collect();
    Ok(())
}

// ── Strategies ────────────────────────────────────────────────────────────

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        any::<u8>().prop_map(Step::Append),
        any::<u8>().prop_map(Step::Prepend),
        (0usize..8, any::<u8>()).prop_map(|(index, value)| Step::Insert(index, value)),
        (0usize..8).prop_map(Step::Remove),
        (0usize..8, 0usize..8).prop_map(|(a, b)| Step::Swap(a, b)),
        (0usize..8, 0usize..8).prop_map(|(from, to)| Step::Move(from, to)),
        (0usize..8, any::<u8>()).prop_map(|(index, value)| Step::Update(index, value)),
        (0usize..8).prop_map(Step::Touch),
    ]
}

fn initial() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..5)
}

// ─── 1. Index alignment ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn bookkeeping_follows_items(initial in initial(), steps in prop::collection::vec(step(), 1..24)) {
        let (form, array) = form_with_items(&initial);
        let mut model = Model {
            values: initial.clone(),
            touched: vec![false; initial.len()],
            ids: vec![None; initial.len()],
        };
        check(&form, &array, &mut model)?;
        for step in &steps {
            apply(&form, &array, &mut model, step);
            check(&form, &array, &mut model)?;
        }
    }
}

// ─── 2. Id stability ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn reorders_keep_the_id_set(initial in prop::collection::vec(any::<u8>(), 1..6), pairs in prop::collection::vec((0usize..6, 0usize..6), 1..10)) {
        let (_form, array) = form_with_items(&initial);
        let mut before: Vec<ItemId> = array.fields().into_iter().map(|field| field.id).collect();
        before.sort_by(|a, b| a.0.cmp(&b.0));
        let len = initial.len();
        for (index, (a, b)) in pairs.into_iter().enumerate() {
            if index % 2 == 0 {
                array.swap(a % len, b % len);
            } else {
                array.move_item(a % len, b % len);
            }
        }
        let mut after: Vec<ItemId> = array.fields().into_iter().map(|field| field.id).collect();
        after.sort_by(|a, b| a.0.cmp(&b.0));
        prop_assert_eq!(before, after);
    }
}

// ─── 3. Removing everything ───────────────────────────────────────────────

proptest! {
    #[test]
    fn remove_all_clears_bookkeeping(initial in initial(), steps in prop::collection::vec(step(), 0..12)) {
        let (form, array) = form_with_items(&initial);
        let mut model = Model {
            values: initial.clone(),
            touched: vec![false; initial.len()],
            ids: vec![None; initial.len()],
        };
        for step in &steps {
            apply(&form, &array, &mut model, step);
        }
        array.remove_all();
        prop_assert!(array.is_empty());
        let state = form.form_state();
        prop_assert!(get(&state.touched_fields, "items").is_none());
        prop_assert!(get(&state.dirty_fields, "items").is_none());
        prop_assert!(get(&state.errors, "items").is_none());
    }
}

#![forbid(unsafe_code)]

//! The form control: one instance per form.
//!
//! [`FormControl`] owns the store, the scheduler, the three subjects (state,
//! values, array) and both update queues. Every public operation mutates
//! the store, then publishes: value and array events go out synchronously,
//! state patches go through the [`StateUpdateQueue`] and are delivered in one
//! merged notification per microtask flush (submit and reset are urgent).
//!
//! Validation is never run inline. Operations enqueue field names on the
//! [`ValidationQueue`]; each pass snapshots its inputs, runs the validators
//! and applies a result only when the field has not been written since the
//! snapshot.
//!
//! # Invariants
//!
//! - No store borrow is held while observers, bindings or validators run.
//! - `is_valid` is true iff the error tree holds no leaf.
//! - Observer deliveries are counted per instance, see
//!   [`FormControl::notification_count`].
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | operation on an unregistered path | logged at `trace`, no-op |
//! | custom validator returns `Err` | other fields still validate; fault recorded, error left as is |
//! | control dropped with a pass in flight | the pass finds no control and applies nothing |

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use formctl_core::path::{get, normalize, set, unset};
use formctl_core::{FieldPath, Subject, Subscription, Tree, Value};
use formctl_runtime::{Merge, PassRequest, PassTrace, Scheduler, StateUpdateQueue, ValidationQueue};
use formctl_validation::{
    CriteriaMode, FieldError, FieldInput, RuleSet, SkipContext, should_skip_validation, validate_field,
};
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use rustc_hash::FxHashSet;

use crate::bindable::{BindingRef, write_group};
use crate::config::FormConfig;
use crate::disabled::{DisabledSetting, resolve_disabled};
use crate::error::FormError;
use crate::field_array::ItemId;
use crate::options::{ResetFieldOptions, ResetOptions, SetValueOptions};
use crate::projector::{
    FormState, FormStatePatch, ReadSet, StateKeys, StateView, should_render, should_subscribe_by_name,
};
use crate::store::FormStore;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// An input event reported by the binding layer.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEvent {
    /// The raw input value changed.
    Change(Value),
    Blur,
    Focus,
}

/// What produced a [`ValueEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueEventKind {
    Change,
    SetValue,
    ArrayOp,
    Reset,
    Unregister,
}

/// A value delta. `name` is `None` for form-wide changes.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueEvent {
    pub name: Option<String>,
    pub kind: ValueEventKind,
    pub values: Value,
}

/// A field array changed shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayEvent {
    pub name: String,
    /// The operation name, or `reset`.
    pub op: &'static str,
    pub values: Vec<Value>,
    pub ids: Vec<ItemId>,
}

/// State of one field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldState {
    pub is_dirty: bool,
    pub is_touched: bool,
    /// An error exists at or beneath the field.
    pub invalid: bool,
    pub is_validating: bool,
    pub error: Option<FieldError>,
}

/// Scope of a state subscription.
#[derive(Debug, Clone, Default)]
pub struct StateSubscription {
    names: Vec<String>,
    exact: bool,
    keys: StateKeys,
    all: bool,
}

impl StateSubscription {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only patches concerning these paths (or their ancestors and
    /// descendants) are delivered.
    #[must_use]
    pub fn names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.names = names.into_iter().map(|name| normalize(name.as_ref())).collect();
        self
    }

    /// Match names exactly instead of by ancestry.
    #[must_use]
    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }

    /// Keys the observer reads up front.
    #[must_use]
    pub fn keys(mut self, keys: StateKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Deliver every patch regardless of reads.
    #[must_use]
    pub fn all(mut self) -> Self {
        self.all = true;
        self
    }
}

/// A live state subscription.
#[derive(Debug)]
pub struct StateHandle {
    subscription: Subscription,
    reads: ReadSet,
}

impl StateHandle {
    /// Keys this observer has declared or read.
    #[must_use]
    pub fn reads(&self) -> StateKeys {
        self.reads.keys()
    }

    /// A view of the current state that records reads into this handle.
    #[must_use]
    pub fn view(&self, control: &FormControl) -> StateView {
        StateView::new(control.form_state(), self.reads.clone())
    }

    pub fn unsubscribe(self) {
        self.subscription.unsubscribe();
    }
}

// ---------------------------------------------------------------------------
// FormControl
// ---------------------------------------------------------------------------

pub(crate) struct ControlInner {
    pub(crate) config: FormConfig,
    store: RefCell<FormStore>,
    scheduler: Scheduler,
    state_subject: Subject<FormStatePatch>,
    state_queue: StateUpdateQueue<FormStatePatch>,
    values_subject: Subject<ValueEvent>,
    array_subject: Subject<ArrayEvent>,
    pub(crate) validation: ValidationQueue<FormError>,
    notifications: Rc<Cell<u64>>,
    faults: RefCell<Vec<FormError>>,
}

impl Drop for ControlInner {
    fn drop(&mut self) {
        self.state_queue.clear();
        self.validation.clear();
        self.state_subject.unsubscribe();
        self.values_subject.unsubscribe();
        self.array_subject.unsubscribe();
        tracing::debug!("form control dropped");
    }
}

/// Cloneable handle to one form.
#[derive(Clone)]
pub struct FormControl {
    pub(crate) inner: Rc<ControlInner>,
}

impl fmt::Debug for FormControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.inner.store.try_borrow().map_or(0, |store| store.registry.names().len());
        f.debug_struct("FormControl")
            .field("mode", &self.inner.config.mode)
            .field("fields", &fields)
            .field("notifications", &self.inner.notifications.get())
            .finish()
    }
}

impl Default for FormControl {
    fn default() -> Self {
        Self::new(FormConfig::default())
    }
}

struct PassJob {
    name: String,
    error_path: String,
    rules: RuleSet,
    input: FieldInput,
    revision: u64,
    epoch: u64,
}

/// Bindings to update once the store borrow is released.
pub(crate) type BindingWrites = Vec<(Vec<BindingRef>, Value)>;

impl FormControl {
    #[must_use]
    pub fn new(config: FormConfig) -> Self {
        Self::with_scheduler(config, Scheduler::new())
    }

    /// Create a control driven by an existing scheduler.
    #[must_use]
    pub fn with_scheduler(config: FormConfig, scheduler: Scheduler) -> Self {
        let inner = Rc::new_cyclic(|owner: &Weak<ControlInner>| {
            let pass_owner = owner.clone();
            let validation = ValidationQueue::new(scheduler.clone(), move |request| {
                run_pass(pass_owner.clone(), request)
            });
            let fault_owner = owner.clone();
            validation.set_on_error(move |err: &FormError| {
                if let Some(inner) = fault_owner.upgrade() {
                    inner.faults.borrow_mut().push(err.clone());
                }
            });
            let state_subject = Subject::new("state");
            let store = FormStore::new(config.default_values.clone(), config.disabled.clone());
            ControlInner {
                state_queue: StateUpdateQueue::new(scheduler.clone(), state_subject.clone()),
                state_subject,
                values_subject: Subject::new("values"),
                array_subject: Subject::new("array"),
                store: RefCell::new(store),
                scheduler,
                validation,
                notifications: Rc::new(Cell::new(0)),
                faults: RefCell::new(Vec::new()),
                config,
            }
        });
        tracing::debug!(
            mode = %inner.config.mode,
            re_validate_mode = %inner.config.re_validate_mode,
            "form control created"
        );
        Self { inner }
    }

    pub(crate) fn store(&self) -> Ref<'_, FormStore> {
        self.inner.store.borrow()
    }

    pub(crate) fn store_mut(&self) -> RefMut<'_, FormStore> {
        self.inner.store.borrow_mut()
    }

    #[must_use]
    pub fn config(&self) -> &FormConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Run microtasks and validation passes until nothing is left.
    pub fn settle(&self) -> usize {
        self.inner.scheduler.run_until_idle()
    }

    /// Drive `future` to completion on this control's scheduler.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.inner.scheduler.block_on(future)
    }

    /// Observer callbacks delivered by this instance so far.
    #[must_use]
    pub fn notification_count(&self) -> u64 {
        self.inner.notifications.get()
    }

    /// Log of validation passes.
    #[must_use]
    pub fn pass_trace(&self) -> PassTrace {
        self.inner.validation.trace()
    }

    /// Fields waiting for the next validation pass.
    #[must_use]
    pub fn pending_validations(&self) -> Vec<String> {
        self.inner.validation.pending_fields()
    }

    /// Whether a validation pass is waiting or in flight.
    #[must_use]
    pub fn is_validation_pending(&self) -> bool {
        self.inner.validation.is_queued() || self.inner.validation.is_running()
    }

    /// Faults raised by custom validators, oldest first.
    #[must_use]
    pub fn validator_faults(&self) -> Vec<FormError> {
        self.inner.faults.borrow().clone()
    }

    // -- publishing -------------------------------------------------------

    /// Apply `patch` to the snapshot and queue it for observers.
    pub(crate) fn commit(&self, patch: FormStatePatch, urgent: bool) {
        if patch.keys().is_empty() {
            if urgent {
                self.inner.state_queue.flush();
            }
            return;
        }
        self.store_mut().commit(&patch);
        self.inner.state_queue.enqueue(patch, urgent);
    }

    pub(crate) fn publish_values(&self, name: Option<String>, kind: ValueEventKind) {
        if !self.inner.values_subject.is_observed() {
            return;
        }
        let values = self.store().values.clone();
        self.inner.values_subject.next(&ValueEvent { name, kind, values });
    }

    pub(crate) fn publish_array(&self, event: ArrayEvent) {
        tracing::trace!(field_array = %event.name, op = event.op, len = event.values.len(), "array event");
        self.inner.array_subject.next(&event);
    }

    pub(crate) fn write_bindings(writes: BindingWrites) {
        for (bindings, value) in writes {
            write_group(&bindings, &value);
        }
    }

    fn count(counter: &Cell<u64>) {
        counter.set(counter.get() + 1);
    }

    // -- subscriptions ----------------------------------------------------

    /// Observe state patches. The observer receives the merged patch and a
    /// view of the state at delivery; reading through the view widens the
    /// set of keys that wake it.
    pub fn subscribe_state(
        &self,
        options: StateSubscription,
        observer: impl Fn(&FormStatePatch, &StateView) + 'static,
    ) -> StateHandle {
        let reads = ReadSet::new(options.keys);
        let handle_reads = reads.clone();
        let owner = Rc::downgrade(&self.inner);
        let counter = Rc::clone(&self.inner.notifications);
        let subscription = self.inner.state_subject.subscribe(move |patch| {
            if !should_subscribe_by_name(&options.names, &patch.names, options.exact) {
                return;
            }
            if !should_render(patch, reads.keys(), options.all) {
                return;
            }
            let Some(inner) = owner.upgrade() else {
                return;
            };
            let Ok(store) = inner.store.try_borrow() else {
                tracing::warn!("state delivered during a store mutation; skipped");
                return;
            };
            let snapshot = store.state.clone();
            drop(store);
            Self::count(&counter);
            observer(patch, &StateView::new(snapshot, reads.clone()));
        });
        StateHandle {
            subscription,
            reads: handle_reads,
        }
    }

    /// Observe value changes at `names` (every change when empty).
    pub fn watch<S: AsRef<str>>(&self, names: &[S], callback: impl Fn(&ValueEvent) + 'static) -> Subscription {
        let filter: Vec<String> = names.iter().map(|name| normalize(name.as_ref())).collect();
        let counter = Rc::clone(&self.inner.notifications);
        self.inner.values_subject.subscribe(move |event| {
            let concerned = match &event.name {
                Some(name) => should_subscribe_by_name(&filter, std::slice::from_ref(name), false),
                None => true,
            };
            if concerned {
                Self::count(&counter);
                callback(event);
            }
        })
    }

    /// Observe structural changes of the field array at `name`.
    pub fn subscribe_array(&self, name: &str, callback: impl Fn(&ArrayEvent) + 'static) -> Subscription {
        let name = normalize(name);
        let counter = Rc::clone(&self.inner.notifications);
        self.inner.array_subject.subscribe(move |event| {
            if event.name == name {
                Self::count(&counter);
                callback(event);
            }
        })
    }

    // -- reads ------------------------------------------------------------

    /// All values, or the value at `name`.
    #[must_use]
    pub fn get_values(&self, name: Option<&str>) -> Value {
        let store = self.store();
        match name {
            Some(name) => store.value_at(name),
            None => store.values.clone(),
        }
    }

    #[must_use]
    pub fn get_field_state(&self, name: &str) -> FieldState {
        let key = normalize(name);
        let store = self.store();
        FieldState {
            is_dirty: get(&store.dirty, &key).is_some_and(Tree::any),
            is_touched: store.is_touched(&key),
            invalid: store.has_error_under(&key),
            is_validating: store.validating.contains(&key),
            error: store.error_at(&key).cloned(),
        }
    }

    /// Snapshot of the form state.
    #[must_use]
    pub fn form_state(&self) -> FormState {
        self.store().state.clone()
    }

    // -- event ingestion --------------------------------------------------

    /// Ingest an input event for the field at `name`.
    pub fn notify(&self, name: &str, event: FieldEvent) {
        let key = normalize(name);
        match event {
            FieldEvent::Change(raw) => self.handle_change(&key, raw),
            FieldEvent::Blur => self.handle_blur(&key),
            FieldEvent::Focus => self.handle_focus(&key),
        }
    }

    fn skip_validation(&self, store: &FormStore, key: &str, rules: &RuleSet, is_blur_event: bool) -> bool {
        let config = &self.inner.config;
        let nothing_to_check =
            !rules.has_validation() && rules.deps.is_empty() && store.error_at(key).is_none();
        nothing_to_check
            || should_skip_validation(SkipContext {
                is_blur_event,
                is_touched: store.is_touched(key),
                is_submitted: store.state.is_submitted,
                mode: rules.mode.unwrap_or(config.mode).flags(),
                re_validate_mode: rules.re_validate_mode.unwrap_or(config.re_validate_mode).flags(),
            })
    }

    fn request_validation(&self, key: &str, deps: &[String]) {
        self.inner.validation.enqueue(Some(key));
        for dep in deps {
            self.inner.validation.enqueue(Some(&normalize(dep)));
        }
    }

    fn handle_change(&self, key: &str, raw: Value) {
        let (patch, skip, deps) = {
            let mut store = self.store_mut();
            let Some(descriptor) = store.registry.field(key) else {
                tracing::trace!(field = key, "change on unregistered field ignored");
                return;
            };
            let raw = if descriptor.kind().is_grouped() {
                descriptor.read_value().unwrap_or(raw)
            } else {
                raw
            };
            let value = descriptor.rules.transform_input(raw);
            let read_only = descriptor.is_read_only();
            let rules = descriptor.rules.clone();
            let skip = self.skip_validation(&store, key, &rules, false);

            let was_dirty = store.state.is_dirty;
            store.write_value(key, value);
            store.read_only.observe(key, read_only);
            store.refresh_array_structure(key);
            let mut patch = FormStatePatch::new().named(key);
            if store.refresh_dirty(key) || store.is_dirty() != was_dirty {
                patch.merge(store.dirty_patch());
            }
            (patch, skip, rules.deps)
        };
        self.commit(patch, false);
        self.publish_values(Some(key.to_owned()), ValueEventKind::Change);
        if skip {
            tracing::trace!(field = key, "validation skipped for change");
        } else {
            self.request_validation(key, &deps);
        }
    }

    fn handle_blur(&self, key: &str) {
        let (patch, skip, deps) = {
            let mut store = self.store_mut();
            let Some(descriptor) = store.registry.field(key) else {
                tracing::trace!(field = key, "blur on unregistered field ignored");
                return;
            };
            let rules = descriptor.rules.clone();
            let skip = self.skip_validation(&store, key, &rules, true);
            let mut patch = FormStatePatch::new().named(key);
            if store.touch(key) {
                patch.touched_fields = Some(store.touched.clone());
            }
            if store.focus.blur(key) {
                patch.focused_field = Some(None);
            }
            (patch, skip, rules.deps)
        };
        self.commit(patch, false);
        if !skip {
            self.request_validation(key, &deps);
        }
    }

    fn handle_focus(&self, key: &str) {
        let patch = {
            let mut store = self.store_mut();
            if !store.registry.contains(key) {
                tracing::trace!(field = key, "focus on unregistered field ignored");
                return;
            }
            let mut patch = FormStatePatch::new().named(key);
            if store.focus.focus(key) {
                patch.focused_field = Some(Some(key.to_owned()));
            }
            patch
        };
        self.commit(patch, false);
    }

    // -- mutation ---------------------------------------------------------

    /// Write `value` at `name`. A container value is pushed to every
    /// registered field beneath it; writing a field array regenerates its
    /// item ids.
    pub fn set_value(&self, name: &str, value: impl Into<Value>, options: SetValueOptions) {
        let key = normalize(name);
        if key.is_empty() {
            tracing::trace!("set_value on the empty path ignored");
            return;
        }
        let (patch, writes, arrays) = {
            let mut store = self.store_mut();
            let was_dirty = store.state.is_dirty;
            store.write_value(&key, value.into());

            let targets = store.registry.descendants(&key);
            let mut writes = Vec::with_capacity(targets.len());
            for target in &targets {
                let current = store.value_at(target);
                let Some(descriptor) = store.registry.field(target) else {
                    continue;
                };
                let read_only = descriptor.is_read_only();
                writes.push((descriptor.bindings().to_vec(), current));
                store.read_only.observe(target, read_only);
            }

            if store.registry.is_field_array(&key) && !store.array_ids.contains_key(&key) {
                store.ids_for(&key);
            }
            store.regenerate_ids(&key);
            store.refresh_array_structure(&key);
            let prefix = FieldPath::parse(&key);
            let arrays: Vec<ArrayEvent> = store
                .array_ids
                .iter()
                .filter(|(name, _)| FieldPath::parse(name).starts_with(&prefix))
                .map(|(name, ids)| ArrayEvent {
                    name: name.clone(),
                    op: "replace",
                    values: get(&store.values, name)
                        .and_then(Value::as_array)
                        .map(<[Value]>::to_vec)
                        .unwrap_or_default(),
                    ids: ids.clone(),
                })
                .collect();

            let mut patch = FormStatePatch::new().named(&key);
            if options.should_dirty {
                store.refresh_dirty(&key);
            }
            if options.should_dirty || store.is_dirty() != was_dirty {
                patch.merge(store.dirty_patch());
            }
            if options.should_touch {
                let points = if targets.is_empty() { vec![key.clone()] } else { targets };
                for point in &points {
                    store.touch(point);
                }
                patch.touched_fields = Some(store.touched.clone());
            }
            (patch, writes, arrays)
        };
        Self::write_bindings(writes);
        self.commit(patch, false);
        for event in arrays {
            self.publish_array(event);
        }
        self.publish_values(Some(key.clone()), ValueEventKind::SetValue);
        if options.should_validate {
            self.inner.validation.enqueue(Some(&key));
        }
    }

    /// Record an error at `name`. With `should_focus`, focus the field.
    pub fn set_error(&self, name: &str, error: FieldError, should_focus: bool) {
        let key = normalize(name);
        let patch = {
            let mut store = self.store_mut();
            set(&mut store.errors, &key, Tree::Leaf(error));
            let mut patch = store.errors_patch();
            patch.names.push(key.clone());
            patch
        };
        self.commit(patch, false);
        if should_focus {
            self.set_focus(&key);
        }
    }

    /// Clear the errors at `names`, or every error when `names` is empty.
    pub fn clear_errors<S: AsRef<str>>(&self, names: &[S]) {
        let patch = {
            let mut store = self.store_mut();
            let mut patch = FormStatePatch::new();
            if names.is_empty() {
                store.errors = Tree::Vacant;
            } else {
                for name in names {
                    let key = normalize(name.as_ref());
                    unset(&mut store.errors, &key);
                    patch.names.push(key);
                }
            }
            patch.merge(store.errors_patch());
            patch
        };
        self.commit(patch, false);
    }

    /// Focus the first binding of `name` that accepts focus.
    pub fn set_focus(&self, name: &str) -> bool {
        let key = normalize(name);
        let bindings = {
            let store = self.store();
            match store.registry.field(&key) {
                Some(descriptor) => descriptor.bindings().to_vec(),
                None => {
                    tracing::trace!(field = %key, "set_focus on unregistered field ignored");
                    return false;
                }
            }
        };
        if !bindings.iter().any(|binding| binding.focus()) {
            return false;
        }
        self.record_focus(&key);
        true
    }

    pub(crate) fn record_focus(&self, key: &str) {
        let patch = {
            let mut store = self.store_mut();
            let mut patch = FormStatePatch::new().named(key);
            if store.focus.focus(key) {
                patch.focused_field = Some(Some(key.to_owned()));
            }
            patch
        };
        self.commit(patch, false);
    }

    /// Change the form-level disabled setting.
    pub fn set_disabled(&self, setting: impl Into<DisabledSetting>) {
        let patch = {
            let mut store = self.store_mut();
            store.disabled = setting.into();
            FormStatePatch {
                disabled: Some(store.disabled.is_form_disabled()),
                ..FormStatePatch::default()
            }
        };
        self.commit(patch, false);
    }

    /// Whether the field at `name` is disabled, all layers considered.
    #[must_use]
    pub fn is_disabled(&self, name: &str) -> bool {
        let key = normalize(name);
        let store = self.store();
        let (control, registration) = store
            .registry
            .field(&key)
            .map_or((None, None), |descriptor| (descriptor.control_disabled(), descriptor.rules.disabled));
        resolve_disabled(control, registration, &store.disabled, &key)
    }

    // -- validation -------------------------------------------------------

    /// Validate `names` (every mounted field when empty) and report whether
    /// they are free of errors afterwards.
    pub async fn trigger<S: AsRef<str>>(&self, names: &[S]) -> bool {
        let keys: Vec<String> = names.iter().map(|name| normalize(name.as_ref())).collect();
        if keys.is_empty() {
            self.inner.validation.enqueue(None);
        } else {
            for key in &keys {
                self.inner.validation.enqueue(Some(key));
            }
        }
        self.inner.validation.flush().await;
        let store = self.store();
        if keys.is_empty() {
            store.errors.is_empty()
        } else {
            keys.iter().all(|key| !store.has_error_under(key))
        }
    }

    /// Validate every mounted field and field array.
    pub async fn trigger_all(&self) -> bool {
        self.trigger::<&str>(&[]).await
    }

    fn field_job(&self, store: &FormStore, name: &str, form_values: &Rc<Value>) -> Option<PassJob> {
        let descriptor = store.registry.field(name)?;
        let mut input = FieldInput::new(name, store.value_at(name), Rc::clone(form_values));
        input.mounted = descriptor.mounted;
        input.disabled = resolve_disabled(
            descriptor.control_disabled(),
            descriptor.rules.disabled,
            &store.disabled,
            name,
        );
        input.skip_read_only =
            self.inner.config.should_skip_read_only_validation && store.read_only.is_read_only(name);
        input.populated = descriptor.is_populated();
        input.raw_blank = descriptor.is_raw_blank();
        Some(PassJob {
            name: name.to_owned(),
            error_path: name.to_owned(),
            rules: descriptor.rules.clone(),
            input,
            revision: store.revision(name),
            epoch: store.epoch,
        })
    }

    fn array_job(store: &FormStore, name: &str, form_values: &Rc<Value>) -> Option<PassJob> {
        let rules = store.registry.array_rules(name)?;
        Some(PassJob {
            name: name.to_owned(),
            error_path: format!("{name}.root"),
            rules: rules.clone(),
            input: FieldInput::field_array(name, store.value_at(name), Rc::clone(form_values)),
            revision: store.revision(name),
            epoch: store.epoch,
        })
    }

    /// Snapshot the work of one pass and publish the validating flags.
    fn begin_pass(&self, request: &PassRequest) -> Vec<PassJob> {
        let jobs = {
            let store = self.store();
            let mut requested = request.fields.clone();
            if request.whole_form {
                requested.extend(store.registry.mounted_names());
                requested.extend(store.registry.validated_arrays());
            }
            let form_values = Rc::new(store.values.clone());
            let mut seen = FxHashSet::default();
            let mut jobs = Vec::new();
            for name in requested {
                let path = FieldPath::parse(&name);
                if path.last().is_some_and(|segment| segment.is_root_key()) {
                    let array = path.parent().map(|parent| parent.to_string()).unwrap_or_default();
                    if seen.insert(name.clone()) {
                        jobs.extend(Self::array_job(&store, &array, &form_values));
                    }
                    continue;
                }
                if seen.insert(format!("{name}.root")) {
                    jobs.extend(Self::array_job(&store, &name, &form_values));
                }
                for field in store.registry.descendants(&name) {
                    if seen.insert(field.clone()) {
                        jobs.extend(self.field_job(&store, &field, &form_values));
                    }
                }
            }
            jobs
        };
        if jobs.is_empty() {
            return jobs;
        }
        let patch = {
            let mut store = self.store_mut();
            for job in &jobs {
                if !store.validating.contains(&job.name) {
                    store.validating.push(job.name.clone());
                }
            }
            store.validating_patch()
        };
        self.commit(patch, false);
        jobs
    }

    /// Apply the results of one pass. `None` marks a faulted field.
    fn finish_pass(&self, outcomes: Vec<(PassJob, Option<Option<FieldError>>)>) {
        let patch = {
            let mut store = self.store_mut();
            let mut names = Vec::with_capacity(outcomes.len());
            for (job, outcome) in outcomes {
                store.validating.retain(|name| name != &job.name);
                let Some(result) = outcome else {
                    continue;
                };
                let known = store.registry.contains(&job.name) || store.array_ids.contains_key(&job.name);
                if !known || job.epoch != store.epoch || job.revision != store.revision(&job.name) {
                    tracing::debug!(field = %job.name, "stale validation result discarded");
                    continue;
                }
                match result {
                    Some(error) => set(&mut store.errors, &job.error_path, Tree::Leaf(error)),
                    None => {
                        unset(&mut store.errors, &job.error_path);
                    }
                }
                names.push(job.name);
            }
            let mut patch = store.errors_patch();
            patch.merge(store.validating_patch());
            patch.names = names;
            patch
        };
        self.commit(patch, false);
    }

    // -- submit -----------------------------------------------------------

    /// Validate the whole form, then call `on_valid` with the values of
    /// enabled fields or `on_invalid` with the errors. An `Err` from
    /// `on_valid` is returned after the submit state is published.
    pub async fn handle_submit<F, Fut, E>(
        &self,
        on_valid: F,
        on_invalid: impl FnOnce(&Tree<FieldError>),
    ) -> std::result::Result<(), E>
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
    {
        tracing::debug!("submit started");
        let patch = {
            let mut store = self.store_mut();
            unset(&mut store.errors, "root");
            let mut patch = FormStatePatch {
                is_submitting: Some(true),
                ..FormStatePatch::default()
            };
            patch.merge(store.errors_patch());
            patch
        };
        self.commit(patch, true);

        self.inner.validation.enqueue(None);
        self.inner.validation.flush().await;

        let (payload, errors) = {
            let store = self.store();
            let mut payload = store.values.clone();
            for (name, descriptor) in store.registry.entries() {
                let disabled = resolve_disabled(
                    descriptor.control_disabled(),
                    descriptor.rules.disabled,
                    &store.disabled,
                    &name,
                );
                if disabled {
                    unset(&mut payload, &name);
                }
            }
            (payload, store.errors.clone())
        };
        let valid = errors.is_empty();
        let outcome = if valid {
            on_valid(payload).await
        } else {
            on_invalid(&errors);
            if self.inner.config.should_focus_error {
                self.focus_first_error();
            }
            Ok(())
        };

        let successful = valid && outcome.is_ok();
        let patch = {
            let store = self.store();
            let mut patch = FormStatePatch {
                is_submitting: Some(false),
                is_submitted: Some(true),
                submit_count: Some(store.state.submit_count + 1),
                is_submit_successful: Some(successful),
                ..FormStatePatch::default()
            };
            patch.merge(store.errors_patch());
            patch
        };
        self.commit(patch, true);
        tracing::debug!(valid, successful, "submit finished");
        outcome
    }

    /// Focus the first registered field holding an error.
    fn focus_first_error(&self) -> bool {
        let candidates: Vec<(String, Vec<BindingRef>)> = {
            let store = self.store();
            store
                .registry
                .entries()
                .into_iter()
                .filter(|(name, _)| store.has_error_under(name))
                .map(|(name, descriptor)| (name, descriptor.bindings().to_vec()))
                .collect()
        };
        for (name, bindings) in candidates {
            if bindings.iter().any(|binding| binding.focus()) {
                self.record_focus(&name);
                return true;
            }
        }
        false
    }

    // -- reset ------------------------------------------------------------

    /// Reset the form to `values` (or the current baseline).
    pub fn reset(&self, values: Option<Value>, options: ResetOptions) {
        let (patch, writes, arrays) = {
            let mut store = self.store_mut();
            let next = values.unwrap_or_else(|| store.defaults.clone());
            if !options.keep_default_values {
                store.defaults = next.clone();
            }
            if !options.keep_values {
                let previous = std::mem::replace(&mut store.values, next);
                if options.keep_dirty_values {
                    for name in store.registry.names() {
                        let dirty = get(&store.dirty, &name).is_some_and(Tree::any);
                        if let Some(kept) = get(&previous, &name).filter(|_| dirty) {
                            set(&mut store.values, &name, kept.clone());
                        }
                    }
                }
            }
            store.epoch += 1;
            for name in store.registry.array_names() {
                store.ids_for(&name);
            }
            store.regenerate_ids("");
            if !options.keep_dirty {
                store.rediff();
            }
            if !options.keep_touched {
                store.touched = Tree::Vacant;
            }
            if !options.keep_errors {
                store.errors = Tree::Vacant;
            }
            store.focus.clear();
            store.validating.clear();
            store.pending_focus = None;

            let state = &store.state;
            let mut patch = FormStatePatch {
                touched_fields: Some(store.touched.clone()),
                is_submitting: Some(false),
                is_submitted: Some(options.keep_is_submitted && state.is_submitted),
                submit_count: Some(if options.keep_submit_count { state.submit_count } else { 0 }),
                is_submit_successful: Some(options.keep_is_submit_successful && state.is_submit_successful),
                focused_field: Some(None),
                ..FormStatePatch::default()
            };
            patch.merge(store.dirty_patch());
            patch.merge(store.errors_patch());
            patch.merge(store.validating_patch());

            let writes: BindingWrites = store
                .registry
                .entries()
                .into_iter()
                .map(|(name, descriptor)| (descriptor.bindings().to_vec(), store.value_at(&name)))
                .collect();
            let arrays: Vec<ArrayEvent> = store
                .array_ids
                .iter()
                .map(|(name, ids)| ArrayEvent {
                    name: name.clone(),
                    op: "reset",
                    values: get(&store.values, name)
                        .and_then(Value::as_array)
                        .map(<[Value]>::to_vec)
                        .unwrap_or_default(),
                    ids: ids.clone(),
                })
                .collect();
            (patch, writes, arrays)
        };
        self.inner.validation.clear();
        Self::write_bindings(writes);
        self.commit(patch, true);
        for event in arrays {
            self.publish_array(event);
        }
        self.publish_values(None, ValueEventKind::Reset);
        tracing::debug!(?options, "form reset");
    }

    /// Restore the field at `name` to its baseline.
    pub fn reset_field(&self, name: &str, options: ResetFieldOptions) {
        let key = normalize(name);
        let (patch, writes) = {
            let mut store = self.store_mut();
            let Some(bindings) = store.registry.field(&key).map(|d| d.bindings().to_vec()) else {
                tracing::trace!(field = %key, "reset_field on unregistered field ignored");
                return;
            };
            if let Some(default_value) = options.default_value {
                set(&mut store.defaults, &key, default_value);
            }
            let baseline = store.baseline_at(&key);
            store.write_value(&key, baseline.clone());
            store.refresh_array_structure(&key);
            if !options.keep_touched {
                unset(&mut store.touched, &key);
            }
            if !options.keep_dirty {
                store.refresh_dirty(&key);
            }
            if !options.keep_error {
                unset(&mut store.errors, &key);
            }
            let mut patch = FormStatePatch::new().named(&key);
            patch.touched_fields = Some(store.touched.clone());
            patch.merge(store.dirty_patch());
            patch.merge(store.errors_patch());
            (patch, vec![(bindings, baseline)])
        };
        Self::write_bindings(writes);
        self.commit(patch, false);
        self.publish_values(Some(key), ValueEventKind::SetValue);
    }

    /// Criteria mode of this form.
    pub(crate) fn criteria(&self) -> CriteriaMode {
        self.inner.config.criteria_mode
    }
}

fn run_pass(owner: Weak<ControlInner>, request: PassRequest) -> LocalBoxFuture<'static, Result<(), FormError>> {
    async move {
        let Some((jobs, criteria)) = owner.upgrade().map(|inner| {
            let control = FormControl { inner };
            (control.begin_pass(&request), control.criteria())
        }) else {
            return Ok(());
        };
        if jobs.is_empty() {
            tracing::trace!(pass = %request.token, "nothing to validate");
            return Ok(());
        }

        let mut outcomes = Vec::with_capacity(jobs.len());
        let mut fault = None;
        for job in jobs {
            match validate_field(&job.rules, &job.input, criteria).await {
                Ok(error) => outcomes.push((job, Some(error))),
                Err(err) => {
                    tracing::warn!(pass = %request.token, field = %job.name, error = %err, "validator faulted");
                    fault.get_or_insert(err);
                    outcomes.push((job, None));
                }
            }
        }

        if let Some(inner) = owner.upgrade() {
            FormControl { inner }.finish_pass(outcomes);
        }
        fault.map_or(Ok(()), |fault| Err(FormError::Validator(fault)))
    }
    .boxed_local()
}

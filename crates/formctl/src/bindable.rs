#![forbid(unsafe_code)]

//! The capability a UI adapter implements for each live input.
//!
//! The engine never inspects a control's shape. Everything it needs from an
//! input (its value, whether it is still attached, read-only, checked, or
//! populated by a custom widget) goes through [`Bindable`].
//!
//! Radio buttons and checkboxes sharing a field name form a group; the field
//! value is derived from the whole group by [`read_group`] and written back
//! by [`write_group`].
//!
//! [`MemoryBinding`] is a headless implementation for tests and for
//! adapters that keep input state in plain memory.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use formctl_core::Value;

/// What kind of control a binding represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BindingKind {
    #[default]
    Input,
    Checkbox,
    Radio,
    SelectMultiple,
    File,
    /// A custom widget that manages its own value.
    Custom,
}

impl BindingKind {
    /// Whether several bindings of this kind share one field value.
    #[must_use]
    pub fn is_grouped(self) -> bool {
        matches!(self, Self::Checkbox | Self::Radio)
    }
}

/// A live input attached to a field.
///
/// For radio buttons and checkboxes, [`Bindable::value`] is the option's own
/// value and [`Bindable::is_checked`] its state.
pub trait Bindable {
    fn kind(&self) -> BindingKind {
        BindingKind::Input
    }

    fn value(&self) -> Value;

    /// Push a value into the control.
    fn set_value(&self, value: &Value);

    fn is_checked(&self) -> bool {
        false
    }

    fn set_checked(&self, _checked: bool) {}

    /// Move focus to the control. Returns whether it took focus.
    fn focus(&self) -> bool {
        false
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn is_read_only(&self) -> bool {
        false
    }

    /// The control's own disabled attribute, when it sets one.
    fn disabled(&self) -> Option<bool> {
        None
    }

    /// Whether the control holds a value its raw value does not show.
    fn is_populated(&self) -> bool {
        false
    }
}

/// Shared handle to a binding.
pub type BindingRef = Rc<dyn Bindable>;

/// Whether two handles point at the same control.
#[must_use]
pub fn same_binding(a: &BindingRef, b: &BindingRef) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

/// Derive the field value from its bindings.
#[must_use]
pub fn read_group(bindings: &[BindingRef]) -> Option<Value> {
    let first = bindings.first()?;
    let value = match first.kind() {
        BindingKind::Radio => bindings
            .iter()
            .find(|b| b.is_checked())
            .map_or(Value::Null, |b| b.value()),
        BindingKind::Checkbox if bindings.len() == 1 => Value::Bool(first.is_checked()),
        BindingKind::Checkbox => Value::array(
            bindings
                .iter()
                .filter(|b| b.is_checked())
                .map(|b| b.value()),
        ),
        _ => first.value(),
    };
    Some(value)
}

/// Push `value` into every binding of a field.
pub fn write_group(bindings: &[BindingRef], value: &Value) {
    let Some(first) = bindings.first() else {
        return;
    };
    match first.kind() {
        BindingKind::Radio => {
            for binding in bindings {
                binding.set_checked(binding.value() == *value);
            }
        }
        BindingKind::Checkbox if bindings.len() == 1 => first.set_checked(value.is_truthy()),
        BindingKind::Checkbox => {
            let selected = value.as_array().unwrap_or_default();
            for binding in bindings {
                let option = binding.value();
                binding.set_checked(selected.contains(&option));
            }
        }
        BindingKind::File => {
            if value.is_nullish() || value.as_str() == Some("") {
                first.set_value(&Value::Null);
            }
        }
        _ => {
            for binding in bindings {
                binding.set_value(value);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryBinding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct MemoryState {
    kind: BindingKind,
    value: Value,
    checked: bool,
    connected: bool,
    read_only: bool,
    disabled: Option<bool>,
    populated: bool,
    focus_count: u32,
}

/// An in-memory binding. Clones share state, so a test can keep one handle
/// and give another to the engine.
#[derive(Clone)]
pub struct MemoryBinding {
    state: Rc<RefCell<MemoryState>>,
}

impl fmt::Debug for MemoryBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MemoryBinding")
            .field("kind", &state.kind)
            .field("value", &state.value)
            .field("checked", &state.checked)
            .field("connected", &state.connected)
            .finish()
    }
}

impl Default for MemoryBinding {
    fn default() -> Self {
        Self::new(BindingKind::Input)
    }
}

impl MemoryBinding {
    #[must_use]
    pub fn new(kind: BindingKind) -> Self {
        Self {
            state: Rc::new(RefCell::new(MemoryState {
                kind,
                connected: true,
                ..MemoryState::default()
            })),
        }
    }

    /// A text input holding `value`.
    #[must_use]
    pub fn input(value: impl Into<Value>) -> Self {
        let binding = Self::new(BindingKind::Input);
        binding.state.borrow_mut().value = value.into();
        binding
    }

    /// One radio option or checkbox with its option value.
    #[must_use]
    pub fn option(kind: BindingKind, value: impl Into<Value>, checked: bool) -> Self {
        let binding = Self::new(kind);
        {
            let mut state = binding.state.borrow_mut();
            state.value = value.into();
            state.checked = checked;
        }
        binding
    }

    /// The handle the engine stores.
    #[must_use]
    pub fn handle(&self) -> BindingRef {
        Rc::new(self.clone())
    }

    /// Simulate typing: replace the raw value.
    pub fn type_value(&self, value: impl Into<Value>) {
        self.state.borrow_mut().value = value.into();
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.borrow_mut().connected = connected;
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.state.borrow_mut().read_only = read_only;
    }

    pub fn set_disabled(&self, disabled: Option<bool>) {
        self.state.borrow_mut().disabled = disabled;
    }

    pub fn set_populated(&self, populated: bool) {
        self.state.borrow_mut().populated = populated;
    }

    #[must_use]
    pub fn focus_count(&self) -> u32 {
        self.state.borrow().focus_count
    }

    #[must_use]
    pub fn current(&self) -> Value {
        self.state.borrow().value.clone()
    }
}

impl Bindable for MemoryBinding {
    fn kind(&self) -> BindingKind {
        self.state.borrow().kind
    }

    fn value(&self) -> Value {
        self.state.borrow().value.clone()
    }

    fn set_value(&self, value: &Value) {
        self.state.borrow_mut().value = value.clone();
    }

    fn is_checked(&self) -> bool {
        self.state.borrow().checked
    }

    fn set_checked(&self, checked: bool) {
        self.state.borrow_mut().checked = checked;
    }

    fn focus(&self) -> bool {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return false;
        }
        state.focus_count += 1;
        true
    }

    fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    fn is_read_only(&self) -> bool {
        self.state.borrow().read_only
    }

    fn disabled(&self) -> Option<bool> {
        self.state.borrow().disabled
    }

    fn is_populated(&self) -> bool {
        self.state.borrow().populated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radio_group_reads_checked_option() {
        let a = MemoryBinding::option(BindingKind::Radio, "a", false);
        let b = MemoryBinding::option(BindingKind::Radio, "b", true);
        let group = vec![a.handle(), b.handle()];
        assert_eq!(read_group(&group), Some(Value::from("b")));

        write_group(&group, &Value::from("a"));
        assert!(a.is_checked());
        assert!(!b.is_checked());
    }

    #[test]
    fn checkbox_group_reads_list_and_single_reads_bool() {
        let x = MemoryBinding::option(BindingKind::Checkbox, "x", true);
        let y = MemoryBinding::option(BindingKind::Checkbox, "y", false);
        let z = MemoryBinding::option(BindingKind::Checkbox, "z", true);
        let group = vec![x.handle(), y.handle(), z.handle()];
        assert_eq!(read_group(&group), Some(Value::array([Value::from("x"), Value::from("z")])));

        write_group(&group, &Value::array([Value::from("y")]));
        assert!(!x.is_checked() && y.is_checked() && !z.is_checked());

        let single = vec![MemoryBinding::option(BindingKind::Checkbox, "on", true).handle()];
        assert_eq!(read_group(&single), Some(Value::Bool(true)));
    }

    #[test]
    fn identity_is_by_pointer() {
        let binding = MemoryBinding::input("a").handle();
        let same = Rc::clone(&binding);
        let other = MemoryBinding::input("a").handle();
        assert!(same_binding(&binding, &same));
        assert!(!same_binding(&binding, &other));
    }

    #[test]
    fn disconnected_binding_refuses_focus() {
        let binding = MemoryBinding::input("");
        assert!(binding.focus());
        binding.set_connected(false);
        assert!(!binding.focus());
        assert_eq!(binding.focus_count(), 1);
    }
}

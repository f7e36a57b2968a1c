#![forbid(unsafe_code)]

//! Option sets of the mutation API.

use formctl_core::Value;

/// Options of [`FormControl::set_value`](crate::FormControl::set_value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetValueOptions {
    pub should_validate: bool,
    pub should_dirty: bool,
    pub should_touch: bool,
}

impl SetValueOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn validate(mut self) -> Self {
        self.should_validate = true;
        self
    }

    #[must_use]
    pub fn dirty(mut self) -> Self {
        self.should_dirty = true;
        self
    }

    #[must_use]
    pub fn touch(mut self) -> Self {
        self.should_touch = true;
        self
    }
}

/// What a full reset keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResetOptions {
    pub keep_values: bool,
    pub keep_default_values: bool,
    pub keep_dirty: bool,
    /// Keep the values of dirty fields; reset the rest.
    pub keep_dirty_values: bool,
    pub keep_touched: bool,
    pub keep_errors: bool,
    pub keep_is_submitted: bool,
    pub keep_submit_count: bool,
    pub keep_is_submit_successful: bool,
}

/// What resetting one field keeps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResetFieldOptions {
    pub keep_dirty: bool,
    pub keep_touched: bool,
    pub keep_error: bool,
    /// New baseline for the field.
    pub default_value: Option<Value>,
}

/// What unregistering keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnregisterOptions {
    /// Keep the value and the (unmounted) descriptor.
    pub keep_value: bool,
    pub keep_error: bool,
    pub keep_dirty: bool,
    pub keep_touched: bool,
    pub keep_default_value: bool,
    pub keep_is_valid: bool,
}

impl UnregisterOptions {
    /// Options for a field that is unmounted but expected back.
    #[must_use]
    pub fn keep_value() -> Self {
        Self {
            keep_value: true,
            ..Self::default()
        }
    }
}

/// Focus behavior of array operations that add items.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FocusOptions {
    pub should_focus: bool,
    /// Offset from the first added item.
    pub focus_index: Option<usize>,
    /// Sub-field of the item to focus, e.g. `name`.
    pub focus_name: Option<String>,
}

impl FocusOptions {
    #[must_use]
    pub fn focus() -> Self {
        Self {
            should_focus: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn focus_name(mut self, name: impl Into<String>) -> Self {
        self.should_focus = true;
        self.focus_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn focus_index(mut self, index: usize) -> Self {
        self.should_focus = true;
        self.focus_index = Some(index);
        self
    }
}

#![forbid(unsafe_code)]

//! formctl public facade.
//!
//! A [`FormControl`] tracks the values, dirty/touched state, errors and
//! focus of one form. The binding layer registers fields, attaches
//! [`Bindable`] inputs and forwards their events; observers subscribe to
//! state, value, or field-array deltas.
//!
//! ```ignore
//! use formctl::prelude::*;
//!
//! let form = FormControl::new(FormConfig::new().with_mode(ValidationMode::OnChange));
//! let email = form.register("email", RuleSet::new().required("Email is required"));
//! email.on_change("");
//! form.settle();
//! assert!(form.get_field_state("email").invalid);
//! ```

pub mod array_handle;
pub mod bindable;
pub mod config;
pub mod control;
pub mod disabled;
pub mod error;
pub mod field_array;
pub mod focus;
pub mod options;
pub mod projector;
pub mod registration;
pub mod registry;
mod store;

// --- Facade ---------------------------------------------------------------

pub use array_handle::{ArrayItem, FieldArray};
pub use bindable::{Bindable, BindingKind, BindingRef, MemoryBinding};
pub use config::FormConfig;
pub use control::{
    ArrayEvent, FieldEvent, FieldState, FormControl, StateHandle, StateSubscription, ValueEvent,
    ValueEventKind,
};
pub use disabled::DisabledSetting;
pub use error::{FormError, Result};
pub use field_array::{ArrayOp, ItemId};
pub use options::{FocusOptions, ResetFieldOptions, ResetOptions, SetValueOptions, UnregisterOptions};
pub use projector::{FormState, FormStatePatch, StateKeys, StateView};
pub use registration::FieldRegistration;

// --- Re-exports -----------------------------------------------------------

pub use formctl_core::{Subscription, Tree, Value};
pub use formctl_runtime::{PassTrace, Scheduler};
pub use formctl_validation::{
    CriteriaMode, FieldError, ReValidateMode, RuleSet, ValidationMode, ValidatorFault,
    async_validator, sync_validator,
};

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        Bindable, BindingKind, CriteriaMode, FieldError, FieldEvent, FieldRegistration, FocusOptions,
        FormConfig, FormControl, FormError, FormState, MemoryBinding, ReValidateMode, ResetOptions,
        Result, RuleSet, SetValueOptions, StateKeys, StateSubscription, Tree, UnregisterOptions,
        ValidationMode, Value,
    };

    pub use crate::{core, runtime, validation};
}

pub use formctl_core as core;
pub use formctl_runtime as runtime;
pub use formctl_validation as validation;

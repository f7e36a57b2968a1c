#![forbid(unsafe_code)]

//! Validation for formctl.
//!
//! - [`mode`]: validation timing (`onSubmit`, `onBlur`, ...) and the skip
//!   decision for input events.
//! - [`rules`]: declarative rule sets, custom validate functions, and input
//!   transforms.
//! - [`validator`]: runs a rule set against one field.
//! - [`error`]: the normalized field error and validator faults.

pub mod error;
pub mod mode;
pub mod rules;
pub mod transform;
pub mod validator;

pub use error::{
    ERROR_CODE_MANUAL, ERROR_CODE_MAX, ERROR_CODE_MAX_LENGTH, ERROR_CODE_MIN, ERROR_CODE_MIN_LENGTH,
    ERROR_CODE_PATTERN, ERROR_CODE_REQUIRED, ERROR_CODE_VALIDATE, FieldError, ValidatorFault,
};
pub use mode::{
    CriteriaMode, ModeFlags, ParseModeError, ReValidateMode, SkipContext, ValidationMode,
    should_skip_validation,
};
pub use rules::{
    Bound, Rule, RuleSet, SetValueAs, Validate, ValidateFn, ValidateFuture, ValidateOutcome,
    async_validator, sync_validator,
};
pub use validator::{FieldInput, validate_field};

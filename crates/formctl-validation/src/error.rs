#![forbid(unsafe_code)]

//! Field errors (data) and validator faults (failures).
//!
//! A [`FieldError`] is an expected outcome: it is stored in the error tree
//! and shown to the user. A [`ValidatorFault`] means a custom validate
//! function itself failed; it never reaches the error tree and is routed to
//! the validation queue's error callback instead.

use std::fmt;

use formctl_core::Value;
use indexmap::IndexMap;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Error Codes
// ---------------------------------------------------------------------------

/// Error code for the required rule.
pub const ERROR_CODE_REQUIRED: &str = "required";
/// Error code for the numeric/date lower bound.
pub const ERROR_CODE_MIN: &str = "min";
/// Error code for the numeric/date upper bound.
pub const ERROR_CODE_MAX: &str = "max";
/// Error code for the minimum length rule.
pub const ERROR_CODE_MIN_LENGTH: &str = "minLength";
/// Error code for the maximum length rule.
pub const ERROR_CODE_MAX_LENGTH: &str = "maxLength";
/// Error code for the pattern rule.
pub const ERROR_CODE_PATTERN: &str = "pattern";
/// Error code for an unnamed custom validate function.
pub const ERROR_CODE_VALIDATE: &str = "validate";
/// Error code used by programmatic `set_error` calls that name no type.
pub const ERROR_CODE_MANUAL: &str = "manual";

// ---------------------------------------------------------------------------
// FieldError
// ---------------------------------------------------------------------------

/// The normalized error of one field.
///
/// `kind` is the failing rule (serialized as `type`). With all-criteria
/// validation, `types` maps every failing rule to its message, or `true`
/// when the message is empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<IndexMap<String, Value>>,
}

impl FieldError {
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            types: None,
        }
    }

    #[must_use]
    pub fn with_type(mut self, kind: impl Into<String>, message: impl Into<Value>) -> Self {
        self.types
            .get_or_insert_with(IndexMap::new)
            .insert(kind.into(), message.into());
        self
    }

    /// The message as text, if it is a string.
    #[must_use]
    pub fn message_str(&self) -> Option<&str> {
        self.message.as_str()
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

// ---------------------------------------------------------------------------
// ValidatorFault
// ---------------------------------------------------------------------------

/// A custom validate function failed instead of producing a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorFault {
    pub field: String,
    pub message: String,
}

impl ValidatorFault {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Attach the field name when the validate function left it blank.
    #[must_use]
    pub fn for_field(mut self, field: &str) -> Self {
        if self.field.is_empty() {
            self.field = field.to_owned();
        }
        self
    }
}

impl fmt::Display for ValidatorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validator for {:?} failed: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidatorFault {}

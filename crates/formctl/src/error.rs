#![forbid(unsafe_code)]

//! Engine-level errors.
//!
//! Validation failures are not errors: they live in the error tree of the
//! form state. Calls on unknown paths are silent no-ops. What remains is
//! listed here.

use std::fmt;

use formctl_validation::ValidatorFault;

/// An error raised by the form engine.
#[derive(Debug, Clone, PartialEq)]
pub enum FormError {
    /// A custom validate function failed.
    Validator(ValidatorFault),
    /// The configuration could not be parsed.
    Config(String),
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormError::Validator(fault) => write!(f, "validator error: {fault}"),
            FormError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for FormError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FormError::Validator(fault) => Some(fault),
            FormError::Config(_) => None,
        }
    }
}

impl From<ValidatorFault> for FormError {
    fn from(fault: ValidatorFault) -> Self {
        FormError::Validator(fault)
    }
}

impl From<serde_json::Error> for FormError {
    fn from(err: serde_json::Error) -> Self {
        FormError::Config(err.to_string())
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, FormError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn validator_fault_is_the_source() {
        let err = FormError::from(ValidatorFault::new("email", "timeout"));
        assert!(err.to_string().contains("timeout"));
        assert!(err.source().is_some());
        assert!(FormError::Config("bad".into()).source().is_none());
    }
}

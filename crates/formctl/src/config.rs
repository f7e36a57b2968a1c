#![forbid(unsafe_code)]

//! Form-level configuration.
//!
//! Built in code with the `with_*` methods or loaded from JSON with
//! camelCase keys:
//!
//! ```json
//! { "mode": "onBlur", "reValidateMode": "onChange", "criteriaMode": "all",
//!   "defaultValues": { "email": "" }, "disabled": ["legacy"],
//!   "shouldFocusError": true, "shouldUnregister": false,
//!   "shouldSkipReadOnlyValidation": true }
//! ```

use formctl_core::Value;
use formctl_validation::{CriteriaMode, ReValidateMode, ValidationMode};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::disabled::DisabledSetting;
use crate::error::Result;

/// Configuration of one form control.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormConfig {
    /// When fields validate before the first submit.
    pub mode: ValidationMode,
    /// When fields re-validate after the first submit.
    pub re_validate_mode: ReValidateMode,
    pub criteria_mode: CriteriaMode,
    /// Baseline for dirty tracking and `reset`.
    pub default_values: Value,
    pub disabled: DisabledSetting,
    /// Focus the first invalid field after a failed submit.
    pub should_focus_error: bool,
    /// Drop a field's value when its bindings go away.
    pub should_unregister: bool,
    /// Skip validation of fields whose binding is read-only.
    pub should_skip_read_only_validation: bool,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            mode: ValidationMode::default(),
            re_validate_mode: ReValidateMode::default(),
            criteria_mode: CriteriaMode::default(),
            default_values: Value::Object(IndexMap::new()),
            disabled: DisabledSetting::default(),
            should_focus_error: true,
            should_unregister: false,
            should_skip_read_only_validation: false,
        }
    }
}

impl FormConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        tracing::debug!(mode = %config.mode, re_validate_mode = %config.re_validate_mode, "form config loaded");
        Ok(config)
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ValidationMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_re_validate_mode(mut self, mode: ReValidateMode) -> Self {
        self.re_validate_mode = mode;
        self
    }

    #[must_use]
    pub fn with_criteria_mode(mut self, mode: CriteriaMode) -> Self {
        self.criteria_mode = mode;
        self
    }

    #[must_use]
    pub fn with_default_values(mut self, values: impl Into<Value>) -> Self {
        self.default_values = values.into();
        self
    }

    #[must_use]
    pub fn with_disabled(mut self, disabled: impl Into<DisabledSetting>) -> Self {
        self.disabled = disabled.into();
        self
    }

    #[must_use]
    pub fn with_should_focus_error(mut self, enabled: bool) -> Self {
        self.should_focus_error = enabled;
        self
    }

    #[must_use]
    pub fn with_should_unregister(mut self, enabled: bool) -> Self {
        self.should_unregister = enabled;
        self
    }

    #[must_use]
    pub fn with_should_skip_read_only_validation(mut self, enabled: bool) -> Self {
        self.should_skip_read_only_validation = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = FormConfig::default();
        assert_eq!(config.mode, ValidationMode::OnSubmit);
        assert_eq!(config.re_validate_mode, ReValidateMode::OnChange);
        assert_eq!(config.criteria_mode, CriteriaMode::FirstError);
        assert!(config.should_focus_error);
        assert!(!config.should_unregister);
    }

    #[test]
    fn loads_camel_case_json() {
        let config = FormConfig::from_json(
            r#"{"mode":"onTouched","reValidateMode":"onBlur","criteriaMode":"all",
                "defaultValues":{"email":"a@b.c"},"disabled":["legacy"],
                "shouldSkipReadOnlyValidation":true}"#,
        )
        .unwrap_or_default();
        assert_eq!(config.mode, ValidationMode::OnTouched);
        assert_eq!(config.re_validate_mode, ReValidateMode::OnBlur);
        assert_eq!(config.criteria_mode, CriteriaMode::All);
        assert_eq!(
            formctl_core::path::get(&config.default_values, "email"),
            Some(&Value::from("a@b.c"))
        );
        assert_eq!(config.disabled, DisabledSetting::Names(vec!["legacy".into()]));
        assert!(config.should_skip_read_only_validation);
        assert!(config.should_focus_error);
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(FormConfig::from_json(r#"{"mode":"sometimes"}"#).is_err());
    }
}

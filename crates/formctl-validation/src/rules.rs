#![forbid(unsafe_code)]

//! Declarative validation rules attached to one field.
//!
//! Each rule carries its own message, which may be any [`Value`] (rich error
//! payloads are allowed, not only text).
//!
//! Re-registering a field replaces its rule set with [`RuleSet::replace_rules`],
//! which clears every rule the newer set omits and reports the names of the
//! rules that went away.

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use formctl_core::Value;
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use indexmap::IndexMap;
use regex::Regex;
use time::OffsetDateTime;

use crate::error::{
    ERROR_CODE_MAX, ERROR_CODE_MAX_LENGTH, ERROR_CODE_MIN, ERROR_CODE_MIN_LENGTH,
    ERROR_CODE_PATTERN, ERROR_CODE_REQUIRED, ERROR_CODE_VALIDATE, ValidatorFault,
};
use crate::mode::{ReValidateMode, ValidationMode};

// ---------------------------------------------------------------------------
// Rule values
// ---------------------------------------------------------------------------

/// A rule value with its message.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule<T> {
    pub value: T,
    pub message: Value,
}

impl<T> Rule<T> {
    #[must_use]
    pub fn new(value: T, message: impl Into<Value>) -> Self {
        Self {
            value,
            message: message.into(),
        }
    }
}

/// A `min`/`max` bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Number(f64),
    Date(OffsetDateTime),
}

impl From<f64> for Bound {
    fn from(n: f64) -> Self {
        Bound::Number(n)
    }
}

impl From<i32> for Bound {
    fn from(n: i32) -> Self {
        Bound::Number(f64::from(n))
    }
}

impl From<OffsetDateTime> for Bound {
    fn from(d: OffsetDateTime) -> Self {
        Bound::Date(d)
    }
}

// ---------------------------------------------------------------------------
// Custom validate functions
// ---------------------------------------------------------------------------

/// Verdict of a custom validate function.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidateOutcome {
    Valid,
    /// Failed with an empty message.
    Invalid,
    /// Failed with this message.
    Message(Value),
}

impl ValidateOutcome {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// The error message, or `None` when valid.
    #[must_use]
    pub fn into_message(self) -> Option<Value> {
        match self {
            Self::Valid => None,
            Self::Invalid => Some(Value::from("")),
            Self::Message(message) => Some(message),
        }
    }
}

impl From<bool> for ValidateOutcome {
    fn from(valid: bool) -> Self {
        if valid { Self::Valid } else { Self::Invalid }
    }
}

impl From<&str> for ValidateOutcome {
    fn from(message: &str) -> Self {
        Self::Message(Value::from(message))
    }
}

impl From<String> for ValidateOutcome {
    fn from(message: String) -> Self {
        Self::Message(Value::from(message))
    }
}

impl From<Option<String>> for ValidateOutcome {
    fn from(message: Option<String>) -> Self {
        message.map_or(Self::Valid, Self::from)
    }
}

/// Future returned by a validate function.
pub type ValidateFuture = LocalBoxFuture<'static, Result<ValidateOutcome, ValidatorFault>>;

/// A custom validate function: `(field value, all form values)`.
pub type ValidateFn = Rc<dyn Fn(&Value, &Value) -> ValidateFuture>;

/// Wrap a synchronous check.
pub fn sync_validator<O>(check: impl Fn(&Value, &Value) -> O + 'static) -> ValidateFn
where
    O: Into<ValidateOutcome>,
{
    Rc::new(move |value: &Value, form: &Value| {
        futures::future::ready(Ok(check(value, form).into())).boxed_local()
    })
}

/// Wrap an asynchronous check. The closure receives owned copies.
pub fn async_validator<F, Fut>(check: F) -> ValidateFn
where
    F: Fn(Value, Value) -> Fut + 'static,
    Fut: Future<Output = Result<ValidateOutcome, ValidatorFault>> + 'static,
{
    Rc::new(move |value: &Value, form: &Value| check(value.clone(), form.clone()).boxed_local())
}

/// One function or a map of named functions.
#[derive(Clone)]
pub enum Validate {
    Single(ValidateFn),
    /// Each failure is reported under its name.
    Named(IndexMap<String, ValidateFn>),
}

impl fmt::Debug for Validate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(_) => f.write_str("Validate::Single(..)"),
            Self::Named(map) => f
                .debug_tuple("Validate::Named")
                .field(&map.keys().collect::<Vec<_>>())
                .finish(),
        }
    }
}

/// Custom transform applied to raw input.
pub type SetValueAs = Rc<dyn Fn(Value) -> Value>;

// ---------------------------------------------------------------------------
// RuleSet
// ---------------------------------------------------------------------------

/// Rules and registration options of one field.
#[derive(Clone, Default)]
pub struct RuleSet {
    pub required: Option<Rule<bool>>,
    pub min: Option<Rule<Bound>>,
    pub max: Option<Rule<Bound>>,
    pub min_length: Option<Rule<usize>>,
    pub max_length: Option<Rule<usize>>,
    pub pattern: Option<Rule<Regex>>,
    pub validate: Option<Validate>,
    /// Paths re-validated whenever this field validates from an input event.
    pub deps: Vec<String>,
    pub value_as_number: bool,
    pub value_as_date: bool,
    pub set_value_as: Option<SetValueAs>,
    pub disabled: Option<bool>,
    pub should_unregister: Option<bool>,
    /// Initial value used when the field has no value yet.
    pub value: Option<Value>,
    pub mode: Option<ValidationMode>,
    pub re_validate_mode: Option<ReValidateMode>,
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("rules", &self.rule_keys())
            .field("deps", &self.deps)
            .field("value_as_number", &self.value_as_number)
            .field("value_as_date", &self.value_as_date)
            .field("set_value_as", &self.set_value_as.is_some())
            .field("disabled", &self.disabled)
            .field("mode", &self.mode)
            .finish()
    }
}

impl RuleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn required(mut self, message: impl Into<Value>) -> Self {
        self.required = Some(Rule::new(true, message));
        self
    }

    #[must_use]
    pub fn min(mut self, bound: impl Into<Bound>, message: impl Into<Value>) -> Self {
        self.min = Some(Rule::new(bound.into(), message));
        self
    }

    #[must_use]
    pub fn max(mut self, bound: impl Into<Bound>, message: impl Into<Value>) -> Self {
        self.max = Some(Rule::new(bound.into(), message));
        self
    }

    #[must_use]
    pub fn min_length(mut self, length: usize, message: impl Into<Value>) -> Self {
        self.min_length = Some(Rule::new(length, message));
        self
    }

    #[must_use]
    pub fn max_length(mut self, length: usize, message: impl Into<Value>) -> Self {
        self.max_length = Some(Rule::new(length, message));
        self
    }

    #[must_use]
    pub fn pattern(mut self, pattern: Regex, message: impl Into<Value>) -> Self {
        self.pattern = Some(Rule::new(pattern, message));
        self
    }

    /// Compile `pattern` and use it as the pattern rule.
    pub fn pattern_str(self, pattern: &str, message: impl Into<Value>) -> Result<Self, regex::Error> {
        Ok(self.pattern(Regex::new(pattern)?, message))
    }

    /// Use a synchronous validate function.
    #[must_use]
    pub fn validate<O: Into<ValidateOutcome>>(
        mut self,
        check: impl Fn(&Value, &Value) -> O + 'static,
    ) -> Self {
        self.validate = Some(Validate::Single(sync_validator(check)));
        self
    }

    /// Use a prepared validate function.
    #[must_use]
    pub fn validate_with(mut self, check: ValidateFn) -> Self {
        self.validate = Some(Validate::Single(check));
        self
    }

    /// Add a named validate function.
    #[must_use]
    pub fn validate_named(mut self, name: impl Into<String>, check: ValidateFn) -> Self {
        let mut named = match self.validate.take() {
            Some(Validate::Named(map)) => map,
            _ => IndexMap::new(),
        };
        named.insert(name.into(), check);
        self.validate = Some(Validate::Named(named));
        self
    }

    #[must_use]
    pub fn deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps = deps.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn value_as_number(mut self) -> Self {
        self.value_as_number = true;
        self
    }

    #[must_use]
    pub fn value_as_date(mut self) -> Self {
        self.value_as_date = true;
        self
    }

    #[must_use]
    pub fn set_value_as(mut self, transform: impl Fn(Value) -> Value + 'static) -> Self {
        self.set_value_as = Some(Rc::new(transform));
        self
    }

    #[must_use]
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = Some(disabled);
        self
    }

    #[must_use]
    pub fn should_unregister(mut self, should_unregister: bool) -> Self {
        self.should_unregister = Some(should_unregister);
        self
    }

    #[must_use]
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: ValidationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    #[must_use]
    pub fn re_validate_mode(mut self, mode: ReValidateMode) -> Self {
        self.re_validate_mode = Some(mode);
        self
    }

    /// Whether any rule would run.
    #[must_use]
    pub fn has_validation(&self) -> bool {
        !self.rule_keys().is_empty()
    }

    /// Names of the rules present, in evaluation order.
    #[must_use]
    pub fn rule_keys(&self) -> Vec<&'static str> {
        [
            (ERROR_CODE_REQUIRED, self.required.is_some()),
            (ERROR_CODE_MIN, self.min.is_some()),
            (ERROR_CODE_MAX, self.max.is_some()),
            (ERROR_CODE_MIN_LENGTH, self.min_length.is_some()),
            (ERROR_CODE_MAX_LENGTH, self.max_length.is_some()),
            (ERROR_CODE_PATTERN, self.pattern.is_some()),
            (ERROR_CODE_VALIDATE, self.validate.is_some()),
        ]
        .into_iter()
        .filter_map(|(key, present)| present.then_some(key))
        .collect()
    }

    /// Replace every rule with `newer`'s, clearing the ones `newer` omits.
    /// Options `newer` leaves unset (`value`, `disabled`, `should_unregister`,
    /// mode overrides) keep their current setting. Returns the rule names
    /// that were removed.
    pub fn replace_rules(&mut self, newer: RuleSet) -> Vec<&'static str> {
        let kept = newer.rule_keys();
        let removed: Vec<&'static str> = self
            .rule_keys()
            .into_iter()
            .filter(|key| !kept.contains(key))
            .collect();

        let RuleSet {
            required,
            min,
            max,
            min_length,
            max_length,
            pattern,
            validate,
            deps,
            value_as_number,
            value_as_date,
            set_value_as,
            disabled,
            should_unregister,
            value,
            mode,
            re_validate_mode,
        } = newer;

        self.required = required;
        self.min = min;
        self.max = max;
        self.min_length = min_length;
        self.max_length = max_length;
        self.pattern = pattern;
        self.validate = validate;
        self.deps = deps;
        self.value_as_number = value_as_number;
        self.value_as_date = value_as_date;
        self.set_value_as = set_value_as;
        if disabled.is_some() {
            self.disabled = disabled;
        }
        if should_unregister.is_some() {
            self.should_unregister = should_unregister;
        }
        if value.is_some() {
            self.value = value;
        }
        if mode.is_some() {
            self.mode = mode;
        }
        if re_validate_mode.is_some() {
            self.re_validate_mode = re_validate_mode;
        }

        removed
    }

    /// Apply the configured input transforms to a raw value.
    #[must_use]
    pub fn transform_input(&self, raw: Value) -> Value {
        if self.value_as_number {
            crate::transform::value_as_number(&raw)
        } else if self.value_as_date {
            crate::transform::value_as_date(&raw)
        } else if let Some(transform) = &self.set_value_as {
            transform(raw)
        } else {
            raw
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_keys_follow_evaluation_order() {
        let rules = RuleSet::new()
            .validate(|_, _| true)
            .max_length(3, "")
            .required("req");
        assert_eq!(rules.rule_keys(), vec!["required", "maxLength", "validate"]);
        assert!(rules.has_validation());
        assert!(!RuleSet::new().deps(["other"]).has_validation());
    }

    #[test]
    fn replace_rules_clears_omitted_rules() {
        let mut rules = RuleSet::new().required("req").min_length(5, "short");
        let removed = rules.replace_rules(RuleSet::new().required("req"));
        assert_eq!(removed, vec!["minLength"]);
        assert!(rules.min_length.is_none());
        assert!(rules.required.is_some());
    }

    #[test]
    fn replace_rules_keeps_unset_options() {
        let mut rules = RuleSet::new().disabled(true).value("seed");
        rules.replace_rules(RuleSet::new().required("req"));
        assert_eq!(rules.disabled, Some(true));
        assert_eq!(rules.value, Some(Value::from("seed")));
    }

    #[test]
    fn named_validators_accumulate() {
        let rules = RuleSet::new()
            .validate_named("lower", sync_validator(|v: &Value, _: &Value| v.as_str().is_some_and(|s| s == s.to_lowercase())))
            .validate_named("short", sync_validator(|v: &Value, _: &Value| v.length().is_some_and(|n| n < 5)));
        match rules.validate {
            Some(Validate::Named(map)) => assert_eq!(map.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn transforms_apply_in_priority_order() {
        let rules = RuleSet::new().value_as_number().set_value_as(|_| Value::Null);
        assert_eq!(rules.transform_input(Value::from("7")), Value::from(7.0));
        let custom = RuleSet::new().set_value_as(|v| Value::from(v.to_string().to_uppercase()));
        assert_eq!(custom.transform_input(Value::from("ab")), Value::from("AB"));
    }
}

#![forbid(unsafe_code)]

//! Rule evaluation for one field.
//!
//! Rules run in a fixed order: `required`, then `min`/`max`, then
//! `minLength`/`maxLength`, then `pattern`, then `validate`. The first
//! failure ends evaluation unless [`CriteriaMode::All`] is set, in which case
//! every rule runs and each failure is recorded under the error's `types`.
//!
//! # Skips
//!
//! | Condition | Result |
//! |-----------|--------|
//! | field not mounted | no error |
//! | field disabled | no error |
//! | field read-only and read-only fields are skipped | no error |
//!
//! # Emptiness
//!
//! A value is empty when it is `""`, an empty array, or its binding reports a
//! blank raw value, unless the binding declares the field populated.

use std::rc::Rc;

use formctl_core::Value;
use indexmap::IndexMap;
use time::OffsetDateTime;

use crate::error::{
    ERROR_CODE_MAX, ERROR_CODE_MAX_LENGTH, ERROR_CODE_MIN, ERROR_CODE_MIN_LENGTH,
    ERROR_CODE_PATTERN, ERROR_CODE_REQUIRED, ERROR_CODE_VALIDATE, FieldError, ValidatorFault,
};
use crate::mode::CriteriaMode;
use crate::rules::{Bound, Rule, RuleSet, Validate};
use crate::transform::parse_date;

/// Everything the validator needs to know about one field.
#[derive(Debug, Clone)]
pub struct FieldInput {
    pub name: String,
    pub value: Value,
    /// Snapshot of all form values, shared by every field of a pass.
    pub form_values: Rc<Value>,
    pub mounted: bool,
    pub disabled: bool,
    /// Read-only and excluded from validation.
    pub skip_read_only: bool,
    /// The binding holds a value the engine cannot see.
    pub populated: bool,
    /// The binding's raw value is blank.
    pub raw_blank: bool,
    /// Validate the whole array at `name` (array-level rules).
    pub is_field_array: bool,
}

impl FieldInput {
    #[must_use]
    pub fn new(name: impl Into<String>, value: Value, form_values: Rc<Value>) -> Self {
        Self {
            name: name.into(),
            value,
            form_values,
            mounted: true,
            disabled: false,
            skip_read_only: false,
            populated: false,
            raw_blank: false,
            is_field_array: false,
        }
    }

    /// Input for the array-level rules of the field array at `name`.
    #[must_use]
    pub fn field_array(name: impl Into<String>, items: Value, form_values: Rc<Value>) -> Self {
        Self {
            is_field_array: true,
            ..Self::new(name, items, form_values)
        }
    }

    fn is_empty(&self) -> bool {
        if self.populated {
            return false;
        }
        self.raw_blank
            || match &self.value {
                Value::String(s) => s.is_empty(),
                Value::Array(items) => items.is_empty(),
                _ => false,
            }
    }

    fn fails_required(&self) -> bool {
        if self.is_field_array {
            return !matches!(&self.value, Value::Array(items) if !items.is_empty());
        }
        if self.populated {
            return false;
        }
        self.is_empty() || self.value.is_nullish() || matches!(self.value, Value::Bool(false))
    }
}

/// Accumulates failures according to the criteria mode.
struct Collector {
    all: bool,
    error: Option<FieldError>,
}

impl Collector {
    /// Record a failure; returns `true` when evaluation should stop.
    fn fail(&mut self, kind: &str, message: Value) -> bool {
        let types = if self.all {
            let mut types = self
                .error
                .take()
                .and_then(|e| e.types)
                .unwrap_or_else(IndexMap::new);
            let entry = if message.is_truthy() {
                message.clone()
            } else {
                Value::Bool(true)
            };
            types.insert(kind.to_owned(), entry);
            Some(types)
        } else {
            None
        };
        self.error = Some(FieldError {
            kind: kind.to_owned(),
            message,
            types,
        });
        !self.all
    }
}

enum Comparable {
    Number(f64),
    Date(OffsetDateTime),
}

fn comparable(value: &Value) -> Option<Comparable> {
    match value {
        Value::Number(n) if !n.is_nan() => Some(Comparable::Number(*n)),
        Value::Date(d) => Some(Comparable::Date(*d)),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(n) => Some(Comparable::Number(n)),
            Err(_) => parse_date(s).map(Comparable::Date),
        },
        _ => None,
    }
}

fn exceeds(value: &Comparable, bound: &Bound, above: bool) -> bool {
    match (value, bound) {
        (Comparable::Number(v), Bound::Number(b)) => {
            if above {
                v > b
            } else {
                v < b
            }
        }
        (Comparable::Date(v), Bound::Date(b)) => {
            if above {
                v > b
            } else {
                v < b
            }
        }
        _ => false,
    }
}

fn bound_failure<'a>(
    value: &Value,
    min: Option<&'a Rule<Bound>>,
    max: Option<&'a Rule<Bound>>,
) -> Option<(&'static str, &'a Value)> {
    let value = comparable(value)?;
    if let Some(rule) = max.filter(|rule| exceeds(&value, &rule.value, true)) {
        return Some((ERROR_CODE_MAX, &rule.message));
    }
    min.filter(|rule| exceeds(&value, &rule.value, false))
        .map(|rule| (ERROR_CODE_MIN, &rule.message))
}

fn length_failure<'a>(
    length: usize,
    min: Option<&'a Rule<usize>>,
    max: Option<&'a Rule<usize>>,
) -> Option<(&'static str, &'a Value)> {
    if let Some(rule) = max.filter(|rule| length > rule.value) {
        return Some((ERROR_CODE_MAX_LENGTH, &rule.message));
    }
    min.filter(|rule| length < rule.value)
        .map(|rule| (ERROR_CODE_MIN_LENGTH, &rule.message))
}

/// Run `rules` against `input`.
///
/// Returns `Ok(None)` when the field passes (or is skipped), `Ok(Some(_))`
/// with the normalized error otherwise, and `Err` when a custom validate
/// function fails.
pub async fn validate_field(
    rules: &RuleSet,
    input: &FieldInput,
    criteria: CriteriaMode,
) -> Result<Option<FieldError>, ValidatorFault> {
    if !input.mounted || input.disabled || input.skip_read_only {
        tracing::trace!(
            field = %input.name,
            mounted = input.mounted,
            disabled = input.disabled,
            read_only = input.skip_read_only,
            "validation skipped"
        );
        return Ok(None);
    }

    let mut collector = Collector {
        all: criteria == CriteriaMode::All,
        error: None,
    };
    let value = &input.value;
    let is_empty = input.is_empty();

    let required = rules.required.as_ref().filter(|rule| rule.value);
    if let Some(rule) = required {
        if input.fails_required() && collector.fail(ERROR_CODE_REQUIRED, rule.message.clone()) {
            return Ok(collector.error);
        }
    }

    if !is_empty && (rules.min.is_some() || rules.max.is_some()) {
        if let Some((kind, message)) = bound_failure(value, rules.min.as_ref(), rules.max.as_ref()) {
            if collector.fail(kind, message.clone()) {
                return Ok(collector.error);
            }
        }
    }

    let length = match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) if input.is_field_array => Some(items.len()),
        _ => None,
    };
    if let Some(length) = length.filter(|_| !is_empty) {
        if let Some((kind, message)) =
            length_failure(length, rules.min_length.as_ref(), rules.max_length.as_ref())
        {
            if collector.fail(kind, message.clone()) {
                return Ok(collector.error);
            }
        }
    }

    if let (Some(rule), Some(text)) = (rules.pattern.as_ref(), value.as_str()) {
        if !is_empty
            && !rule.value.is_match(text)
            && collector.fail(ERROR_CODE_PATTERN, rule.message.clone())
        {
            return Ok(collector.error);
        }
    }

    match &rules.validate {
        Some(Validate::Single(check)) => {
            let outcome = check(value, &input.form_values)
                .await
                .map_err(|fault| fault.for_field(&input.name))?;
            if let Some(message) = outcome.into_message() {
                if collector.fail(ERROR_CODE_VALIDATE, message) {
                    return Ok(collector.error);
                }
            }
        }
        Some(Validate::Named(checks)) => {
            let mut failed = false;
            for (key, check) in checks {
                if failed && !collector.all {
                    break;
                }
                let outcome = check(value, &input.form_values)
                    .await
                    .map_err(|fault| fault.for_field(&input.name))?;
                if let Some(message) = outcome.into_message() {
                    failed = true;
                    collector.fail(key, message);
                }
            }
        }
        None => {}
    }

    if let Some(error) = &collector.error {
        tracing::trace!(field = %input.name, kind = %error.kind, "field invalid");
    }
    Ok(collector.error)
}

//! Property-based invariant tests for validation timing and rule evaluation.
//!
//! 1. `all` never skips; `onSubmit` before submit always skips.
//! 2. After submit the decision depends only on the re-validate mode (except
//!    for `all`).
//! 3. A rule removed by re-registration never reports again.
//! 4. First-error mode reports the first failing rule of the all-criteria
//!    `types` map.

use std::rc::Rc;

use formctl_core::Value;
use formctl_validation::{
    CriteriaMode, FieldInput, ModeFlags, ReValidateMode, RuleSet, SkipContext, ValidationMode,
    should_skip_validation, validate_field,
};
use futures::executor::block_on;
use proptest::prelude::*;

// ── Strategies ────────────────────────────────────────────────────────────

fn mode() -> impl Strategy<Value = ValidationMode> {
    prop::sample::select(ValidationMode::ALL.to_vec())
}

fn re_validate_mode() -> impl Strategy<Value = ReValidateMode> {
    prop::sample::select(vec![
        ReValidateMode::OnSubmit,
        ReValidateMode::OnBlur,
        ReValidateMode::OnChange,
    ])
}

fn text() -> impl Strategy<Value = String> {
    "[a-z0-9]{0,12}"
}

fn run(rules: &RuleSet, value: &str, criteria: CriteriaMode) -> Option<formctl_validation::FieldError> {
    let input = FieldInput::new("field", Value::from(value), Rc::new(Value::Undefined));
    block_on(validate_field(rules, &input, criteria)).unwrap_or_default()
}

fn rich_rules() -> RuleSet {
    RuleSet::new()
        .required("required")
        .min_length(4, "short")
        .max_length(8, "long")
        .pattern_str("^[a-z]+$", "letters")
        .unwrap_or_default()
        .validate(|v: &Value, _: &Value| v.as_str().is_some_and(|s| !s.starts_with('x')))
}

// ─── 1. Fixed rows of the skip table ──────────────────────────────────────

proptest! {
    #[test]
    fn all_mode_never_skips(
        blur in any::<bool>(),
        touched in any::<bool>(),
        submitted in any::<bool>(),
        re in re_validate_mode(),
    ) {
        let ctx = SkipContext {
            is_blur_event: blur,
            is_touched: touched,
            is_submitted: submitted,
            mode: ModeFlags::ON_ALL,
            re_validate_mode: re.flags(),
        };
        prop_assert!(!should_skip_validation(ctx));
    }

    #[test]
    fn on_submit_skips_until_submitted(
        blur in any::<bool>(),
        touched in any::<bool>(),
        re in re_validate_mode(),
    ) {
        let ctx = SkipContext {
            is_blur_event: blur,
            is_touched: touched,
            is_submitted: false,
            mode: ValidationMode::OnSubmit.flags(),
            re_validate_mode: re.flags(),
        };
        prop_assert!(should_skip_validation(ctx));
    }
}

// ─── 2. Submitted forms follow the re-validate mode ───────────────────────

proptest! {
    #[test]
    fn submitted_decision_ignores_pre_submit_mode(
        a in mode(),
        b in mode(),
        blur in any::<bool>(),
        touched in any::<bool>(),
        re in re_validate_mode(),
    ) {
        prop_assume!(a != ValidationMode::All && b != ValidationMode::All);
        let ctx = |m: ValidationMode| SkipContext {
            is_blur_event: blur,
            is_touched: touched,
            is_submitted: true,
            mode: m.flags(),
            re_validate_mode: re.flags(),
        };
        prop_assert_eq!(should_skip_validation(ctx(a)), should_skip_validation(ctx(b)));
    }
}

// ─── 3. Removed rules stop reporting ──────────────────────────────────────

proptest! {
    #[test]
    fn removed_min_length_never_reports(value in text()) {
        let mut rules = RuleSet::new().required("required").min_length(5, "short");
        rules.replace_rules(RuleSet::new().required("required"));
        let error = run(&rules, &value, CriteriaMode::All);
        let kinds: Vec<String> = error
            .map(|e| e.types.unwrap_or_default().keys().cloned().collect())
            .unwrap_or_default();
        prop_assert!(!kinds.iter().any(|k| k == "minLength"));
    }
}

// ─── 4. First error agrees with the full report ───────────────────────────

proptest! {
    #[test]
    fn first_error_is_first_of_all_types(value in text()) {
        let rules = rich_rules();
        let first = run(&rules, &value, CriteriaMode::FirstError);
        let all = run(&rules, &value, CriteriaMode::All);
        prop_assert_eq!(first.is_some(), all.is_some());
        if let (Some(first), Some(all)) = (first, all) {
            let types = all.types.unwrap_or_default();
            let leading = types.keys().next().cloned().unwrap_or_default();
            prop_assert_eq!(first.kind, leading);
        }
    }
}

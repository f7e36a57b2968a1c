#![forbid(unsafe_code)]

//! Validation timing policy.
//!
//! A form chooses when fields validate before the first submit
//! ([`ValidationMode`]) and when fields re-validate afterwards
//! ([`ReValidateMode`]). Either can be overridden per field. The decision
//! itself lives in [`should_skip_validation`].
//!
//! # Skip table
//!
//! | Condition (checked in order) | Skip |
//! |------------------------------|------|
//! | mode is `all` | never |
//! | not submitted, mode is `onTouched` | unless touched already or blur |
//! | blur flag of (submitted ? re-validate : mode) | unless blur |
//! | change flag of (submitted ? re-validate : mode) | if blur |
//! | otherwise | always |

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// When fields validate before the first submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationMode {
    #[default]
    OnSubmit,
    OnBlur,
    OnChange,
    OnTouched,
    All,
}

/// When fields re-validate after the first submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReValidateMode {
    OnSubmit,
    OnBlur,
    #[default]
    OnChange,
}

/// Whether every rule runs or the first failure wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CriteriaMode {
    #[default]
    FirstError,
    All,
}

bitflags! {
    /// Boolean view of a mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModeFlags: u8 {
        const ON_SUBMIT = 1 << 0;
        const ON_BLUR = 1 << 1;
        const ON_CHANGE = 1 << 2;
        const ON_TOUCH = 1 << 3;
        const ON_ALL = 1 << 4;
    }
}

impl ModeFlags {
    #[must_use]
    pub fn is_on_submit(self) -> bool {
        self.contains(Self::ON_SUBMIT)
    }

    #[must_use]
    pub fn is_on_blur(self) -> bool {
        self.contains(Self::ON_BLUR)
    }

    #[must_use]
    pub fn is_on_change(self) -> bool {
        self.contains(Self::ON_CHANGE)
    }

    #[must_use]
    pub fn is_on_touch(self) -> bool {
        self.contains(Self::ON_TOUCH)
    }

    #[must_use]
    pub fn is_on_all(self) -> bool {
        self.contains(Self::ON_ALL)
    }
}

impl ValidationMode {
    pub const ALL: [Self; 5] = [
        Self::OnSubmit,
        Self::OnBlur,
        Self::OnChange,
        Self::OnTouched,
        Self::All,
    ];

    /// Exactly one flag per mode; `all` does not imply blur or change.
    #[must_use]
    pub fn flags(self) -> ModeFlags {
        match self {
            Self::OnSubmit => ModeFlags::ON_SUBMIT,
            Self::OnBlur => ModeFlags::ON_BLUR,
            Self::OnChange => ModeFlags::ON_CHANGE,
            Self::OnTouched => ModeFlags::ON_TOUCH,
            Self::All => ModeFlags::ON_ALL,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnSubmit => "onSubmit",
            Self::OnBlur => "onBlur",
            Self::OnChange => "onChange",
            Self::OnTouched => "onTouched",
            Self::All => "all",
        }
    }
}

impl ReValidateMode {
    #[must_use]
    pub fn flags(self) -> ModeFlags {
        match self {
            Self::OnSubmit => ModeFlags::ON_SUBMIT,
            Self::OnBlur => ModeFlags::ON_BLUR,
            Self::OnChange => ModeFlags::ON_CHANGE,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnSubmit => "onSubmit",
            Self::OnBlur => "onBlur",
            Self::OnChange => "onChange",
        }
    }
}

/// A mode string that names no known mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseModeError(pub String);

impl fmt::Display for ParseModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown validation mode: {:?}", self.0)
    }
}

impl std::error::Error for ParseModeError {}

impl FromStr for ValidationMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| ParseModeError(s.to_owned()))
    }
}

impl FromStr for ReValidateMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "onSubmit" => Ok(Self::OnSubmit),
            "onBlur" => Ok(Self::OnBlur),
            "onChange" => Ok(Self::OnChange),
            other => Err(ParseModeError(other.to_owned())),
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ReValidateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the skip decision for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SkipContext {
    pub is_blur_event: bool,
    pub is_touched: bool,
    pub is_submitted: bool,
    pub mode: ModeFlags,
    pub re_validate_mode: ModeFlags,
}

/// Whether an input event should leave the field unvalidated.
#[must_use]
pub fn should_skip_validation(ctx: SkipContext) -> bool {
    let active = if ctx.is_submitted {
        ctx.re_validate_mode
    } else {
        ctx.mode
    };
    if ctx.mode.is_on_all() {
        false
    } else if !ctx.is_submitted && ctx.mode.is_on_touch() {
        !(ctx.is_touched || ctx.is_blur_event)
    } else if active.is_on_blur() {
        !ctx.is_blur_event
    } else if active.is_on_change() {
        ctx.is_blur_event
    } else {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(
        is_blur_event: bool,
        is_touched: bool,
        is_submitted: bool,
        mode: ModeFlags,
        re_validate_mode: ModeFlags,
    ) -> SkipContext {
        SkipContext {
            is_blur_event,
            is_touched,
            is_submitted,
            mode,
            re_validate_mode,
        }
    }

    const BLUR_AND_CHANGE: ModeFlags = ModeFlags::ON_BLUR.union(ModeFlags::ON_CHANGE);

    #[test]
    fn on_change_blur_before_submit_skips() {
        let c = ctx(true, false, false, ModeFlags::ON_CHANGE, BLUR_AND_CHANGE);
        assert!(should_skip_validation(c));
    }

    #[test]
    fn on_change_change_before_submit_validates() {
        let c = ctx(false, false, false, ModeFlags::ON_CHANGE, BLUR_AND_CHANGE);
        assert!(!should_skip_validation(c));
    }

    #[test]
    fn on_submit_before_submit_always_skips() {
        for blur in [true, false] {
            let c = ctx(blur, false, false, ModeFlags::ON_SUBMIT, ModeFlags::ON_CHANGE);
            assert!(should_skip_validation(c));
        }
    }

    #[test]
    fn all_never_skips() {
        for bits in 0..8u8 {
            let c = ctx(
                bits & 1 != 0,
                bits & 2 != 0,
                bits & 4 != 0,
                ModeFlags::ON_ALL,
                ModeFlags::ON_SUBMIT,
            );
            assert!(!should_skip_validation(c));
        }
    }

    #[test]
    fn on_blur_blur_validates_and_change_skips() {
        let blur = ctx(true, false, false, ModeFlags::ON_BLUR, ModeFlags::ON_CHANGE);
        let change = ctx(false, false, false, ModeFlags::ON_BLUR, ModeFlags::ON_CHANGE);
        assert!(!should_skip_validation(blur));
        assert!(should_skip_validation(change));
    }

    #[test]
    fn on_touched_untouched_change_skips() {
        let c = ctx(false, false, false, ModeFlags::ON_TOUCH, ModeFlags::ON_CHANGE);
        assert!(should_skip_validation(c));
    }

    #[test]
    fn on_touched_blur_validates() {
        let c = ctx(true, false, false, ModeFlags::ON_TOUCH, ModeFlags::ON_CHANGE);
        assert!(!should_skip_validation(c));
    }

    #[test]
    fn on_touched_touched_change_validates() {
        let c = ctx(false, true, false, ModeFlags::ON_TOUCH, ModeFlags::ON_CHANGE);
        assert!(!should_skip_validation(c));
    }

    #[test]
    fn submitted_re_validate_on_blur_skips_change() {
        let c = ctx(false, false, true, ModeFlags::ON_SUBMIT, ModeFlags::ON_BLUR);
        assert!(should_skip_validation(c));
        let blur = ctx(true, false, true, ModeFlags::ON_SUBMIT, ModeFlags::ON_BLUR);
        assert!(!should_skip_validation(blur));
    }

    #[test]
    fn submitted_re_validate_on_change_skips_blur() {
        let c = ctx(true, false, true, ModeFlags::ON_SUBMIT, ModeFlags::ON_CHANGE);
        assert!(should_skip_validation(c));
        let change = ctx(false, false, true, ModeFlags::ON_SUBMIT, ModeFlags::ON_CHANGE);
        assert!(!should_skip_validation(change));
    }

    #[test]
    fn submitted_re_validate_on_submit_always_skips() {
        for blur in [true, false] {
            let c = ctx(blur, false, true, ModeFlags::ON_CHANGE, ModeFlags::ON_SUBMIT);
            assert!(should_skip_validation(c));
        }
    }

    #[test]
    fn submitted_on_touched_defers_to_re_validate_mode() {
        let c = ctx(false, false, true, ModeFlags::ON_TOUCH, ModeFlags::ON_CHANGE);
        assert!(!should_skip_validation(c));
    }

    #[test]
    fn modes_parse_and_display() {
        for mode in ValidationMode::ALL {
            assert_eq!(mode.as_str().parse::<ValidationMode>(), Ok(mode));
        }
        assert_eq!("onBlur".parse::<ReValidateMode>(), Ok(ReValidateMode::OnBlur));
        assert!("sometimes".parse::<ValidationMode>().is_err());
        assert_eq!(ValidationMode::OnTouched.to_string(), "onTouched");
    }
}

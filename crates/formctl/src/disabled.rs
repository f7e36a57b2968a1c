#![forbid(unsafe_code)]

//! Effective disabled and read-only state per field.
//!
//! # Disabled precedence
//!
//! | Layer | Example | Wins over |
//! |-------|---------|-----------|
//! | control override | the binding's own disabled attribute | everything |
//! | registration override | `RuleSet::disabled(true)` | form level |
//! | form level | `true`, or a list of names (descendants included) | default |
//! | default | `false` | |
//!
//! # Read-only tracking
//!
//! Read-only state belongs to the bindings, not the engine. [`ReadOnlyTracker`]
//! holds the last observation per field and is refreshed whenever the
//! binding layer reports a read-only change; validation reads the tracker.

use formctl_core::FieldPath;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Form-level disabled setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DisabledSetting {
    /// Applies to every field.
    Flag(bool),
    /// Applies to the listed paths and everything beneath them.
    Names(Vec<String>),
}

impl Default for DisabledSetting {
    fn default() -> Self {
        DisabledSetting::Flag(false)
    }
}

impl DisabledSetting {
    /// Whether the form-level setting disables `path`.
    #[must_use]
    pub fn covers(&self, path: &str) -> bool {
        match self {
            DisabledSetting::Flag(flag) => *flag,
            DisabledSetting::Names(names) => {
                let path = FieldPath::parse(path);
                names
                    .iter()
                    .any(|name| path.starts_with(&FieldPath::parse(name)))
            }
        }
    }

    /// The `disabled` flag reported in the form state.
    #[must_use]
    pub fn is_form_disabled(&self) -> bool {
        matches!(self, DisabledSetting::Flag(true))
    }
}

impl From<bool> for DisabledSetting {
    fn from(flag: bool) -> Self {
        DisabledSetting::Flag(flag)
    }
}

/// Resolve the effective disabled value of `path`.
#[must_use]
pub fn resolve_disabled(
    control: Option<bool>,
    registration: Option<bool>,
    form: &DisabledSetting,
    path: &str,
) -> bool {
    control
        .or(registration)
        .unwrap_or_else(|| form.covers(path))
}

/// Last observed read-only state of each field.
#[derive(Debug, Clone, Default)]
pub struct ReadOnlyTracker {
    read_only: FxHashSet<String>,
    refreshes: u64,
}

impl ReadOnlyTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh observation for `path`. Returns whether it changed.
    pub fn observe(&mut self, path: &str, read_only: bool) -> bool {
        self.refreshes += 1;
        let changed = if read_only {
            self.read_only.insert(path.to_owned())
        } else {
            self.read_only.remove(path)
        };
        if changed {
            tracing::trace!(field = path, read_only, "read-only state changed");
        }
        changed
    }

    #[must_use]
    pub fn is_read_only(&self, path: &str) -> bool {
        self.read_only.contains(path)
    }

    /// Forget `path` (unregistered fields).
    pub fn forget(&mut self, path: &str) {
        self.read_only.remove(path);
    }

    pub fn clear(&mut self) {
        self.read_only.clear();
    }

    /// Observations recorded so far.
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.refreshes
    }
}

#![forbid(unsafe_code)]

//! The single focused field.
//!
//! Only the current field matters: no history is kept. A blur clears the
//! slot only when the blurred field still holds it, so a focus event that
//! arrives before the previous field's blur is not lost.

use formctl_core::FieldPath;

/// Tracks which field is focused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FocusTracker {
    focused: Option<String>,
}

impl FocusTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    /// Record focus on `path`. Returns whether the slot changed.
    pub fn focus(&mut self, path: &str) -> bool {
        if self.focused.as_deref() == Some(path) {
            return false;
        }
        self.focused = Some(path.to_owned());
        true
    }

    /// Record a blur of `path`. Returns whether the slot changed.
    pub fn blur(&mut self, path: &str) -> bool {
        if self.focused.as_deref() != Some(path) {
            return false;
        }
        self.focused = None;
        true
    }

    /// Clear the slot. Returns whether it was occupied.
    pub fn clear(&mut self) -> bool {
        self.focused.take().is_some()
    }

    /// Clear the slot when it holds `path` or a descendant of it.
    pub fn release(&mut self, path: &str) -> bool {
        let prefix = FieldPath::parse(path);
        let held = self
            .focused
            .as_deref()
            .is_some_and(|focused| FieldPath::parse(focused).starts_with(&prefix));
        if held {
            self.focused = None;
        }
        held
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_only_clears_own_focus() {
        let mut focus = FocusTracker::new();
        assert!(focus.focus("a"));
        assert!(focus.focus("b"));
        assert!(!focus.blur("a"));
        assert_eq!(focus.focused(), Some("b"));
        assert!(focus.blur("b"));
        assert_eq!(focus.focused(), None);
    }

    #[test]
    fn release_covers_descendants() {
        let mut focus = FocusTracker::new();
        focus.focus("items.0.name");
        assert!(!focus.release("items.1"));
        assert!(focus.release("items"));
        assert!(!focus.clear());
    }
}

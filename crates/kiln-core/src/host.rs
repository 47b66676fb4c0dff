//! Hand-off to the isolated rendering host.

use std::collections::BTreeMap;

use kiln_common::diagnostics::Diagnostic;
use kiln_common::types::CompilationResult;
use serde::Serialize;

/// What the render host receives for one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderPayload {
    /// Entry module code.
    pub final_js: String,
    /// Stylesheet injected into the isolated tree.
    pub final_css: String,
    /// Published location to module code, fetched by the entry's imports.
    pub modules: BTreeMap<String, String>,
    /// Errors to display instead of, or next to, the preview.
    pub errors: Vec<Diagnostic>,
    /// Warnings.
    pub warnings: Vec<Diagnostic>,
}

impl RenderPayload {
    /// Extracts the payload of `result`.
    #[must_use]
    pub fn from_result(result: &CompilationResult) -> Self {
        Self {
            final_js: result.final_js.clone(),
            final_css: result.final_css.clone(),
            modules: result.final_modules.clone(),
            errors: result.errors.clone(),
            warnings: result.warnings.clone(),
        }
    }
}

/// How the host should apply a new payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderAction {
    /// Tear down and re-run the entry module.
    Remount,
    /// Only replace the stylesheet.
    Restyle,
    /// Nothing visible changed.
    Keep,
}

/// Remembers what the host rendered last.
#[derive(Debug, Clone, Default)]
pub struct RenderTracker {
    last: Option<RenderPayload>,
}

impl RenderTracker {
    /// Creates a tracker that has rendered nothing yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the entry code or any module differs from the last render.
    ///
    /// Module code is compared as well as locations: scoping a property can
    /// rewrite a module without a script edit.
    #[must_use]
    pub fn needs_remount(&self, payload: &RenderPayload) -> bool {
        self.last.as_ref().is_none_or(|last| {
            last.final_js != payload.final_js || last.modules != payload.modules
        })
    }

    /// Decides how to apply `payload` and records it as rendered.
    pub fn apply(&mut self, payload: &RenderPayload) -> RenderAction {
        let action = if self.needs_remount(payload) {
            RenderAction::Remount
        } else if self.last.as_ref().is_some_and(|last| last.final_css != payload.final_css) {
            RenderAction::Restyle
        } else {
            RenderAction::Keep
        };
        self.last = Some(payload.clone());
        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(js: &str, css: &str, modules: &[&str]) -> RenderPayload {
        RenderPayload {
            final_js: js.into(),
            final_css: css.into(),
            modules: modules
                .iter()
                .map(|m| ((*m).to_owned(), String::new()))
                .collect(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn first_payload_mounts() {
        let tracker = RenderTracker::new();
        assert!(tracker.needs_remount(&payload("a", "", &[])));
    }

    #[test]
    fn css_only_change_restyles() {
        let mut tracker = RenderTracker::new();
        assert_eq!(tracker.apply(&payload("a", "x", &["m1"])), RenderAction::Remount);
        assert_eq!(tracker.apply(&payload("a", "y", &["m1"])), RenderAction::Restyle);
        assert_eq!(tracker.apply(&payload("a", "y", &["m1"])), RenderAction::Keep);
    }

    #[test]
    fn module_set_change_remounts() {
        let mut tracker = RenderTracker::new();
        let _ = tracker.apply(&payload("a", "x", &["m1"]));
        assert!(tracker.needs_remount(&payload("a", "x", &["m2"])));
        assert!(tracker.needs_remount(&payload("b", "x", &["m1"])));
        assert!(!tracker.needs_remount(&payload("a", "z", &["m1"])));
    }

    #[test]
    fn module_code_change_remounts_under_same_location() {
        let mut tracker = RenderTracker::new();
        let mut first = payload("a", "x", &["m1"]);
        let _ = first.modules.insert("m1".into(), "set('--s1')".into());
        let _ = tracker.apply(&first);
        let mut second = payload("a", "y", &["m1"]);
        let _ = second
            .modules
            .insert("m1".into(), "set('--s1-1-_number_-true-5acf7ef5')".into());
        assert_eq!(tracker.apply(&second), RenderAction::Remount);
    }
}

//! Data model shared by every pipeline stage.
//!
//! A [`CompilationResult`] is an immutable snapshot: stages never mutate a
//! published snapshot, they derive a new one. Callers hold snapshots as
//! `Arc<CompilationResult>` so that an unchanged result can be handed back
//! by reference.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::ast::ParsedUnit;
use crate::config::KilnConfig;
use crate::constants;
use crate::diagnostics::{Diagnostic, Diagnostics};

/// Kind of a project file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// Script source compiled to executable code.
    Script,
    /// Stylesheet source fed to the stylesheet build.
    Style,
}

impl UnitKind {
    /// Classifies a filename by extension.
    #[must_use]
    pub fn from_filename(filename: &str) -> Option<Self> {
        if constants::is_script(filename) {
            Some(Self::Script)
        } else if constants::is_style(filename) {
            Some(Self::Style)
        } else {
            None
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Script => write!(f, "script"),
            Self::Style => write!(f, "style"),
        }
    }
}

/// One project file and its last compiled artifacts.
#[derive(Debug, Clone, Serialize)]
pub struct SourceUnit {
    /// Project-relative, `/`-separated path.
    pub filename: String,
    /// Script or stylesheet.
    pub kind: UnitKind,
    /// Content of the last successful compilation.
    pub committed_content: Option<String>,
    /// Latest edited content.
    pub pending_content: String,
    /// Executable output of `committed_content`.
    pub compiled_output: Option<String>,
    /// Whether the most recent compilation of this unit succeeded.
    pub compiled_successfully: bool,
    /// Class names referenced by `committed_content`.
    pub extracted_class_names: BTreeSet<String>,
    /// Location the unit was last published at.
    pub published_location: Option<String>,
    /// Parse tree of `committed_content`.
    #[serde(skip)]
    pub parsed: Option<Arc<ParsedUnit>>,
    /// Diagnostics from the most recent compilation of this unit.
    pub diagnostics: Diagnostics,
}

impl SourceUnit {
    /// Creates a unit that has never been compiled.
    #[must_use]
    pub fn new(filename: impl Into<String>, kind: UnitKind, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            kind,
            committed_content: None,
            pending_content: content.into(),
            compiled_output: None,
            compiled_successfully: false,
            extracted_class_names: BTreeSet::new(),
            published_location: None,
            parsed: None,
            diagnostics: Diagnostics::default(),
        }
    }

    /// Returns `true` if the pending content has not been compiled yet.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.committed_content.as_deref() != Some(self.pending_content.as_str())
    }

    /// Returns the compiled output only if it matches the pending content.
    #[must_use]
    pub fn trusted_output(&self) -> Option<&str> {
        if self.is_dirty() {
            None
        } else {
            self.compiled_output.as_deref()
        }
    }
}

/// A compiled non-entry unit made addressable for importers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedModule {
    /// Location importers are rewritten to.
    pub location: String,
    /// Executable code before property scoping.
    pub code: String,
    /// Digest of the rewritten source and target the code was produced from.
    pub source_digest: String,
    /// Transform warnings reported for `code`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// A class name generated by the utility stylesheet engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UtilityClass {
    /// Class name as used in scripts.
    pub name: String,
    /// CSS generated for it.
    pub css: String,
}

/// A custom property renamed for an isolated rendering context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ScopedProperty {
    /// Name as declared, including the leading `--`.
    pub original_name: String,
    /// Collision-resistant replacement name.
    pub scoped_name: String,
    /// Syntax descriptor with quotes stripped.
    pub syntax: String,
    /// Inheritance flag.
    pub inherits: bool,
    /// Raw initial value.
    pub initial_value: String,
}

/// The set of project files handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInputs {
    /// Filename to latest content.
    pub files: BTreeMap<String, String>,
    /// Entry script unit.
    pub entry_script: String,
    /// Entry stylesheet unit.
    pub entry_style: String,
}

impl ProjectInputs {
    /// Creates an empty project with the given entry units.
    #[must_use]
    pub fn new(entry_script: impl Into<String>, entry_style: impl Into<String>) -> Self {
        Self {
            files: BTreeMap::new(),
            entry_script: entry_script.into(),
            entry_style: entry_style.into(),
        }
    }

    /// Creates an empty project using the configured entry units.
    #[must_use]
    pub fn from_config(config: &KilnConfig) -> Self {
        Self::new(&config.entry_script, &config.entry_style)
    }

    /// Adds or replaces a file, builder style.
    #[must_use]
    pub fn with_file(mut self, filename: impl Into<String>, content: impl Into<String>) -> Self {
        self.set_file(filename, content);
        self
    }

    /// Adds or replaces a file.
    pub fn set_file(&mut self, filename: impl Into<String>, content: impl Into<String>) {
        let _ = self.files.insert(filename.into(), content.into());
    }

    /// Removes a file, returning its last content.
    pub fn remove_file(&mut self, filename: &str) -> Option<String> {
        self.files.remove(filename)
    }
}

impl Default for ProjectInputs {
    fn default() -> Self {
        Self::new(constants::DEFAULT_ENTRY_SCRIPT, constants::DEFAULT_ENTRY_STYLE)
    }
}

/// Immutable snapshot produced by one orchestrator invocation.
#[derive(Debug, Clone, Serialize)]
pub struct CompilationResult {
    /// Every project unit keyed by filename.
    pub units: BTreeMap<String, SourceUnit>,
    /// Entry script unit.
    pub entry_script: String,
    /// Entry stylesheet unit.
    pub entry_style: String,
    /// Class names referenced by all successfully compiled units.
    pub class_names: BTreeSet<String>,
    /// Aggregated stylesheet source the CSS was built from.
    pub style_source: String,
    /// Classes generated by the utility engine, with their CSS.
    pub utility_classes: Vec<UtilityClass>,
    /// Classes the utility engine did not recognise; expected to be author-defined.
    pub author_classes: Vec<String>,
    /// Entry code with imports rewritten, before property scoping.
    pub compiled_entry_js: String,
    /// Built stylesheet before property scoping.
    pub compiled_entry_css: String,
    /// Non-entry units keyed by filename, before property scoping.
    pub published: BTreeMap<String, PublishedModule>,
    /// Entry code handed to the render host.
    pub final_js: String,
    /// Stylesheet handed to the render host.
    pub final_css: String,
    /// Published location to scoped module code.
    pub final_modules: BTreeMap<String, String>,
    /// Properties renamed by the scoping pass.
    pub scoped_properties: Vec<ScopedProperty>,
    /// Errors in discovery order.
    pub errors: Vec<Diagnostic>,
    /// Warnings in discovery order.
    pub warnings: Vec<Diagnostic>,
    /// Diagnostics of the last graph processing, replayed when it is reused.
    #[serde(skip)]
    pub graph_diagnostics: Diagnostics,
    /// Diagnostics of the last stylesheet build, replayed when it is reused.
    #[serde(skip)]
    pub style_diagnostics: Diagnostics,
    /// Diagnostics of the last scoping pass, replayed when it is reused.
    #[serde(skip)]
    pub scope_diagnostics: Diagnostics,
}

impl CompilationResult {
    /// Creates an empty snapshot for the given entry units.
    #[must_use]
    pub fn empty(entry_script: impl Into<String>, entry_style: impl Into<String>) -> Self {
        Self {
            units: BTreeMap::new(),
            entry_script: entry_script.into(),
            entry_style: entry_style.into(),
            class_names: BTreeSet::new(),
            style_source: String::new(),
            utility_classes: Vec::new(),
            author_classes: Vec::new(),
            compiled_entry_js: String::new(),
            compiled_entry_css: String::new(),
            published: BTreeMap::new(),
            final_js: String::new(),
            final_css: String::new(),
            final_modules: BTreeMap::new(),
            scoped_properties: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            graph_diagnostics: Diagnostics::default(),
            style_diagnostics: Diagnostics::default(),
            scope_diagnostics: Diagnostics::default(),
        }
    }

    /// Returns a unit by filename.
    #[must_use]
    pub fn unit(&self, filename: &str) -> Option<&SourceUnit> {
        self.units.get(filename)
    }

    /// Iterates over script units in filename order.
    pub fn script_units(&self) -> impl Iterator<Item = &SourceUnit> {
        self.units.values().filter(|u| u.kind == UnitKind::Script)
    }

    /// Iterates over stylesheet units in filename order.
    pub fn style_units(&self) -> impl Iterator<Item = &SourceUnit> {
        self.units.values().filter(|u| u.kind == UnitKind::Style)
    }

    /// Returns `true` if the snapshot's pending contents equal `inputs` exactly.
    ///
    /// Files that are neither scripts nor stylesheets are not units and are ignored.
    #[must_use]
    pub fn matches_inputs(&self, inputs: &ProjectInputs) -> bool {
        let mut files = inputs
            .files
            .iter()
            .filter(|(name, _)| UnitKind::from_filename(name).is_some());
        self.entry_script == inputs.entry_script
            && self.entry_style == inputs.entry_style
            && self.units.iter().all(|(name, unit)| {
                files
                    .next()
                    .is_some_and(|(file, content)| name == file && unit.pending_content == *content)
            })
            && files.next().is_none()
    }

    /// Returns a copy whose diagnostics are replaced by `diagnostics`.
    ///
    /// Used to surface a failed attempt while keeping the last good artifacts.
    #[must_use]
    pub fn with_failure(&self, diagnostics: &Diagnostics) -> Self {
        Self {
            errors: diagnostics.errors.clone(),
            warnings: diagnostics.warnings.clone(),
            ..self.clone()
        }
    }
}

impl Default for CompilationResult {
    fn default() -> Self {
        Self::empty(constants::DEFAULT_ENTRY_SCRIPT, constants::DEFAULT_ENTRY_STYLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_unit_is_dirty() {
        let unit = SourceUnit::new("main.tsx", UnitKind::Script, "export {}");
        assert!(unit.is_dirty());
        assert!(unit.trusted_output().is_none());
    }

    #[test]
    fn output_trusted_only_when_committed_matches() {
        let mut unit = SourceUnit::new("main.tsx", UnitKind::Script, "a");
        unit.committed_content = Some("a".into());
        unit.compiled_output = Some("compiled a".into());
        assert_eq!(unit.trusted_output(), Some("compiled a"));

        unit.pending_content = "b".into();
        assert!(unit.trusted_output().is_none());
    }

    #[test]
    fn classifies_unit_kinds() {
        assert_eq!(UnitKind::from_filename("a/b.ts"), Some(UnitKind::Script));
        assert_eq!(UnitKind::from_filename("main.css"), Some(UnitKind::Style));
        assert_eq!(UnitKind::from_filename("data.json"), None);
    }

    #[test]
    fn matches_inputs_compares_pending_content() {
        let mut result = CompilationResult::default();
        let _ = result.units.insert(
            "main.tsx".into(),
            SourceUnit::new("main.tsx", UnitKind::Script, "x"),
        );
        let same = ProjectInputs::default().with_file("main.tsx", "x");
        let edited = ProjectInputs::default().with_file("main.tsx", "y");
        let added = same.clone().with_file("main.css", "");
        let with_asset = same.clone().with_file("logo.svg", "<svg/>");

        assert!(result.matches_inputs(&same));
        assert!(result.matches_inputs(&with_asset));
        assert!(!result.matches_inputs(&edited));
        assert!(!result.matches_inputs(&added));
    }
}

//! User-facing diagnostics produced by a compilation attempt.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::KilnError;

/// Category of a diagnostic, kept for filtering and testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    /// A unit failed to parse.
    Parse,
    /// A unit failed to transform.
    Transform,
    /// An import was left unresolved.
    Resolution,
    /// The module graph has a cycle.
    GraphCycle,
    /// The stylesheet build failed.
    Stylesheet,
    /// A property registration conflicted.
    Registry,
    /// Type declarations could not be delivered to the editor.
    TypeDeclarations,
    /// The entry unit is missing or has never compiled.
    MissingEntry,
    /// Anything reported by a capability as a plain warning.
    Other,
}

/// A single human-readable diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Category.
    pub kind: DiagnosticKind,
    /// Unit the diagnostic refers to, if any.
    pub filename: Option<String>,
    /// Message without the filename prefix.
    pub message: String,
}

impl Diagnostic {
    /// Creates a diagnostic attached to a unit.
    #[must_use]
    pub fn for_unit(kind: DiagnosticKind, filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            filename: Some(filename.into()),
            message: message.into(),
        }
    }

    /// Creates a diagnostic not tied to any unit.
    #[must_use]
    pub fn global(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            filename: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filename {
            Some(name) => write!(f, "{name}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl From<&KilnError> for Diagnostic {
    fn from(err: &KilnError) -> Self {
        match err {
            KilnError::Parse { filename, message } => {
                Self::for_unit(DiagnosticKind::Parse, filename, message)
            }
            KilnError::Transform { filename, message } => {
                Self::for_unit(DiagnosticKind::Transform, filename, message)
            }
            KilnError::Resolution {
                importer,
                specifier,
                reason,
            } => Self::for_unit(
                DiagnosticKind::Resolution,
                importer,
                format!("cannot resolve import \"{specifier}\": {reason}"),
            ),
            KilnError::GraphCycle { .. } => Self::global(DiagnosticKind::GraphCycle, err.to_string()),
            KilnError::Stylesheet { .. } => Self::global(DiagnosticKind::Stylesheet, err.to_string()),
            KilnError::RegistryConflict { .. } => Self::global(DiagnosticKind::Registry, err.to_string()),
            KilnError::TypeDeclarations { .. } => {
                Self::global(DiagnosticKind::TypeDeclarations, err.to_string())
            }
            KilnError::Io { .. }
            | KilnError::Config { .. }
            | KilnError::Serialization { .. }
            | KilnError::Yaml { .. } => Self::global(DiagnosticKind::Other, err.to_string()),
        }
    }
}

impl From<KilnError> for Diagnostic {
    fn from(err: KilnError) -> Self {
        Self::from(&err)
    }
}

/// Errors and warnings in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Errors.
    pub errors: Vec<Diagnostic>,
    /// Warnings.
    pub warnings: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Records an error.
    pub fn error(&mut self, diagnostic: impl Into<Diagnostic>) {
        self.errors.push(diagnostic.into());
    }

    /// Records a warning.
    pub fn warning(&mut self, diagnostic: impl Into<Diagnostic>) {
        self.warnings.push(diagnostic.into());
    }

    /// Appends every diagnostic of `other`, preserving order.
    pub fn extend(&mut self, other: &Self) {
        self.errors.extend(other.errors.iter().cloned());
        self.warnings.extend(other.warnings.iter().cloned());
    }

    /// Returns `true` if there are neither errors nor warnings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    /// Returns `true` if at least one error was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

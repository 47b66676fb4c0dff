//! Bare module resolution.
//!
//! The [`ImportTable`] is shared by every compilation attempt of a session.
//! It is append-only: the first location written for a specifier wins and
//! entries are never invalidated, so writes made by a cancelled attempt are
//! simply reused by the next one.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use kiln_common::capability::{ModuleResolver, TypeSink};
use kiln_common::diagnostics::{Diagnostic, DiagnosticKind};
use kiln_common::error::KilnError;

/// Session-wide `specifier -> location` table.
#[derive(Debug, Default)]
pub struct ImportTable {
    entries: RwLock<BTreeMap<String, String>>,
}

impl ImportTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `specifier`.
    ///
    /// An exact entry wins. Otherwise the longest key `k` such that
    /// `specifier` starts with `k/` is used, with the remainder appended to
    /// its location (`lodash/fp` against `lodash`).
    #[must_use]
    pub fn lookup(&self, specifier: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(location) = entries.get(specifier) {
            return Some(location.clone());
        }
        entries
            .iter()
            .filter(|(key, _)| {
                specifier.len() > key.len()
                    && specifier.starts_with(key.as_str())
                    && specifier.as_bytes()[key.len()] == b'/'
            })
            .max_by_key(|(key, _)| key.len())
            .map(|(key, location)| format!("{location}{}", &specifier[key.len()..]))
    }

    /// Records `location` for `specifier` unless an entry already exists.
    ///
    /// Returns the location now stored for `specifier`.
    pub fn insert(&self, specifier: &str, location: &str) -> String {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry(specifier.to_owned())
            .or_insert_with(|| location.to_owned())
            .clone()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of resolving one bare import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedImport {
    /// Location to rewrite the import to; `None` leaves it unresolved.
    pub location: Option<String>,
    /// Non-fatal problems met along the way.
    pub warnings: Vec<Diagnostic>,
}

/// Memoizing resolver of bare module names.
///
/// Wraps the host's [`ModuleResolver`] capability; every successful
/// resolution is written to the shared [`ImportTable`] before it is
/// returned, so later imports of the same module in the same pass hit the
/// table.
pub struct ImportResolver<R> {
    resolver: R,
    table: Arc<ImportTable>,
    types: Option<Arc<dyn TypeSink>>,
}

impl<R: ModuleResolver> ImportResolver<R> {
    /// Creates a resolver backed by `table`.
    pub const fn new(resolver: R, table: Arc<ImportTable>) -> Self {
        Self {
            resolver,
            table,
            types: None,
        }
    }

    /// Hands type declarations of resolved modules to `sink`.
    #[must_use]
    pub fn with_type_sink(mut self, sink: Arc<dyn TypeSink>) -> Self {
        self.types = Some(sink);
        self
    }

    /// The shared table.
    #[must_use]
    pub fn table(&self) -> &Arc<ImportTable> {
        &self.table
    }

    /// Resolves a bare `specifier` imported by `importer`.
    ///
    /// Never fails: an unresolvable module yields a `Resolution` warning and
    /// no location; undeliverable type declarations yield a
    /// `TypeDeclarations` warning.
    pub async fn resolve(&self, specifier: &str, importer: &str) -> ResolvedImport {
        if let Some(location) = self.table.lookup(specifier) {
            return ResolvedImport {
                location: Some(location),
                warnings: Vec::new(),
            };
        }

        tracing::debug!(specifier, importer, "resolving bare module");
        let resolution = match self.resolver.resolve(specifier).await {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::warn!(specifier, importer, error = %e, "module resolution failed");
                let warning = KilnError::Resolution {
                    importer: importer.to_owned(),
                    specifier: specifier.to_owned(),
                    reason: e.to_string(),
                };
                return ResolvedImport {
                    location: None,
                    warnings: vec![warning.into()],
                };
            }
        };

        let location = self.table.insert(specifier, &resolution.location);
        let mut warnings = Vec::new();
        if let (Some(sink), Some(declarations)) = (&self.types, &resolution.type_declarations) {
            if let Err(e) = sink.add_declarations(specifier, declarations) {
                tracing::warn!(specifier, error = %e, "type declarations dropped");
                warnings.push(Diagnostic::for_unit(
                    DiagnosticKind::TypeDeclarations,
                    importer,
                    e.to_string(),
                ));
            }
        }
        ResolvedImport {
            location: Some(location),
            warnings,
        }
    }
}

impl<R> std::fmt::Debug for ImportResolver<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportResolver")
            .field("table", &self.table)
            .field("types", &self.types.is_some())
            .finish_non_exhaustive()
    }
}

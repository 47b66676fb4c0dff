//! Module graph processing.
//!
//! Walks the acyclic graph dependencies-first. Every non-entry unit is
//! rewritten, transformed once and published at a content-addressed
//! location; the entry is rewritten and transformed last, against the
//! complete table of published locations.
//!
//! A unit whose rewritten source is unchanged since the previous pass keeps
//! its previous code instead of being transformed again. Once later stages
//! rewrite published code, [`readdress`] moves each changed module to the
//! location of its new content.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use kiln_common::ast::{ImportItem, ModuleItem, ParsedUnit};
use kiln_common::cancel::{CancelToken, Cancelled};
use kiln_common::capability::{ModuleResolver, ScriptTransform};
use kiln_common::config::TargetOptions;
use kiln_common::constants;
use kiln_common::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use kiln_common::digest::short_digest;
use kiln_common::error::KilnError;
use kiln_common::types::PublishedModule;

use crate::graph::DependencyGraph;
use crate::path;
use crate::resolver::ImportResolver;

/// Project state the processor reads.
#[derive(Debug, Clone, Copy)]
pub struct ProcessInput<'a> {
    /// Entry script unit.
    pub entry: &'a str,
    /// Committed parse trees of script units.
    pub units: &'a BTreeMap<String, Arc<ParsedUnit>>,
    /// Stylesheet units of the project.
    pub style_files: &'a BTreeSet<String>,
    /// Bare specifiers provided by the render host.
    pub externals: &'a [String],
    /// Options handed to the script transform.
    pub target: &'a TargetOptions,
    /// Executable output of units whose committed content is current.
    pub compiled: &'a BTreeMap<String, String>,
    /// Modules published by the previous pass, keyed by filename.
    pub previous: &'a BTreeMap<String, PublishedModule>,
}

/// Output of one processing pass.
#[derive(Debug, Clone, Default)]
pub struct ProcessedGraph {
    /// Non-entry units keyed by filename.
    pub published: BTreeMap<String, PublishedModule>,
    /// Entry code, if the entry has a committed parse and transformed cleanly.
    pub entry_js: Option<String>,
    /// Diagnostics in discovery order.
    pub diagnostics: Diagnostics,
}

/// What to do with one import item.
enum Rewrite {
    Keep,
    Replace(String),
    Remove,
}

/// Transformed code of one unit.
struct Compiled {
    code: String,
    source_digest: String,
    warnings: Vec<String>,
}

/// Drives the script transform over the module graph.
pub struct GraphProcessor<'a, S, R> {
    script: &'a S,
    resolver: &'a ImportResolver<R>,
    cancel: &'a CancelToken,
}

impl<'a, S: ScriptTransform, R: ModuleResolver> GraphProcessor<'a, S, R> {
    /// Creates a processor over the given capabilities.
    #[must_use]
    pub const fn new(script: &'a S, resolver: &'a ImportResolver<R>, cancel: &'a CancelToken) -> Self {
        Self {
            script,
            resolver,
            cancel,
        }
    }

    /// Processes every unit of `graph`.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the token is cancelled at a suspension point.
    pub async fn process(
        &self,
        graph: &DependencyGraph,
        input: &ProcessInput<'_>,
    ) -> Result<ProcessedGraph, Cancelled> {
        let mut out = ProcessedGraph::default();
        let order = match graph.order() {
            Ok(order) => order,
            Err(e) => {
                out.diagnostics.error(e);
                return Ok(out);
            }
        };
        tracing::info!(units = order.len(), entry = input.entry, "processing module graph");

        let mut local: BTreeMap<String, String> = BTreeMap::new();
        for filename in order.iter().filter(|f| f.as_str() != input.entry) {
            let Some(parsed) = input.units.get(filename) else {
                continue;
            };
            let Some(compiled) = self.compile(parsed, &local, input, &mut out.diagnostics).await? else {
                continue;
            };
            let location = publish_location(filename, &compiled.code);
            tracing::debug!(filename = %filename, location = %location, "module published");
            let _ = local.insert(filename.clone(), location.clone());
            let _ = local.insert(path::strip_extension(filename).to_owned(), location.clone());
            let _ = out.published.insert(
                filename.clone(),
                PublishedModule {
                    location,
                    code: compiled.code,
                    source_digest: compiled.source_digest,
                    warnings: compiled.warnings,
                },
            );
        }

        if let Some(parsed) = input.units.get(input.entry) {
            out.entry_js = self
                .compile(parsed, &local, input, &mut out.diagnostics)
                .await?
                .map(|compiled| compiled.code);
        }
        Ok(out)
    }

    /// Rewrites and transforms one unit. `None` if the transform failed.
    ///
    /// The transform is skipped when the unit's own output already covers the
    /// rewritten tree, or when the previous pass published the same source.
    async fn compile(
        &self,
        parsed: &ParsedUnit,
        local: &BTreeMap<String, String>,
        input: &ProcessInput<'_>,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<Compiled>, Cancelled> {
        let filename = parsed.filename.as_str();
        let rewritten = ParsedUnit {
            filename: parsed.filename.clone(),
            items: self.rewrite(parsed, local, input, diagnostics).await?,
        };
        let source = rewritten.to_source();
        let source_digest = short_digest(
            &[source.as_str(), input.target.target.as_str()],
            constants::PUBLISH_DIGEST_LEN,
        );

        if rewritten.items == parsed.items {
            if let Some(code) = input.compiled.get(filename) {
                tracing::debug!(filename, "reusing unit output");
                return Ok(Some(Compiled {
                    code: code.clone(),
                    source_digest,
                    warnings: Vec::new(),
                }));
            }
        }
        if let Some(previous) = input
            .previous
            .get(filename)
            .filter(|module| module.source_digest == source_digest)
        {
            tracing::debug!(filename, "reusing published output");
            for warning in &previous.warnings {
                diagnostics.warning(Diagnostic::for_unit(DiagnosticKind::Other, filename, warning.clone()));
            }
            return Ok(Some(Compiled {
                code: previous.code.clone(),
                source_digest,
                warnings: previous.warnings.clone(),
            }));
        }

        let output = self.script.transform(&rewritten, input.target).await;
        self.cancel.checkpoint()?;
        match output {
            Ok(output) => {
                for warning in &output.warnings {
                    diagnostics.warning(Diagnostic::for_unit(DiagnosticKind::Other, filename, warning.clone()));
                }
                Ok(Some(Compiled {
                    code: output.code,
                    source_digest,
                    warnings: output.warnings,
                }))
            }
            Err(e) => {
                tracing::warn!(filename, error = %e, "transform failed");
                diagnostics.error(e);
                Ok(None)
            }
        }
    }

    async fn rewrite(
        &self,
        parsed: &ParsedUnit,
        local: &BTreeMap<String, String>,
        input: &ProcessInput<'_>,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<ModuleItem>, Cancelled> {
        let mut items = Vec::with_capacity(parsed.items.len());
        for item in &parsed.items {
            match item {
                ModuleItem::Code(_) | ModuleItem::ClassName(_) => items.push(item.clone()),
                ModuleItem::Import(import) => {
                    match self
                        .rewrite_import(&parsed.filename, import, local, input, diagnostics)
                        .await?
                    {
                        Rewrite::Keep => items.push(item.clone()),
                        Rewrite::Replace(location) => {
                            items.push(ModuleItem::Import(import.with_specifier(location)));
                        }
                        Rewrite::Remove => {}
                    }
                }
            }
        }
        Ok(items)
    }

    async fn rewrite_import(
        &self,
        importer: &str,
        import: &ImportItem,
        local: &BTreeMap<String, String>,
        input: &ProcessInput<'_>,
        diagnostics: &mut Diagnostics,
    ) -> Result<Rewrite, Cancelled> {
        let specifier = import.specifier.as_str();
        if import.is_type_only() || path::is_passthrough(specifier) || is_external(specifier, input.externals) {
            return Ok(Rewrite::Keep);
        }
        if path::is_relative(specifier) {
            return Ok(rewrite_relative(importer, specifier, local, input, diagnostics));
        }
        if let Some(location) = local.get(specifier) {
            return Ok(Rewrite::Replace(location.clone()));
        }

        let resolved = self.resolver.resolve(specifier, importer).await;
        self.cancel.checkpoint()?;
        for warning in resolved.warnings {
            diagnostics.warning(warning);
        }
        Ok(resolved.location.map_or(Rewrite::Keep, Rewrite::Replace))
    }
}

fn rewrite_relative(
    importer: &str,
    specifier: &str,
    local: &BTreeMap<String, String>,
    input: &ProcessInput<'_>,
    diagnostics: &mut Diagnostics,
) -> Rewrite {
    let unresolved = |reason: &str| KilnError::Resolution {
        importer: importer.to_owned(),
        specifier: specifier.to_owned(),
        reason: reason.to_owned(),
    };
    let Some(resolved) = path::resolve_relative(importer, specifier) else {
        diagnostics.warning(unresolved("path escapes the project root"));
        return Rewrite::Keep;
    };
    for candidate in path::candidates(&resolved) {
        if let Some(location) = local.get(&candidate) {
            return Rewrite::Replace(location.clone());
        }
        if input.style_files.contains(&candidate) {
            return Rewrite::Remove;
        }
    }
    let reason = if input.units.contains_key(&resolved)
        || path::candidates(&resolved)
            .iter()
            .any(|c| input.units.contains_key(c))
    {
        "module was not published"
    } else {
        "no such file in the project"
    };
    diagnostics.warning(unresolved(reason));
    Rewrite::Keep
}

/// Returns `true` if `specifier` names an external module or one of its subpaths.
fn is_external(specifier: &str, externals: &[String]) -> bool {
    externals.iter().any(|external| {
        specifier == external
            || specifier
                .strip_prefix(external.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Content-addressed location for a published unit.
#[must_use]
pub fn publish_location(filename: &str, code: &str) -> String {
    format!(
        "{}{}/{filename}",
        constants::PUBLISH_PREFIX,
        short_digest(&[code], constants::PUBLISH_DIGEST_LEN)
    )
}

/// Modules and entry code after moving rewritten modules to new locations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Readdressed {
    /// Modules keyed by their final location.
    pub modules: BTreeMap<String, String>,
    /// Entry code referencing the final locations.
    pub entry_js: String,
    /// Old location to new location, for every module that moved.
    pub moved: BTreeMap<String, String>,
}

/// Moves every module whose code no longer matches its location.
///
/// `modules` maps published locations to possibly rewritten code. A module
/// is settled once none of the modules it references is still pending, so
/// dependencies move before their importers and each importer is rewritten
/// to the final location before its own location is derived.
#[must_use]
pub fn readdress(modules: &BTreeMap<String, String>, entry_js: &str) -> Readdressed {
    let mut pending = modules.clone();
    let mut out = Readdressed {
        entry_js: entry_js.to_owned(),
        ..Readdressed::default()
    };
    loop {
        let ready = pending
            .iter()
            .find(|(location, code)| {
                !pending
                    .keys()
                    .any(|other| other != *location && code.contains(other.as_str()))
            })
            .map(|(location, _)| location.clone());
        let Some(old) = ready else {
            break;
        };
        let Some(code) = pending.remove(&old) else {
            break;
        };
        let new = published_filename(&old).map_or_else(|| old.clone(), |filename| publish_location(filename, &code));
        if new != old {
            tracing::debug!(from = %old, to = %new, "module moved");
            for other in pending.values_mut() {
                *other = other.replace(&old, &new);
            }
            out.entry_js = out.entry_js.replace(&old, &new);
            let _ = out.moved.insert(old, new.clone());
        }
        let _ = out.modules.insert(new, code);
    }
    // Only reachable with mutually referencing modules, which the graph rejects.
    out.modules.extend(pending);
    out
}

/// Filename part of a location produced by [`publish_location`].
fn published_filename(location: &str) -> Option<&str> {
    location
        .strip_prefix(constants::PUBLISH_PREFIX)?
        .split_once('/')
        .map(|(_, filename)| filename)
}

//! Incremental compilation of a project snapshot.
//!
//! [`compile`] derives a new [`CompilationResult`] from the previous one and
//! the latest inputs, re-running only the stages whose inputs changed:
//!
//! 1. merge inputs into units; identical inputs return the previous `Arc`
//! 2. recompile dirty script units
//! 3. rebuild and process the module graph if any script changed
//! 4. rebuild the stylesheet if the class set or the style source changed
//! 5. rescope custom properties if anything changed, moving rewritten
//!    modules to the locations of their new content
//!
//! The token is checked after every suspension point. A cancelled attempt
//! never touches the previous snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use kiln_common::ast::ParsedUnit;
use kiln_common::cancel::{CancelToken, Cancelled};
use kiln_common::capability::{ModuleResolver, ScriptTransform, StylesheetBuild};
use kiln_common::config::KilnConfig;
use kiln_common::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use kiln_common::error::KilnError;
use kiln_common::types::{CompilationResult, ProjectInputs, SourceUnit, UnitKind};
use kiln_graph::graph::DependencyGraph;
use kiln_graph::processor::{self, GraphProcessor, ProcessInput};
use kiln_style::resolver::{self, StyleResolver};
use kiln_style::scope::PropertyScopeTransformer;

use crate::capability::CapabilityHandle;
use crate::unit::UnitCompiler;

/// Everything one compilation attempt needs besides its inputs.
pub struct CompileOptions<'a, S, B, R> {
    /// Cancellation token of the attempt.
    pub cancel: &'a CancelToken,
    /// Host capabilities.
    pub capabilities: &'a CapabilityHandle<S, B, R>,
    /// Project configuration.
    pub config: &'a KilnConfig,
}

/// Outcome of one compilation attempt.
#[derive(Debug, Clone)]
pub enum CompileOutcome {
    /// A new (or the unchanged previous) snapshot.
    Completed(Arc<CompilationResult>),
    /// The attempt failed as a whole; the previous snapshot stays current.
    Failed(Diagnostics),
    /// The attempt was superseded.
    Cancelled,
}

impl CompileOutcome {
    /// Returns the snapshot of a completed attempt.
    #[must_use]
    pub const fn completed(&self) -> Option<&Arc<CompilationResult>> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Failed(_) | Self::Cancelled => None,
        }
    }
}

/// Compiles `inputs` on top of `previous`.
pub async fn compile<S, B, R>(
    previous: &Arc<CompilationResult>,
    inputs: &ProjectInputs,
    options: &CompileOptions<'_, S, B, R>,
) -> CompileOutcome
where
    S: ScriptTransform,
    B: StylesheetBuild,
    R: ModuleResolver,
{
    if previous.matches_inputs(inputs) {
        tracing::debug!("inputs unchanged, reusing previous result");
        return CompileOutcome::Completed(Arc::clone(previous));
    }
    match run(previous, inputs, options).await {
        Ok(outcome) => outcome,
        Err(Cancelled) => {
            tracing::info!("compilation cancelled");
            CompileOutcome::Cancelled
        }
    }
}

async fn run<S, B, R>(
    previous: &Arc<CompilationResult>,
    inputs: &ProjectInputs,
    options: &CompileOptions<'_, S, B, R>,
) -> Result<CompileOutcome, Cancelled>
where
    S: ScriptTransform,
    B: StylesheetBuild,
    R: ModuleResolver,
{
    let caps = options.capabilities;
    let config = options.config;
    let mut next = CompilationResult {
        units: merge_units(previous, inputs),
        entry_script: inputs.entry_script.clone(),
        entry_style: inputs.entry_style.clone(),
        ..(**previous).clone()
    };

    let script_set_changed = script_names(&next) != script_names(previous);
    let entry_changed = next.entry_script != previous.entry_script;
    let dirty: Vec<String> = next
        .script_units()
        .filter(|unit| needs_compile(unit, previous.unit(&unit.filename)))
        .map(|unit| unit.filename.clone())
        .collect();
    tracing::info!(
        units = next.units.len(),
        dirty = dirty.len(),
        "compilation started"
    );

    let compiler = UnitCompiler::new(&caps.script, &config.target, options.cancel);
    for filename in &dirty {
        let Some(unit) = next.units.get_mut(filename) else {
            continue;
        };
        let source = unit.pending_content.clone();
        match compiler.compile(filename, &source).await? {
            Ok(compiled) => {
                unit.committed_content = Some(source);
                unit.compiled_output = Some(compiled.code);
                unit.compiled_successfully = true;
                unit.extracted_class_names = compiled.class_names;
                unit.parsed = Some(compiled.parsed);
                unit.diagnostics = Diagnostics::default();
                for warning in compiled.warnings {
                    unit.diagnostics
                        .warning(Diagnostic::for_unit(DiagnosticKind::Other, filename, warning));
                }
            }
            Err(e) => {
                tracing::warn!(filename = %filename, error = %e, "unit failed to compile");
                unit.compiled_successfully = false;
                unit.diagnostics = Diagnostics::default();
                unit.diagnostics.error(e);
            }
        }
    }

    let scripts_changed = !dirty.is_empty() || script_set_changed || entry_changed;
    if scripts_changed {
        let parsed: BTreeMap<String, Arc<ParsedUnit>> = next
            .script_units()
            .filter_map(|unit| unit.parsed.as_ref().map(|p| (unit.filename.clone(), Arc::clone(p))))
            .collect();
        let graph = DependencyGraph::build(&parsed);
        if let Some(path) = graph.find_cycle() {
            tracing::warn!(cycle = %path.join(" -> "), "import cycle");
            let mut diagnostics = Diagnostics::default();
            diagnostics.error(KilnError::GraphCycle { path });
            return Ok(CompileOutcome::Failed(diagnostics));
        }

        let style_files: BTreeSet<String> = next.style_units().map(|u| u.filename.clone()).collect();
        let compiled: BTreeMap<String, String> = next
            .script_units()
            .filter_map(|unit| unit.trusted_output().map(|code| (unit.filename.clone(), code.to_owned())))
            .collect();
        let input = ProcessInput {
            entry: &next.entry_script,
            units: &parsed,
            style_files: &style_files,
            externals: &config.externals,
            target: &config.target,
            compiled: &compiled,
            previous: &previous.published,
        };
        let processed = GraphProcessor::new(&caps.script, &caps.resolver, options.cancel)
            .process(&graph, &input)
            .await?;

        let mut graph_diagnostics = processed.diagnostics;
        match processed.entry_js {
            Some(code) => next.compiled_entry_js = code,
            None if !next.units.contains_key(&next.entry_script) => {
                next.compiled_entry_js.clear();
                graph_diagnostics.error(Diagnostic::global(
                    DiagnosticKind::MissingEntry,
                    format!("entry script {} not found", next.entry_script),
                ));
            }
            None => {}
        }
        next.published = processed.published;
        next.graph_diagnostics = graph_diagnostics;
    }

    let class_names: BTreeSet<String> = next
        .script_units()
        .filter(|unit| unit.committed_content.is_some())
        .flat_map(|unit| unit.extracted_class_names.iter().cloned())
        .collect();
    let style_source = resolver::aggregate(
        &next.entry_style,
        next.style_units()
            .map(|unit| (unit.filename.as_str(), unit.pending_content.as_str())),
    );
    let first_build = previous.units.is_empty();
    let styles_changed =
        first_build || class_names != previous.class_names || style_source != previous.style_source;

    if styles_changed {
        let styles = StyleResolver::new(&caps.stylesheet, &config.style)
            .resolve(&style_source, &class_names)
            .await;
        options.cancel.checkpoint()?;
        let built = styles.is_ok();
        next.style_diagnostics = Diagnostics::default();
        match styles {
            Ok(styles) => {
                next.compiled_entry_css = styles.css;
                next.utility_classes = styles.utility_classes;
                next.author_classes = styles.author_classes;
            }
            Err(e) => {
                tracing::warn!(error = %e, "stylesheet build failed, keeping previous CSS");
                next.style_diagnostics.error(e);
            }
        }
        for unit in next.units.values_mut().filter(|u| u.kind == UnitKind::Style) {
            unit.compiled_successfully = built;
            if built {
                unit.committed_content = Some(unit.pending_content.clone());
            }
        }
        next.class_names = class_names;
        next.style_source = style_source;
    }

    if scripts_changed || styles_changed {
        scope(&mut next, caps, config);
    }

    collect_diagnostics(&mut next);
    tracing::info!(
        errors = next.errors.len(),
        warnings = next.warnings.len(),
        "compilation finished"
    );
    Ok(CompileOutcome::Completed(Arc::new(next)))
}

/// Applies property scoping, or passes the artifacts through when either side is empty.
///
/// Modules rewritten by scoping move to the location of their scoped code,
/// and `published_location` of every unit follows.
fn scope<S, B, R>(next: &mut CompilationResult, caps: &CapabilityHandle<S, B, R>, config: &KilnConfig) {
    let modules: BTreeMap<String, String> = next
        .published
        .values()
        .map(|m| (m.location.clone(), m.code.clone()))
        .collect();

    let mut moved = BTreeMap::new();
    if next.compiled_entry_js.is_empty() || next.compiled_entry_css.is_empty() {
        next.final_js.clone_from(&next.compiled_entry_js);
        next.final_css.clone_from(&next.compiled_entry_css);
        next.final_modules = modules;
        next.scoped_properties.clear();
        next.scope_diagnostics = Diagnostics::default();
    } else {
        let scoped = PropertyScopeTransformer::new(caps.registry.as_ref(), config.scope).transform(
            &next.compiled_entry_css,
            &next.compiled_entry_js,
            &modules,
        );
        let readdressed = processor::readdress(&scoped.modules, &scoped.entry_js);
        next.final_js = readdressed.entry_js;
        next.final_css = scoped.css;
        next.final_modules = readdressed.modules;
        next.scoped_properties = scoped.properties;
        next.scope_diagnostics = scoped.diagnostics;
        moved = readdressed.moved;
    }

    let published = &next.published;
    for (filename, unit) in &mut next.units {
        unit.published_location = published
            .get(filename)
            .map(|m| moved.get(&m.location).unwrap_or(&m.location).clone());
    }
}

/// Carries previous units over, applying new contents, additions and removals.
fn merge_units(previous: &CompilationResult, inputs: &ProjectInputs) -> BTreeMap<String, SourceUnit> {
    inputs
        .files
        .iter()
        .filter_map(|(filename, content)| {
            let kind = UnitKind::from_filename(filename)?;
            let unit = match previous.unit(filename) {
                Some(existing) if existing.kind == kind => SourceUnit {
                    pending_content: content.clone(),
                    ..existing.clone()
                },
                _ => SourceUnit::new(filename, kind, content.clone()),
            };
            Some((filename.clone(), unit))
        })
        .collect()
}

/// A unit needs compiling unless its committed content is current, or it
/// already failed on exactly this content.
fn needs_compile(unit: &SourceUnit, previous: Option<&SourceUnit>) -> bool {
    if !unit.is_dirty() {
        return false;
    }
    !previous.is_some_and(|prev| !prev.compiled_successfully && prev.pending_content == unit.pending_content)
}

fn script_names(result: &CompilationResult) -> BTreeSet<&str> {
    result.script_units().map(|u| u.filename.as_str()).collect()
}

/// Flattens diagnostics: units in filename order, then graph, style and scoping.
fn collect_diagnostics(next: &mut CompilationResult) {
    let mut all = Diagnostics::default();
    for unit in next.units.values() {
        all.extend(&unit.diagnostics);
    }
    all.extend(&next.graph_diagnostics);
    all.extend(&next.style_diagnostics);
    all.extend(&next.scope_diagnostics);
    next.errors = all.errors;
    next.warnings = all.warnings;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_adds_updates_and_removes() {
        let mut previous = CompilationResult::default();
        let mut kept = SourceUnit::new("a.ts", UnitKind::Script, "old");
        kept.committed_content = Some("old".into());
        kept.compiled_output = Some("old".into());
        let _ = previous.units.insert("a.ts".into(), kept);
        let _ = previous
            .units
            .insert("gone.ts".into(), SourceUnit::new("gone.ts", UnitKind::Script, ""));

        let inputs = ProjectInputs::default()
            .with_file("a.ts", "new")
            .with_file("main.css", "")
            .with_file("notes.md", "# notes");
        let units = merge_units(&previous, &inputs);

        assert_eq!(units.keys().collect::<Vec<_>>(), vec!["a.ts", "main.css"]);
        let a = &units["a.ts"];
        assert_eq!(a.pending_content, "new");
        assert_eq!(a.committed_content.as_deref(), Some("old"));
        assert!(a.is_dirty());
    }

    #[test]
    fn failed_unit_with_same_content_is_not_recompiled() {
        let mut failed = SourceUnit::new("a.ts", UnitKind::Script, "broken");
        failed.committed_content = Some("good".into());
        assert!(needs_compile(&failed, None));
        assert!(!needs_compile(&failed, Some(&failed)));

        let mut edited = failed.clone();
        edited.pending_content = "still broken".into();
        assert!(needs_compile(&edited, Some(&failed)));
    }
}

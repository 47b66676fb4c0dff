//! End-to-end tests of the compilation pipeline.
//!
//! The capabilities are fakes that count their calls, so the tests can
//! check which stages ran:
//! 1. Import rewriting to published locations
//! 2. Cycle detection
//! 3. Custom property scoping across stylesheet and scripts, including
//!    modules moved by a stylesheet edit
//! 4. Stylesheet-only edits
//! 5. Cancellation and supersession
//! 6. Skip-recompute and determinism

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use kiln_common::ast::ParsedUnit;
use kiln_common::cancel::CancelToken;
use kiln_common::capability::{
    ModuleResolver, PropertyRegistry, Resolution, ScriptTransform, StylesheetBuild, StylesheetOutput, TransformOutput,
};
use kiln_common::config::{KilnConfig, TargetOptions};
use kiln_common::diagnostics::DiagnosticKind;
use kiln_common::error::Result;
use kiln_common::types::{CompilationResult, ProjectInputs};
use kiln_core::capability::CapabilityHandle;
use kiln_core::host::{RenderAction, RenderPayload, RenderTracker};
use kiln_core::orchestrator::{self, CompileOptions, CompileOutcome};
use kiln_core::session::CompilationSession;
use kiln_graph::resolver::{ImportResolver, ImportTable};
use kiln_script::EsmTransform;
use kiln_style::builder::PassthroughStylesheet;
use kiln_style::registry::InMemoryPropertyRegistry;

// ── Fakes ────────────────────────────────────────────────────────────

#[derive(Default)]
struct CountingScript {
    parses: AtomicUsize,
    transforms: AtomicUsize,
}

impl ScriptTransform for CountingScript {
    async fn parse(&self, filename: &str, source: &str) -> Result<ParsedUnit> {
        let _ = self.parses.fetch_add(1, Ordering::SeqCst);
        EsmTransform::new().parse(filename, source).await
    }

    async fn transform(&self, unit: &ParsedUnit, options: &TargetOptions) -> Result<TransformOutput> {
        let _ = self.transforms.fetch_add(1, Ordering::SeqCst);
        EsmTransform::new().transform(unit, options).await
    }
}

#[derive(Default)]
struct CountingStyles {
    builds: AtomicUsize,
}

impl StylesheetBuild for CountingStyles {
    async fn build(&self, source: &str, class_names: &[String]) -> Result<StylesheetOutput> {
        let _ = self.builds.fetch_add(1, Ordering::SeqCst);
        PassthroughStylesheet.build(source, class_names).await
    }
}

/// Resolves to a fake CDN and can cancel an attempt from inside the call.
#[derive(Default)]
struct FakeResolver {
    calls: AtomicUsize,
    cancel_on_call: Mutex<Option<CancelToken>>,
}

impl ModuleResolver for FakeResolver {
    async fn resolve(&self, module: &str) -> Result<Resolution> {
        let _ = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = self.cancel_on_call.lock().unwrap().take() {
            token.cancel();
        }
        Ok(Resolution {
            location: format!("https://cdn.test/{module}"),
            type_declarations: None,
        })
    }
}

type Caps = CapabilityHandle<CountingScript, CountingStyles, Arc<FakeResolver>>;

struct Harness {
    caps: Caps,
    config: KilnConfig,
    registry: Arc<InMemoryPropertyRegistry>,
    resolver: Arc<FakeResolver>,
}

impl Harness {
    fn new() -> Self {
        let registry = Arc::new(InMemoryPropertyRegistry::new());
        let resolver = Arc::new(FakeResolver::default());
        Self {
            caps: CapabilityHandle::new(
                CountingScript::default(),
                CountingStyles::default(),
                ImportResolver::new(Arc::clone(&resolver), Arc::new(ImportTable::new())),
                Arc::clone(&registry) as Arc<dyn PropertyRegistry>,
            ),
            config: KilnConfig::default(),
            registry,
            resolver,
        }
    }

    async fn compile_with(
        &self,
        previous: &Arc<CompilationResult>,
        inputs: &ProjectInputs,
        cancel: &CancelToken,
    ) -> CompileOutcome {
        let options = CompileOptions {
            cancel,
            capabilities: &self.caps,
            config: &self.config,
        };
        orchestrator::compile(previous, inputs, &options).await
    }

    async fn compile(&self, previous: &Arc<CompilationResult>, inputs: &ProjectInputs) -> CompileOutcome {
        self.compile_with(previous, inputs, &CancelToken::new()).await
    }

    async fn completed(&self, previous: &Arc<CompilationResult>, inputs: &ProjectInputs) -> Arc<CompilationResult> {
        match self.compile(previous, inputs).await {
            CompileOutcome::Completed(result) => result,
            other => panic!("expected a completed compilation, got {other:?}"),
        }
    }

    fn parses(&self) -> usize {
        self.caps.script.parses.load(Ordering::SeqCst)
    }

    fn transforms(&self) -> usize {
        self.caps.script.transforms.load(Ordering::SeqCst)
    }

    fn builds(&self) -> usize {
        self.caps.stylesheet.builds.load(Ordering::SeqCst)
    }
}

fn empty() -> Arc<CompilationResult> {
    Arc::new(CompilationResult::default())
}

const PROPERTY_CSS: &str = "@property --s1 {\n  syntax: '<number>';\n  inherits: true;\n  initial-value: 1;\n}\n.box { opacity: var(--s1); }\n";
const PROPERTY_TSX: &str = "export default () => <div className=\"box\" style={{ '--s1': 0.5 }} />;\n";

// ── Import rewriting ─────────────────────────────────────────────────

#[tokio::test]
async fn entry_import_rewritten_to_published_utils() {
    let harness = Harness::new();
    let inputs = ProjectInputs::default()
        .with_file("main.tsx", "import { add } from './utils';\nexport default () => <p>{add(1, 2)}</p>;\n")
        .with_file("utils.ts", "export const add = (a: number, b: number) => a + b;\n")
        .with_file("main.css", "p { color: red; }\n");

    let result = harness.completed(&empty(), &inputs).await;

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    let utils = result.published.get("utils.ts").expect("utils published");
    assert!(result.final_js.contains(&format!("from '{}'", utils.location)));
    assert!(!result.final_js.contains("./utils"));
    assert_eq!(
        result.final_modules.get(&utils.location).map(String::as_str),
        Some(utils.code.as_str())
    );
    assert_eq!(
        result.unit("utils.ts").and_then(|u| u.published_location.as_deref()),
        Some(utils.location.as_str())
    );
}

#[tokio::test]
async fn bare_imports_resolved_once_per_session() {
    let harness = Harness::new();
    let inputs = ProjectInputs::default()
        .with_file("main.tsx", "import confetti from 'canvas-confetti';\nimport React from 'react';\nconfetti();\n")
        .with_file("extra.ts", "import confetti from 'canvas-confetti';\nexport default confetti;\n");

    let first = harness.completed(&empty(), &inputs).await;
    assert!(first.final_js.contains("'https://cdn.test/canvas-confetti'"));
    assert!(first.final_js.contains("from 'react'"));

    let edited = inputs.with_file("main.tsx", "import confetti from 'canvas-confetti';\nconfetti({});\n");
    let _ = harness.completed(&first, &edited).await;
    assert_eq!(harness.caps.resolver.table().len(), 1);
}

// ── Cycles ───────────────────────────────────────────────────────────

#[tokio::test]
async fn mutual_import_fails_with_single_cycle_error() {
    let harness = Harness::new();
    let inputs = ProjectInputs::default()
        .with_file("main.tsx", "import './a';\n")
        .with_file("a.ts", "import { b } from './b';\nexport const a = 1;\n")
        .with_file("b.ts", "import { a } from './a';\nexport const b = 2;\n");

    match harness.compile(&empty(), &inputs).await {
        CompileOutcome::Failed(diagnostics) => {
            assert_eq!(diagnostics.errors.len(), 1);
            assert_eq!(diagnostics.errors[0].kind, DiagnosticKind::GraphCycle);
            assert_eq!(
                diagnostics.errors[0].message,
                "import cycle detected: a.ts -> b.ts -> a.ts"
            );
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn diamond_compiles_cleanly() {
    let harness = Harness::new();
    let inputs = ProjectInputs::default()
        .with_file("main.tsx", "import './b';\nimport './c';\n")
        .with_file("b.ts", "import './d';\n")
        .with_file("c.ts", "import './d';\n")
        .with_file("d.ts", "export {};\n");

    let result = harness.completed(&empty(), &inputs).await;
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.published.len(), 3);
    let d = &result.published["d.ts"].location;
    assert!(result.published["b.ts"].code.contains(d.as_str()));
    assert!(result.published["c.ts"].code.contains(d.as_str()));
}

// ── Property scoping ─────────────────────────────────────────────────

#[tokio::test]
async fn property_scoped_consistently_in_css_and_js() {
    let harness = Harness::new();
    let inputs = ProjectInputs::default()
        .with_file("main.tsx", PROPERTY_TSX)
        .with_file("main.css", PROPERTY_CSS);

    let result = harness.completed(&empty(), &inputs).await;

    assert_eq!(result.scoped_properties.len(), 1);
    let scoped = &result.scoped_properties[0].scoped_name;
    assert!(!result.final_css.contains("@property"));
    assert!(result.final_css.contains(&format!("var({scoped})")));
    assert!(result.final_js.contains(&format!("'{scoped}'")));
    assert!(!result.final_js.contains("'--s1'"));
    assert_eq!(result.compiled_entry_css, PROPERTY_CSS);
    assert_eq!(harness.registry.registered(), result.scoped_properties);
}

#[tokio::test]
async fn stylesheet_edit_that_scopes_a_module_moves_it() {
    let harness = Harness::new();
    let inputs = ProjectInputs::default()
        .with_file("main.tsx", "import { paint } from './utils';\npaint();\n")
        .with_file(
            "utils.ts",
            "export const paint = () => document.body.style.setProperty('--s1', '2');\n",
        )
        .with_file("main.css", ".box { opacity: var(--s1); }\n");
    let first = harness.completed(&empty(), &inputs).await;
    let mut tracker = RenderTracker::new();
    assert_eq!(tracker.apply(&RenderPayload::from_result(&first)), RenderAction::Remount);
    let old_location = first
        .unit("utils.ts")
        .and_then(|u| u.published_location.clone())
        .expect("published");
    let transforms = harness.transforms();

    let second = harness
        .completed(&first, &inputs.with_file("main.css", PROPERTY_CSS))
        .await;

    assert_eq!(harness.transforms(), transforms);
    let scoped = &second.scoped_properties[0].scoped_name;
    let location = second
        .unit("utils.ts")
        .and_then(|u| u.published_location.clone())
        .expect("published");
    assert_ne!(location, old_location);
    assert!(!first.final_modules.contains_key(&location));
    assert!(second.final_modules[&location].contains(&format!("'{scoped}'")));
    assert!(second.final_js.contains(&format!("from '{location}'")));
    assert!(!second.final_js.contains(&old_location));
    assert_eq!(tracker.apply(&RenderPayload::from_result(&second)), RenderAction::Remount);
}

#[tokio::test]
async fn empty_stylesheet_passes_scripts_through_unscoped() {
    let harness = Harness::new();
    let inputs = ProjectInputs::default().with_file("main.tsx", PROPERTY_TSX);
    let result = harness.completed(&empty(), &inputs).await;
    assert_eq!(result.final_js, result.compiled_entry_js);
    assert!(result.final_css.is_empty());
    assert!(result.scoped_properties.is_empty());
}

// ── Incremental behaviour ────────────────────────────────────────────

#[tokio::test]
async fn unchanged_inputs_return_same_snapshot_without_calls() {
    let harness = Harness::new();
    let inputs = ProjectInputs::default()
        .with_file("main.tsx", PROPERTY_TSX)
        .with_file("main.css", PROPERTY_CSS);
    let first = harness.completed(&empty(), &inputs).await;
    let (parses, transforms, builds) = (harness.parses(), harness.transforms(), harness.builds());

    let second = harness.completed(&first, &inputs).await;

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(harness.parses(), parses);
    assert_eq!(harness.transforms(), transforms);
    assert_eq!(harness.builds(), builds);
}

#[tokio::test]
async fn stylesheet_only_edit_skips_script_compilation() {
    let harness = Harness::new();
    let inputs = ProjectInputs::default()
        .with_file("main.tsx", PROPERTY_TSX)
        .with_file("main.css", PROPERTY_CSS);
    let first = harness.completed(&empty(), &inputs).await;
    let (parses, transforms, builds) = (harness.parses(), harness.transforms(), harness.builds());

    let edited = inputs.with_file("main.css", format!("{PROPERTY_CSS}.box {{ z-index: var(--s1); }}\n"));
    let second = harness.completed(&first, &edited).await;

    assert_eq!(harness.parses(), parses);
    assert_eq!(harness.transforms(), transforms);
    assert_eq!(harness.builds(), builds + 1);
    let scoped = &second.scoped_properties[0].scoped_name;
    assert!(second.final_css.contains(&format!("z-index: var({scoped})")));
    assert_eq!(second.final_js, first.final_js);
}

#[tokio::test]
async fn only_dirty_units_are_recompiled() {
    let harness = Harness::new();
    let inputs = ProjectInputs::default()
        .with_file("main.tsx", "import './a';\n")
        .with_file("a.ts", "export const a = 1;\n")
        .with_file("b.ts", "export const b = 1;\n");
    let first = harness.completed(&empty(), &inputs).await;
    assert_eq!(harness.parses(), 3);

    let edited = inputs.with_file("a.ts", "export const a = 2;\n");
    let second = harness.completed(&first, &edited).await;

    assert_eq!(harness.parses(), 4);
    assert_ne!(
        first.published["a.ts"].location,
        second.published["a.ts"].location
    );
    assert_eq!(
        first.published["b.ts"].location,
        second.published["b.ts"].location
    );
}

#[tokio::test]
async fn failed_unit_keeps_last_good_artifacts() {
    let harness = Harness::new();
    let inputs = ProjectInputs::default()
        .with_file("main.tsx", "import { a } from './a';\nconsole.log(a);\n")
        .with_file("a.ts", "export const a = 1;\n");
    let first = harness.completed(&empty(), &inputs).await;

    let broken = inputs.with_file("a.ts", "export const a = `unterminated;\n");
    let second = harness.completed(&first, &broken).await;

    assert_eq!(second.errors.len(), 1);
    assert_eq!(second.errors[0].kind, DiagnosticKind::Parse);
    assert_eq!(second.errors[0].filename.as_deref(), Some("a.ts"));
    let unit = second.unit("a.ts").expect("unit");
    assert!(!unit.compiled_successfully);
    assert_eq!(unit.committed_content.as_deref(), Some("export const a = 1;\n"));
    assert_eq!(second.final_js, first.final_js);

    // Editing another file does not retry the broken unit.
    let parses = harness.parses();
    let third = harness
        .completed(&second, &broken.with_file("main.tsx", "import { a } from './a';\n"))
        .await;
    assert_eq!(harness.parses(), parses + 1);
    assert_eq!(third.errors.len(), 1);
}

#[tokio::test]
async fn missing_entry_is_reported() {
    let harness = Harness::new();
    let inputs = ProjectInputs::default().with_file("other.ts", "export {};\n");
    let result = harness.completed(&empty(), &inputs).await;
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, DiagnosticKind::MissingEntry);
    assert!(result.final_js.is_empty());
}

#[tokio::test]
async fn output_is_deterministic() {
    let inputs = ProjectInputs::default()
        .with_file("main.tsx", format!("import './lib/x';\n{PROPERTY_TSX}"))
        .with_file("lib/x.ts", "document.body.style.setProperty('--s1', '2');\n")
        .with_file("main.css", PROPERTY_CSS)
        .with_file("theme.css", ":root { color: black; }\n");

    let a = Harness::new().completed(&empty(), &inputs).await;
    let b = Harness::new().completed(&empty(), &inputs).await;

    assert_eq!(a.final_js, b.final_js);
    assert_eq!(a.final_css, b.final_css);
    assert_eq!(a.final_modules, b.final_modules);
    assert!(a.final_css.contains(":host { color: black; }"));
    let scoped = &a.scoped_properties[0].scoped_name;
    assert!(a.final_modules.values().any(|code| code.contains(scoped.as_str())));
}

// ── Cancellation ─────────────────────────────────────────────────────

#[tokio::test]
async fn cancellation_during_resolution_leaves_previous_untouched() {
    let harness = Harness::new();
    let first_inputs = ProjectInputs::default().with_file("main.tsx", "export default 1;\n");
    let previous = harness.completed(&empty(), &first_inputs).await;
    let before = previous.final_js.clone();

    let cancel = CancelToken::new();
    *harness.resolver.cancel_on_call.lock().unwrap() = Some(cancel.clone());
    let inputs = first_inputs.with_file("main.tsx", "import { z } from 'zod';\nexport default z;\n");

    let outcome = harness.compile_with(&previous, &inputs, &cancel).await;

    assert!(matches!(outcome, CompileOutcome::Cancelled));
    assert_eq!(harness.resolver.calls.load(Ordering::SeqCst), 1);
    assert_eq!(previous.final_js, before);
    assert!(previous.errors.is_empty());
}

// ── Sessions ─────────────────────────────────────────────────────────

fn session() -> CompilationSession<CountingScript, CountingStyles, Arc<FakeResolver>> {
    CompilationSession::new(KilnConfig::default(), Arc::new(Harness::new().caps))
}

#[tokio::test]
async fn superseded_attempt_is_not_published() {
    let session = session();
    session.notify_change("main.tsx", "export default 1;\n");
    let stale = session.begin_attempt();
    session.notify_change("main.tsx", "export default 2;\n");
    let live = session.begin_attempt();
    let mut updates = session.subscribe();

    let stale_outcome = session.run_attempt(stale).await;
    assert!(matches!(stale_outcome, CompileOutcome::Cancelled));
    assert!(!updates.has_changed().expect("sender alive"));

    let live_outcome = session.run_attempt(live).await;
    assert!(live_outcome.completed().is_some());
    assert!(updates.has_changed().expect("sender alive"));
    assert_eq!(updates.borrow_and_update().final_js, "export default 2;\n");
}

#[tokio::test]
async fn failed_attempt_publishes_previous_artifacts_with_errors() {
    let session = session();
    session.notify_change("main.tsx", "import './a';\n");
    session.notify_change("a.ts", "export const a = 1;\n");
    let good = session.run().await;
    let good = Arc::clone(good.completed().expect("completed"));

    session.notify_change("a.ts", "import './main';\n");
    let outcome = session.run().await;
    assert!(matches!(outcome, CompileOutcome::Failed(_)));

    let latest = session.latest();
    assert_eq!(latest.final_js, good.final_js);
    assert_eq!(latest.errors.len(), 1);
    assert_eq!(latest.errors[0].kind, DiagnosticKind::GraphCycle);
}

#[tokio::test]
async fn removing_a_file_reports_unresolved_import() {
    let session = session();
    session.notify_change("main.tsx", "import './a';\n");
    session.notify_change("a.ts", "export {};\n");
    let _ = session.run().await;
    session.remove_file("a.ts");
    let _ = session.run().await;

    let latest = session.latest();
    assert!(latest.unit("a.ts").is_none());
    assert_eq!(latest.warnings.len(), 1);
    assert_eq!(latest.warnings[0].kind, DiagnosticKind::Resolution);
}

#[tokio::test]
async fn render_payload_serializes() {
    let harness = Harness::new();
    let inputs = ProjectInputs::default()
        .with_file("main.tsx", PROPERTY_TSX)
        .with_file("main.css", PROPERTY_CSS);
    let result = harness.completed(&empty(), &inputs).await;
    let json = serde_json::to_value(RenderPayload::from_result(&result)).expect("serialize");
    assert_eq!(json["final_js"], result.final_js.as_str());
    assert!(json["errors"].as_array().expect("array").is_empty());
}

//! Output helpers for CLI commands.
//!
//! Writes compiled artifacts to the output directory and prints
//! diagnostics with colored severity labels.

use std::path::Path;

use anyhow::Context;
use kiln_common::diagnostics::{Diagnostic, DiagnosticKind};
use kiln_common::types::{CompilationResult, ScopedProperty};
use kiln_core::host::RenderPayload;
use serde::Serialize;

const BOLD: &str = "\x1b[1m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Script output file.
pub const JS_FILE: &str = "index.js";
/// Stylesheet output file.
pub const CSS_FILE: &str = "index.css";
/// Render payload and scoped properties.
pub const BUNDLE_FILE: &str = "bundle.json";

#[derive(Serialize)]
struct Bundle<'a> {
    #[serde(flatten)]
    payload: &'a RenderPayload,
    scoped_properties: &'a [ScopedProperty],
}

/// Serializes the payload and scoped properties as pretty JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn bundle_json(payload: &RenderPayload, result: &CompilationResult) -> anyhow::Result<String> {
    let bundle = Bundle {
        payload,
        scoped_properties: &result.scoped_properties,
    };
    serde_json::to_string_pretty(&bundle).context("failed to serialize bundle")
}

/// Writes every artifact to `out`.
///
/// # Errors
///
/// Returns an error if the directory or a file cannot be written.
pub fn write_bundle(out: &Path, payload: &RenderPayload, result: &CompilationResult) -> anyhow::Result<()> {
    std::fs::create_dir_all(out).with_context(|| format!("failed to create {}", out.display()))?;
    write(out, JS_FILE, &payload.final_js)?;
    write(out, CSS_FILE, &payload.final_css)?;
    write(out, BUNDLE_FILE, &bundle_json(payload, result)?)?;
    tracing::info!(out = %out.display(), "bundle written");
    Ok(())
}

/// Rewrites only the stylesheet.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_styles(out: &Path, css: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(out).with_context(|| format!("failed to create {}", out.display()))?;
    write(out, CSS_FILE, css)
}

fn write(out: &Path, name: &str, content: &str) -> anyhow::Result<()> {
    let path = out.join(name);
    std::fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))
}

/// Short label of a diagnostic kind.
#[must_use]
pub const fn kind_label(kind: DiagnosticKind) -> &'static str {
    match kind {
        DiagnosticKind::Parse => "parse",
        DiagnosticKind::Transform => "transform",
        DiagnosticKind::Resolution => "resolution",
        DiagnosticKind::GraphCycle => "graph-cycle",
        DiagnosticKind::Stylesheet => "stylesheet",
        DiagnosticKind::Registry => "registry",
        DiagnosticKind::TypeDeclarations => "type-declarations",
        DiagnosticKind::MissingEntry => "missing-entry",
        DiagnosticKind::Other => "other",
    }
}

/// Formats one diagnostic as `severity[kind]: file: message`.
#[must_use]
pub fn format_diagnostic(severity: &str, diagnostic: &Diagnostic) -> String {
    format!("{severity}[{}]: {diagnostic}", kind_label(diagnostic.kind))
}

/// Prints errors then warnings to stderr.
pub fn print_diagnostics(result: &CompilationResult) {
    for error in &result.errors {
        eprintln!("  {RED}{BOLD}{}{RESET}", format_diagnostic("error", error));
    }
    for warning in &result.warnings {
        eprintln!("  {YELLOW}{}{RESET}", format_diagnostic("warning", warning));
    }
}

/// One-line summary of a snapshot.
#[must_use]
pub fn summary(result: &CompilationResult) -> String {
    format!(
        "{} unit(s), {} module(s), {} scoped propert{}, {} error(s), {} warning(s)",
        result.units.len(),
        result.final_modules.len(),
        result.scoped_properties.len(),
        if result.scoped_properties.len() == 1 { "y" } else { "ies" },
        result.errors.len(),
        result.warnings.len()
    )
}

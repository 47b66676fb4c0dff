//! # kiln-script
//!
//! Built-in script-transform capability for kiln.
//!
//! Scans ES module source (JavaScript, TypeScript and JSX) into the closed
//! [`ParsedUnit`] tree with a `nom` lexer and prints rewritten trees back to
//! module code. Syntax the pipeline does not inspect passes through
//! unchanged, so the emitted code is only executable when the host can run
//! the source dialect directly.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod lexer;
pub mod printer;

use kiln_common::ast::ParsedUnit;
use kiln_common::capability::{ScriptTransform, TransformOutput};
use kiln_common::config::TargetOptions;
use kiln_common::error::Result;

/// Passthrough ES module transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct EsmTransform;

impl EsmTransform {
    /// Creates the transform.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ScriptTransform for EsmTransform {
    async fn parse(&self, filename: &str, source: &str) -> Result<ParsedUnit> {
        tracing::debug!(filename, bytes = source.len(), "scanning script");
        let items = lexer::tokenize(filename, source)?;
        Ok(ParsedUnit {
            filename: filename.to_owned(),
            items,
        })
    }

    async fn transform(&self, unit: &ParsedUnit, options: &TargetOptions) -> Result<TransformOutput> {
        let mut warnings = Vec::new();
        if options.target != "esnext" {
            warnings.push(format!(
                "target \"{}\" is not supported by the built-in transform; emitting esnext",
                options.target
            ));
        }
        Ok(TransformOutput {
            code: printer::print_executable(unit),
            warnings,
        })
    }
}

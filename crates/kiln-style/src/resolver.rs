//! Stylesheet resolution.
//!
//! Aggregates the project's stylesheet units, hands them to the
//! stylesheet-build capability together with the class names used by
//! scripts, and sorts the used classes into utility-generated and
//! author-defined ones.

use std::collections::BTreeSet;

use kiln_common::capability::StylesheetBuild;
use kiln_common::config::StyleOptions;
use kiln_common::error::{KilnError, Result};
use kiln_common::types::UtilityClass;

/// Compiled stylesheet with class provenance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedStyles {
    /// Complete stylesheet.
    pub css: String,
    /// Classes generated by the utility engine.
    pub utility_classes: Vec<UtilityClass>,
    /// Classes the engine did not recognise.
    pub author_classes: Vec<String>,
}

/// Joins stylesheet sources: the entry stylesheet first, then the others by name.
///
/// `sources` yields `(filename, content)` pairs in any order.
#[must_use]
pub fn aggregate<'a>(entry: &str, sources: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut entry_source = None;
    let mut others: Vec<(&str, &str)> = Vec::new();
    for (filename, content) in sources {
        if filename == entry {
            entry_source = Some(content);
        } else {
            others.push((filename, content));
        }
    }
    others.sort_unstable_by(|a, b| a.0.cmp(b.0));
    entry_source
        .into_iter()
        .chain(others.into_iter().map(|(_, content)| content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drives the stylesheet-build capability.
#[derive(Debug)]
pub struct StyleResolver<'a, B> {
    builder: &'a B,
    options: &'a StyleOptions,
}

impl<'a, B: StylesheetBuild> StyleResolver<'a, B> {
    /// Creates a resolver over `builder`.
    #[must_use]
    pub const fn new(builder: &'a B, options: &'a StyleOptions) -> Self {
        Self { builder, options }
    }

    /// Builds the stylesheet for `source` and the used `class_names`.
    ///
    /// # Errors
    ///
    /// Returns [`KilnError::Stylesheet`] if the capability fails.
    pub async fn resolve(&self, source: &str, class_names: &BTreeSet<String>) -> Result<ResolvedStyles> {
        let source = match &self.options.implicit_import {
            Some(directive) if !source.contains("@import") => format!("{directive}\n{source}"),
            _ => source.to_owned(),
        };
        let classes: Vec<String> = class_names.iter().cloned().collect();
        tracing::debug!(classes = classes.len(), bytes = source.len(), "building stylesheet");

        let output = self
            .builder
            .build(&source, &classes)
            .await
            .map_err(|e| match e {
                KilnError::Stylesheet { .. } => e,
                other => KilnError::Stylesheet {
                    message: other.to_string(),
                },
            })?;

        let utility_classes = output
            .per_class_css
            .into_iter()
            .map(|class| UtilityClass {
                name: class.class_name,
                css: class.css,
            })
            .collect();
        Ok(ResolvedStyles {
            css: output.css,
            utility_classes,
            author_classes: output.unmatched_classes,
        })
    }
}

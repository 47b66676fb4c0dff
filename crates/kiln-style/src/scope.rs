//! Custom property scoping.
//!
//! Registered custom properties (`@property`) are global to a document, so
//! two previews declaring `--size` differently would clash. The transformer
//! gives every declaration a name derived from its full definition, removes
//! the `@property` rules from the stylesheet, rewrites every use in the
//! stylesheet and the scripts, and registers the renamed properties with
//! the host instead.

use std::collections::{BTreeMap, BTreeSet};

use kiln_common::capability::{PropertyRegistry, Registration};
use kiln_common::config::ScopeOptions;
use kiln_common::constants;
use kiln_common::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use kiln_common::digest::short_digest;
use kiln_common::error::KilnError;
use kiln_common::types::ScopedProperty;

use crate::css::{self, PropertyBlock};

/// Scoped artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopedOutput {
    /// Stylesheet without `@property` rules, with names replaced.
    pub css: String,
    /// Entry code with names replaced.
    pub entry_js: String,
    /// Published location to module code with names replaced.
    pub modules: BTreeMap<String, String>,
    /// Renamed properties in discovery order.
    pub properties: Vec<ScopedProperty>,
    /// Warnings in discovery order.
    pub diagnostics: Diagnostics,
}

/// Renames registered custom properties for an isolated rendering context.
pub struct PropertyScopeTransformer<'a> {
    registry: &'a dyn PropertyRegistry,
    options: ScopeOptions,
}

impl<'a> PropertyScopeTransformer<'a> {
    /// Creates a transformer registering with `registry`.
    #[must_use]
    pub fn new(registry: &'a dyn PropertyRegistry, options: ScopeOptions) -> Self {
        Self { registry, options }
    }

    /// Scopes `css`, `entry_js` and every module in `modules`.
    ///
    /// Running the transformer on its own output changes nothing.
    #[must_use]
    pub fn transform(&self, css: &str, entry_js: &str, modules: &BTreeMap<String, String>) -> ScopedOutput {
        let mut diagnostics = Diagnostics::default();
        let mut properties = Vec::new();
        let mut removed: Vec<&PropertyBlock> = Vec::new();

        let blocks = css::scan_properties(css);
        for block in &blocks {
            if !block.name.starts_with("--") {
                tracing::warn!(name = %block.name, "@property name is not a custom property; left untouched");
                diagnostics.warning(Diagnostic::global(
                    DiagnosticKind::Stylesheet,
                    format!("@property {} does not name a custom property; left untouched", block.name),
                ));
                continue;
            }
            properties.push(scoped_property(block));
            removed.push(block);
        }

        let mut scoped_css = String::with_capacity(css.len());
        let mut cursor = 0;
        for block in removed {
            scoped_css.push_str(&css[cursor..block.span.start]);
            cursor = block.span.end;
        }
        scoped_css.push_str(&css[cursor..]);

        let renames: Vec<(&str, &str)> = properties
            .iter()
            .map(|p| (p.original_name.as_str(), p.scoped_name.as_str()))
            .collect();
        let mut scoped_css = rename_all(&scoped_css, &renames);
        if self.options.replace_root {
            scoped_css = replace_token(&scoped_css, ":root", ":host");
        }
        let entry_js = rename_all(entry_js, &renames);
        let modules = modules
            .iter()
            .map(|(location, code)| (location.clone(), rename_all(code, &renames)))
            .collect();

        if self.options.register {
            self.register(&properties, &mut diagnostics);
        }
        tracing::debug!(properties = properties.len(), "custom properties scoped");

        ScopedOutput {
            css: scoped_css,
            entry_js,
            modules,
            properties,
            diagnostics,
        }
    }

    fn register(&self, properties: &[ScopedProperty], diagnostics: &mut Diagnostics) {
        let mut seen = BTreeSet::new();
        for property in properties {
            if !seen.insert(property.scoped_name.as_str()) {
                continue;
            }
            match self.registry.register(property) {
                Registration::Registered | Registration::AlreadyRegisteredIdentical => {}
                Registration::Conflict => {
                    tracing::warn!(name = %property.scoped_name, "property registration conflict");
                    diagnostics.warning(KilnError::RegistryConflict {
                        name: property.scoped_name.clone(),
                    });
                }
            }
        }
    }
}

/// Builds the scoped identity of a declaration.
///
/// The readable part is `--<name>-<initial>-<syntax>-<inherits>` with every
/// character outside `[A-Za-z0-9-]` replaced by `_`; sanitizing can merge
/// distinct definitions, so a digest of the raw fields is appended.
#[must_use]
pub fn scoped_property(block: &PropertyBlock) -> ScopedProperty {
    let bare = block.name.trim_start_matches("--");
    let inherits = if block.inherits { "true" } else { "false" };
    let readable = sanitize(&format!(
        "--{bare}-{}-{}-{inherits}",
        block.initial_value, block.syntax
    ));
    let digest = short_digest(
        &[&block.name, &block.syntax, inherits, &block.initial_value],
        constants::SCOPE_DIGEST_LEN,
    );
    ScopedProperty {
        original_name: block.name.clone(),
        scoped_name: format!("{readable}-{digest}"),
        syntax: block.syntax.clone(),
        inherits: block.inherits,
        initial_value: block.initial_value.clone(),
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

fn rename_all(text: &str, renames: &[(&str, &str)]) -> String {
    renames
        .iter()
        .fold(text.to_owned(), |acc, (from, to)| replace_token(&acc, from, to))
}

const fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || !c.is_ascii()
}

/// Replaces every occurrence of `token` not embedded in a longer identifier.
///
/// A token edge that is itself an identifier character must not touch
/// another identifier character.
#[must_use]
pub fn replace_token(text: &str, token: &str, replacement: &str) -> String {
    let (Some(first), Some(last)) = (token.chars().next(), token.chars().next_back()) else {
        return text.to_owned();
    };
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, _) in text.match_indices(token) {
        if start < cursor {
            continue;
        }
        let end = start + token.len();
        let before_ok = !is_identifier_char(first)
            || text[..start].chars().next_back().is_none_or(|c| !is_identifier_char(c));
        let after_ok = !is_identifier_char(last)
            || text[end..].chars().next().is_none_or(|c| !is_identifier_char(c));
        if before_ok && after_ok {
            out.push_str(&text[cursor..start]);
            out.push_str(replacement);
            cursor = end;
        }
    }
    out.push_str(&text[cursor..]);
    out
}

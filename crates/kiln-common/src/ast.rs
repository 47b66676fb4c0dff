//! Closed syntax tree for script units.
//!
//! The tree only models what the pipeline needs to look at: import
//! statements (to build and rewrite the module graph) and class-name
//! attributes (to feed the stylesheet build). Everything else is kept as
//! opaque source text, so printing the items back in order reproduces the
//! input exactly.

/// A parsed script unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedUnit {
    /// Unit the tree was parsed from.
    pub filename: String,
    /// Top-to-bottom sequence of items.
    pub items: Vec<ModuleItem>,
}

/// One item of a parsed unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleItem {
    /// Source text the pipeline does not inspect.
    Code(String),
    /// An import or re-export referencing another module.
    Import(ImportItem),
    /// A `className` attribute or property with a literal value.
    ClassName(ClassNameItem),
}

/// Syntactic form of an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportKind {
    /// `import x from "./x"`.
    Static,
    /// `import "./x"`.
    SideEffect,
    /// `export { x } from "./x"` or `export * from "./x"`.
    ReExport,
    /// `import("./x")`.
    Dynamic,
}

/// An import-like reference to another module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportItem {
    /// Syntactic form.
    pub kind: ImportKind,
    /// Raw text from the keyword up to the opening quote.
    pub prefix: String,
    /// Quote character delimiting the specifier.
    pub quote: char,
    /// Module specifier as written.
    pub specifier: String,
}

impl ImportItem {
    /// Returns a copy pointing at `specifier`, keeping the original spelling otherwise.
    #[must_use]
    pub fn with_specifier(&self, specifier: impl Into<String>) -> Self {
        Self {
            specifier: specifier.into(),
            ..self.clone()
        }
    }

    /// Returns `true` for `import type ... from` and `export type ... from`.
    ///
    /// Such imports have no runtime meaning: they are neither graph edges nor
    /// part of executable output.
    #[must_use]
    pub fn is_type_only(&self) -> bool {
        let keyword_len = match self.kind {
            ImportKind::SideEffect | ImportKind::Dynamic => return false,
            ImportKind::Static => "import".len(),
            ImportKind::ReExport => "export".len(),
        };
        let Some(after) = self
            .prefix
            .get(keyword_len..)
            .and_then(|rest| rest.trim_start().strip_prefix("type"))
        else {
            return false;
        };
        if !(after.starts_with(char::is_whitespace) || after.starts_with('{')) {
            return false;
        }
        // `import type from "x"` binds a default export named `type`.
        !after
            .trim_start()
            .strip_prefix("from")
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
    }
}

/// A class-name attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassNameItem {
    /// Raw text from `className` up to the opening quote.
    pub prefix: String,
    /// Quote character; a backtick marks a template literal.
    pub quote: char,
    /// Raw text between the quotes.
    pub value: String,
}

impl ClassNameItem {
    /// Returns `true` if the value is a template literal.
    #[must_use]
    pub const fn is_template(&self) -> bool {
        self.quote == '`'
    }
}

impl ModuleItem {
    /// Appends the source text of the item to `out`.
    pub fn write_to(&self, out: &mut String) {
        match self {
            Self::Code(text) => out.push_str(text),
            Self::Import(import) => {
                out.push_str(&import.prefix);
                out.push(import.quote);
                out.push_str(&import.specifier);
                out.push(import.quote);
            }
            Self::ClassName(class) => {
                out.push_str(&class.prefix);
                out.push(class.quote);
                out.push_str(&class.value);
                out.push(class.quote);
            }
        }
    }
}

impl ParsedUnit {
    /// Prints every item in order.
    ///
    /// Printing an unmodified unit reproduces the scanned source exactly.
    #[must_use]
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        for item in &self.items {
            item.write_to(&mut out);
        }
        out
    }

    /// Returns the specifier of every runtime import in source order.
    ///
    /// Type-only imports are skipped.
    #[must_use]
    pub fn import_specifiers(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|item| match item {
                ModuleItem::Import(import) if !import.is_type_only() => Some(import.specifier.as_str()),
                ModuleItem::Import(_) => None,
                ModuleItem::Code(_) | ModuleItem::ClassName(_) => None,
            })
            .collect()
    }
}

//! Compilation of a single script unit.

use std::collections::BTreeSet;
use std::sync::Arc;

use kiln_common::ast::{ModuleItem, ParsedUnit};
use kiln_common::cancel::{CancelToken, Cancelled};
use kiln_common::capability::ScriptTransform;
use kiln_common::config::TargetOptions;
use kiln_common::error::Result;

/// Artifacts of one successful unit compilation.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    /// Parse tree of the compiled content.
    pub parsed: Arc<ParsedUnit>,
    /// Standalone executable code, imports not yet rewritten.
    pub code: String,
    /// Class names referenced by the unit.
    pub class_names: BTreeSet<String>,
    /// Non-fatal transform messages.
    pub warnings: Vec<String>,
}

/// Compiles one script unit through the script-transform capability.
pub struct UnitCompiler<'a, S> {
    script: &'a S,
    target: &'a TargetOptions,
    cancel: &'a CancelToken,
}

impl<'a, S: ScriptTransform> UnitCompiler<'a, S> {
    /// Creates a compiler over `script`.
    #[must_use]
    pub const fn new(script: &'a S, target: &'a TargetOptions, cancel: &'a CancelToken) -> Self {
        Self { script, target, cancel }
    }

    /// Parses and transforms `source`.
    ///
    /// The outer result reports cancellation; the inner one the unit's own
    /// parse or transform failure.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the token is set after either capability call.
    pub async fn compile(&self, filename: &str, source: &str) -> std::result::Result<Result<CompiledUnit>, Cancelled> {
        tracing::debug!(filename, "compiling unit");
        let parsed = self.script.parse(filename, source).await;
        self.cancel.checkpoint()?;
        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(e) => return Ok(Err(e)),
        };
        let output = self.script.transform(&parsed, self.target).await;
        self.cancel.checkpoint()?;
        Ok(output.map(|output| CompiledUnit {
            class_names: extract_class_names(&parsed),
            parsed: Arc::new(parsed),
            code: output.code,
            warnings: output.warnings,
        }))
    }
}

/// Collects the class names a unit references.
///
/// Plain values are split on whitespace. For template literals the static
/// words are kept, words glued to an interpolation are dropped, and quoted
/// strings inside interpolations contribute their words.
#[must_use]
pub fn extract_class_names(unit: &ParsedUnit) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for item in &unit.items {
        match item {
            ModuleItem::ClassName(class) if class.is_template() => template_classes(&class.value, &mut names),
            ModuleItem::ClassName(class) => words(&class.value, &mut names),
            ModuleItem::Code(_) | ModuleItem::Import(_) => {}
        }
    }
    names
}

fn words(text: &str, names: &mut BTreeSet<String>) {
    names.extend(text.split_whitespace().map(str::to_owned));
}

fn template_classes(value: &str, names: &mut BTreeSet<String>) {
    let mut rest = value;
    let mut after_expression = false;
    loop {
        let (text, expression) = match rest.find("${") {
            Some(start) => (&rest[..start], Some(&rest[start + 2..])),
            None => (rest, None),
        };
        let mut static_words: Vec<&str> = text.split_whitespace().collect();
        if expression.is_some() && !text.ends_with(char::is_whitespace) {
            let _ = static_words.pop();
        }
        if after_expression && !text.starts_with(char::is_whitespace) && !static_words.is_empty() {
            let _ = static_words.remove(0);
        }
        names.extend(static_words.into_iter().map(str::to_owned));

        let Some(expression) = expression else {
            break;
        };
        let len = expression_len(expression);
        quoted_words(&expression[..len.saturating_sub(1)], names);
        rest = &expression[len.min(expression.len())..];
        after_expression = true;
    }
}

/// Byte length of an interpolation body including its closing `}`.
fn expression_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' if depth == 0 => return i + 1,
            b'}' => depth -= 1,
            b'"' | b'\'' | b'`' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += if bytes[i] == b'\\' { 2 } else { 1 };
                }
            }
            _ => {}
        }
        i += 1;
    }
    s.len()
}

fn quoted_words(expression: &str, names: &mut BTreeSet<String>) {
    let mut rest = expression;
    while let Some(start) = rest.find(['"', '\'']) {
        let quote = rest[start..].chars().next().unwrap_or('"');
        let body = &rest[start + 1..];
        let Some(end) = body.find(quote) else {
            break;
        };
        words(&body[..end], names);
        rest = &body[end + 1..];
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use kiln_common::ast::ClassNameItem;
    use kiln_common::capability::TransformOutput;
    use kiln_common::error::KilnError;
    use kiln_script::EsmTransform;

    use super::*;

    fn class_item(quote: char, value: &str) -> ModuleItem {
        ModuleItem::ClassName(ClassNameItem {
            prefix: "className=".into(),
            quote,
            value: value.into(),
        })
    }

    fn names(items: Vec<ModuleItem>) -> Vec<String> {
        extract_class_names(&ParsedUnit {
            filename: "main.tsx".into(),
            items,
        })
        .into_iter()
        .collect()
    }

    #[test]
    fn plain_values_split_on_whitespace() {
        assert_eq!(
            names(vec![class_item('"', " p-4  text-lg\nflex ")]),
            vec!["flex", "p-4", "text-lg"]
        );
    }

    #[test]
    fn template_values_keep_static_and_quoted_words() {
        assert_eq!(
            names(vec![class_item(
                '`',
                "card ${active ? 'ring-2 ring-blue' : \"opacity-50\"} btn-${size} shadow"
            )]),
            vec!["card", "opacity-50", "ring-2", "ring-blue", "shadow"]
        );
        assert_eq!(names(vec![class_item('`', "${a}x y")]), vec!["y"]);
        assert_eq!(names(vec![class_item('`', "${ {a: 'b'}.a }")]), vec!["b"]);
    }

    #[tokio::test]
    async fn compiles_with_builtin_transform() {
        let script = EsmTransform::new();
        let target = TargetOptions::default();
        let cancel = CancelToken::new();
        let unit = UnitCompiler::new(&script, &target, &cancel)
            .compile("main.tsx", "export default () => <p className=\"p-2 m-1\">hi</p>;\n")
            .await
            .expect("not cancelled")
            .expect("should compile");
        assert_eq!(unit.code, "export default () => <p className=\"p-2 m-1\">hi</p>;\n");
        assert_eq!(unit.class_names.into_iter().collect::<Vec<_>>(), vec!["m-1", "p-2"]);
    }

    #[tokio::test]
    async fn parse_failure_is_an_inner_error() {
        let script = EsmTransform::new();
        let target = TargetOptions::default();
        let cancel = CancelToken::new();
        let result = UnitCompiler::new(&script, &target, &cancel)
            .compile("bad.ts", "function f() {")
            .await
            .expect("not cancelled");
        assert!(matches!(result, Err(KilnError::Parse { .. })));
    }

    struct CancellingTransform {
        cancel: CancelToken,
        transforms: AtomicUsize,
    }

    impl ScriptTransform for CancellingTransform {
        async fn parse(&self, filename: &str, _source: &str) -> Result<ParsedUnit> {
            self.cancel.cancel();
            Ok(ParsedUnit {
                filename: filename.into(),
                items: Vec::new(),
            })
        }

        async fn transform(&self, _unit: &ParsedUnit, _options: &TargetOptions) -> Result<TransformOutput> {
            let _ = self.transforms.fetch_add(1, Ordering::SeqCst);
            Ok(TransformOutput::default())
        }
    }

    #[tokio::test]
    async fn cancellation_stops_before_transform() {
        let cancel = CancelToken::new();
        let script = CancellingTransform {
            cancel: cancel.clone(),
            transforms: AtomicUsize::new(0),
        };
        let target = TargetOptions::default();
        let result = UnitCompiler::new(&script, &target, &cancel).compile("a.ts", "").await;
        assert!(result.is_err());
        assert_eq!(script.transforms.load(Ordering::SeqCst), 0);
    }
}

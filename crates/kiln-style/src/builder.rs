//! Built-in stylesheet builder.

use kiln_common::capability::{StylesheetBuild, StylesheetOutput};
use kiln_common::error::Result;

/// Emits the author stylesheet unchanged and generates no utility classes.
///
/// Every used class is reported as author-defined.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughStylesheet;

impl StylesheetBuild for PassthroughStylesheet {
    async fn build(&self, source: &str, class_names: &[String]) -> Result<StylesheetOutput> {
        Ok(StylesheetOutput {
            css: source.to_owned(),
            per_class_css: Vec::new(),
            unmatched_classes: class_names.to_vec(),
        })
    }
}

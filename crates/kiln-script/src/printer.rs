//! Printing of parsed script units back to source text.

use kiln_common::ast::{ModuleItem, ParsedUnit};

/// Prints `unit` as executable module code.
///
/// Type-only imports and re-exports are dropped; they have no runtime
/// meaning and would make the host fetch a module for nothing.
#[must_use]
pub fn print_executable(unit: &ParsedUnit) -> String {
    let mut out = String::new();
    for item in &unit.items {
        if matches!(item, ModuleItem::Import(import) if import.is_type_only()) {
            continue;
        }
        item.write_to(&mut out);
    }
    out
}

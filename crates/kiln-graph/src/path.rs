//! Virtual project paths.
//!
//! Project files are keyed by `/`-separated paths relative to the project
//! root. Relative specifiers are resolved against the importer's directory
//! without touching the filesystem.

use kiln_common::constants;

/// Returns `true` for specifiers that name a project file (`./`, `../` or `/`).
#[must_use]
pub fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
}

/// Returns `true` for specifiers that are already fetchable locations.
#[must_use]
pub fn is_passthrough(specifier: &str) -> bool {
    constants::PASSTHROUGH_SCHEMES
        .iter()
        .any(|scheme| specifier.starts_with(scheme))
}

/// Resolves `specifier` against the directory of `importer`.
///
/// `/`-prefixed specifiers resolve from the project root. Returns `None`
/// when the path climbs above the root.
#[must_use]
pub fn resolve_relative(importer: &str, specifier: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    if !specifier.starts_with('/') {
        segments.extend(importer.split('/').filter(|s| !s.is_empty()));
        let _ = segments.pop();
    }
    for segment in specifier.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                let _ = segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    Some(segments.join("/"))
}

/// Filenames tried, in order, for a resolved import path.
///
/// A path that already has an extension is tried as written; otherwise the
/// script extensions are tried before the bare path.
#[must_use]
pub fn candidates(path: &str) -> Vec<String> {
    if constants::extension(path).is_some() {
        return vec![path.to_owned()];
    }
    constants::SCRIPT_EXTENSIONS
        .iter()
        .map(|ext| format!("{path}.{ext}"))
        .chain(std::iter::once(path.to_owned()))
        .collect()
}

/// Returns `filename` without its extension.
#[must_use]
pub fn strip_extension(filename: &str) -> &str {
    constants::extension(filename).map_or(filename, |ext| &filename[..filename.len() - ext.len() - 1])
}

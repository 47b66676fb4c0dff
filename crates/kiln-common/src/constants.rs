//! Workspace-wide constants and defaults.

/// Default entry script unit.
pub const DEFAULT_ENTRY_SCRIPT: &str = "main.tsx";

/// Default entry stylesheet unit.
pub const DEFAULT_ENTRY_STYLE: &str = "main.css";

/// Default CDN used by the built-in module resolver.
pub const DEFAULT_CDN_BASE: &str = "https://esm.sh/";

/// Modules provided by the render host and never rewritten.
pub const DEFAULT_EXTERNALS: &[&str] = &["react", "react-dom"];

/// Script extensions, in the order tried for extensionless imports.
pub const SCRIPT_EXTENSIONS: &[&str] = &["tsx", "ts", "jsx", "js"];

/// Stylesheet extensions.
pub const STYLE_EXTENSIONS: &[&str] = &["css"];

/// Specifier prefixes that already name a fetchable location.
pub const PASSTHROUGH_SCHEMES: &[&str] = &["data:", "blob:", "http:", "https:", "file:"];

/// Scheme and authority of published module locations.
pub const PUBLISH_PREFIX: &str = "blob:kiln/";

/// Hex digits of the content digest kept in a published location.
pub const PUBLISH_DIGEST_LEN: usize = 16;

/// Hex digits of the definition digest appended to scoped property names.
pub const SCOPE_DIGEST_LEN: usize = 8;

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = "kiln.yaml";

/// Application name used in CLI output.
pub const APP_NAME: &str = "kiln";

/// Returns the extension of `filename` without the dot, if any.
#[must_use]
pub fn extension(filename: &str) -> Option<&str> {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    base.rsplit_once('.')
        .and_then(|(stem, ext)| (!stem.is_empty()).then_some(ext))
}

/// Returns `true` if `filename` names a script unit.
#[must_use]
pub fn is_script(filename: &str) -> bool {
    extension(filename).is_some_and(|ext| SCRIPT_EXTENSIONS.contains(&ext))
}

/// Returns `true` if `filename` names a stylesheet unit.
#[must_use]
pub fn is_style(filename: &str) -> bool {
    extension(filename).is_some_and(|ext| STYLE_EXTENSIONS.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_ignores_directories_and_dotfiles() {
        assert_eq!(extension("src/app.v2/main.tsx"), Some("tsx"));
        assert_eq!(extension("src/app.v2/README"), None);
        assert_eq!(extension(".hidden"), None);
    }

    #[test]
    fn classifies_units() {
        assert!(is_script("components/Button.jsx"));
        assert!(is_style("main.css"));
        assert!(!is_script("main.css"));
        assert!(!is_style("notes.md"));
    }
}

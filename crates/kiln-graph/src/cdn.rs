//! Built-in module resolver backed by an ES module CDN.

use kiln_common::capability::{ModuleResolver, Resolution};
use kiln_common::constants;
use kiln_common::error::{KilnError, Result};

/// Maps a bare module name to `<base><name>`.
///
/// Does not fetch anything, so it never returns type declarations.
#[derive(Debug, Clone)]
pub struct CdnResolver {
    base: String,
}

impl CdnResolver {
    /// Creates a resolver for `base`; a trailing `/` is added if missing.
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self { base }
    }
}

impl Default for CdnResolver {
    fn default() -> Self {
        Self::new(constants::DEFAULT_CDN_BASE)
    }
}

impl ModuleResolver for CdnResolver {
    async fn resolve(&self, module: &str) -> Result<Resolution> {
        if module.is_empty() || module.starts_with('.') || module.contains("..") {
            return Err(KilnError::Config {
                message: format!("\"{module}\" is not a package name"),
            });
        }
        Ok(Resolution {
            location: format!("{}{module}", self.base),
            type_declarations: None,
        })
    }
}

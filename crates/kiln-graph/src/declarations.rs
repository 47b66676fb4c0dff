//! In-memory store of type declarations for resolved modules.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use kiln_common::capability::TypeSink;
use kiln_common::error::Result;

/// Collects declarations handed over by the import resolver.
///
/// Stands in for the editor collaborator. Re-adding a module replaces its
/// declarations.
#[derive(Debug, Default)]
pub struct TypeDeclarationStore {
    modules: Mutex<BTreeMap<String, String>>,
}

impl TypeDeclarationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declarations registered for `module`.
    #[must_use]
    pub fn get(&self, module: &str) -> Option<String> {
        self.modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(module)
            .cloned()
    }

    /// Registered module names in order.
    #[must_use]
    pub fn modules(&self) -> Vec<String> {
        self.modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl TypeSink for TypeDeclarationStore {
    fn add_declarations(&self, module: &str, declarations: &str) -> Result<()> {
        let _ = self
            .modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(module.to_owned(), declarations.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_adds_are_idempotent() {
        let store = TypeDeclarationStore::new();
        store.add_declarations("zod", "declare module 'zod';").expect("add");
        store.add_declarations("zod", "declare module 'zod';").expect("add");
        assert_eq!(store.modules(), vec!["zod"]);
        assert_eq!(store.get("zod").as_deref(), Some("declare module 'zod';"));
    }
}

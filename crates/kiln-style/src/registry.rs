//! In-memory custom property registry.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use kiln_common::capability::{PropertyRegistry, Registration};
use kiln_common::types::ScopedProperty;

/// Registry that keeps every definition for the life of the process.
///
/// Mirrors a document-wide registry: a name can be registered once, and a
/// second registration with a different definition is a conflict.
#[derive(Debug, Default)]
pub struct InMemoryPropertyRegistry {
    properties: Mutex<BTreeMap<String, ScopedProperty>>,
}

impl InMemoryPropertyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every registered property in name order.
    #[must_use]
    pub fn registered(&self) -> Vec<ScopedProperty> {
        self.properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl PropertyRegistry for InMemoryPropertyRegistry {
    fn register(&self, property: &ScopedProperty) -> Registration {
        let mut properties = self.properties.lock().unwrap_or_else(PoisonError::into_inner);
        match properties.get(&property.scoped_name) {
            Some(existing) if existing == property => Registration::AlreadyRegisteredIdentical,
            Some(_) => Registration::Conflict,
            None => {
                let _ = properties.insert(property.scoped_name.clone(), property.clone());
                Registration::Registered
            }
        }
    }
}

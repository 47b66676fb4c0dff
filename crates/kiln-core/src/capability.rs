//! The capability handle the orchestrator is driven through.

use std::sync::Arc;

use kiln_common::capability::{PropertyRegistry, TypeSink};
use kiln_common::config::KilnConfig;
use kiln_graph::cdn::CdnResolver;
use kiln_graph::resolver::{ImportResolver, ImportTable};
use kiln_script::EsmTransform;
use kiln_style::builder::PassthroughStylesheet;
use kiln_style::registry::InMemoryPropertyRegistry;

/// Heavy collaborators, constructed once by the host and shared by every attempt.
pub struct CapabilityHandle<S, B, R> {
    /// Script parsing and printing.
    pub script: S,
    /// Stylesheet building.
    pub stylesheet: B,
    /// Memoizing bare module resolver over the session's import table.
    pub resolver: ImportResolver<R>,
    /// Host property registry.
    pub registry: Arc<dyn PropertyRegistry>,
}

impl<S, B, R> CapabilityHandle<S, B, R> {
    /// Bundles the given capabilities.
    pub fn new(script: S, stylesheet: B, resolver: ImportResolver<R>, registry: Arc<dyn PropertyRegistry>) -> Self {
        Self {
            script,
            stylesheet,
            resolver,
            registry,
        }
    }
}

/// Capabilities built into kiln.
pub type BuiltinCapabilities = CapabilityHandle<EsmTransform, PassthroughStylesheet, CdnResolver>;

impl BuiltinCapabilities {
    /// Built-in transform, passthrough stylesheet, CDN resolver and in-memory registry.
    #[must_use]
    pub fn builtin(config: &KilnConfig, table: Arc<ImportTable>, types: Option<Arc<dyn TypeSink>>) -> Self {
        let mut resolver = ImportResolver::new(CdnResolver::new(&config.cdn_base), table);
        if let Some(sink) = types {
            resolver = resolver.with_type_sink(sink);
        }
        Self::new(
            EsmTransform::new(),
            PassthroughStylesheet,
            resolver,
            Arc::new(InMemoryPropertyRegistry::new()),
        )
    }
}

impl<S, B, R> std::fmt::Debug for CapabilityHandle<S, B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityHandle")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

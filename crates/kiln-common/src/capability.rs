//! Capabilities the pipeline is driven through.
//!
//! Parsing and printing scripts, building stylesheets, resolving bare module
//! names and registering custom properties are all provided by the host.
//! The host constructs them once and hands them to the orchestrator; the
//! pipeline holds no global state of its own.
//!
//! The async capabilities are suspension points: the orchestrator checks its
//! cancellation token after every call.

use std::future::Future;
use std::sync::Arc;

use crate::ast::ParsedUnit;
use crate::config::TargetOptions;
use crate::error::Result;
use crate::types::ScopedProperty;

/// Executable code produced from a parsed unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutput {
    /// Emitted code.
    pub code: String,
    /// Non-fatal messages reported by the transform.
    pub warnings: Vec<String>,
}

/// Parses and prints script units.
pub trait ScriptTransform: Send + Sync {
    /// Parses `source` into the closed syntax tree.
    ///
    /// # Errors
    ///
    /// Returns [`KilnError::Parse`](crate::error::KilnError::Parse) for malformed input.
    fn parse(&self, filename: &str, source: &str) -> impl Future<Output = Result<ParsedUnit>> + Send;

    /// Emits executable code for a (possibly rewritten) tree.
    ///
    /// # Errors
    ///
    /// Returns [`KilnError::Transform`](crate::error::KilnError::Transform) on failure.
    fn transform(
        &self,
        unit: &ParsedUnit,
        options: &TargetOptions,
    ) -> impl Future<Output = Result<TransformOutput>> + Send;
}

/// CSS generated for one class by the stylesheet engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassCss {
    /// Class name.
    pub class_name: String,
    /// Generated CSS.
    pub css: String,
}

/// Result of a stylesheet build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StylesheetOutput {
    /// Complete stylesheet.
    pub css: String,
    /// CSS generated per recognised class.
    pub per_class_css: Vec<ClassCss>,
    /// Classes the engine did not recognise.
    pub unmatched_classes: Vec<String>,
}

/// Builds a stylesheet from author CSS and class usage.
pub trait StylesheetBuild: Send + Sync {
    /// Builds the stylesheet for `source` given the classes used by scripts.
    ///
    /// # Errors
    ///
    /// Returns [`KilnError::Stylesheet`](crate::error::KilnError::Stylesheet) on failure.
    fn build(
        &self,
        source: &str,
        class_names: &[String],
    ) -> impl Future<Output = Result<StylesheetOutput>> + Send;
}

/// Where a bare module name can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Fetchable location.
    pub location: String,
    /// Type declarations for the editor, if the resolver found any.
    pub type_declarations: Option<String>,
}

/// Maps bare module names to fetchable locations.
pub trait ModuleResolver: Send + Sync {
    /// Resolves `module`.
    ///
    /// # Errors
    ///
    /// Returns an error if the module cannot be located; callers downgrade it to a warning.
    fn resolve(&self, module: &str) -> impl Future<Output = Result<Resolution>> + Send;
}

/// Receives type declarations for resolved modules (the editor collaborator).
///
/// Implementations must tolerate repeated calls with the same module.
pub trait TypeSink: Send + Sync {
    /// Registers `declarations` for `module`.
    ///
    /// # Errors
    ///
    /// Returns an error if the declarations cannot be registered.
    fn add_declarations(&self, module: &str, declarations: &str) -> Result<()>;
}

/// Outcome of registering a scoped property with the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Newly registered.
    Registered,
    /// An identical definition was already registered.
    AlreadyRegisteredIdentical,
    /// A different definition is registered under the same name.
    Conflict,
}

/// The host's custom property registry.
pub trait PropertyRegistry: Send + Sync {
    /// Registers `property` under its scoped name.
    fn register(&self, property: &ScopedProperty) -> Registration;
}

impl<T: ScriptTransform> ScriptTransform for Arc<T> {
    fn parse(&self, filename: &str, source: &str) -> impl Future<Output = Result<ParsedUnit>> + Send {
        (**self).parse(filename, source)
    }

    fn transform(
        &self,
        unit: &ParsedUnit,
        options: &TargetOptions,
    ) -> impl Future<Output = Result<TransformOutput>> + Send {
        (**self).transform(unit, options)
    }
}

impl<T: StylesheetBuild> StylesheetBuild for Arc<T> {
    fn build(
        &self,
        source: &str,
        class_names: &[String],
    ) -> impl Future<Output = Result<StylesheetOutput>> + Send {
        (**self).build(source, class_names)
    }
}

impl<T: ModuleResolver> ModuleResolver for Arc<T> {
    fn resolve(&self, module: &str) -> impl Future<Output = Result<Resolution>> + Send {
        (**self).resolve(module)
    }
}

//! Unified error types for the kiln workspace.
//!
//! Per-unit failures (`Parse`, `Transform`) and recoverable failures
//! (`Resolution`, `TypeDeclarations`, `RegistryConflict`) are converted into
//! [`Diagnostic`](crate::diagnostics::Diagnostic)s at the stage boundary.
//! Only `GraphCycle` aborts a whole compilation attempt. Cancellation is not
//! an error and lives in [`crate::cancel`].

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum KilnError {
    /// A script unit could not be parsed.
    #[error("{filename}: parse error: {message}")]
    Parse {
        /// Unit that failed to parse.
        filename: String,
        /// Human-readable description, usually with a `line:column` prefix.
        message: String,
    },

    /// A parsed script unit could not be turned into executable code.
    #[error("{filename}: transform error: {message}")]
    Transform {
        /// Unit that failed to transform.
        filename: String,
        /// Human-readable description.
        message: String,
    },

    /// An import specifier could not be resolved.
    #[error("{importer}: cannot resolve import \"{specifier}\": {reason}")]
    Resolution {
        /// Unit containing the import.
        importer: String,
        /// Specifier as written in the source.
        specifier: String,
        /// Why resolution failed.
        reason: String,
    },

    /// The module graph contains a cycle.
    #[error("import cycle detected: {}", path.join(" -> "))]
    GraphCycle {
        /// The cycle, starting and ending at the same unit.
        path: Vec<String>,
    },

    /// The stylesheet-build capability failed.
    #[error("stylesheet build failed: {message}")]
    Stylesheet {
        /// Description reported by the capability.
        message: String,
    },

    /// A scoped property clashes with a different registered definition.
    #[error("property {name} is already registered with a different definition")]
    RegistryConflict {
        /// Scoped property name.
        name: String,
    },

    /// Type declarations for a resolved module could not be handed to the editor.
    #[error("type declarations for \"{module}\" were not registered: {reason}")]
    TypeDeclarations {
        /// Module whose declarations were dropped.
        module: String,
        /// Failure reported by the sink.
        reason: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// The YAML configuration file could not be parsed.
    #[error("configuration parse error: {source}")]
    Yaml {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, KilnError>;

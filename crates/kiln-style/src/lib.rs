//! # kiln-style
//!
//! Stylesheet stages of the kiln pipeline.
//!
//! Handles:
//! - **Resolver**: aggregation of stylesheet units and class provenance
//!   around the stylesheet-build capability.
//! - **Css**: permissive scanning of `@property` rules.
//! - **Scope**: renaming of registered custom properties across the
//!   stylesheet and the scripts.
//! - **Registry**: the in-memory property registry.
//! - **Builder**: the passthrough stylesheet builder.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod builder;
pub mod css;
pub mod registry;
pub mod resolver;
pub mod scope;

//! # kiln-graph
//!
//! Module graph handling for kiln projects.
//!
//! Handles:
//! - **Path**: virtual project paths and relative specifier resolution.
//! - **Graph**: dependency graph construction, cycle detection and
//!   topological ordering with `petgraph`.
//! - **Resolver**: the session-wide import table and memoizing bare module
//!   resolution.
//! - **Cdn**: the built-in CDN-backed module resolver.
//! - **Declarations**: the in-memory type declaration store.
//! - **Processor**: import rewriting, transformation and publishing of
//!   every unit, dependencies first.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cdn;
pub mod declarations;
pub mod graph;
pub mod path;
pub mod processor;
pub mod resolver;

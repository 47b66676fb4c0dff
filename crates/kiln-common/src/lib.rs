//! # kiln-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the entire kiln workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the data model (source units, compilation
//! snapshots, scoped properties), the closed script AST, the capability
//! traits the pipeline is driven through, and the cancellation token.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod ast;
pub mod cancel;
pub mod capability;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod digest;
pub mod error;
pub mod types;

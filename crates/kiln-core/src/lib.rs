//! # kiln-core
//!
//! The incremental compilation pipeline.
//!
//! Handles:
//! - **Unit**: compilation of single script units and class-name extraction.
//! - **Orchestrator**: the staged, cancellable `compile` over a snapshot.
//! - **Session**: attempt supersession and publication of snapshots.
//! - **Host**: the payload handed to the render host and remount tracking.
//! - **Capability**: the handle bundling the host's capabilities.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod capability;
pub mod host;
pub mod orchestrator;
pub mod session;
pub mod unit;

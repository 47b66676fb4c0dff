//! # kiln
//!
//! Incremental in-memory compiler for small script and stylesheet projects.
//! Builds a project once, prints its module graph, or watches it for changes.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod commands;
mod output;
mod project;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env());
    if cli.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    commands::execute(cli).await
}

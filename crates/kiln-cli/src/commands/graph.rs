//! `kiln graph`: Print the module graph in processing order.

use std::collections::BTreeMap;
use std::sync::Arc;

use clap::Args;
use kiln_common::capability::ScriptTransform;
use kiln_common::error::KilnError;
use kiln_common::types::UnitKind;
use kiln_graph::graph::DependencyGraph;
use kiln_script::EsmTransform;

use super::ProjectArgs;
use crate::project;

/// Arguments for the `graph` command.
#[derive(Args, Debug)]
pub struct GraphArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

/// Executes the `graph` command.
///
/// Parses every script, builds the dependency graph and prints units
/// dependencies-first, each followed by the units it imports.
///
/// # Errors
///
/// Returns an error if the project cannot be loaded or the graph has a cycle.
pub async fn execute(args: GraphArgs) -> anyhow::Result<()> {
    let config = args.project.config()?;
    let files = project::load(&args.project.dir, Some(&args.project.out_dir(None)))?;

    let transform = EsmTransform::new();
    let mut parsed = BTreeMap::new();
    for (filename, content) in &files {
        if UnitKind::from_filename(filename) != Some(UnitKind::Script) {
            continue;
        }
        match transform.parse(filename, content).await {
            Ok(unit) => {
                let _ = parsed.insert(filename.clone(), Arc::new(unit));
            }
            Err(e) => eprintln!("  skipping {filename}: {e}"),
        }
    }

    let graph = DependencyGraph::build(&parsed);
    if let Some(path) = graph.find_cycle() {
        return Err(KilnError::GraphCycle { path }.into());
    }
    let order = graph.order()?;

    println!("Module graph for: {}", args.project.dir.display());
    println!();
    for (index, filename) in order.iter().enumerate() {
        let marker = if *filename == config.entry_script { " (entry)" } else { "" };
        println!("  {:>3}. {filename}{marker}", index + 1);
        for dependency in graph.dependencies(filename) {
            println!("         <- {dependency}");
        }
    }
    println!();
    println!("  {} script unit(s).", order.len());
    Ok(())
}

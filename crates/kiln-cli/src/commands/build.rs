//! `kiln build`: Compile the project once and write the bundle.

use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use kiln_core::host::RenderPayload;
use kiln_core::orchestrator::CompileOutcome;

use super::ProjectArgs;
use crate::{output, project};

/// Arguments for the `build` command.
#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Output directory, `<DIR>/dist` by default.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Executes the `build` command.
///
/// # Errors
///
/// Returns an error if the project cannot be loaded, the output cannot be
/// written, or compilation reports errors.
pub async fn execute(args: BuildArgs) -> anyhow::Result<()> {
    let started = Instant::now();
    let config = args.project.config()?;
    let out = args.project.out_dir(args.out.as_deref());
    let files = project::load(&args.project.dir, Some(&out))?;
    if files.is_empty() {
        anyhow::bail!(
            "no script or stylesheet files found in {}",
            args.project.dir.display()
        );
    }
    tracing::info!(dir = %args.project.dir.display(), files = files.len(), "building project");

    let session = super::new_session(config);
    for (filename, content) in &files {
        session.notify_change(filename, content);
    }
    let outcome = session.run().await;
    let result = session.latest();
    output::print_diagnostics(&result);

    match outcome {
        CompileOutcome::Completed(_) => {
            output::write_bundle(&out, &RenderPayload::from_result(&result), &result)?;
        }
        CompileOutcome::Failed(_) => anyhow::bail!("compilation failed, nothing written"),
        CompileOutcome::Cancelled => anyhow::bail!("compilation was cancelled"),
    }

    eprintln!(
        "  {} in {:.1}s -> {}",
        output::summary(&result),
        started.elapsed().as_secs_f64(),
        out.display()
    );
    if !result.errors.is_empty() {
        anyhow::bail!("compilation finished with {} error(s)", result.errors.len());
    }
    Ok(())
}
